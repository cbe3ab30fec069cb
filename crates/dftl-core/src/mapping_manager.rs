//! Coordinates CMT/GTD/GMT/OOB/block-pool: translation, eviction, batched
//! write-back, and translation-page rewrite (§4.5).

use tracing::debug;

use crate::block_pool::AllocKind;
use crate::cmt::CacheEntry;
use crate::ctx::Ctx;
use crate::error::{DftlError, DftlResult};
use crate::event::{FlashOp, FlashTag, Lpn, MVpn, Ppn, UNINITIATED};
use crate::oob::ReverseTarget;

/// Ensures `lpn`'s mapping is resident in the CMT, loading it from flash on
/// a miss: evict-until-not-full, read the translation page named by the
/// GTD, then insert `(lpn, GMT[lpn], dirty=false)`.
async fn ensure_loaded(ctx: &mut Ctx<'_>, lpn: Lpn, ops: &mut Vec<FlashOp>) -> DftlResult<CacheEntry> {
    if let Some(entry) = ctx.cmt.get(lpn) {
        return Ok(entry);
    }
    evict_until_not_full(ctx, ops).await?;

    let m_vpn = ctx.geo.m_vpn_of_lpn(lpn);
    if m_vpn as usize >= ctx.gtd.len() {
        return Err(DftlError::invariant(format!(
            "LPN {lpn} has no GTD entry for M_VPN {m_vpn}"
        )));
    }
    let m_ppn = ctx.gtd.lookup(m_vpn);
    ctx.backend.read_page(m_ppn, FlashTag::TransCache).await?;
    ops.push(FlashOp::Read {
        ppn: m_ppn,
        tag: FlashTag::TransCache,
    });

    let ppn = ctx.gmt.lookup(lpn).unwrap_or(UNINITIATED);
    ctx.cmt.insert(lpn, ppn, false);
    Ok(CacheEntry { ppn, dirty: false })
}

async fn evict_until_not_full(ctx: &mut Ctx<'_>, ops: &mut Vec<FlashOp>) -> DftlResult<()> {
    while ctx.cmt.is_full() {
        evict_one(ctx, ops).await?;
    }
    Ok(())
}

/// Evicts the SLRU victim. If it is dirty, gathers every currently-dirty
/// sibling sharing its M_VPN and folds them into a single translation-page
/// rewrite before clearing their dirty bits, amortizing the per-eviction
/// read+write across as many resident dirty siblings as possible. Either
/// way, only the selected victim is removed from the CMT.
async fn evict_one(ctx: &mut Ctx<'_>, ops: &mut Vec<FlashOp>) -> DftlResult<()> {
    let victim_lpn = ctx
        .cmt
        .victim()
        .ok_or_else(|| DftlError::invariant("CMT reports full but has no victim"))?;
    let victim = ctx
        .cmt
        .peek(victim_lpn)
        .expect("victim() returned an LPN absent from the CMT");

    if victim.dirty {
        let m_vpn = ctx.geo.m_vpn_of_lpn(victim_lpn);
        let siblings: Vec<(Lpn, Ppn)> = ctx
            .cmt
            .iter_entries()
            .filter(|(lpn, entry)| entry.dirty && ctx.geo.m_vpn_of_lpn(*lpn) == m_vpn)
            .map(|(lpn, entry)| (lpn, entry.ppn))
            .collect();
        debug!(m_vpn, siblings = siblings.len(), "batched write-back on eviction");
        update_translation_page_on_flash(ctx, m_vpn, &siblings, FlashTag::TransClean, false, ops)
            .await?;
        for (lpn, _) in &siblings {
            ctx.cmt.mark_clean(*lpn);
        }
    }
    ctx.cmt.remove(victim_lpn);
    Ok(())
}

/// Rewrites M_VPN's translation page with `new_mappings` folded in.
/// Preserves untouched entries by reading the old page first unless
/// `new_mappings` already covers every entry the page holds. `via_gc`
/// selects the GC write cursor over the cache-driven one (§4.5 step 2).
pub async fn update_translation_page_on_flash(
    ctx: &mut Ctx<'_>,
    m_vpn: MVpn,
    new_mappings: &[(Lpn, Ppn)],
    tag: FlashTag,
    via_gc: bool,
    ops: &mut Vec<FlashOp>,
) -> DftlResult<Ppn> {
    let old_m_ppn = ctx.gtd.lookup(m_vpn);

    if (new_mappings.len() as u64) < ctx.geo.entries_per_translation_page {
        ctx.backend.read_page(old_m_ppn, tag).await?;
        ops.push(FlashOp::Read {
            ppn: old_m_ppn,
            tag,
        });
    }

    let kind = if via_gc {
        AllocKind::GcTransWrite
    } else {
        AllocKind::TransWrite
    };
    let new_m_ppn = ctx.block_pool.allocate(kind)?;
    ctx.backend.write_page(new_m_ppn, tag).await?;
    ops.push(FlashOp::Write {
        ppn: new_m_ppn,
        tag,
    });

    for (lpn, ppn) in new_mappings {
        ctx.gmt.update(*lpn, *ppn);
    }
    ctx.oob
        .new_write(ReverseTarget::MVpn(m_vpn), Some(old_m_ppn), new_m_ppn);
    ctx.gtd.update(m_vpn, new_m_ppn);
    Ok(new_m_ppn)
}

/// `translate_for_read` (§4.5): load-then-lookup for every LPN, with
/// `UNINITIATED` standing in for "never written".
pub async fn translate_for_read(
    ctx: &mut Ctx<'_>,
    lpns: &[Lpn],
    ops: &mut Vec<FlashOp>,
) -> DftlResult<Vec<Ppn>> {
    let mut out = Vec::with_capacity(lpns.len());
    for &lpn in lpns {
        let entry = ensure_loaded(ctx, lpn, ops).await?;
        out.push(entry.ppn);
    }
    Ok(out)
}

/// `translate_for_write` (§4.5): establish the old mapping, then
/// allocate a fresh data PPN per LPN and mark the CMT entry dirty.
pub async fn translate_for_write(
    ctx: &mut Ctx<'_>,
    lpns: &[Lpn],
    ops: &mut Vec<FlashOp>,
) -> DftlResult<Vec<Ppn>> {
    let mut out = Vec::with_capacity(lpns.len());
    for &lpn in lpns {
        let old = ensure_loaded(ctx, lpn, ops).await?;
        let new_ppn = ctx.block_pool.allocate(AllocKind::DataWrite)?;
        ctx.backend.write_page(new_ppn, FlashTag::DataUser).await?;
        ops.push(FlashOp::Write {
            ppn: new_ppn,
            tag: FlashTag::DataUser,
        });
        let old_ppn = if old.ppn == UNINITIATED {
            None
        } else {
            Some(old.ppn)
        };
        ctx.cmt.overwrite(lpn, new_ppn, true);
        ctx.oob.new_lba_write(lpn, old_ppn, new_ppn);
        out.push(new_ppn);
    }
    Ok(out)
}

/// `discard` (§4.5): a no-op for an LPN never written; otherwise
/// invalidates the old mapping and marks the CMT entry dirty-UNINITIATED.
pub async fn discard(ctx: &mut Ctx<'_>, lpn: Lpn, ops: &mut Vec<FlashOp>) -> DftlResult<()> {
    let current = ensure_loaded(ctx, lpn, ops).await?;
    if current.ppn == UNINITIATED {
        return Ok(());
    }
    ctx.cmt.overwrite(lpn, UNINITIATED, true);
    ctx.oob.invalidate(current.ppn);
    Ok(())
}
