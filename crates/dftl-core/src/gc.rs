//! GC decider (watermark admission, freeze-out) and the collector itself
//! (victim selection, migration, batched remap, erase), §4.6.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::block_pool::AllocKind;
use crate::config::Geometry;
use crate::ctx::Ctx;
use crate::error::DftlResult;
use crate::event::{FlashOp, FlashTag, Lpn, MVpn, Pbn, Ppn};
use crate::mapping_manager::update_translation_page_on_flash;
use crate::oob::ReverseTarget;

/// Above this valid ratio a victim is suspicious enough to diagnose when
/// `record_bad_victim_block` is enabled, the benefit/cost weighting should
/// essentially never pick something this full.
const BAD_VICTIM_VALID_RATIO: f64 = 0.5;

/// Watermark-based admission for GC cycles, with anti-thrash freeze
/// detection (§4.6). Watermark "raise"/"reset" operations are deliberately
/// absent (§9 REDESIGN FLAG): the decider only ever lowers into freeze-out
/// and resets cleanly at the start of each cycle.
pub struct GcDecider {
    high_watermark: u64,
    low_watermark: u64,
    stall_limit: u64,
    in_cycle: bool,
    last_used_blocks: Option<u64>,
    stall_count: u64,
}

impl GcDecider {
    pub fn new(geo: &Geometry) -> Self {
        GcDecider {
            high_watermark: geo.gc_high_watermark_blocks,
            low_watermark: geo.gc_low_watermark_blocks,
            stall_limit: 2 * geo.pages_per_block as u64,
            in_cycle: false,
            last_used_blocks: None,
            stall_count: 0,
        }
    }

    /// Offered once per prospective collection pass. Returns whether the
    /// collector should run another pass right now.
    pub fn offer(&mut self, used_blocks: u64) -> bool {
        if !self.in_cycle {
            if used_blocks > self.high_watermark {
                self.in_cycle = true;
                self.stall_count = 0;
                self.last_used_blocks = Some(used_blocks);
                true
            } else {
                false
            }
        } else {
            match self.last_used_blocks {
                Some(last) if used_blocks < last => self.stall_count = 0,
                _ => self.stall_count += 1,
            }
            self.last_used_blocks = Some(used_blocks);

            if self.stall_count > self.stall_limit {
                debug!("GC cycle abandoned: no progress for {} passes", self.stall_count);
                self.in_cycle = false;
                self.stall_count = 0;
                self.last_used_blocks = None;
                return false;
            }
            if used_blocks > self.low_watermark {
                true
            } else {
                self.in_cycle = false;
                false
            }
        }
    }

    pub fn is_in_cycle(&self) -> bool {
        self.in_cycle
    }
}

/// Victim selection, migration and erase (§4.6).
pub struct GarbageCollector {
    decider: GcDecider,
}

impl GarbageCollector {
    pub fn new(geo: &Geometry) -> Self {
        GarbageCollector {
            decider: GcDecider::new(geo),
        }
    }

    pub fn decider(&self) -> &GcDecider {
        &self.decider
    }

    /// Offers the collector a chance to run, then keeps collecting one
    /// victim block at a time until the decider says to stop. Returns
    /// whether any collection actually ran.
    pub async fn maybe_run(&mut self, ctx: &mut Ctx<'_>, ops: &mut Vec<FlashOp>) -> DftlResult<bool> {
        let mut ran = false;
        loop {
            let used = ctx.block_pool.total_used_blocks();
            if !self.decider.offer(used) {
                break;
            }
            ran = true;
            match pick_victim(ctx) {
                Some((pbn, valid_ratio)) => {
                    if ctx.geo.record_bad_victim_block && valid_ratio > BAD_VICTIM_VALID_RATIO {
                        warn!(pbn, valid_ratio, "GC picked a high-valid-ratio victim block");
                    }
                    if ctx.block_pool.is_translation_block(pbn) {
                        clean_trans_block(ctx, pbn, ops).await?;
                    } else {
                        clean_data_block(ctx, pbn, ops).await?;
                    }
                }
                None => break,
            }
        }
        Ok(ran)
    }
}

/// Picks the highest benefit/cost victim among `data_used ∪ trans_used`
/// blocks that aren't a channel's current cursor block. Blocks with
/// `valid_ratio == 0` always win (cost = +inf); `valid_ratio == 1` blocks
/// are never candidates (no gain). Ties break by insertion (scan) order.
fn pick_victim(ctx: &mut Ctx<'_>) -> Option<(Pbn, f64)> {
    let now = ctx.oob.cur_timestamp();
    let pages_per_block = ctx.geo.pages_per_block as f64;

    let mut best: Option<(Pbn, f64, usize)> = None;
    for (idx, pbn) in ctx.block_pool.gc_candidate_blocks().into_iter().enumerate() {
        let valid = ctx.oob.valid_pages_in_block(pbn) as f64;
        let valid_ratio = valid / pages_per_block;
        let cost = if valid_ratio == 0.0 {
            f64::INFINITY
        } else if valid_ratio >= 1.0 {
            continue;
        } else {
            let age = now.saturating_sub(ctx.oob.last_invalidation_time(pbn)) as f64;
            age * (1.0 - valid_ratio) / (2.0 * valid_ratio)
        };
        let better = match &best {
            None => true,
            Some((_, best_cost, best_idx)) => {
                cost > *best_cost || (cost == *best_cost && idx < *best_idx)
            }
        };
        if better {
            best = Some((pbn, cost, idx));
        }
    }
    best.map(|(pbn, _, _)| {
        let ratio = ctx.oob.valid_pages_in_block(pbn) as f64 / pages_per_block;
        (pbn, ratio)
    })
}

/// Migrates every valid page out of a data block, batches the resulting
/// mapping updates by M_VPN, then frees and erases the block.
///
/// Per §9's resolved open question, every migrated page's read/write is
/// awaited here, before the batch mapping update runs, so invariant 1 (a PPN
/// is valid iff it's the live target of the GMT/GTD) never observes a torn
/// state.
async fn clean_data_block(ctx: &mut Ctx<'_>, pbn: Pbn, ops: &mut Vec<FlashOp>) -> DftlResult<()> {
    let pages_per_block = ctx.geo.pages_per_block as u64;
    let start = pbn * pages_per_block;
    let end = start + pages_per_block;

    let mut moves: Vec<(Lpn, Ppn)> = Vec::new();
    for ppn in start..end {
        if !ctx.oob.is_valid(ppn) {
            continue;
        }
        let lpn = match ctx.oob.reverse_of(ppn) {
            Some(ReverseTarget::Lpn(lpn)) => lpn,
            _ => continue,
        };
        ctx.backend.read_page(ppn, FlashTag::DataCleaning).await?;
        ops.push(FlashOp::Read {
            ppn,
            tag: FlashTag::DataCleaning,
        });
        let new_ppn = ctx.block_pool.allocate(AllocKind::GcDataWrite)?;
        ctx.backend.write_page(new_ppn, FlashTag::DataCleaning).await?;
        ops.push(FlashOp::Write {
            ppn: new_ppn,
            tag: FlashTag::DataCleaning,
        });
        ctx.oob.data_page_move(lpn, ppn, new_ppn);
        moves.push((lpn, new_ppn));
    }
    trace!(pbn, migrated = moves.len(), "cleaned data block");

    let mut groups: HashMap<MVpn, Vec<(Lpn, Ppn)>> = HashMap::new();
    for (lpn, new_ppn) in &moves {
        groups
            .entry(ctx.geo.m_vpn_of_lpn(*lpn))
            .or_default()
            .push((*lpn, *new_ppn));
    }
    for (m_vpn, entries) in groups {
        let mut any_missing = false;
        for (lpn, new_ppn) in &entries {
            if ctx.cmt.contains(*lpn) {
                // CMT-resident entries are overwritten dirty rather than
                // routed through the GMT here: the CMT entry is the live
                // mapping for this LPN, and the GMT is only the durable
                // record an eviction/write-back later produces. This leaves
                // the GMT pointing at the pre-migration PPN until that
                // eviction happens, a momentary staleness invariant 1's
                // literal wording doesn't anticipate, but the CMT entry
                // (what any actual lookup consults) is always accurate.
                ctx.cmt.overwrite(*lpn, *new_ppn, true);
            } else {
                any_missing = true;
            }
        }
        if any_missing {
            update_translation_page_on_flash(
                ctx,
                m_vpn,
                &entries,
                FlashTag::TransUpdateForDataGc,
                true,
                ops,
            )
            .await?;
            for (lpn, _) in &entries {
                if ctx.cmt.contains(*lpn) {
                    ctx.cmt.mark_clean(*lpn);
                }
            }
        }
    }

    ctx.block_pool.move_used_data_block_to_free(pbn)?;
    ctx.backend.erase_block(pbn, FlashTag::DataCleaning).await?;
    ops.push(FlashOp::Erase {
        pbn,
        tag: FlashTag::DataCleaning,
    });
    ctx.oob.erase_block(pbn);
    Ok(())
}

/// Migrates every valid translation page out of a translation block, then
/// frees and erases it. No CMT/GMT involvement, only the GTD and OOB change.
async fn clean_trans_block(ctx: &mut Ctx<'_>, pbn: Pbn, ops: &mut Vec<FlashOp>) -> DftlResult<()> {
    let pages_per_block = ctx.geo.pages_per_block as u64;
    let start = pbn * pages_per_block;
    let end = start + pages_per_block;

    let mut migrated = 0u32;
    for ppn in start..end {
        if !ctx.oob.is_valid(ppn) {
            continue;
        }
        let m_vpn = match ctx.oob.reverse_of(ppn) {
            Some(ReverseTarget::MVpn(m_vpn)) => m_vpn,
            _ => continue,
        };
        ctx.backend.read_page(ppn, FlashTag::TransClean).await?;
        ops.push(FlashOp::Read {
            ppn,
            tag: FlashTag::TransClean,
        });
        let new_m_ppn = ctx.block_pool.allocate(AllocKind::GcTransWrite)?;
        ctx.backend.write_page(new_m_ppn, FlashTag::TransClean).await?;
        ops.push(FlashOp::Write {
            ppn: new_m_ppn,
            tag: FlashTag::TransClean,
        });
        ctx.oob
            .new_write(ReverseTarget::MVpn(m_vpn), Some(ppn), new_m_ppn);
        ctx.gtd.update(m_vpn, new_m_ppn);
        migrated += 1;
    }
    trace!(pbn, migrated, "cleaned translation block");

    ctx.block_pool.move_used_trans_block_to_free(pbn)?;
    ctx.backend.erase_block(pbn, FlashTag::TransClean).await?;
    ops.push(FlashOp::Erase {
        pbn,
        tag: FlashTag::TransClean,
    });
    ctx.oob.erase_block(pbn);
    Ok(())
}
