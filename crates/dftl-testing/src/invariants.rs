//! Runtime checkers for the quantified invariants: each one checked directly
//! against engine state, rather than kept as a descriptive catalog entry.
//!
//! Invariants 6 and 7 are sequential properties (comparing state across a
//! GC pass, or across a run of events) rather than single-snapshot checks,
//! so they are exercised directly in `tests/properties.rs` instead of living
//! here.

use std::collections::HashSet;

use dftl_core::{DftlEngine, ReverseTarget, UNINITIATED};

/// Invariant 1: a PPN is VALID iff some LPN's GMT entry or some M_VPN's GTD
/// entry targets it.
///
/// When GC migrates a page whose LPN is CMT-resident, the CMT entry is
/// overwritten dirty with the new PPN and the GMT is left pointing at the
/// pre-migration PPN until a later eviction writes it back (see the
/// CMT-dirty override in `gc::clean_data_block`). The live mapping for that
/// LPN is always the CMT entry, not the GMT, so this check can only ever
/// observe a false positive for an LPN that's CMT-resident at snapshot time;
/// it holds unconditionally for anything evicted.
pub fn validity_matches_mappings(engine: &DftlEngine) -> Result<(), String> {
    let geo = engine.geometry();
    for ppn in 0..geo.pages_per_device {
        let valid = engine.oob_is_valid(ppn);
        let reverse = engine.oob_reverse_of(ppn);
        match (valid, reverse) {
            (true, Some(ReverseTarget::Lpn(lpn))) => {
                if engine.gmt_lookup(lpn) != Some(ppn) {
                    return Err(format!(
                        "ppn {ppn} valid via lpn {lpn} but GMT[{lpn}] != {ppn}"
                    ));
                }
            }
            (true, Some(ReverseTarget::MVpn(m_vpn))) => {
                if engine.gtd_lookup(m_vpn) != ppn {
                    return Err(format!(
                        "ppn {ppn} valid via m_vpn {m_vpn} but GTD[{m_vpn}] != {ppn}"
                    ));
                }
            }
            (true, None) => return Err(format!("ppn {ppn} valid with no reverse map entry")),
            (false, _) => {}
        }
    }
    Ok(())
}

/// Invariant 2: `free`, `data_used`, `trans_used` partition the device's
/// blocks. Checked device-wide, which implies the per-channel statement
/// since each channel's blocks occupy a disjoint global PBN range.
pub fn block_sets_partition_device(engine: &DftlEngine) -> Result<(), String> {
    let data: HashSet<_> = engine.data_used_pbns().into_iter().collect();
    let trans: HashSet<_> = engine.trans_used_pbns().into_iter().collect();
    if !data.is_disjoint(&trans) {
        return Err("data_used and trans_used overlap".to_string());
    }
    let used = (data.len() + trans.len()) as u64;
    let free = engine.total_free_blocks();
    let total = engine.geometry().blocks_per_device;
    if used + free != total {
        return Err(format!(
            "used({used}) + free({free}) != blocks_per_device({total})"
        ));
    }
    Ok(())
}

/// Invariant 3: a clean CMT entry agrees with the GMT (or, for an entry that
/// was never written, both sides agree it's UNINITIATED).
pub fn clean_cmt_entries_match_gmt(engine: &DftlEngine) -> Result<(), String> {
    for (lpn, entry) in engine.cmt_entries() {
        if entry.dirty {
            continue;
        }
        let expected = if entry.ppn == UNINITIATED {
            None
        } else {
            Some(entry.ppn)
        };
        if engine.gmt_lookup(lpn) != expected {
            return Err(format!(
                "clean cmt entry for lpn {lpn} (ppn {}) disagrees with GMT",
                entry.ppn
            ));
        }
    }
    Ok(())
}

/// Invariant 4: every write cursor's block is a member of its matching
/// used-set.
pub fn cursors_point_into_used_sets(engine: &DftlEngine) -> Result<(), String> {
    let data: HashSet<_> = engine.data_used_pbns().into_iter().collect();
    let trans: HashSet<_> = engine.trans_used_pbns().into_iter().collect();
    for pbn in engine.cursor_pbns() {
        if !data.contains(&pbn) && !trans.contains(&pbn) {
            return Err(format!("cursor block {pbn} is in neither used set"));
        }
    }
    Ok(())
}

/// Invariant 5: the CMT never exceeds its configured capacity.
pub fn cmt_within_capacity(engine: &DftlEngine) -> Result<(), String> {
    if engine.cmt_len() > engine.cmt_max_entries() {
        return Err(format!(
            "cmt_len {} exceeds max_entries {}",
            engine.cmt_len(),
            engine.cmt_max_entries()
        ));
    }
    Ok(())
}

/// Runs every snapshot invariant, short-circuiting on the first failure.
pub fn check_all(engine: &DftlEngine) -> Result<(), String> {
    validity_matches_mappings(engine)?;
    block_sets_partition_device(engine)?;
    clean_cmt_entries_match_gmt(engine)?;
    cursors_point_into_used_sets(engine)?;
    cmt_within_capacity(engine)?;
    Ok(())
}
