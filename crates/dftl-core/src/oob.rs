//! Out-of-band metadata: per-page validity, reverse mapping, timestamps
//! (§4.1).

use std::collections::HashMap;

use crate::config::Geometry;
use crate::event::{Lpn, MVpn, Pbn, Ppn};

/// Per-PPN validity trit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Erased,
    Valid,
    Invalid,
}

/// What a PPN's reverse map points back to: a data LPN or a translation
/// page's virtual number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseTarget {
    Lpn(Lpn),
    MVpn(MVpn),
}

/// Per-PPN metadata kept alongside the page it describes. Modeled in memory
/// (spec: "the OOB is conceptually on flash but is modeled in memory").
pub struct OutOfBandAreas {
    geo: Geometry,
    validity: HashMap<Ppn, Validity>,
    reverse_map: HashMap<Ppn, ReverseTarget>,
    timestamp: HashMap<Ppn, u64>,
    last_invalidation: HashMap<Pbn, u64>,
    cur_timestamp: u64,
}

impl OutOfBandAreas {
    pub fn new(geo: Geometry) -> Self {
        OutOfBandAreas {
            geo,
            validity: HashMap::new(),
            reverse_map: HashMap::new(),
            timestamp: HashMap::new(),
            last_invalidation: HashMap::new(),
            cur_timestamp: 0,
        }
    }

    /// Advances the monotonic logical clock and returns the value consumed.
    /// Only the host-write path calls this (§3 "Timestamp"); GC must
    /// never refresh a page's age. `new_lba_write` is the only internal
    /// caller; exposed publicly so a driver can advance time independent of
    /// a write (e.g. to exercise GC aging in tests).
    pub fn advance_timestamp(&mut self) -> u64 {
        let t = self.cur_timestamp;
        self.cur_timestamp += 1;
        t
    }

    pub fn cur_timestamp(&self) -> u64 {
        self.cur_timestamp
    }

    pub fn is_valid(&self, ppn: Ppn) -> bool {
        matches!(self.validity.get(&ppn), Some(Validity::Valid))
    }

    pub fn validity_of(&self, ppn: Ppn) -> Validity {
        *self.validity.get(&ppn).unwrap_or(&Validity::Erased)
    }

    pub fn reverse_of(&self, ppn: Ppn) -> Option<ReverseTarget> {
        self.reverse_map.get(&ppn).copied()
    }

    pub fn timestamp_of(&self, ppn: Ppn) -> Option<u64> {
        self.timestamp.get(&ppn).copied()
    }

    pub fn last_invalidation_time(&self, pbn: Pbn) -> u64 {
        *self.last_invalidation.get(&pbn).unwrap_or(&0)
    }

    pub fn validate(&mut self, ppn: Ppn, target: ReverseTarget) {
        self.validity.insert(ppn, Validity::Valid);
        self.reverse_map.insert(ppn, target);
    }

    pub fn invalidate(&mut self, ppn: Ppn) {
        self.validity.insert(ppn, Validity::Invalid);
        let pbn = self.geo.pbn_of_ppn(ppn);
        self.last_invalidation.insert(pbn, self.cur_timestamp);
    }

    /// Resets every page of `pbn` to ERASED and drops its reverse map and
    /// timestamp. Does not touch `last_invalidation` for the block, a fresh
    /// block starts with no recorded invalidation, and GC only ever reads
    /// this for `data_used`/`trans_used` blocks.
    pub fn erase_block(&mut self, pbn: Pbn) {
        let start = pbn * self.geo.pages_per_block as u64;
        let end = start + self.geo.pages_per_block as u64;
        for ppn in start..end {
            self.validity.insert(ppn, Validity::Erased);
            self.reverse_map.remove(&ppn);
            self.timestamp.remove(&ppn);
        }
        self.last_invalidation.remove(&pbn);
    }

    /// Shared core of `new_write`/`new_lba_write`/`data_page_move`: marks
    /// `new_ppn` valid, records its reverse map, invalidates `old_ppn` (if
    /// it held a prior mapping).
    fn new_write_common(&mut self, target: ReverseTarget, old_ppn: Option<Ppn>, new_ppn: Ppn) {
        self.validate(new_ppn, target);
        if let Some(old) = old_ppn {
            if old != crate::event::UNINITIATED {
                self.invalidate(old);
            }
        }
    }

    /// Used for both data and translation-page rewrites that aren't driven
    /// directly by a host LBA write (e.g. batched CMT write-back, GC
    /// translation-page migration).
    pub fn new_write(&mut self, target: ReverseTarget, old_ppn: Option<Ppn>, new_ppn: Ppn) {
        self.new_write_common(target, old_ppn, new_ppn);
    }

    /// As `new_write`, plus stamps `new_ppn` with a freshly advanced logical
    /// timestamp, used only for host-triggered data writes.
    pub fn new_lba_write(&mut self, lpn: Lpn, old_ppn: Option<Ppn>, new_ppn: Ppn) {
        let ts = self.advance_timestamp();
        self.new_write_common(ReverseTarget::Lpn(lpn), old_ppn, new_ppn);
        self.timestamp.insert(new_ppn, ts);
    }

    /// As `new_write`, but *copies* the old PPN's timestamp to the new one:
    /// GC must not refresh a page's age.
    pub fn data_page_move(&mut self, lpn: Lpn, old_ppn: Ppn, new_ppn: Ppn) {
        let ts = self.timestamp.get(&old_ppn).copied().unwrap_or(0);
        self.new_write_common(ReverseTarget::Lpn(lpn), Some(old_ppn), new_ppn);
        self.timestamp.insert(new_ppn, ts);
    }

    /// All LPNs whose current valid page lives in block `pbn` (GC query).
    pub fn lpns_of_block(&self, pbn: Pbn) -> Vec<Lpn> {
        let start = pbn * self.geo.pages_per_block as u64;
        let end = start + self.geo.pages_per_block as u64;
        (start..end)
            .filter(|ppn| self.is_valid(*ppn))
            .filter_map(|ppn| match self.reverse_map.get(&ppn) {
                Some(ReverseTarget::Lpn(lpn)) => Some(*lpn),
                _ => None,
            })
            .collect()
    }

    /// All M_VPNs whose current valid translation page lives in block `pbn`.
    pub fn m_vpns_of_block(&self, pbn: Pbn) -> Vec<MVpn> {
        let start = pbn * self.geo.pages_per_block as u64;
        let end = start + self.geo.pages_per_block as u64;
        (start..end)
            .filter(|ppn| self.is_valid(*ppn))
            .filter_map(|ppn| match self.reverse_map.get(&ppn) {
                Some(ReverseTarget::MVpn(m_vpn)) => Some(*m_vpn),
                _ => None,
            })
            .collect()
    }

    pub fn valid_pages_in_block(&self, pbn: Pbn) -> u32 {
        let start = pbn * self.geo.pages_per_block as u64;
        let end = start + self.geo.pages_per_block as u64;
        (start..end).filter(|ppn| self.is_valid(*ppn)).count() as u32
    }
}
