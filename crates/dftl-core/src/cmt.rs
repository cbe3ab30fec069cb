//! Cached Mapping Table: a bounded, dirty-aware, segmented-LRU cache of
//! LPN→PPN entries (§4.4).
//!
//! The cache never evicts on its own, the mapping manager must evict down
//! to capacity (writing back dirty victims) before inserting. `CachedEntry`
//! order is tracked as two ordered lists (protected / probationary, MRU at
//! the front); promotion on any hit matches the default 50/50 split called
//! out in §9.

use std::collections::{HashMap, VecDeque};

use crate::event::{Lpn, Ppn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub ppn: Ppn,
    pub dirty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Protected,
    Probationary,
}

struct Slot {
    entry: CacheEntry,
    segment: Segment,
}

pub struct CachedMappingTable {
    max_entries: u64,
    protected_capacity: u64,
    entries: HashMap<Lpn, Slot>,
    protected: VecDeque<Lpn>,
    probationary: VecDeque<Lpn>,
}

impl CachedMappingTable {
    pub fn new(max_entries: u64, protected_ratio: f64) -> Self {
        let protected_capacity = ((max_entries as f64) * protected_ratio).round() as u64;
        CachedMappingTable {
            max_entries,
            protected_capacity,
            entries: HashMap::new(),
            protected: VecDeque::new(),
            probationary: VecDeque::new(),
        }
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_entries
    }

    pub fn contains(&self, lpn: Lpn) -> bool {
        self.entries.contains_key(&lpn)
    }

    fn remove_from_order(&mut self, lpn: Lpn, segment: Segment) {
        let list = match segment {
            Segment::Protected => &mut self.protected,
            Segment::Probationary => &mut self.probationary,
        };
        if let Some(pos) = list.iter().position(|l| *l == lpn) {
            list.remove(pos);
        }
    }

    fn demote_protected_overflow(&mut self) {
        while self.protected.len() as u64 > self.protected_capacity {
            if let Some(lpn) = self.protected.pop_back() {
                if let Some(slot) = self.entries.get_mut(&lpn) {
                    slot.segment = Segment::Probationary;
                }
                self.probationary.push_front(lpn);
            } else {
                break;
            }
        }
    }

    /// Promotes `lpn` to the protected segment's MRU position, demoting the
    /// protected LRU into probationary if that overflows capacity.
    fn promote(&mut self, lpn: Lpn) {
        let segment = match self.entries.get(&lpn) {
            Some(slot) => slot.segment,
            None => return,
        };
        self.remove_from_order(lpn, segment);
        self.protected.push_front(lpn);
        if let Some(slot) = self.entries.get_mut(&lpn) {
            slot.segment = Segment::Protected;
        }
        self.demote_protected_overflow();
    }

    /// Looks up `lpn`, promoting on hit. `None` on a cache miss (the
    /// `MISS` sentinel from §7 is represented as `Option::None` here).
    pub fn get(&mut self, lpn: Lpn) -> Option<CacheEntry> {
        let entry = self.entries.get(&lpn).map(|s| s.entry)?;
        self.promote(lpn);
        Some(entry)
    }

    /// Read-only peek that does not affect recency ordering.
    pub fn peek(&self, lpn: Lpn) -> Option<CacheEntry> {
        self.entries.get(&lpn).map(|s| s.entry)
    }

    /// Inserts a brand-new entry into the probationary MRU slot. Panics (via
    /// an invariant-violation style assertion) if `lpn` is already present:
    /// the caller is responsible for evicting down to capacity first.
    pub fn insert(&mut self, lpn: Lpn, ppn: Ppn, dirty: bool) {
        assert!(
            !self.entries.contains_key(&lpn),
            "CMT invariant violated: inserting an LPN already present"
        );
        self.entries.insert(
            lpn,
            Slot {
                entry: CacheEntry { ppn, dirty },
                segment: Segment::Probationary,
            },
        );
        self.probationary.push_front(lpn);
    }

    /// Updates an existing entry's PPN/dirty bit in place. Requires `lpn`
    /// present; does not change recency order (the caller typically already
    /// promoted via a preceding `get`).
    pub fn overwrite(&mut self, lpn: Lpn, ppn: Ppn, dirty: bool) {
        let slot = self
            .entries
            .get_mut(&lpn)
            .expect("CMT invariant violated: overwriting an absent LPN");
        slot.entry.ppn = ppn;
        slot.entry.dirty = dirty;
    }

    pub fn mark_clean(&mut self, lpn: Lpn) {
        if let Some(slot) = self.entries.get_mut(&lpn) {
            slot.entry.dirty = false;
        }
    }

    /// Returns the next eviction candidate without removing it: the LRU of
    /// the probationary segment, falling back to the protected segment's LRU
    /// if probationary is empty.
    pub fn victim(&self) -> Option<Lpn> {
        self.probationary
            .back()
            .or_else(|| self.protected.back())
            .copied()
    }

    pub fn remove(&mut self, lpn: Lpn) -> Option<CacheEntry> {
        let slot = self.entries.remove(&lpn)?;
        self.remove_from_order(lpn, slot.segment);
        Some(slot.entry)
    }

    pub fn iter_entries(&self) -> impl Iterator<Item = (Lpn, CacheEntry)> + '_ {
        self.entries.iter().map(|(lpn, slot)| (*lpn, slot.entry))
    }
}
