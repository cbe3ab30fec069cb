//! Global Mapping Table: conceptual LPN→PPN for the whole device,
//! modeled in-memory but semantically "on flash" (§4.3).

use std::collections::HashMap;

use crate::event::{Lpn, Ppn};

#[derive(Debug, Default)]
pub struct GlobalMappingTable {
    entries: HashMap<Lpn, Ppn>,
}

impl GlobalMappingTable {
    pub fn new() -> Self {
        GlobalMappingTable {
            entries: HashMap::new(),
        }
    }

    /// Returns `None` for an LPN that was never written (the caller
    /// substitutes the `UNINITIATED` sentinel).
    pub fn lookup(&self, lpn: Lpn) -> Option<Ppn> {
        self.entries.get(&lpn).copied()
    }

    pub fn update(&mut self, lpn: Lpn, ppn: Ppn) {
        self.entries.insert(lpn, ppn);
    }
}
