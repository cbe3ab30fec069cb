//! Channel and device block pools: free/used-set bookkeeping and the four
//! write cursors per channel (§4.2).

use std::collections::{HashSet, VecDeque};

use crate::config::Geometry;
use crate::error::{DftlError, DftlResult};
use crate::event::{Pbn, Ppn};

/// Which of the four write streams an allocation request belongs to.
/// An explicit enum (§9) in place of dispatch-by-method-name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocKind {
    DataWrite,
    TransWrite,
    GcDataWrite,
    GcTransWrite,
}

impl AllocKind {
    fn targets_data(self) -> bool {
        matches!(self, AllocKind::DataWrite | AllocKind::GcDataWrite)
    }
}

/// One channel's blocks: three disjoint sets plus four write cursors, all in
/// the channel's local address space (block/page numbers `0..blocks_per_channel`
/// / `0..pages_per_channel`).
pub struct ChannelBlockPool {
    pages_per_block: u64,
    free: VecDeque<Pbn>,
    data_used: HashSet<Pbn>,
    trans_used: HashSet<Pbn>,
    data_cursor: Option<Ppn>,
    trans_cursor: Option<Ppn>,
    gc_data_cursor: Option<Ppn>,
    gc_trans_cursor: Option<Ppn>,
}

impl ChannelBlockPool {
    pub fn new(blocks_per_channel: u32, pages_per_block: u32) -> Self {
        ChannelBlockPool {
            pages_per_block: pages_per_block as u64,
            free: (0..blocks_per_channel as u64).collect(),
            data_used: HashSet::new(),
            trans_used: HashSet::new(),
            data_cursor: None,
            trans_cursor: None,
            gc_data_cursor: None,
            gc_trans_cursor: None,
        }
    }

    fn pbn_of(&self, local_ppn: Ppn) -> Pbn {
        local_ppn / self.pages_per_block
    }

    fn pop_free_block(&mut self, into_data: bool) -> DftlResult<Pbn> {
        let pbn = self.free.pop_front().ok_or(DftlError::OutOfSpace)?;
        if into_data {
            self.data_used.insert(pbn);
        } else {
            self.trans_used.insert(pbn);
        }
        Ok(pbn)
    }

    /// Cursor-advance rule (§4.2): the first call for a stream pops a
    /// fresh block; thereafter the cursor walks forward within its block and
    /// only pops a new one on exhaustion.
    fn advance_cursor(&mut self, cursor: Option<Ppn>, into_data: bool) -> DftlResult<Ppn> {
        match cursor {
            None => {
                let pbn = self.pop_free_block(into_data)?;
                Ok(pbn * self.pages_per_block)
            }
            Some(cur) => {
                let next = cur + 1;
                if self.pbn_of(next) == self.pbn_of(cur) {
                    Ok(next)
                } else {
                    let pbn = self.pop_free_block(into_data)?;
                    Ok(pbn * self.pages_per_block)
                }
            }
        }
    }

    pub fn allocate(&mut self, kind: AllocKind) -> DftlResult<Ppn> {
        let into_data = kind.targets_data();
        let new_ppn = match kind {
            AllocKind::DataWrite => self.advance_cursor(self.data_cursor, into_data)?,
            AllocKind::TransWrite => self.advance_cursor(self.trans_cursor, into_data)?,
            AllocKind::GcDataWrite => self.advance_cursor(self.gc_data_cursor, into_data)?,
            AllocKind::GcTransWrite => self.advance_cursor(self.gc_trans_cursor, into_data)?,
        };
        match kind {
            AllocKind::DataWrite => self.data_cursor = Some(new_ppn),
            AllocKind::TransWrite => self.trans_cursor = Some(new_ppn),
            AllocKind::GcDataWrite => self.gc_data_cursor = Some(new_ppn),
            AllocKind::GcTransWrite => self.gc_trans_cursor = Some(new_ppn),
        }
        Ok(new_ppn)
    }

    fn cursor_block(&self, cursor: Option<Ppn>) -> Option<Pbn> {
        cursor.map(|ppn| self.pbn_of(ppn))
    }

    /// Blocks currently pointed to by any of the four cursors, GC must
    /// never select these as victims.
    pub fn cursor_blocks(&self) -> Vec<Pbn> {
        [
            self.cursor_block(self.data_cursor),
            self.cursor_block(self.trans_cursor),
            self.cursor_block(self.gc_data_cursor),
            self.cursor_block(self.gc_trans_cursor),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn move_used_data_block_to_free(&mut self, pbn: Pbn) -> DftlResult<()> {
        if !self.data_used.remove(&pbn) {
            return Err(DftlError::invariant(format!(
                "block {pbn} is not in the data-used set"
            )));
        }
        self.free.push_back(pbn);
        Ok(())
    }

    pub fn move_used_trans_block_to_free(&mut self, pbn: Pbn) -> DftlResult<()> {
        if !self.trans_used.remove(&pbn) {
            return Err(DftlError::invariant(format!(
                "block {pbn} is not in the trans-used set"
            )));
        }
        self.free.push_back(pbn);
        Ok(())
    }

    pub fn data_used_blocks(&self) -> impl Iterator<Item = Pbn> + '_ {
        self.data_used.iter().copied()
    }

    pub fn trans_used_blocks(&self) -> impl Iterator<Item = Pbn> + '_ {
        self.trans_used.iter().copied()
    }

    pub fn total_used_blocks(&self) -> u64 {
        (self.data_used.len() + self.trans_used.len()) as u64
    }

    pub fn num_free_blocks(&self) -> u64 {
        self.free.len() as u64
    }

    #[cfg(test)]
    fn total_blocks(&self) -> u64 {
        self.free.len() as u64 + self.data_used.len() as u64 + self.trans_used.len() as u64
    }
}

/// Device-wide allocation: round-robin striping over per-channel pools
/// (§4.2 "Device block pool").
pub struct DeviceBlockPool {
    geo: Geometry,
    channels: Vec<ChannelBlockPool>,
    cur_channel: u32,
}

impl DeviceBlockPool {
    pub fn new(geo: Geometry) -> Self {
        let channels = (0..geo.channels)
            .map(|_| ChannelBlockPool::new(geo.blocks_per_channel, geo.pages_per_block))
            .collect();
        DeviceBlockPool {
            geo,
            channels,
            cur_channel: 0,
        }
    }

    fn to_global_ppn(&self, channel: u32, local_ppn: Ppn) -> Ppn {
        channel as u64 * self.geo.pages_per_channel + local_ppn
    }

    fn to_global_pbn(&self, channel: u32, local_pbn: Pbn) -> Pbn {
        channel as u64 * self.geo.blocks_per_channel as u64 + local_pbn
    }

    fn to_local_pbn(&self, global_pbn: Pbn) -> Pbn {
        global_pbn % self.geo.blocks_per_channel as u64
    }

    pub fn channel_of_pbn(&self, global_pbn: Pbn) -> u32 {
        (global_pbn / self.geo.blocks_per_channel as u64) as u32
    }

    /// Allocates one page for `kind`, striping round-robin across channels:
    /// the attempt starts at `cur_channel`, retries the next channel on
    /// `OutOfSpace`, and only fails once every channel has been tried. The
    /// rotation advances on every call, success or failure.
    pub fn allocate(&mut self, kind: AllocKind) -> DftlResult<Ppn> {
        let n = self.channels.len() as u32;
        let start = self.cur_channel;
        for i in 0..n {
            let ch = (start + i) % n;
            match self.channels[ch as usize].allocate(kind) {
                Ok(local_ppn) => {
                    self.cur_channel = (ch + 1) % n;
                    return Ok(self.to_global_ppn(ch, local_ppn));
                }
                Err(DftlError::OutOfSpace) => continue,
                Err(e) => return Err(e),
            }
        }
        self.cur_channel = (start + 1) % n;
        Err(DftlError::OutOfSpace)
    }

    pub fn move_used_data_block_to_free(&mut self, global_pbn: Pbn) -> DftlResult<()> {
        let ch = self.channel_of_pbn(global_pbn);
        let local = self.to_local_pbn(global_pbn);
        self.channels[ch as usize].move_used_data_block_to_free(local)
    }

    pub fn move_used_trans_block_to_free(&mut self, global_pbn: Pbn) -> DftlResult<()> {
        let ch = self.channel_of_pbn(global_pbn);
        let local = self.to_local_pbn(global_pbn);
        self.channels[ch as usize].move_used_trans_block_to_free(local)
    }

    /// All used blocks (data + translation), device-global PBNs, skipping
    /// each channel's current cursor blocks, candidates for GC victim
    /// selection (§4.6).
    pub fn gc_candidate_blocks(&self) -> Vec<Pbn> {
        let mut out = Vec::new();
        for (ch_idx, ch) in self.channels.iter().enumerate() {
            let ch_idx = ch_idx as u32;
            let cursor_blocks: HashSet<Pbn> = ch.cursor_blocks().into_iter().collect();
            for pbn in ch.data_used_blocks().chain(ch.trans_used_blocks()) {
                if !cursor_blocks.contains(&pbn) {
                    out.push(self.to_global_pbn(ch_idx, pbn));
                }
            }
        }
        out
    }

    /// Every data-used block, device-global PBNs (includes cursor blocks,
    /// unlike `gc_candidate_blocks`), for invariant checking.
    pub fn data_used_pbns(&self) -> Vec<Pbn> {
        self.channels
            .iter()
            .enumerate()
            .flat_map(|(ch, c)| {
                let ch = ch as u32;
                c.data_used_blocks()
                    .map(move |pbn| (ch, pbn))
                    .collect::<Vec<_>>()
            })
            .map(|(ch, pbn)| self.to_global_pbn(ch, pbn))
            .collect()
    }

    /// As `data_used_pbns`, for translation blocks.
    pub fn trans_used_pbns(&self) -> Vec<Pbn> {
        self.channels
            .iter()
            .enumerate()
            .flat_map(|(ch, c)| {
                let ch = ch as u32;
                c.trans_used_blocks()
                    .map(move |pbn| (ch, pbn))
                    .collect::<Vec<_>>()
            })
            .map(|(ch, pbn)| self.to_global_pbn(ch, pbn))
            .collect()
    }

    /// Every channel's four write-cursor blocks, device-global PBNs.
    pub fn cursor_pbns(&self) -> Vec<Pbn> {
        self.channels
            .iter()
            .enumerate()
            .flat_map(|(ch, c)| {
                let ch = ch as u32;
                c.cursor_blocks()
                    .into_iter()
                    .map(move |pbn| (ch, pbn))
                    .collect::<Vec<_>>()
            })
            .map(|(ch, pbn)| self.to_global_pbn(ch, pbn))
            .collect()
    }

    pub fn is_translation_block(&self, global_pbn: Pbn) -> bool {
        let ch = self.channel_of_pbn(global_pbn);
        let local = self.to_local_pbn(global_pbn);
        self.channels[ch as usize]
            .trans_used_blocks()
            .any(|b| b == local)
    }

    pub fn total_used_blocks(&self) -> u64 {
        self.channels.iter().map(|c| c.total_used_blocks()).sum()
    }

    pub fn num_free_blocks(&self) -> u64 {
        self.channels.iter().map(|c| c.num_free_blocks()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DftlConfig;

    fn geo(channels: u32, blocks_per_channel: u32, pages_per_block: u32) -> Geometry {
        let cfg = DftlConfig {
            n_channels_per_dev: channels,
            n_blocks_per_channel: blocks_per_channel,
            n_pages_per_block: pages_per_block,
            ..DftlConfig::default()
        };
        Geometry::from_config(&cfg, 1024)
    }

    #[test]
    fn round_robin_stripes_across_channels() {
        let mut pool = DeviceBlockPool::new(geo(4, 4, 4));
        let ppns: Vec<Ppn> = (0..4)
            .map(|_| pool.allocate(AllocKind::DataWrite).unwrap())
            .collect();
        let channels: HashSet<u32> = ppns.iter().map(|p| pool.geo.channel_of_ppn(*p)).collect();
        assert_eq!(channels.len(), 4);
    }

    #[test]
    fn cursor_stays_within_block_until_exhausted() {
        let mut chan = ChannelBlockPool::new(2, 4);
        let mut ppns = Vec::new();
        for _ in 0..4 {
            ppns.push(chan.allocate(AllocKind::DataWrite).unwrap());
        }
        assert_eq!(ppns, vec![0, 1, 2, 3]);
        assert_eq!(chan.total_used_blocks(), 1);
        let next = chan.allocate(AllocKind::DataWrite).unwrap();
        assert_eq!(next, 4);
        assert_eq!(chan.total_used_blocks(), 2);
    }

    #[test]
    fn moving_block_not_in_used_set_is_an_error() {
        let mut chan = ChannelBlockPool::new(2, 4);
        assert!(chan.move_used_data_block_to_free(0).is_err());
    }

    #[test]
    fn sets_stay_disjoint_and_cover_all_blocks() {
        let mut chan = ChannelBlockPool::new(3, 2);
        chan.allocate(AllocKind::DataWrite).unwrap();
        chan.allocate(AllocKind::TransWrite).unwrap();
        assert_eq!(chan.total_blocks(), 3);
        assert_eq!(chan.data_used.len() + chan.trans_used.len() + chan.free.len() as usize, 3);
    }

    #[test]
    fn out_of_space_when_all_channels_exhausted() {
        let mut pool = DeviceBlockPool::new(geo(2, 1, 2));
        pool.allocate(AllocKind::DataWrite).unwrap();
        pool.allocate(AllocKind::DataWrite).unwrap();
        // both channels now have a single exhausted block with nothing free
        pool.allocate(AllocKind::DataWrite).unwrap();
        pool.allocate(AllocKind::DataWrite).unwrap();
        assert!(matches!(
            pool.allocate(AllocKind::DataWrite),
            Err(DftlError::OutOfSpace)
        ));
    }
}
