//! The DFTL façade: serializes host ops, drives translation, emits flash
//! requests (§4.7). Formatting (GTD pre-population) also lives here,
//! since it is the one place that owns every sibling component at once.

use crate::backend::FlashBackend;
use crate::block_pool::{AllocKind, DeviceBlockPool};
use crate::cmt::{CacheEntry, CachedMappingTable};
use crate::config::{DftlConfig, Geometry};
use crate::ctx::Ctx;
use crate::error::DftlResult;
use crate::event::{HostEvent, Lpn, Operation, PipelineOutcome, UNINITIATED};
use crate::gc::GarbageCollector;
use crate::gmt::GlobalMappingTable;
use crate::gtd::GlobalTranslationDirectory;
use crate::mapping_manager;
use crate::oob::{OutOfBandAreas, ReverseTarget};

/// Owns every DFTL sibling component. Callers are responsible for the
/// single-writer discipline from §5, wrap a `DftlEngine` in
/// `tokio::sync::Mutex` and hold the guard for the duration of one
/// `submit` call; the pipeline itself never re-enters that lock.
pub struct DftlEngine {
    geo: Geometry,
    cmt: CachedMappingTable,
    gtd: GlobalTranslationDirectory,
    gmt: GlobalMappingTable,
    oob: OutOfBandAreas,
    block_pool: DeviceBlockPool,
    gc: GarbageCollector,
    backend: Box<dyn FlashBackend>,
    total_lpns: u64,
}

impl DftlEngine {
    /// Formats a fresh device: derives geometry, then pre-populates the GTD
    /// with one translation-page mapping per M_VPN. No flash I/O happens
    /// here, the GTD is assumed vendor-initialized (§4.3).
    pub fn format(cfg: DftlConfig, total_lpns: u64, backend: Box<dyn FlashBackend>) -> DftlResult<Self> {
        let geo = Geometry::from_config(&cfg, total_lpns);
        let mut block_pool = DeviceBlockPool::new(geo);
        let mut oob = OutOfBandAreas::new(geo);
        let mut gtd = GlobalTranslationDirectory::new();

        for m_vpn in 0..geo.total_translation_pages {
            let m_ppn = block_pool.allocate(AllocKind::TransWrite)?;
            gtd.push(m_ppn);
            oob.validate(m_ppn, ReverseTarget::MVpn(m_vpn));
        }

        Ok(DftlEngine {
            geo,
            cmt: CachedMappingTable::new(geo.max_cmt_entries, geo.slru_protected_ratio),
            gtd,
            gmt: GlobalMappingTable::new(),
            oob,
            block_pool,
            gc: GarbageCollector::new(&geo),
            backend,
            total_lpns,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }

    pub fn cmt_len(&self) -> u64 {
        self.cmt.len()
    }

    pub fn total_used_blocks(&self) -> u64 {
        self.block_pool.total_used_blocks()
    }

    pub fn is_gc_in_cycle(&self) -> bool {
        self.gc.decider().is_in_cycle()
    }

    pub fn cur_timestamp(&self) -> u64 {
        self.oob.cur_timestamp()
    }

    fn ctx(&mut self) -> Ctx<'_> {
        Ctx {
            geo: &self.geo,
            cmt: &mut self.cmt,
            gtd: &mut self.gtd,
            gmt: &mut self.gmt,
            oob: &mut self.oob,
            block_pool: &mut self.block_pool,
            backend: self.backend.as_ref(),
        }
    }

    /// Computes `[lpn_start, lpn_start + lpn_count)` from a host event's
    /// byte offset and size, aligning down/up to page boundaries for writes
    /// and discards (§4.7 step 2, §6).
    fn lpn_range(&self, event: &HostEvent) -> (Lpn, u64) {
        let page_size = self.geo.page_size as u64;
        match event.operation {
            Operation::Write | Operation::Discard => {
                let start = event.offset_bytes / page_size;
                let end = (event.offset_bytes + event.size_bytes + page_size - 1) / page_size;
                (start, end.saturating_sub(start))
            }
            _ => {
                let start = event.offset_bytes / page_size;
                let end = (event.offset_bytes + event.size_bytes).div_ceil(page_size);
                (start, end.saturating_sub(start))
            }
        }
    }

    /// Drives one host event through translation and emits the resulting
    /// flash ops, then offers the collector a chance to run (§4.7).
    pub async fn submit(&mut self, event: HostEvent) -> DftlResult<PipelineOutcome> {
        let (start, count) = self.lpn_range(&event);
        let lpns: Vec<Lpn> = (start..start + count).collect();
        let mut ops = Vec::new();

        let ppns = match event.operation {
            Operation::Read => {
                let mut ctx = self.ctx();
                let ppns = mapping_manager::translate_for_read(&mut ctx, &lpns, &mut ops).await?;
                ppns.into_iter().filter(|p| *p != UNINITIATED).collect()
            }
            Operation::Write => {
                let mut ctx = self.ctx();
                mapping_manager::translate_for_write(&mut ctx, &lpns, &mut ops).await?
            }
            Operation::Discard => {
                let mut ctx = self.ctx();
                for &lpn in &lpns {
                    mapping_manager::discard(&mut ctx, lpn, &mut ops).await?;
                }
                Vec::new()
            }
            Operation::EnableRecorder | Operation::DisableRecorder => Vec::new(),
        };

        let mut gc_ran = false;
        if matches!(event.operation, Operation::Write) {
            let mut ctx = Ctx {
                geo: &self.geo,
                cmt: &mut self.cmt,
                gtd: &mut self.gtd,
                gmt: &mut self.gmt,
                oob: &mut self.oob,
                block_pool: &mut self.block_pool,
                backend: self.backend.as_ref(),
            };
            gc_ran = self.gc.maybe_run(&mut ctx, &mut ops).await?;
        }

        Ok(PipelineOutcome {
            ppns,
            ops,
            gc_ran,
        })
    }

    pub fn total_lpns(&self) -> u64 {
        self.total_lpns
    }

    // --- Introspection, for invariant checking and diagnostics only. Not
    // part of the request pipeline; nothing above this point should call
    // these. ---

    pub fn oob_is_valid(&self, ppn: crate::event::Ppn) -> bool {
        self.oob.is_valid(ppn)
    }

    pub fn oob_reverse_of(&self, ppn: crate::event::Ppn) -> Option<crate::oob::ReverseTarget> {
        self.oob.reverse_of(ppn)
    }

    pub fn oob_timestamp_of(&self, ppn: crate::event::Ppn) -> Option<u64> {
        self.oob.timestamp_of(ppn)
    }

    pub fn gmt_lookup(&self, lpn: Lpn) -> Option<crate::event::Ppn> {
        self.gmt.lookup(lpn)
    }

    pub fn gtd_lookup(&self, m_vpn: crate::event::MVpn) -> crate::event::Ppn {
        self.gtd.lookup(m_vpn)
    }

    pub fn cmt_peek(&self, lpn: Lpn) -> Option<CacheEntry> {
        self.cmt.peek(lpn)
    }

    pub fn cmt_max_entries(&self) -> u64 {
        self.geo.max_cmt_entries
    }

    pub fn cmt_entries(&self) -> Vec<(Lpn, CacheEntry)> {
        self.cmt.iter_entries().collect()
    }

    pub fn data_used_pbns(&self) -> Vec<crate::event::Pbn> {
        self.block_pool.data_used_pbns()
    }

    pub fn trans_used_pbns(&self) -> Vec<crate::event::Pbn> {
        self.block_pool.trans_used_pbns()
    }

    pub fn total_free_blocks(&self) -> u64 {
        self.block_pool.num_free_blocks()
    }

    pub fn cursor_pbns(&self) -> Vec<crate::event::Pbn> {
        self.block_pool.cursor_pbns()
    }
}
