//! The flash backend boundary (§6 "Flash backend", §9 suspension
//! points). The backend is an external collaborator: the simulation clock
//! and channel-contention model live in `dftl-sim`, not here. The core only
//! needs the interface, an async call per page/block op that suspends the
//! caller until the modeled completion.

use async_trait::async_trait;

use crate::error::DftlResult;
use crate::event::{FlashTag, Pbn, Ppn};

/// Per-PPN read/write and per-PBN erase, each tagged so a downstream
/// latency/metrics model can discriminate host from GC traffic. Object-safe
/// via `async-trait` so the engine can hold `Box<dyn FlashBackend>` without
/// becoming generic over the backend implementation.
#[async_trait]
pub trait FlashBackend: Send + Sync {
    async fn read_page(&self, ppn: Ppn, tag: FlashTag) -> DftlResult<()>;
    async fn write_page(&self, ppn: Ppn, tag: FlashTag) -> DftlResult<()>;
    async fn erase_block(&self, pbn: Pbn, tag: FlashTag) -> DftlResult<()>;
}
