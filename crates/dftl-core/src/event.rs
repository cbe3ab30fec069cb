//! Host event stream and flash backend request shapes (§6).

use serde::{Deserialize, Serialize};

/// A host-visible block-device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    Discard,
    EnableRecorder,
    DisableRecorder,
}

/// One record from the host event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEvent {
    pub operation: Operation,
    pub offset_bytes: u64,
    pub size_bytes: u64,
    pub pid: u32,
}

/// Physical page number. Device-global: `channel * pages_per_channel + offset`.
pub type Ppn = u64;
/// Physical block number. Device-global, same striping rule as `Ppn`.
pub type Pbn = u64;
/// Logical page number, host-visible, dense from zero.
pub type Lpn = u64;
/// Virtual translation-page number: `lpn / entries_per_translation_page`.
pub type MVpn = u64;

/// Sentinel PPN meaning "this LPN was never written" (§3, §7).
pub const UNINITIATED: Ppn = u64::MAX;

/// Tag attached to every flash backend call, enumerated in §6, so a
/// downstream latency/metrics model can discriminate GC traffic from host
/// traffic. A closed enum rather than string constants
/// (`trans.cache`, `trans.clean`, ...), so callers get exhaustiveness
/// checking at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashTag {
    /// Translation page loaded into the CMT on a cache miss.
    TransCache,
    /// Translation page rewritten by cache eviction / batched write-back.
    TransClean,
    /// Translation page rewritten as part of a data-block GC pass.
    TransUpdateForDataGc,
    /// Data page written directly by a host write.
    DataUser,
    /// Data page rewritten by GC migration.
    DataCleaning,
}

/// One emitted flash operation, in the order the pipeline issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Read { ppn: Ppn, tag: FlashTag },
    Write { ppn: Ppn, tag: FlashTag },
    Erase { pbn: Pbn, tag: FlashTag },
}

/// The result of driving a single `HostEvent` through the pipeline: the
/// per-LPN PPNs produced (skipping `UNINITIATED` reads) and the ordered list
/// of flash ops issued, so a driver can compute completion time as the max
/// over the ops' modeled latencies (§5).
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub ppns: Vec<Ppn>,
    pub ops: Vec<FlashOp>,
    pub gc_ran: bool,
}
