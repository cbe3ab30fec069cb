//! In-memory flash backend with per-channel serialized latency.
//!
//! A resource-guarded, tokio-native idiom (`Arc<Mutex<..>>` per shared
//! resource, `tokio::time::sleep` for modeled delay), here with no child
//! process to supervise, just a clock. Per-channel mutexes give the channel
//! overlap §5 requires: two ops on different channels never wait on each
//! other, two ops on the same channel are strictly ordered by arrival.

use std::time::Duration;

use async_trait::async_trait;
use dftl_core::{DftlResult, FlashBackend, FlashTag, Geometry, Pbn, Ppn};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct LatencyModel {
    pub page_read: Duration,
    pub page_write: Duration,
    pub block_erase: Duration,
}

impl Default for LatencyModel {
    fn default() -> Self {
        LatencyModel {
            page_read: Duration::from_micros(50),
            page_write: Duration::from_micros(200),
            block_erase: Duration::from_millis(2),
        }
    }
}

pub struct MockFlashBackend {
    geo: Geometry,
    latency: LatencyModel,
    channel_locks: Vec<Mutex<()>>,
}

impl MockFlashBackend {
    pub fn new(geo: Geometry, latency: LatencyModel) -> Self {
        let channel_locks = (0..geo.channels).map(|_| Mutex::new(())).collect();
        MockFlashBackend {
            geo,
            latency,
            channel_locks,
        }
    }

    fn channel_lock(&self, channel: u32) -> &Mutex<()> {
        &self.channel_locks[channel as usize]
    }
}

#[async_trait]
impl FlashBackend for MockFlashBackend {
    async fn read_page(&self, ppn: Ppn, tag: FlashTag) -> DftlResult<()> {
        let ch = self.geo.channel_of_ppn(ppn);
        let _guard = self.channel_lock(ch).lock().await;
        sleep(self.latency.page_read).await;
        trace!(ppn, ?tag, "mock backend: page read");
        Ok(())
    }

    async fn write_page(&self, ppn: Ppn, tag: FlashTag) -> DftlResult<()> {
        let ch = self.geo.channel_of_ppn(ppn);
        let _guard = self.channel_lock(ch).lock().await;
        sleep(self.latency.page_write).await;
        trace!(ppn, ?tag, "mock backend: page write");
        Ok(())
    }

    async fn erase_block(&self, pbn: Pbn, tag: FlashTag) -> DftlResult<()> {
        let ch = (pbn / self.geo.blocks_per_channel as u64) as u32;
        let _guard = self.channel_lock(ch).lock().await;
        sleep(self.latency.block_erase).await;
        trace!(pbn, ?tag, "mock backend: block erase");
        Ok(())
    }
}
