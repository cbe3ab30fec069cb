//! A zero-latency [`FlashBackend`] for scenario and property tests, no
//! timing model, just acceptance. The real latency model lives in
//! `dftl-sim`'s mock backend; tests care about ordering and state, not
//! elapsed time.

use async_trait::async_trait;
use dftl_core::{DftlResult, FlashBackend, FlashTag, Pbn, Ppn};

#[derive(Debug, Default)]
pub struct NullBackend;

#[async_trait]
impl FlashBackend for NullBackend {
    async fn read_page(&self, _ppn: Ppn, _tag: FlashTag) -> DftlResult<()> {
        Ok(())
    }

    async fn write_page(&self, _ppn: Ppn, _tag: FlashTag) -> DftlResult<()> {
        Ok(())
    }

    async fn erase_block(&self, _pbn: Pbn, _tag: FlashTag) -> DftlResult<()> {
        Ok(())
    }
}
