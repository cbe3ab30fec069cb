//! Borrowed view over the sibling components the mapping manager and GC
//! coordinate. These components reference each other and are modeled as
//! siblings owned by the DFTL root rather than a cycle of ownership (§9);
//! `Ctx` is that root's way of handing out non-overlapping mutable borrows
//! of its fields to a single call without the root itself needing to be
//! generic over every collaborator.

use crate::backend::FlashBackend;
use crate::block_pool::DeviceBlockPool;
use crate::cmt::CachedMappingTable;
use crate::config::Geometry;
use crate::gmt::GlobalMappingTable;
use crate::gtd::GlobalTranslationDirectory;
use crate::oob::OutOfBandAreas;

pub struct Ctx<'a> {
    pub geo: &'a Geometry,
    pub cmt: &'a mut CachedMappingTable,
    pub gtd: &'a mut GlobalTranslationDirectory,
    pub gmt: &'a mut GlobalMappingTable,
    pub oob: &'a mut OutOfBandAreas,
    pub block_pool: &'a mut DeviceBlockPool,
    pub backend: &'a dyn FlashBackend,
}
