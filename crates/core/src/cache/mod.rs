//! Block cache: compiles guest code on demand and caches it by both guest and host
//! address.

pub mod block_cache;
pub mod entry;

pub use block_cache::BlockCache;
pub use entry::{AbsoluteFaultSite, BlockEntry, BlockFlags};
