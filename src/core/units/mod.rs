//! TLB and memory-hierarchy components used by the pipeline stages.

/// Translation lookaside buffer.
pub mod tlb;

/// Cache/memory layer state machines.
pub mod memory;

pub use memory::{drive_cache, CacheLayer, IoLayer, MemChain, PdcLayer, RamLayer};
pub use tlb::Tlb;
