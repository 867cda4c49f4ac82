//! The layered cache/memory hierarchy.
//!
//! A request entering this module travels through zero or more cache
//! layers before reaching a terminal backing store (RAM, PDC, or MMIO).
//! Every layer, cache or terminal, is a non-blocking state machine polled
//! once per cycle until it reports completion (`spec.md` section 4.2).
//! Dispatch between concrete layer kinds is static everywhere except the
//! handful of connection points where a cache's miss handler must drive
//! whichever concrete backing store sits downstream of it; those points
//! use the small [`DownstreamStep`]/[`DownstreamResult`] protocol below
//! rather than a trait object, since the hierarchy's shape (L1 → optional
//! L2 → RAM; PDC and IO are always direct) is fixed at construction.

/// Byte-storage, set-associative cache layer (used for L1I, L1D, and the
/// optional unified L2).
pub mod cache;
/// Terminal physical RAM layer.
pub mod ram;
/// Terminal read/write PDC (boot ROM) layer.
pub mod pdc;
/// Terminal memory-mapped I/O layer.
pub mod io;
/// Drives a cache access down through an optional L2 to RAM.
pub mod hierarchy;

pub use cache::CacheLayer;
pub use hierarchy::{drive as drive_cache, MemChain};
pub use io::IoLayer;
pub use pdc::PdcLayer;
pub use ram::RamLayer;

/// A request to the layer immediately downstream of a cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownstreamReq {
    /// Fetch the block containing `block_addr`.
    Fetch {
        /// Physical address of the first byte of the block.
        block_addr: u32,
    },
    /// Write `bytes` back to `block_addr` (eviction of a dirty line).
    Writeback {
        /// Physical address of the first byte of the block.
        block_addr: u32,
        /// The block's current contents.
        bytes: Vec<u8>,
    },
}

/// The outcome of polling a downstream layer for a [`DownstreamReq`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownstreamResult {
    /// Fetch completed; these are the block's bytes.
    Fetched(Vec<u8>),
    /// Writeback completed (acknowledgement only).
    WrittenBack,
}

/// One step of a cache layer's request state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheStep {
    /// The request has not completed this cycle.
    NotCompleted,
    /// The layer needs its downstream neighbor serviced before it can make
    /// further progress; the caller must drive that layer and call
    /// `process` again with the matching [`DownstreamResult`] once ready.
    NeedsDownstream(DownstreamReq),
    /// The request completed. Carries the read word on a read; `None` on
    /// a write.
    Completed(Option<u32>),
}

/// One step of a terminal layer's request state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalStep {
    /// The request has not completed this cycle.
    NotCompleted,
    /// The request completed. Carries the read word on a read; `None` on
    /// a write.
    Completed(Option<u32>),
}
