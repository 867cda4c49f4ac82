//! The three pipeline stages (Fetch/Decode, Memory Access, Execute) and the
//! dual-latch registers that connect them.

/// Fetch/Decode stage.
pub mod fd;
/// Memory Access stage.
pub mod ma;
/// Execute stage.
pub mod ex;
/// Pipeline latch primitives (`PipeLatch`, `StageLatch`).
pub mod latches;

pub use ex::{ExOutcome, ExRedirect};
pub use fd::FdOutcome;
pub use latches::{PipeLatch, StageLatch};
pub use ma::MaOutcome;
