//! Trap taxonomy and pending-trap record.
//!
//! Traps are data, not Rust errors: a stage that detects a fault condition
//! records a `TrapId` plus parameters into the pending-trap record
//! (mirroring the `TEMP_1`/`TRAP_PSW_*`/`TRAP_PARM_*` control registers of
//! `spec.md` section 4.7) and stalls; nothing unwinds the call stack. See
//! `core::cpu::Core::handle_traps`.
//!
//! Construction-time configuration failures, by contrast, are ordinary
//! fallible Rust APIs and use [`ConfigError`].

use std::fmt;

/// Identifies which trap condition was recorded.
///
/// Values and ordering follow the trap taxonomy named in `spec.md` section 7
/// and the original design's `TrapId` enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TrapId {
    /// No trap pending.
    None = 0,
    /// Machine-check: an internal consistency failure.
    MachineCheck = 1,
    /// A physical address matched none of the three physical regions.
    PhysAddressCheck = 2,
    /// External interrupt (hook only; no source is modeled).
    ExtInterrupt = 3,
    /// Decoded opcode is not implemented.
    IllegalInstr = 4,
    /// A privileged instruction was executed outside execution level 0.
    PrivOperation = 5,
    /// Signed arithmetic overflow with the trap-on-overflow bit set.
    Overflow = 6,
    /// Instruction fetch targeted a protected physical page.
    InstrMemProtect = 7,
    /// Data access targeted a protected physical page.
    DataMemProtect = 8,
    /// Instruction-side TLB miss.
    ItlbMiss = 10,
    /// Instruction-side TLB hit but the page type forbids execution.
    ItlbAccRights = 11,
    /// Instruction-side TLB hit but the protection id check failed.
    ItlbProtectId = 12,
    /// Instruction-side TLB entry is marked non-access.
    ItlbNonAccess = 13,
    /// Data-side TLB miss.
    DtlbMiss = 14,
    /// Data-side TLB hit but the page type forbids the access.
    DtlbAccRights = 15,
    /// Data-side TLB hit but the protection id check failed.
    DtlbProtectId = 16,
    /// Data-side TLB entry is marked non-access.
    DtlbNonAccess = 17,
    /// `BRK` executed with a non-zero argument.
    Break = 18,
}

impl TrapId {
    /// `true` for every variant other than `None`.
    #[inline]
    #[must_use]
    pub const fn is_pending(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for TrapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A trap recorded by a pipeline stage: the trap id plus the PSW of the
/// faulting instruction and up to three parameter words.
///
/// This is the Rust-level equivalent of the `TEMP_1`/`TRAP_PSW_0/1`/
/// `TRAP_PARM_1/2/3` control registers; `Core` copies it into those
/// registers and stages compare `psw` to decide whether their trap is still
/// the oldest one in flight (`spec.md` section 4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrapRecord {
    /// Which trap fired.
    pub id: TrapId,
    /// Instruction segment of the faulting instruction.
    pub psw0: u32,
    /// Instruction offset of the faulting instruction.
    pub psw1: u32,
    /// First trap parameter (e.g. faulting address or protection id).
    pub parm1: u32,
    /// Second trap parameter.
    pub parm2: u32,
    /// Third trap parameter.
    pub parm3: u32,
}

impl TrapRecord {
    /// Builds a trap record with all three parameters.
    #[must_use]
    pub const fn new(id: TrapId, psw0: u32, psw1: u32, parm1: u32, parm2: u32, parm3: u32) -> Self {
        Self {
            id,
            psw0,
            psw1,
            parm1,
            parm2,
            parm3,
        }
    }

    /// Builds a trap record with no parameters.
    #[must_use]
    pub const fn simple(id: TrapId, psw0: u32, psw1: u32) -> Self {
        Self::new(id, psw0, psw1, 0, 0, 0)
    }
}

/// Construction-time configuration failure.
///
/// Distinct from [`TrapId`]: this is raised by `Result`-returning
/// constructors (`Configuration::validate`, `Core::new`) before the
/// simulator exists, not recorded into control registers.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A cache or memory layer's block size was not a power of two.
    #[error("block size {0} for layer {1:?} is not a power of two")]
    BlockSizeNotPowerOfTwo(u32, &'static str),

    /// A cache's associativity (`sets`) was zero.
    #[error("associativity for layer {0:?} must be at least 1")]
    ZeroAssociativity(&'static str),

    /// Two physical regions overlap.
    #[error("physical regions {0:?} and {1:?} overlap")]
    OverlappingRegions(&'static str, &'static str),

    /// A TLB's configured entry count was zero.
    #[error("TLB {0:?} must have at least 1 entry")]
    ZeroTlbEntries(&'static str),

    /// An upstream cache's block size exceeded its downstream layer's.
    #[error("layer {0:?} block size {1} exceeds downstream layer {2:?} block size {3}")]
    BlockSizeExceedsDownstream(&'static str, u32, &'static str, u32),
}
