//! Global architectural constants.
//!
//! Fixed values that define the machine's register counts, address-space
//! layout, and runaway-execution guards. Carried forward from the original
//! design's constant block where `spec.md` leaves a value unstated.

/// Width of a machine word, in bits.
pub const WORD_BITS: u32 = 32;

/// Width of a half-word, in bits.
pub const HALF_WORD_BITS: u32 = 16;

/// Page size in bytes (4 KiB).
pub const PAGE_SIZE: u32 = 4096;

/// Number of bits in a page offset.
pub const PAGE_BITS: u32 = 12;

/// Mask for the page offset within an address.
pub const PAGE_BIT_MASK: u32 = (1 << PAGE_BITS) - 1;

/// Number of general registers.
pub const MAX_GREGS: usize = 8;

/// Number of segment registers.
pub const MAX_SREGS: usize = 8;

/// Number of control registers.
pub const MAX_CREGS: usize = 32;

/// First segment register index requiring privileged writes.
pub const FIRST_PRIV_SREG: usize = 4;

/// Sentinel register id meaning "not sourced from a general register".
///
/// Any id `>= MAX_GREGS` qualifies; this is the canonical value used when
/// constructing pipeline latches so bypass logic has a single value to
/// compare against.
pub const NO_REG: u8 = MAX_GREGS as u8;

/// Control register holding the shift amount for `DSR`.
pub const CR_SHIFT_AMOUNT: usize = 1;

/// First of four protection-id control registers.
pub const CR_PROTECT_ID1: usize = 8;
/// Second protection-id control register.
pub const CR_PROTECT_ID2: usize = 9;
/// Third protection-id control register.
pub const CR_PROTECT_ID3: usize = 10;
/// Fourth protection-id control register.
pub const CR_PROTECT_ID4: usize = 11;

/// Control register holding the trap handler base address.
pub const CR_TRAP_VECTOR_ADR: usize = 16;
/// Control register holding the trapping instruction's segment.
pub const CR_TRAP_PSW_0: usize = 17;
/// Control register holding the trapping instruction's offset.
pub const CR_TRAP_PSW_1: usize = 18;
/// Control register holding the trapping instruction's status word.
pub const CR_TRAP_STAT: usize = 19;
/// First trap parameter control register.
pub const CR_TRAP_PARM_1: usize = 20;
/// Second trap parameter control register.
pub const CR_TRAP_PARM_2: usize = 21;
/// Third trap parameter control register.
pub const CR_TRAP_PARM_3: usize = 22;

/// Control register holding the pending trap id (`TEMP_1`).
///
/// Non-zero means a trap is pending commitment at `EX`; cleared by handler
/// code, never by hardware (`spec.md` invariant, section 3).
pub const CR_TEMP_1: usize = 25;

/// Bytes reserved per trap handler slot in the trap vector table.
pub const TRAP_CODE_BLOCK_SIZE: u32 = 32;

/// Highest valid trap id.
pub const MAX_TRAP_ID: u32 = 32;

/// Cycle budget for a single `instr_step` before it is reported as a runaway.
pub const MAX_CYCLE_PER_INSTR: u64 = 100_000;

/// Status register bit: interrupts enabled.
pub const ST_INTERRUPT_ENABLE: u32 = 1 << 0;
/// Status register bit: data address translation enabled.
pub const ST_DATA_TRANSLATE_ENABLE: u32 = 1 << 1;
/// Status register bit: protection-id checking enabled.
pub const ST_PROTECT_ID_CHECK_ENABLE: u32 = 1 << 2;
/// Status register bit: carry flag from the last arithmetic op.
pub const ST_CARRY: u32 = 1 << 15;
/// Status register bit: code address translation enabled.
///
/// Relocated from the original design's bit 30 to bit 31 to make room for
/// the two-bit `ST_EXECUTION_LEVEL` field this spec calls for; see
/// `DESIGN.md`.
pub const ST_CODE_TRANSLATE_ENABLE: u32 = 1 << 31;
/// Status register bit: machine-check.
pub const ST_MACHINE_CHECK: u32 = 1 << 28;
/// Low bit of the two-bit execution-level (privilege) field.
pub const ST_EXECUTION_LEVEL_SHIFT: u32 = 29;
/// Mask (already shifted) for the two-bit execution-level field.
pub const ST_EXECUTION_LEVEL_MASK: u32 = 0b11 << ST_EXECUTION_LEVEL_SHIFT;
/// The low status bits `MST` is scoped to: interrupt-enable,
/// data-translate-enable, protect-id-check-enable, and three reserved bits.
/// `MST` must never reach the carry, machine-check, execution-level, or
/// code-translate-enable bits above this mask.
pub const ST_LOW_BITS_MASK: u32 = 0x3F;
