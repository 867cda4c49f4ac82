//! Opcode taxonomy.
//!
//! `OpCode` enumerates every instruction this core decodes. Each variant's
//! discriminant is the exact 6-bit value carried in bits 0..5 of the
//! instruction word (`spec.md` section 6). Variants group into the
//! families the decode/execute stages dispatch on: arithmetic, logical,
//! compare, bit-field, immediate-load, memory, branch, TLB/cache control,
//! and system.

use std::fmt;

/// The six-bit primary opcode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OpCode {
    /// Illegal or unrecognized encoding.
    #[default]
    Illegal = 0,

    /// Add, with carry-in/overflow-trap option bits.
    Add = 1,
    /// Subtract, with carry-in/overflow-trap option bits.
    Sub = 2,
    /// Bitwise AND, with negate-result/complement-B option bits.
    And = 3,
    /// Bitwise OR, with negate-result/complement-B option bits.
    Or = 4,
    /// Bitwise XOR, with negate-result/complement-B option bits.
    Xor = 5,
    /// Signed compare against a three-bit condition code.
    Cmp = 6,
    /// Unsigned compare against a three-bit condition code.
    Cmpu = 7,

    /// Extract a bit field, optionally sign-extended.
    Extr = 8,
    /// Deposit a bit field, optionally zero-basing the target first.
    Dep = 9,
    /// Double-register shift by the shift-amount control register.
    Dsr = 10,
    /// Shift left by 0..3 and add.
    Shla = 11,

    /// Load immediate into the left half, clearing the right half.
    Ldil = 12,
    /// Load offset: `valB` plus a sign-extended displacement.
    Ldo = 13,
    /// Load address: effective address into a general register.
    Lda = 14,
    /// Load word/half/byte from memory.
    Ld = 15,
    /// Store word/half/byte to memory.
    St = 16,

    /// Unconditional branch, PC-relative.
    B = 17,
    /// Unconditional branch through a register.
    Br = 18,
    /// Branch and switch segment (vectored).
    Bv = 19,
    /// Branch external: switch segment and offset, non-linking.
    Be = 20,
    /// Branch and link, PC-relative.
    Bl = 21,
    /// Branch and link through a register.
    Blr = 22,
    /// Branch and link, vectored through a register.
    Bvr = 23,
    /// Branch external and link.
    Ble = 24,
    /// Conditional branch, signed comparison.
    Cbr = 25,
    /// Conditional branch, unsigned comparison.
    Cbru = 26,
    /// Gateway branch: may promote execution level.
    Gate = 27,

    /// Move between general and segment/control registers.
    Mr = 28,
    /// Modify status register bits.
    Mst = 29,

    /// Insert into the instruction or data TLB, address half.
    ItlbA = 30,
    /// Insert into the instruction or data TLB, protection half.
    ItlbP = 31,
    /// Purge a TLB entry.
    Ptlb = 32,
    /// Purge or flush a cache line.
    Pca = 33,

    /// Return from interrupt/trap.
    Rfi = 34,
    /// Software breakpoint.
    Brk = 35,
}

impl OpCode {
    /// Decodes the raw 6-bit opcode value. Unrecognized values decode as
    /// [`OpCode::Illegal`] rather than panicking; the fetch/decode stage is
    /// responsible for raising `ILLEGAL_INSTR_TRAP` in that case.
    #[must_use]
    pub const fn from_u32(raw: u32) -> Self {
        match raw {
            1 => Self::Add,
            2 => Self::Sub,
            3 => Self::And,
            4 => Self::Or,
            5 => Self::Xor,
            6 => Self::Cmp,
            7 => Self::Cmpu,
            8 => Self::Extr,
            9 => Self::Dep,
            10 => Self::Dsr,
            11 => Self::Shla,
            12 => Self::Ldil,
            13 => Self::Ldo,
            14 => Self::Lda,
            15 => Self::Ld,
            16 => Self::St,
            17 => Self::B,
            18 => Self::Br,
            19 => Self::Bv,
            20 => Self::Be,
            21 => Self::Bl,
            22 => Self::Blr,
            23 => Self::Bvr,
            24 => Self::Ble,
            25 => Self::Cbr,
            26 => Self::Cbru,
            27 => Self::Gate,
            28 => Self::Mr,
            29 => Self::Mst,
            30 => Self::ItlbA,
            31 => Self::ItlbP,
            32 => Self::Ptlb,
            33 => Self::Pca,
            34 => Self::Rfi,
            35 => Self::Brk,
            _ => Self::Illegal,
        }
    }

    /// Whether this opcode requires execution level 0 to issue.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(
            self,
            Self::Mst | Self::ItlbA | Self::ItlbP | Self::Ptlb | Self::Pca | Self::Rfi
        )
    }

    /// Whether this opcode forms an effective address in MA and accesses
    /// memory (loads and stores; `LDA` forms the address but never touches
    /// memory, so it is excluded).
    #[must_use]
    pub const fn accesses_memory(self) -> bool {
        matches!(self, Self::Ld | Self::St)
    }

    /// Whether this opcode is a branch that redirects FD before EX.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            Self::B
                | Self::Br
                | Self::Bv
                | Self::Be
                | Self::Bl
                | Self::Blr
                | Self::Bvr
                | Self::Ble
                | Self::Cbr
                | Self::Cbru
                | Self::Gate
        )
    }

    /// Whether this opcode carries a predicted-vs-actual outcome that EX
    /// must reconcile, flushing FD on misprediction.
    #[must_use]
    pub const fn is_conditional_branch(self) -> bool {
        matches!(self, Self::Cbr | Self::Cbru)
    }

    /// Whether this opcode initiates a TLB or cache control state machine.
    #[must_use]
    pub const fn is_tlb_or_cache_control(self) -> bool {
        matches!(self, Self::ItlbA | Self::ItlbP | Self::Ptlb | Self::Pca)
    }

    /// Short mnemonic, as an external disassembler would render it.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Illegal => "ILLEGAL",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Cmp => "CMP",
            Self::Cmpu => "CMPU",
            Self::Extr => "EXTR",
            Self::Dep => "DEP",
            Self::Dsr => "DSR",
            Self::Shla => "SHLA",
            Self::Ldil => "LDIL",
            Self::Ldo => "LDO",
            Self::Lda => "LDA",
            Self::Ld => "LD",
            Self::St => "ST",
            Self::B => "B",
            Self::Br => "BR",
            Self::Bv => "BV",
            Self::Be => "BE",
            Self::Bl => "BL",
            Self::Blr => "BLR",
            Self::Bvr => "BVR",
            Self::Ble => "BLE",
            Self::Cbr => "CBR",
            Self::Cbru => "CBRU",
            Self::Gate => "GATE",
            Self::Mr => "MR",
            Self::Mst => "MST",
            Self::ItlbA => "ITLB.A",
            Self::ItlbP => "ITLB.P",
            Self::Ptlb => "PTLB",
            Self::Pca => "PCA",
            Self::Rfi => "RFI",
            Self::Brk => "BRK",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Addressing mode for memory-referencing and branch-target instructions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdrMode {
    /// Effective address is an immediate displacement from zero.
    #[default]
    Imm,
    /// Effective address is the value of a single general register.
    Reg,
    /// Effective address is the sum of two general registers.
    TwoReg,
    /// Effective address carries an explicit segment selector plus offset.
    ExtAdr,
    /// Effective address is indexed through `gReg[4..=7]` plus displacement.
    Indexed(IndexReg),
}

/// Which of `gReg[4..=7]` an [`AdrMode::Indexed`] addressing mode uses as
/// its base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexReg {
    /// `gReg[4]`.
    Gr4,
    /// `gReg[5]`.
    Gr5,
    /// `gReg[6]`.
    Gr6,
    /// `gReg[7]`.
    Gr7,
}

impl AdrMode {
    /// Decodes the 3-bit addressing-mode field.
    #[must_use]
    pub const fn from_u32(raw: u32) -> Self {
        match raw {
            0 => Self::Imm,
            1 => Self::Reg,
            2 => Self::TwoReg,
            3 => Self::ExtAdr,
            4 => Self::Indexed(IndexReg::Gr4),
            5 => Self::Indexed(IndexReg::Gr5),
            6 => Self::Indexed(IndexReg::Gr6),
            _ => Self::Indexed(IndexReg::Gr7),
        }
    }
}

/// Three-bit condition code for `CMP`/`CMPU`/`CBR`/`CBRU`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Condition {
    /// Equal.
    #[default]
    Eq,
    /// Less than.
    Lt,
    /// Not equal.
    Ne,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Lower or same (unsigned `<=`).
    Ls,
    /// Higher (unsigned `>`).
    Hi,
}

impl Condition {
    /// Decodes the 3-bit condition field.
    #[must_use]
    pub const fn from_u32(raw: u32) -> Self {
        match raw & 0b111 {
            0 => Self::Eq,
            1 => Self::Lt,
            2 => Self::Ne,
            3 => Self::Le,
            4 => Self::Gt,
            5 => Self::Ge,
            6 => Self::Ls,
            _ => Self::Hi,
        }
    }

    /// Evaluates the condition against a signed difference `a - b`.
    #[must_use]
    pub const fn eval_signed(self, a: i32, b: i32) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Lt => a < b,
            Self::Ne => a != b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
            Self::Ls => a <= b,
            Self::Hi => a > b,
        }
    }

    /// Evaluates the condition against an unsigned pair.
    #[must_use]
    pub const fn eval_unsigned(self, a: u32, b: u32) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Lt => a < b,
            Self::Ne => a != b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
            Self::Ls => a <= b,
            Self::Hi => a > b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AdrMode, Condition, IndexReg, OpCode};

    #[test]
    fn round_trips_every_defined_opcode() {
        for raw in 1..=35u32 {
            let op = OpCode::from_u32(raw);
            assert_ne!(op, OpCode::Illegal, "opcode {raw} decoded as illegal");
        }
    }

    #[test]
    fn unknown_opcode_is_illegal() {
        assert_eq!(OpCode::from_u32(63), OpCode::Illegal);
    }

    #[test]
    fn privileged_opcodes_are_flagged() {
        assert!(OpCode::Ptlb.is_privileged());
        assert!(!OpCode::Add.is_privileged());
    }

    #[test]
    fn indexed_mode_picks_correct_register() {
        assert_eq!(AdrMode::from_u32(6), AdrMode::Indexed(IndexReg::Gr6));
    }

    #[test]
    fn condition_eq_matches_equal_operands() {
        assert!(Condition::Eq.eval_signed(4, 4));
        assert!(!Condition::Eq.eval_signed(4, 5));
    }
}
