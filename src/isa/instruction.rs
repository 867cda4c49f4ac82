//! Instruction decode.
//!
//! [`Decoded`] is the fully-extracted form of a 32-bit instruction word:
//! every field FD needs to drive register reads, immediate generation, and
//! the op-mode dispatch used by MA and EX. Decoding never fails — an
//! unrecognized opcode decodes to [`OpCode::Illegal`] and it is FD's job to
//! turn that into `ILLEGAL_INSTR_TRAP`.
//!
//! Field layout (bit position counted from the MSB, bit 0):
//!
//! | bits  | width | meaning                                   |
//! |-------|-------|--------------------------------------------|
//! | 0..6  | 6     | opcode                                     |
//! | 6..9  | 3     | `r`: destination/primary register id       |
//! | 9..12 | 3     | `a`: register id for `valA`                |
//! | 12..15| 3     | `b`: register id for `valB`                |
//! | 15..18| 3     | addressing mode / condition code           |
//! | 18..32| 14    | low-bit-sign immediate / displacement      |

use crate::common::constants::NO_REG;
use crate::isa::fields::{extract, extract_bit, extract_low_sign};
use crate::isa::opcodes::{AdrMode, Condition, OpCode};

const OPCODE_POS: u32 = 0;
const OPCODE_LEN: u32 = 6;
const R_POS: u32 = 6;
const A_POS: u32 = 9;
const B_POS: u32 = 12;
const MODE_POS: u32 = 15;
const MODE_LEN: u32 = 3;
const IMM_POS: u32 = 18;
const IMM_LEN: u32 = 14;
const REG_FIELD_LEN: u32 = 3;

/// Option bits packed into the low end of the immediate field for
/// register-to-register arithmetic/logical ops (bits 28..32 of the word,
/// i.e. the top 4 bits of the 14-bit immediate span when the op does not
/// need a full-width immediate).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptionBits {
    /// Use the incoming PSW carry bit as carry-in (`ADD`/`SUB`).
    pub use_carry: bool,
    /// Raise `OVERFLOW_TRAP` on signed overflow.
    pub trap_on_overflow: bool,
    /// Negate the result (`AND`/`OR`/`XOR`).
    pub negate_result: bool,
    /// Complement the B operand before the logical op.
    pub complement_b: bool,
    /// Sign-extend the extracted field (`EXTR`).
    pub sign_extend: bool,
    /// Zero the target before depositing (`DEP`).
    pub zero_base: bool,
    /// B operand is an immediate rather than a register (`DEP`, `ADD`, ...).
    pub immediate_b: bool,
}

impl OptionBits {
    fn decode(word: u32) -> Self {
        Self {
            use_carry: extract_bit(word, 28),
            trap_on_overflow: extract_bit(word, 29),
            negate_result: extract_bit(word, 30),
            complement_b: extract_bit(word, 31),
            sign_extend: extract_bit(word, 29),
            zero_base: extract_bit(word, 30),
            immediate_b: extract_bit(word, 28),
        }
    }
}

/// A fully-decoded instruction, as produced by fetch/decode and carried
/// through the pipeline registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decoded {
    /// The raw instruction word (kept for trap metadata and disassembly).
    pub raw: u32,
    /// The decoded opcode.
    pub op: OpCode,
    /// Destination/primary register id (`regIdForValR`), 0..7.
    pub r: usize,
    /// Register id consumed as `valA`, or [`NO_REG`] if sourced elsewhere.
    pub reg_id_a: u8,
    /// Register id consumed as `valB`, or [`NO_REG`] if immediate/unused.
    pub reg_id_b: u8,
    /// Register id consumed as `valX` (index base for memory ops), or
    /// [`NO_REG`].
    pub reg_id_x: u8,
    /// Addressing mode for memory/branch-target formation.
    pub adr_mode: AdrMode,
    /// Condition code for `CMP`/`CMPU`/`CBR`/`CBRU`.
    pub condition: Condition,
    /// Sign-extended low-bit-sign immediate/displacement field.
    pub immediate: i32,
    /// Packed option bits (carry, overflow-trap, negate, complement, ...).
    pub options: OptionBits,
}

impl Decoded {
    /// Decodes a raw 32-bit instruction word.
    #[must_use]
    pub fn decode(word: u32) -> Self {
        let op = OpCode::from_u32(extract(word, OPCODE_POS, OPCODE_LEN));
        let r = extract(word, R_POS, REG_FIELD_LEN) as usize;
        let a_field = extract(word, A_POS, REG_FIELD_LEN) as u8;
        let b_field = extract(word, B_POS, REG_FIELD_LEN) as u8;
        let adr_mode = AdrMode::from_u32(extract(word, MODE_POS, MODE_LEN));
        let condition = Condition::from_u32(extract(word, MODE_POS, MODE_LEN));
        let immediate = extract_low_sign(word, IMM_POS, IMM_LEN);
        let options = OptionBits::decode(word);

        let (reg_id_a, reg_id_b, reg_id_x) = Self::operand_sources(op, adr_mode, a_field, b_field, options);

        Self {
            raw: word,
            op,
            r,
            reg_id_a,
            reg_id_b,
            reg_id_x,
            adr_mode,
            condition,
            immediate,
            options,
        }
    }

    /// Determines which general-register ids are actually read, per
    /// opcode and addressing mode. Fields that are not register sources
    /// for a given opcode report [`NO_REG`] so the hazard-detection and
    /// bypass logic never matches on stale field bits.
    fn operand_sources(
        op: OpCode,
        adr_mode: AdrMode,
        a_field: u8,
        b_field: u8,
        options: OptionBits,
    ) -> (u8, u8, u8) {
        match op {
            OpCode::Add | OpCode::Sub | OpCode::And | OpCode::Or | OpCode::Xor | OpCode::Cmp | OpCode::Cmpu => {
                let reg_b = if options.immediate_b { NO_REG } else { b_field };
                (a_field, reg_b, NO_REG)
            }
            OpCode::Extr | OpCode::Dep | OpCode::Dsr | OpCode::Shla => (a_field, b_field, NO_REG),
            OpCode::Ldil | OpCode::Mr | OpCode::Mst => (NO_REG, NO_REG, NO_REG),
            OpCode::Ldo | OpCode::Lda | OpCode::Ld | OpCode::St => match adr_mode {
                AdrMode::Imm => (NO_REG, b_field, NO_REG),
                AdrMode::Reg => (NO_REG, NO_REG, a_field),
                AdrMode::TwoReg => (NO_REG, b_field, a_field),
                AdrMode::ExtAdr => (NO_REG, b_field, a_field),
                AdrMode::Indexed(_) => (NO_REG, b_field, a_field),
            },
            OpCode::B | OpCode::Bl => (NO_REG, NO_REG, NO_REG),
            OpCode::Br | OpCode::Blr => (NO_REG, NO_REG, a_field),
            OpCode::Bv | OpCode::Bvr => (NO_REG, NO_REG, a_field),
            OpCode::Be | OpCode::Ble => (NO_REG, NO_REG, a_field),
            OpCode::Cbr | OpCode::Cbru => (a_field, b_field, NO_REG),
            OpCode::Gate => (NO_REG, NO_REG, a_field),
            OpCode::ItlbA | OpCode::ItlbP | OpCode::Ptlb | OpCode::Pca => (NO_REG, NO_REG, a_field),
            OpCode::Rfi | OpCode::Brk | OpCode::Illegal => (NO_REG, NO_REG, NO_REG),
        }
    }

    /// Whether this instruction writes a general register at commit.
    #[must_use]
    pub const fn writes_gpr(&self) -> bool {
        matches!(
            self.op,
            OpCode::Add
                | OpCode::Sub
                | OpCode::And
                | OpCode::Or
                | OpCode::Xor
                | OpCode::Cmp
                | OpCode::Cmpu
                | OpCode::Extr
                | OpCode::Dep
                | OpCode::Dsr
                | OpCode::Shla
                | OpCode::Ldil
                | OpCode::Ldo
                | OpCode::Lda
                | OpCode::Ld
                | OpCode::Mr
        ) || (matches!(self.op, OpCode::B | OpCode::Bl | OpCode::Be | OpCode::Ble) && self.links())
    }

    /// Whether a branch variant computes and stores a return address
    /// (`spec.md` section 4: `B`, `BE`, `BL`, `BLE` all deposit
    /// `psw1 + 4` into the destination register; `BE`/`BLE` additionally
    /// snapshot the instruction segment into `sReg[0]`).
    #[must_use]
    pub const fn links(&self) -> bool {
        matches!(self.op, OpCode::B | OpCode::Be | OpCode::Bl | OpCode::Ble)
    }

    /// Whether this branch additionally snapshots the instruction segment
    /// into `sReg[0]` (the external forms).
    #[must_use]
    pub const fn is_external_branch(&self) -> bool {
        matches!(self.op, OpCode::Be | OpCode::Ble)
    }

    /// A NOP instruction: the all-zero word, which decodes to `Illegal`
    /// with every operand field at zero. Pipeline flush/reset inject this.
    #[must_use]
    pub fn nop() -> Self {
        let mut d = Self::decode(0);
        d.op = OpCode::Illegal;
        d.reg_id_a = NO_REG;
        d.reg_id_b = NO_REG;
        d.reg_id_x = NO_REG;
        d
    }
}

#[cfg(test)]
mod tests {
    use super::Decoded;
    use crate::common::constants::NO_REG;
    use crate::isa::opcodes::OpCode;

    fn encode(opcode: u32, r: u32, a: u32, b: u32, mode: u32, imm_raw: u32) -> u32 {
        (opcode << 26) | (r << 23) | (a << 20) | (b << 17) | (mode << 14) | (imm_raw & 0x3fff)
    }

    #[test]
    fn decodes_add_register_form() {
        let word = encode(1, 3, 1, 2, 0, 0);
        let d = Decoded::decode(word);
        assert_eq!(d.op, OpCode::Add);
        assert_eq!(d.r, 3);
        assert_eq!(d.reg_id_a, 1);
        assert_eq!(d.reg_id_b, 2);
        assert_eq!(d.reg_id_x, NO_REG);
    }

    #[test]
    fn add_immediate_form_has_no_b_register_source() {
        let mut word = encode(1, 3, 1, 0, 0, 0);
        word |= 1 << 3; // immediate_b bit at word bit 28 == bit 3 of low 4 bits
        let d = Decoded::decode(word);
        assert_eq!(d.reg_id_b, NO_REG);
    }

    #[test]
    fn ldil_reads_no_general_registers() {
        let word = encode(12, 4, 0, 0, 0, 0);
        let d = Decoded::decode(word);
        assert_eq!(d.reg_id_a, NO_REG);
        assert_eq!(d.reg_id_b, NO_REG);
        assert_eq!(d.reg_id_x, NO_REG);
    }

    #[test]
    fn nop_decodes_as_illegal_with_no_sources() {
        let d = Decoded::nop();
        assert_eq!(d.op, OpCode::Illegal);
        assert_eq!(d.reg_id_a, NO_REG);
        assert_eq!(d.reg_id_b, NO_REG);
        assert_eq!(d.reg_id_x, NO_REG);
    }

    #[test]
    fn indexed_load_reads_base_and_index() {
        let word = encode(15, 5, 2, 3, 4, 0);
        let d = Decoded::decode(word);
        assert_eq!(d.reg_id_b, 3);
        assert_eq!(d.reg_id_x, 2);
    }
}
