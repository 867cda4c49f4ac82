//! Execute (EX) stage.
//!
//! The ALU and the pipeline's only commit point. Consumes the latch MA
//! produced last cycle, computes `valR` per opcode, resolves conditional
//! branch mispredictions, writes the destination general register, and
//! drives the bypass network that forwards `valR` into FD's and MA's
//! pending inputs before this cycle's tick (`spec.md` section 4, EX).

use crate::common::constants::NO_REG;
use crate::common::TrapRecord;
use crate::core::cpu::Core;
use crate::isa::OpCode;

/// What EX wants Core to do to FD after this cycle's tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExRedirect {
    /// No redirection needed.
    None,
    /// A conditional branch was mispredicted: overwrite FD's PSW with
    /// `(seg, ofs)` and flush FD.
    Mispredict {
        /// Target instruction segment.
        seg: u32,
        /// Target instruction offset.
        ofs: u32,
    },
}

/// Outcome of one EX cycle.
#[derive(Clone, Copy, Debug)]
pub struct ExOutcome {
    /// The trap this cycle's EX instruction carries (from upstream or
    /// freshly detected); `None` means this instruction retires cleanly.
    pub trap: Option<TrapRecord>,
    /// Whether EX wants FD redirected/flushed this cycle.
    pub redirect: ExRedirect,
    /// Whether an instruction actually retired (for `Statistics`).
    pub retired: bool,
}

fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let (r1, c1) = a.overflowing_add(b);
    let (r2, c2) = r1.overflowing_add(u32::from(carry_in));
    let carry_out = c1 || c2;
    let (sr, sov) = (a as i32).overflowing_add(b as i32);
    let (_sr2, sov2) = sr.overflowing_add(i32::from(carry_in));
    (r2, carry_out, sov || sov2)
}

fn sub_with_borrow(a: u32, b: u32, borrow_in: bool) -> (u32, bool, bool) {
    let (r1, b1) = a.overflowing_sub(b);
    let (r2, b2) = r1.overflowing_sub(u32::from(borrow_in));
    let borrow_out = b1 || b2;
    let (sr, sov) = (a as i32).overflowing_sub(b as i32);
    let (_sr2, sov2) = sr.overflowing_sub(i32::from(borrow_in));
    (r2, borrow_out, sov || sov2)
}

/// Advances EX by one cycle.
pub fn process(core: &mut Core) -> ExOutcome {
    let latch = *core.ma_latch.get();

    if let Some(trap) = latch.trap {
        return ExOutcome {
            trap: Some(trap),
            redirect: ExRedirect::None,
            retired: false,
        };
    }

    let instr = latch.instr;
    let mut val_r: Option<u32> = None;
    let mut trap: Option<TrapRecord> = None;
    let mut redirect = ExRedirect::None;

    match instr.op {
        OpCode::Add => {
            let carry_in = instr.options.use_carry && core.status.carry();
            let (r, carry, overflow) = add_with_carry(latch.val_a, latch.val_b, carry_in);
            core.status.set_carry(carry);
            if overflow && instr.options.trap_on_overflow {
                trap = Some(TrapRecord::simple(crate::common::TrapId::Overflow, latch.psw0, latch.psw1));
            } else {
                val_r = Some(r);
            }
        }
        OpCode::Sub => {
            let borrow_in = instr.options.use_carry && core.status.carry();
            let (r, carry, overflow) = sub_with_borrow(latch.val_a, latch.val_b, borrow_in);
            core.status.set_carry(carry);
            if overflow && instr.options.trap_on_overflow {
                trap = Some(TrapRecord::simple(crate::common::TrapId::Overflow, latch.psw0, latch.psw1));
            } else {
                val_r = Some(r);
            }
        }
        OpCode::And | OpCode::Or | OpCode::Xor => {
            let b = if instr.options.complement_b { !latch.val_b } else { latch.val_b };
            let mut r = match instr.op {
                OpCode::And => latch.val_a & b,
                OpCode::Or => latch.val_a | b,
                _ => latch.val_a ^ b,
            };
            if instr.options.negate_result {
                r = !r;
            }
            val_r = Some(r);
        }
        OpCode::Cmp => {
            let taken = instr.condition.eval_signed(latch.val_a as i32, latch.val_b as i32);
            val_r = Some(u32::from(taken));
        }
        OpCode::Cmpu => {
            let taken = instr.condition.eval_unsigned(latch.val_a, latch.val_b);
            val_r = Some(u32::from(taken));
        }
        OpCode::Extr => {
            let pos = (instr.immediate as u32 >> 6) & 0x1f;
            let len = (instr.immediate as u32) & 0x3f;
            let len = len.clamp(1, 32);
            let shift = 32u32.saturating_sub(pos + len);
            let mask = if len >= 32 { u32::MAX } else { (1u32 << len) - 1 };
            let field = (latch.val_b >> shift) & mask;
            val_r = Some(if instr.options.sign_extend && len < 32 && (field >> (len - 1)) & 1 != 0 {
                field | !mask
            } else {
                field
            });
        }
        OpCode::Dep => {
            let pos = (instr.immediate as u32 >> 6) & 0x1f;
            let len = (instr.immediate as u32) & 0x3f;
            let len = len.clamp(1, 32);
            let shift = 32u32.saturating_sub(pos + len);
            let mask = if len >= 32 { u32::MAX } else { (1u32 << len) - 1 };
            let base = if instr.options.zero_base { 0 } else { latch.val_a };
            let field = latch.val_b & mask;
            val_r = Some((base & !(mask << shift)) | (field << shift));
        }
        OpCode::Dsr => {
            let shift = core.creg.get(crate::common::constants::CR_SHIFT_AMOUNT) & 0x1f;
            let combined = (u64::from(latch.val_a) << 32) | u64::from(latch.val_b);
            val_r = Some((combined >> shift) as u32);
        }
        OpCode::Shla => {
            let amount = (instr.immediate as u32) & 0b11;
            let a = latch.val_a;
            let bit_mismatch = |probe: u32| (a & 0x8000_0000) != (a & probe);
            let pre_shift_overflow = instr.options.trap_on_overflow
                && match amount {
                    1 => bit_mismatch(0x4000_0000),
                    2 => bit_mismatch(0x4000_0000) || bit_mismatch(0x2000_0000),
                    3 => bit_mismatch(0x4000_0000) || bit_mismatch(0x2000_0000) || bit_mismatch(0x1000_0000),
                    _ => false,
                };
            if pre_shift_overflow {
                trap = Some(TrapRecord::simple(crate::common::TrapId::Overflow, latch.psw0, latch.psw1));
            } else {
                let shifted = a.wrapping_shl(amount);
                let (r, overflow) = (shifted as i32).overflowing_add(latch.val_b as i32);
                if overflow && instr.options.trap_on_overflow {
                    trap = Some(TrapRecord::simple(crate::common::TrapId::Overflow, latch.psw0, latch.psw1));
                } else {
                    val_r = Some(r as u32);
                }
            }
        }
        OpCode::Ldil | OpCode::Ldo | OpCode::Lda | OpCode::Ld => {
            val_r = Some(latch.val_b);
        }
        OpCode::B | OpCode::Bl | OpCode::Be | OpCode::Ble => {
            val_r = Some(latch.psw1.wrapping_add(4));
            if instr.is_external_branch() {
                core.sreg.set(0, latch.psw0);
            }
        }
        OpCode::Cbr | OpCode::Cbru => {
            let taken = if instr.op == OpCode::Cbr {
                instr.condition.eval_signed(latch.val_a as i32, latch.val_b as i32)
            } else {
                instr.condition.eval_unsigned(latch.val_a, latch.val_b)
            };
            if taken != latch.predicted_taken {
                let ofs = if taken { latch.val_x } else { latch.psw1.wrapping_add(4) };
                redirect = ExRedirect::Mispredict { seg: latch.psw0, ofs };
            }
        }
        OpCode::Mr => {
            val_r = Some(latch.val_b);
        }
        OpCode::Mst => {
            if instr.options.zero_base {
                core.status.set_bits(latch.val_b);
            } else if instr.options.negate_result {
                core.status.clear_mask(latch.val_b);
            } else {
                core.status.set_mask(latch.val_b);
            }
        }
        OpCode::Gate => {
            if let Some(level) = latch.gate_level {
                core.status.set_execution_level(level);
            }
        }
        OpCode::Rfi => {
            let psw0 = core.creg.get(crate::common::constants::CR_TRAP_PSW_0);
            let psw1 = core.creg.get(crate::common::constants::CR_TRAP_PSW_1);
            redirect = ExRedirect::Mispredict { seg: psw0, ofs: psw1 };
        }
        OpCode::Brk => {
            if latch.val_a != 0 || latch.val_b != 0 {
                trap = Some(TrapRecord::simple(crate::common::TrapId::Break, latch.psw0, latch.psw1));
            }
        }
        OpCode::Illegal => {
            trap = Some(TrapRecord::simple(crate::common::TrapId::IllegalInstr, latch.psw0, latch.psw1));
        }
        OpCode::Br | OpCode::Bv | OpCode::Blr | OpCode::Bvr | OpCode::ItlbA | OpCode::ItlbP | OpCode::Ptlb | OpCode::Pca => {
            // Resolved entirely in MA (target formation / TLB-cache control); EX has no further work.
        }
    }

    if trap.is_none() {
        if let Some(r) = val_r {
            if instr.r < crate::common::constants::MAX_GREGS {
                core.greg.set(instr.r, r);
                bypass(core, instr.r as u8, r);
            }
        }
    }

    ExOutcome {
        trap,
        redirect,
        retired: trap.is_none(),
    }
}

fn bypass(core: &mut Core, reg_id: u8, value: u32) {
    if reg_id == NO_REG {
        return;
    }
    let mut fd = core.fd_latch.pending();
    if fd.reg_id_a == reg_id {
        fd.val_a = value;
    }
    if fd.reg_id_b == reg_id {
        fd.val_b = value;
    }
    if fd.reg_id_x == reg_id {
        fd.val_x = value;
    }
    core.fd_latch.set(fd);

    let mut ma = core.ma_latch.pending();
    if ma.reg_id_a == reg_id {
        ma.val_a = value;
    }
    if ma.reg_id_b == reg_id {
        ma.val_b = value;
    }
    if ma.reg_id_x == reg_id {
        ma.val_x = value;
    }
    core.ma_latch.set(ma);
}
