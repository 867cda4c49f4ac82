//! Fetch/Decode (FD) stage.
//!
//! Translates the current `(segment, offset)` program counter through the
//! instruction TLB (when code translation is enabled), drives the result
//! through the instruction fetch path (L1I/L2/RAM, or direct PDC), decodes
//! the returned word, reads its register operands, and statically predicts
//! conditional branches. Unconditional branch targets are not resolved
//! here: MA forms those and flushes this stage (`spec.md` section 4.5).
//!
//! FD is gated by `Core::fd_retiring`: whenever a previously finished fetch
//! is still waiting for MA to pick it up, FD does nothing at all rather
//! than risk clobbering that unconsumed result with a fresh one (the
//! structural hazard `spec.md` section 4.4 describes). There is no skid
//! buffer; a gated cycle is simply idle.

use crate::common::constants::{CR_PROTECT_ID1, CR_PROTECT_ID2, CR_PROTECT_ID3, CR_PROTECT_ID4, NO_REG, PAGE_BITS, PAGE_BIT_MASK};
use crate::common::{AccessType, AccessWidth, PageType, TrapId, TrapRecord};
use crate::core::cpu::{AccessState, Core, Route};
use crate::core::pipeline::latches::StageLatch;
use crate::core::units::memory::TerminalStep;
use crate::core::units::tlb::LookupResult;
use crate::core::units::Tlb;
use crate::isa::{Decoded, OpCode};

/// Outcome of one FD cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct FdOutcome {
    /// Whether FD committed fresh content into `fd_latch` this cycle
    /// (a decoded instruction or a trap); `false` means FD was gated or
    /// is still mid-fetch.
    pub produced: bool,
}

/// Advances FD by one cycle.
pub fn process(core: &mut Core) -> FdOutcome {
    if core.fd_retiring {
        return FdOutcome::default();
    }

    let (psw0, psw1) = *core.fd_pc.get();

    if core.fd_access.is_none() {
        let (phys, gate_level) = if core.status.code_translate_enable() {
            match translate_fetch(core, psw0, psw1) {
                Ok(result) => result,
                Err(trap) => {
                    commit_trap(core, psw0, psw1, trap);
                    return FdOutcome { produced: true };
                }
            }
        } else {
            if core.status.execution_level() != 0 {
                let trap = TrapRecord::simple(TrapId::InstrMemProtect, psw0, psw1);
                commit_trap(core, psw0, psw1, trap);
                return FdOutcome { produced: true };
            }
            (psw1, None)
        };

        let route = core.regions.route_for(phys).filter(|r| !matches!(r, Route::Io));
        let Some(route) = route else {
            commit_trap(core, psw0, psw1, TrapRecord::simple(TrapId::PhysAddressCheck, psw0, psw1));
            return FdOutcome { produced: true };
        };
        core.fd_access = Some(AccessState {
            phys_addr: phys,
            route,
            started: false,
            gate_level,
        });
    }

    let access = core.fd_access.expect("fd_access populated above");
    let word = match access.route {
        Route::Ram => {
            let priority = core.fd_priority;
            match core
                .fd_mem
                .step(&mut core.l1_icache, core.l2_cache.as_mut(), &mut core.ram, priority, |l1| {
                    l1.begin(access.phys_addr, AccessType::Fetch, AccessWidth::Word, None, priority)
                }) {
                Some(word) => word.unwrap_or(0),
                None => return FdOutcome::default(),
            }
        }
        Route::Pdc => {
            if !access.started {
                let priority = core.regions.pdc_mem.priority;
                core.pdc.begin(access.phys_addr, AccessType::Fetch, AccessWidth::Word, None, priority);
                if let Some(a) = core.fd_access.as_mut() {
                    a.started = true;
                }
            }
            match core.pdc.process() {
                TerminalStep::Completed(word) => word.unwrap_or(0),
                TerminalStep::NotCompleted => return FdOutcome::default(),
            }
        }
        Route::Io => unreachable!("IO is filtered out before an access is ever started"),
    };

    let gate_level = access.gate_level;
    core.fd_access = None;

    let instr = Decoded::decode(word);

    if instr.op == OpCode::Illegal {
        commit_trap(core, psw0, psw1, TrapRecord::simple(TrapId::IllegalInstr, psw0, psw1));
        return FdOutcome { produced: true };
    }
    if instr.op.is_privileged() && core.status.execution_level() != 0 {
        commit_trap(core, psw0, psw1, TrapRecord::simple(TrapId::PrivOperation, psw0, psw1));
        return FdOutcome { produced: true };
    }

    let val_a = core.greg.get(instr.reg_id_a as usize);
    let mut val_b = core.greg.get(instr.reg_id_b as usize);
    let mut val_x = core.greg.get(instr.reg_id_x as usize);

    if instr.reg_id_b == NO_REG {
        if instr.op == OpCode::Ldil {
            // Load-immediate-left: the 14-bit immediate occupies the upper
            // bits, with the low bits cleared.
            val_b = (instr.immediate as u32) << 18;
        } else if matches!(
            instr.op,
            OpCode::Add | OpCode::Sub | OpCode::And | OpCode::Or | OpCode::Xor | OpCode::Cmp | OpCode::Cmpu
        ) && instr.options.immediate_b
        {
            val_b = instr.immediate as u32;
        }
    }

    let mut predicted_taken = false;
    if instr.op.is_branch() && instr.reg_id_x == NO_REG {
        // No register sourced the target: this is a PC-relative form (`B`,
        // `BL`, `CBR`, `CBRU`). FD must compute the displacement itself.
        val_x = psw1.wrapping_add(instr.immediate as u32);
        if instr.op.is_conditional_branch() {
            predicted_taken = instr.immediate < 0;
        }
    }

    let latch = StageLatch {
        psw0,
        psw1,
        instr,
        val_a,
        val_b,
        val_x,
        val_s: 0,
        reg_id_a: instr.reg_id_a,
        reg_id_b: instr.reg_id_b,
        reg_id_x: instr.reg_id_x,
        predicted_taken,
        gate_level,
        trap: None,
    };
    core.fd_latch.set(latch);
    core.fd_retiring = true;

    let next_ofs = if instr.op.is_conditional_branch() && predicted_taken {
        val_x
    } else {
        psw1.wrapping_add(4)
    };
    core.fd_pc.set((psw0, next_ofs));

    FdOutcome { produced: true }
}

fn commit_trap(core: &mut Core, psw0: u32, psw1: u32, trap: TrapRecord) {
    let mut latch = StageLatch::nop();
    latch.psw0 = psw0;
    latch.psw1 = psw1;
    latch.trap = Some(trap);
    core.fd_latch.set(latch);
    core.fd_retiring = true;
    // fd_pc is deliberately left untouched: the next cycle would retry the
    // same faulting address, but the trap squashes the pipeline (via
    // `Core::handle_traps`) long before that retry could commit anything.
}

fn translate_fetch(core: &mut Core, seg: u32, ofs: u32) -> Result<(u32, Option<u8>), TrapRecord> {
    let Some(tlb) = core.tlb.itlb() else {
        if core.status.execution_level() != 0 {
            return Err(TrapRecord::simple(TrapId::InstrMemProtect, seg, ofs));
        }
        return Ok((ofs, None));
    };
    let vpn_ofs = ofs >> PAGE_BITS;
    match tlb.lookup(seg as u16, vpn_ofs) {
        LookupResult::Miss => Err(TrapRecord::simple(TrapId::ItlbMiss, seg, ofs)),
        LookupResult::Hit(index) => {
            let entry = *tlb.entry(index);
            let level = core.status.execution_level();
            if !Tlb::check_rights(&entry, AccessType::Fetch, level) {
                return Err(TrapRecord::simple(TrapId::ItlbAccRights, seg, ofs));
            }
            if core.status.protect_id_check_enable() && !protect_id_matches(core, entry.protect_id) {
                return Err(TrapRecord::simple(TrapId::ItlbProtectId, seg, ofs));
            }
            let phys = entry.ppn | (ofs & PAGE_BIT_MASK);
            let gate_level = matches!(entry.page_type, PageType::Gateway).then_some(entry.priv_l1);
            Ok((phys, gate_level))
        }
    }
}

pub(crate) fn protect_id_matches(core: &Core, protect_id: u16) -> bool {
    let want = u32::from(protect_id);
    [CR_PROTECT_ID1, CR_PROTECT_ID2, CR_PROTECT_ID3, CR_PROTECT_ID4]
        .into_iter()
        .any(|cr| core.creg.get(cr) == want)
}
