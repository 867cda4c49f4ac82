//! Memory-Address (MA) stage.
//!
//! Picks up whatever FD finished decoding, forms effective addresses and
//! branch targets, drives the DTLB and the data memory hierarchy, and
//! dispatches the TLB/cache-control opcodes. ALU-only instructions simply
//! pass through unchanged; MA's own work is entirely about addressing.
//!
//! MA is gated symmetrically to FD: it only looks at `fd_latch.get()` when
//! `Core::fd_retiring` says FD has produced something not yet picked up,
//! and it reports back to `Core` whether it produced a result for EX this
//! cycle (`Core::ma_retiring`). A still-in-flight multi-cycle access
//! (tracked in `Core::ma_access`/`Core::ma_mem`) is resumed, not restarted,
//! across stall cycles.

use crate::common::constants::PAGE_BITS;
use crate::common::data::PageType;
use crate::common::{AccessType, AccessWidth, TrapId, TrapRecord};
use crate::core::cpu::{AccessState, Core, Route};
use crate::core::pipeline::fd::protect_id_matches;
use crate::core::pipeline::latches::StageLatch;
use crate::core::units::memory::TerminalStep;
use crate::core::units::tlb::LookupResult;
use crate::core::units::Tlb;
use crate::isa::{AdrMode, IndexReg, OpCode};

/// Outcome of one MA cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaOutcome {
    /// Whether MA committed a real result into `ma_latch` this cycle
    /// (`ma_retiring` for the next cycle's EX).
    pub produced: bool,
}

/// Advances MA by one cycle.
pub fn process(core: &mut Core) -> MaOutcome {
    if core.ma_access.is_some() {
        return drive_in_flight(core);
    }

    if !core.fd_retiring {
        return MaOutcome::default();
    }
    let latch = *core.fd_latch.get();
    core.fd_retiring = false;

    if latch.trap.is_some() {
        // Oldest trap in program order wins; MA performs no further work.
        core.ma_latch.set(latch);
        return MaOutcome { produced: true };
    }

    if latch.instr.op.is_branch() && !latch.instr.op.is_conditional_branch() {
        flush_for_branch(core, &latch);
        core.ma_latch.set(latch);
        return MaOutcome { produced: true };
    }

    match latch.instr.op {
        OpCode::Ldo | OpCode::Lda => {
            let (_, ea) = effective_address(core, &latch);
            let mut out = latch;
            out.val_b = ea;
            core.ma_latch.set(out);
            MaOutcome { produced: true }
        }
        OpCode::Ld | OpCode::St => begin_data_access(core, latch),
        OpCode::ItlbA | OpCode::ItlbP | OpCode::Ptlb | OpCode::Pca => begin_tlb_op(core, latch),
        _ => {
            core.ma_latch.set(latch);
            MaOutcome { produced: true }
        }
    }
}

fn drive_in_flight(core: &mut Core) -> MaOutcome {
    let access = core.ma_access.expect("checked Some by caller");
    match access.route {
        Route::Ram if access.gate_level == Some(TLB_OP_MARKER) => drive_tlb_in_flight(core),
        _ => drive_data_in_flight(core, access),
    }
}

/// Sentinel stashed into `AccessState::gate_level` to tell
/// `drive_in_flight` that this in-flight access is a TLB/cache-control
/// opcode rather than a load/store (the field is otherwise unused by MA;
/// `gate_level` is FD's business for instruction gateway pages).
const TLB_OP_MARKER: u8 = 0xff;

fn flush_for_branch(core: &mut Core, latch: &StageLatch) {
    let target = branch_target(core, latch);
    core.fd_pc.load(target);
    core.fd_latch.load(StageLatch::nop());
    core.fd_mem.abort();
    if let Some(tlb) = core.tlb.itlb() {
        tlb.abort_op();
    }
    core.fd_access = None;
    core.fd_retiring = false;
}

fn branch_target(core: &Core, latch: &StageLatch) -> (u32, u32) {
    match latch.instr.op {
        OpCode::Bv | OpCode::Bvr | OpCode::Be | OpCode::Ble => (core.sreg.get(latch.instr.r), latch.val_x),
        _ => (latch.psw0, latch.val_x),
    }
}

fn index_reg_number(idx: IndexReg) -> usize {
    match idx {
        IndexReg::Gr4 => 4,
        IndexReg::Gr5 => 5,
        IndexReg::Gr6 => 6,
        IndexReg::Gr7 => 7,
    }
}

/// Returns `(segment, offset)` for a data-addressing instruction.
fn effective_address(core: &Core, latch: &StageLatch) -> (u32, u32) {
    match latch.instr.adr_mode {
        AdrMode::Imm => (core.sreg.get(1), latch.val_b.wrapping_add(latch.instr.immediate as u32)),
        AdrMode::Reg => (core.sreg.get(1), latch.val_x),
        AdrMode::TwoReg => (core.sreg.get(1), latch.val_b.wrapping_add(latch.val_x)),
        AdrMode::ExtAdr => (core.sreg.get(0), latch.val_b.wrapping_add(latch.val_x)),
        AdrMode::Indexed(idx) => {
            let base = core.greg.get(index_reg_number(idx));
            (
                core.sreg.get(1),
                base.wrapping_add(latch.val_b).wrapping_add(latch.val_x),
            )
        }
    }
}

fn begin_data_access(core: &mut Core, latch: StageLatch) -> MaOutcome {
    let (seg, ofs) = effective_address(core, &latch);
    let access_type = if latch.instr.op == OpCode::St {
        AccessType::Write
    } else {
        AccessType::Read
    };

    let (phys, cacheable) = if core.status.data_translate_enable() {
        match translate_data(core, seg, ofs, access_type) {
            Ok(phys) => (phys, true),
            Err(trap) => {
                core.ma_latch.set(fault(latch, trap));
                return MaOutcome { produced: true };
            }
        }
    } else {
        if core.status.execution_level() != 0 {
            let trap = TrapRecord::simple(TrapId::DataMemProtect, latch.psw0, latch.psw1);
            core.ma_latch.set(fault(latch, trap));
            return MaOutcome { produced: true };
        }
        (ofs, false)
    };

    let Some(route) = core.regions.route_for(phys) else {
        let trap = TrapRecord::simple(TrapId::PhysAddressCheck, latch.psw0, latch.psw1);
        core.ma_latch.set(fault(latch, trap));
        return MaOutcome { produced: true };
    };
    let cacheable = cacheable && matches!(route, Route::Ram);

    let write_data = if access_type == AccessType::Write {
        Some(core.greg.get(latch.instr.r))
    } else {
        None
    };

    core.ma_access = Some(AccessState {
        phys_addr: phys,
        route,
        started: cacheable, // cacheable path drives through MemChain, which tracks its own "started"
        gate_level: None,
    });
    core.ma_pending = Some((latch, access_type, write_data, cacheable));
    drive_data_in_flight(core, core.ma_access.expect("just set"))
}

fn drive_data_in_flight(core: &mut Core, access: AccessState) -> MaOutcome {
    let Some((latch, access_type, write_data, cacheable)) = core.ma_pending else {
        // Reached only if Core state was corrupted; treat as a stall.
        return MaOutcome::default();
    };

    let result = if cacheable {
        let priority = core.ma_priority;
        core.ma_mem
            .step(&mut core.l1_dcache, core.l2_cache.as_mut(), &mut core.ram, priority, |l1| {
                l1.begin(access.phys_addr, access_type, AccessWidth::Word, write_data, priority)
            })
    } else {
        match access.route {
            Route::Ram => {
                if !access.started {
                    let priority = core.ma_priority;
                    core.ram.begin(access.phys_addr, access_type, AccessWidth::Word, write_data, priority);
                    mark_started(core);
                }
                match core.ram.process() {
                    TerminalStep::Completed(word) => Some(word),
                    TerminalStep::NotCompleted => None,
                }
            }
            Route::Pdc => {
                if !access.started {
                    let priority = core.regions.pdc_mem.priority;
                    core.pdc.begin(access.phys_addr, access_type, AccessWidth::Word, write_data, priority);
                    mark_started(core);
                }
                match core.pdc.process() {
                    TerminalStep::Completed(word) => Some(word),
                    TerminalStep::NotCompleted => None,
                }
            }
            Route::Io => {
                if !access.started {
                    let priority = core.regions.io_mem.priority;
                    core.io.begin(access.phys_addr, access_type, AccessWidth::Word, write_data, priority);
                    mark_started(core);
                }
                match core.io.process() {
                    TerminalStep::Completed(word) => Some(word),
                    TerminalStep::NotCompleted => None,
                }
            }
        }
    };

    let Some(word) = result else {
        return MaOutcome::default();
    };

    core.ma_access = None;
    core.ma_pending = None;
    let mut out = latch;
    if access_type == AccessType::Read {
        out.val_b = word.unwrap_or(0);
    }
    core.ma_latch.set(out);
    MaOutcome { produced: true }
}

fn mark_started(core: &mut Core) {
    if let Some(a) = core.ma_access.as_mut() {
        a.started = true;
    }
}

fn fault(latch: StageLatch, trap: TrapRecord) -> StageLatch {
    let mut out = latch;
    out.trap = Some(trap);
    out
}

fn translate_data(core: &mut Core, seg: u32, ofs: u32, access: AccessType) -> Result<u32, TrapRecord> {
    let Some(tlb) = core.tlb.dtlb() else {
        return Ok(ofs);
    };
    let vpn_ofs = ofs >> PAGE_BITS;
    match tlb.lookup(seg as u16, vpn_ofs) {
        LookupResult::Miss => Err(TrapRecord::simple(TrapId::DtlbMiss, seg, ofs)),
        LookupResult::Hit(index) => {
            let entry = *tlb.entry(index);
            let level = core.status.execution_level();
            if !Tlb::check_rights(&entry, access, level) {
                return Err(TrapRecord::simple(TrapId::DtlbAccRights, seg, ofs));
            }
            if core.status.protect_id_check_enable() && !protect_id_matches(core, entry.protect_id) {
                return Err(TrapRecord::simple(TrapId::DtlbProtectId, seg, ofs));
            }
            Ok(entry.ppn | (ofs & crate::common::constants::PAGE_BIT_MASK))
        }
    }
}

// --- TLB / cache-control opcodes -------------------------------------------------

fn begin_tlb_op(core: &mut Core, latch: StageLatch) -> MaOutcome {
    core.ma_access = Some(AccessState {
        phys_addr: 0,
        route: Route::Ram,
        started: false,
        gate_level: Some(TLB_OP_MARKER),
    });
    core.ma_pending = Some((latch, AccessType::Read, None, false));
    drive_tlb_in_flight(core)
}

fn target_is_data(latch: &StageLatch) -> bool {
    latch.instr.options.negate_result
}

fn drive_tlb_in_flight(core: &mut Core) -> MaOutcome {
    let Some((latch, ..)) = core.ma_pending else {
        return MaOutcome::default();
    };
    let started = core.ma_access.map(|a| a.started).unwrap_or(false);

    let done = match latch.instr.op {
        OpCode::ItlbA => itlb_a_step(core, &latch, started),
        OpCode::ItlbP => itlb_p_step(core, &latch, started),
        OpCode::Ptlb => ptlb_step(core, &latch, started),
        OpCode::Pca => pca_step(core, &latch),
        _ => true,
    };

    if !started {
        if let Some(a) = core.ma_access.as_mut() {
            a.started = true;
        }
    }

    if done {
        core.ma_access = None;
        core.ma_pending = None;
        core.ma_latch.set(latch);
        MaOutcome { produced: true }
    } else {
        core.ma_latch.set(StageLatch::nop());
        MaOutcome::default()
    }
}

fn itlb_a_step(core: &mut Core, latch: &StageLatch, started: bool) -> bool {
    let data_target = target_is_data(latch);
    let seg = core.sreg.get(latch.instr.r) as u16;
    let vpn_ofs = latch.val_x >> PAGE_BITS;
    let Some(tlb) = (if data_target { core.tlb.dtlb() } else { core.tlb.itlb() }) else {
        return true;
    };
    if !started {
        let index = tlb.hash_index(seg, vpn_ofs);
        tlb.begin_insert_addr(seg, vpn_ofs);
        if data_target {
            core.dtlb_pending_index = Some(index);
        } else {
            core.itlb_pending_index = Some(index);
        }
    }
    tlb.process()
}

fn itlb_p_step(core: &mut Core, latch: &StageLatch, started: bool) -> bool {
    let data_target = target_is_data(latch);
    let Some(tlb) = (if data_target { core.tlb.dtlb() } else { core.tlb.itlb() }) else {
        return true;
    };
    let pending = if data_target {
        &mut core.dtlb_pending_index
    } else {
        &mut core.itlb_pending_index
    };
    let Some(index) = *pending else {
        return true;
    };
    if !started {
        let raw_imm = (latch.instr.immediate as u32) & 0x3fff;
        let page_type = match raw_imm & 0b11 {
            0 => PageType::ReadOnly,
            1 => PageType::ReadWrite,
            2 => PageType::Execute,
            _ => PageType::Gateway,
        };
        let priv_l1 = ((raw_imm >> 2) & 0b11) as u8;
        let priv_l2 = ((raw_imm >> 4) & 0b11) as u8;
        let protect_id = ((raw_imm >> 6) & 0xff) as u16;
        let ppn = latch.val_x & !crate::common::constants::PAGE_BIT_MASK;
        tlb.begin_insert_prot(index, page_type, priv_l1, priv_l2, protect_id, ppn);
    }
    let done = tlb.process();
    if done {
        *pending = None;
    }
    done
}

fn ptlb_step(core: &mut Core, latch: &StageLatch, started: bool) -> bool {
    let data_target = target_is_data(latch);
    let seg = core.sreg.get(latch.instr.r) as u16;
    let vpn_ofs = latch.val_x >> PAGE_BITS;
    let Some(tlb) = (if data_target { core.tlb.dtlb() } else { core.tlb.itlb() }) else {
        return true;
    };
    if !started {
        let index = tlb.hash_index(seg, vpn_ofs);
        tlb.begin_purge(index);
    }
    tlb.process()
}

/// `PCA` purges or flushes a single cache line, addressed the same way a
/// data access is (decision 6): DTLB-consulted when translation is on,
/// otherwise the register operand is the physical address directly. The
/// purge/flush itself (`CacheLayer::purge_block`/`flush_block`) is
/// synchronous, so this always completes in the single cycle it starts.
fn pca_step(core: &mut Core, latch: &StageLatch) -> bool {
    let seg = core.sreg.get(latch.instr.r);
    let phys = if core.status.data_translate_enable() {
        match translate_data(core, seg, latch.val_x, AccessType::Read) {
            Ok(phys) => phys,
            Err(_) => return true, // surfaced to the caller as a no-op fault path is out of scope here
        }
    } else {
        latch.val_x
    };

    let purge = matches!(latch.instr.condition, crate::isa::Condition::Eq | crate::isa::Condition::Lt);
    let instruction_side = matches!(latch.instr.condition, crate::isa::Condition::Eq | crate::isa::Condition::Ne);
    let cache = if instruction_side { &mut core.l1_icache } else { &mut core.l1_dcache };

    if purge {
        cache.purge_block(phys);
    } else if let Some((block_addr, bytes)) = cache.flush_block(phys) {
        core.ram.write_block(block_addr, &bytes);
    }
    true
}
