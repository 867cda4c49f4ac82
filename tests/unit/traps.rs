use pretty_assertions::assert_eq;
use vcpu32_core::common::constants::{CR_TRAP_VECTOR_ADR, TRAP_CODE_BLOCK_SIZE};
use vcpu32_core::common::TrapId;

use crate::common::harness;

#[test]
fn illegal_instruction_raises_a_trap() {
    let mut core = harness(&[0]); // all-zero word decodes to Illegal
    core.clock_step(20);
    assert!(core.stats().traps_taken >= 1);
}

#[test]
fn illegal_instruction_redirects_to_the_configured_trap_vector() {
    let mut core = harness(&[0]);
    core.set_control_reg(CR_TRAP_VECTOR_ADR, 0x1000);

    // The handler address itself is unmapped program memory (also all
    // zero), so the core keeps re-trapping into the same vector; give it
    // enough cycles to clear the cold RAM-fetch latency and settle.
    core.clock_step(400);

    let expected_ofs = 0x1000u32.wrapping_add(TrapId::IllegalInstr as u32 * TRAP_CODE_BLOCK_SIZE);
    assert!(core.stats().traps_taken >= 1);
    assert_eq!(core.pc(), (0, expected_ofs));
}

#[test]
fn fetch_with_translation_disabled_outside_level_zero_raises_instr_mem_protect() {
    // Code-translate stays disabled (default), but execution level is
    // raised above 0: only level 0 may fetch through the untranslated PSW
    // offset directly, so a non-zero level here must trap instead of
    // fetching.
    //
    // This trap is raised purely from register state, before any memory
    // access is even attempted, so it commits within a handful of cycles
    // (unlike the re-fault loop the illegal-instruction tests settle into,
    // which crosses real RAM-fetch latency each time around). A small
    // cycle budget catches exactly this first trap and no more, so the
    // handler address isn't clobbered by a later, different trap id
    // re-faulting at the same handler.
    let mut core = harness(&[0]);
    core.set_control_reg(CR_TRAP_VECTOR_ADR, 0x2000);
    core.set_status_bits(1 << 29); // execution level 1, everything else clear

    core.clock_step(30);

    let expected_ofs = 0x2000u32.wrapping_add(TrapId::InstrMemProtect as u32 * TRAP_CODE_BLOCK_SIZE);
    assert_eq!(core.stats().traps_taken, 1);
    assert_eq!(core.pc(), (0, expected_ofs));
}
