use pretty_assertions::assert_eq;

use crate::common::{encode, harness, imm_neg, imm_pos, NEGATIVE_IMM_RAW};

#[test]
fn unconditional_branch_skips_intervening_instructions() {
    let words = [
        encode(17, 0, 0, 0, 0, imm_pos(16)), // B +16 (to offset 16)
        encode(12, 6, 0, 0, 0, imm_pos(0)),  // decoy: LDIL r6 = 0
        encode(12, 6, 0, 0, 0, imm_pos(0)),  // decoy
        encode(12, 6, 0, 0, 0, imm_pos(0)),  // decoy
        encode(12, 5, 0, 0, 0, imm_pos(9)),  // target: LDIL r5 = 9 << 18
    ];
    let mut core = harness(&words);
    core.set_general_reg(6, 0xDEAD_BEEF);

    let retired = core.instr_step(2);

    assert_eq!(retired, 2);
    assert_eq!(core.general_reg(5), 9u32 << 18, "branch target did not execute");
    assert_eq!(core.general_reg(6), 0xDEAD_BEEF, "decoy instructions after the branch must never commit");

    let stats = core.stats();
    assert_eq!(stats.inst_branch, 1);
    assert_eq!(stats.inst_alu, 1);
}

#[test]
fn backward_branch_lands_on_its_exact_computed_target() {
    // Target sits *before* the branch in memory; the branch starts
    // execution and must wrap its negative displacement back onto that
    // exact earlier offset, not just "some negative direction".
    let words = [
        encode(12, 5, 0, 0, 0, imm_pos(77)),  // offset 0 (target): LDIL r5 = 77 << 18
        encode(12, 6, 0, 0, 0, imm_pos(0)),   // offset 4: decoy
        encode(12, 6, 0, 0, 0, imm_pos(0)),   // offset 8: decoy
        encode(12, 6, 0, 0, 0, imm_pos(0)),   // offset 12: decoy
        encode(17, 0, 0, 0, 0, imm_neg(-16)), // offset 16: B -16 (back to offset 0)
    ];
    let mut core = harness(&words);
    core.set_general_reg(6, 0xDEAD_BEEF);
    core.set_pc(0, 16); // start execution directly at the branch

    let retired = core.instr_step(2);

    assert_eq!(retired, 2);
    assert_eq!(core.general_reg(5), 77u32 << 18, "backward branch did not land on its exact target");
    assert_eq!(core.general_reg(6), 0xDEAD_BEEF, "decoys between start and target must never execute");

    let stats = core.stats();
    assert_eq!(stats.inst_branch, 1);
    assert_eq!(stats.inst_alu, 1);
}

#[test]
fn mispredicted_conditional_branch_still_commits_the_correct_path() {
    // CBR r1==r2, predicted taken (negative immediate) but actually not
    // taken (r1 != r2): EX must squash FD/MA's speculative work and the
    // fallthrough instruction must be the one that commits.
    let words = [
        encode(25, 0, 1, 2, 0, NEGATIVE_IMM_RAW), // CBR.EQ a=r1,b=r2 (mispredicted taken)
        encode(12, 5, 0, 0, 0, imm_pos(42)),       // fallthrough: LDIL r5 = 42 << 18
    ];
    let mut core = harness(&words);
    core.set_general_reg(1, 1);
    core.set_general_reg(2, 2);

    let retired = core.instr_step(2);

    assert_eq!(retired, 2);
    assert_eq!(core.general_reg(5), 42u32 << 18);
    assert!(core.stats().branch_mispredictions >= 1);
}
