use pretty_assertions::assert_eq;

use crate::common::{encode, harness, imm_neg, imm_pos};

#[test]
fn add_computes_sum_of_two_registers() {
    let word = encode(1, 3, 1, 2, 0, 0); // ADD r3 = r1 + r2
    let mut core = harness(&[word]);
    core.set_general_reg(1, 5);
    core.set_general_reg(2, 7);
    let retired = core.instr_step(1);
    assert_eq!(retired, 1);
    assert_eq!(core.general_reg(3), 12);
}

#[test]
fn sub_computes_difference_of_two_registers() {
    let word = encode(2, 3, 1, 2, 0, 0); // SUB r3 = r1 - r2
    let mut core = harness(&[word]);
    core.set_general_reg(1, 10);
    core.set_general_reg(2, 4);
    core.instr_step(1);
    assert_eq!(core.general_reg(3), 6);
}

#[test]
fn bitwise_and_masks_registers() {
    let word = encode(3, 3, 1, 2, 0, 0); // AND r3 = r1 & r2
    let mut core = harness(&[word]);
    core.set_general_reg(1, 0b1100);
    core.set_general_reg(2, 0b1010);
    core.instr_step(1);
    assert_eq!(core.general_reg(3), 0b1000);
}

#[test]
fn bitwise_or_combines_registers() {
    let word = encode(4, 3, 1, 2, 0, 0); // OR r3 = r1 | r2
    let mut core = harness(&[word]);
    core.set_general_reg(1, 0b1100);
    core.set_general_reg(2, 0b0011);
    core.instr_step(1);
    assert_eq!(core.general_reg(3), 0b1111);
}

#[test]
fn ldil_shifts_immediate_into_upper_bits() {
    let word = encode(12, 3, 0, 0, 0, imm_pos(5)); // LDIL r3 = 5 << 18
    let mut core = harness(&[word]);
    core.instr_step(1);
    assert_eq!(core.general_reg(3), 5u32 << 18);
}

#[test]
fn ldil_handles_a_negative_immediate_correctly() {
    let word = encode(12, 3, 0, 0, 0, imm_neg(-5)); // LDIL r3 = -5 << 18
    let mut core = harness(&[word]);
    core.instr_step(1);
    assert_eq!(core.general_reg(3), (-5i32 << 18) as u32);
}

#[test]
fn ldil_reaches_the_most_negative_encodable_immediate() {
    let word = encode(12, 3, 0, 0, 0, imm_neg(-8192)); // LDIL r3 = -8192 << 18
    let mut core = harness(&[word]);
    core.instr_step(1);
    assert_eq!(core.general_reg(3), (-8192i32 << 18) as u32);
}

#[test]
fn counters_classify_retired_instructions_by_family() {
    let words = [
        encode(12, 1, 0, 0, 0, imm_pos(1)), // LDIL r1
        encode(1, 3, 1, 1, 0, 0),           // ADD r3 = r1 + r1
    ];
    let mut core = harness(&words);
    core.instr_step(2);
    let stats = core.stats();
    assert_eq!(stats.instructions_retired, 2);
    assert_eq!(stats.inst_alu, 2);
    assert_eq!(stats.inst_load, 0);
    assert_eq!(stats.inst_branch, 0);
}
