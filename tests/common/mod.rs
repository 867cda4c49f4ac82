//! Shared test infrastructure: instruction encoding and a small harness
//! around `Core` for assembling tiny programs and running them.

use vcpu32_core::config::Configuration;
use vcpu32_core::core::Core;

/// Encodes one instruction word from its raw fields: opcode(6) r(3) a(3)
/// b(3) mode(3) imm(14), matching this machine's bit layout.
#[must_use]
pub fn encode(opcode: u32, r: u32, a: u32, b: u32, mode: u32, imm_raw: u32) -> u32 {
    (opcode << 26) | (r << 23) | (a << 20) | (b << 17) | (mode << 14) | (imm_raw & 0x3fff)
}

/// Packs a non-negative value into the low-bit-sign 14-bit immediate
/// field (sign bit clear, magnitude in the remaining 13 bits).
#[must_use]
pub fn imm_pos(value: i32) -> u32 {
    assert!((0..(1i32 << 13)).contains(&value), "value out of range: {value}");
    (value as u32) << 1
}

/// A raw immediate field (sign bit set, zero magnitude) that decodes to
/// a negative value. Used where a test only needs "some negative
/// immediate" to force the static branch predictor to predict taken,
/// not a specific displacement.
pub const NEGATIVE_IMM_RAW: u32 = 1;

/// Packs a negative value into the low-bit-sign 14-bit immediate field
/// (sign bit set, magnitude encodes `-value - 1`).
#[must_use]
pub fn imm_neg(value: i32) -> u32 {
    assert!((-(1i32 << 13)..0).contains(&value), "value out of range: {value}");
    let magnitude = (-value - 1) as u32;
    (magnitude << 1) | 1
}

/// Assembles `words` into RAM starting at physical address 0 (segment 0,
/// offset 0) and returns a freshly configured core with its PC pointed
/// at the start of the program.
pub fn harness(words: &[u32]) -> Core {
    let mut core = Core::new(Configuration::default()).expect("default configuration is valid");
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for w in words {
        bytes.extend_from_slice(&w.to_be_bytes());
    }
    core.write_ram(0, &bytes);
    core.set_pc(0, 0);
    core
}
