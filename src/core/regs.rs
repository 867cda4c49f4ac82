//! Register files: general, segment, control, and the status register.
//!
//! Every architectural register is a [`CpuReg`], so writes made during a
//! cycle's process phase are only observable after the following tick,
//! exactly like any pipeline latch (`spec.md` section 4.1).

use crate::common::constants::{
    FIRST_PRIV_SREG, MAX_CREGS, MAX_GREGS, MAX_SREGS, ST_CARRY, ST_CODE_TRANSLATE_ENABLE,
    ST_DATA_TRANSLATE_ENABLE, ST_EXECUTION_LEVEL_MASK, ST_EXECUTION_LEVEL_SHIFT,
    ST_INTERRUPT_ENABLE, ST_LOW_BITS_MASK, ST_MACHINE_CHECK, ST_PROTECT_ID_CHECK_ENABLE,
};
use crate::common::CpuReg;

/// The eight general-purpose registers. None are privileged for write.
#[derive(Clone, Debug)]
pub struct GeneralRegisterFile {
    regs: [CpuReg; MAX_GREGS],
}

impl Default for GeneralRegisterFile {
    fn default() -> Self {
        Self {
            regs: [CpuReg::new(false); MAX_GREGS],
        }
    }
}

impl GeneralRegisterFile {
    /// Reads `gReg[id]`. Out-of-range ids (the `NO_REG` sentinel and
    /// above) read as zero.
    #[must_use]
    pub fn get(&self, id: usize) -> u32 {
        self.regs.get(id).map_or(0, CpuReg::get)
    }

    /// Writes `gReg[id]`'s input latch, visible after the next tick.
    pub fn set(&mut self, id: usize, val: u32) {
        if let Some(r) = self.regs.get_mut(id) {
            r.set(val);
        }
    }

    /// Forces `gReg[id]` immediately (external driver `setReg`).
    pub fn load(&mut self, id: usize, val: u32) {
        if let Some(r) = self.regs.get_mut(id) {
            r.load(val);
        }
    }

    /// Ticks every register.
    pub fn tick(&mut self) {
        for r in &mut self.regs {
            r.tick();
        }
    }

    /// Resets every register to zero.
    pub fn reset(&mut self) {
        for r in &mut self.regs {
            r.reset();
        }
    }
}

/// The eight segment registers; indices 0..3 are non-privileged-write,
/// 4..7 require execution level 0.
#[derive(Clone, Debug)]
pub struct SegmentRegisterFile {
    regs: [CpuReg; MAX_SREGS],
}

impl Default for SegmentRegisterFile {
    fn default() -> Self {
        let mut regs = [CpuReg::new(false); MAX_SREGS];
        for r in regs.iter_mut().skip(FIRST_PRIV_SREG) {
            *r = CpuReg::new(true);
        }
        Self { regs }
    }
}

impl SegmentRegisterFile {
    /// Reads `sReg[id]`.
    #[must_use]
    pub fn get(&self, id: usize) -> u32 {
        self.regs.get(id).map_or(0, CpuReg::get)
    }

    /// Writes `sReg[id]`'s input latch.
    pub fn set(&mut self, id: usize, val: u32) {
        if let Some(r) = self.regs.get_mut(id) {
            r.set(val);
        }
    }

    /// Forces `sReg[id]` immediately.
    pub fn load(&mut self, id: usize, val: u32) {
        if let Some(r) = self.regs.get_mut(id) {
            r.load(val);
        }
    }

    /// Whether a write to `sReg[id]` requires execution level 0.
    #[must_use]
    pub fn is_privileged(&self, id: usize) -> bool {
        self.regs.get(id).is_some_and(CpuReg::is_priv_reg)
    }

    /// Ticks every register.
    pub fn tick(&mut self) {
        for r in &mut self.regs {
            r.tick();
        }
    }

    /// Resets every register to zero.
    pub fn reset(&mut self) {
        for r in &mut self.regs {
            r.reset();
        }
    }
}

/// The 32 control registers, all privileged for write. Fixed-role indices
/// are named in `crate::common::constants` (`CR_*`).
#[derive(Clone, Debug)]
pub struct ControlRegisterFile {
    regs: [CpuReg; MAX_CREGS],
}

impl Default for ControlRegisterFile {
    fn default() -> Self {
        Self {
            regs: [CpuReg::new(true); MAX_CREGS],
        }
    }
}

impl ControlRegisterFile {
    /// Reads `cReg[id]`.
    #[must_use]
    pub fn get(&self, id: usize) -> u32 {
        self.regs.get(id).map_or(0, CpuReg::get)
    }

    /// Writes `cReg[id]`'s input latch.
    pub fn set(&mut self, id: usize, val: u32) {
        if let Some(r) = self.regs.get_mut(id) {
            r.set(val);
        }
    }

    /// Forces `cReg[id]` immediately, bypassing the tick.
    ///
    /// Used for trap-entry control-register writes, which must be visible
    /// to the handler's very first fetch (`spec.md` section 7).
    pub fn load(&mut self, id: usize, val: u32) {
        if let Some(r) = self.regs.get_mut(id) {
            r.load(val);
        }
    }

    /// Ticks every register.
    pub fn tick(&mut self) {
        for r in &mut self.regs {
            r.tick();
        }
    }

    /// Resets every register to zero.
    pub fn reset(&mut self) {
        for r in &mut self.regs {
            r.reset();
        }
    }
}

/// The status register, with named bit accessors over a single `CpuReg`.
#[derive(Clone, Debug, Default)]
pub struct StatusRegister {
    reg: CpuReg,
}

impl StatusRegister {
    /// Raw status word, as read by `MR`/`MST` and stored in `psw0`'s low
    /// bits.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.reg.get()
    }

    /// Replaces the low status bits (`MST` replace mode). Scoped to
    /// [`ST_LOW_BITS_MASK`]: bits above it (carry, machine-check,
    /// execution-level, code-translate-enable) are left untouched, since
    /// only trap entry/`RFI` are allowed to drive those.
    pub fn set_bits(&mut self, bits: u32) {
        let preserved = self.reg.get() & !ST_LOW_BITS_MASK;
        self.reg.set(preserved | (bits & ST_LOW_BITS_MASK));
    }

    /// Forces the raw status word immediately (trap entry, `reset()`).
    pub fn load_bits(&mut self, bits: u32) {
        self.reg.load(bits);
    }

    /// Sets (ORs in) the given low status bits (`MST` set mode).
    pub fn set_mask(&mut self, mask: u32) {
        self.reg.set(self.reg.get() | (mask & ST_LOW_BITS_MASK));
    }

    /// Clears the given low status bits (`MST` clear mode).
    pub fn clear_mask(&mut self, mask: u32) {
        self.reg.set(self.reg.get() & !(mask & ST_LOW_BITS_MASK));
    }

    /// Interrupts-enabled flag.
    #[must_use]
    pub fn interrupt_enable(&self) -> bool {
        self.reg.get() & ST_INTERRUPT_ENABLE != 0
    }

    /// Data-translate-enabled flag.
    #[must_use]
    pub fn data_translate_enable(&self) -> bool {
        self.reg.get() & ST_DATA_TRANSLATE_ENABLE != 0
    }

    /// Code-translate-enabled flag.
    #[must_use]
    pub fn code_translate_enable(&self) -> bool {
        self.reg.get() & ST_CODE_TRANSLATE_ENABLE != 0
    }

    /// Protect-id-check-enabled flag.
    #[must_use]
    pub fn protect_id_check_enable(&self) -> bool {
        self.reg.get() & ST_PROTECT_ID_CHECK_ENABLE != 0
    }

    /// Machine-check flag.
    #[must_use]
    pub fn machine_check(&self) -> bool {
        self.reg.get() & ST_MACHINE_CHECK != 0
    }

    /// Carry flag from the last arithmetic op.
    #[must_use]
    pub fn carry(&self) -> bool {
        self.reg.get() & ST_CARRY != 0
    }

    /// Writes the carry flag (input latch; visible after the next tick).
    pub fn set_carry(&mut self, carry: bool) {
        let bits = self.reg.get();
        let next = if carry { bits | ST_CARRY } else { bits & !ST_CARRY };
        self.reg.set(next);
    }

    /// Current execution level (0 = most privileged, 3 = least).
    #[must_use]
    pub fn execution_level(&self) -> u8 {
        ((self.reg.get() & ST_EXECUTION_LEVEL_MASK) >> ST_EXECUTION_LEVEL_SHIFT) as u8
    }

    /// Writes the execution-level field.
    pub fn set_execution_level(&mut self, level: u8) {
        let bits = self.reg.get() & !ST_EXECUTION_LEVEL_MASK;
        self.reg.set(bits | ((u32::from(level) << ST_EXECUTION_LEVEL_SHIFT) & ST_EXECUTION_LEVEL_MASK));
    }

    /// Ticks the underlying register.
    pub fn tick(&mut self) {
        self.reg.tick();
    }

    /// Resets to zero (all flags clear, execution level 0).
    pub fn reset(&mut self) {
        self.reg.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::{GeneralRegisterFile, SegmentRegisterFile, StatusRegister};

    #[test]
    fn general_register_write_needs_a_tick() {
        let mut gr = GeneralRegisterFile::default();
        gr.set(3, 99);
        assert_eq!(gr.get(3), 0);
        gr.tick();
        assert_eq!(gr.get(3), 99);
    }

    #[test]
    fn out_of_range_register_reads_zero() {
        let gr = GeneralRegisterFile::default();
        assert_eq!(gr.get(8), 0);
    }

    #[test]
    fn segment_registers_4_through_7_are_privileged() {
        let sr = SegmentRegisterFile::default();
        assert!(!sr.is_privileged(3));
        assert!(sr.is_privileged(4));
        assert!(sr.is_privileged(7));
    }

    #[test]
    fn execution_level_round_trips() {
        let mut st = StatusRegister::default();
        st.set_execution_level(3);
        st.tick();
        assert_eq!(st.execution_level(), 3);
    }

    #[test]
    fn carry_flag_round_trips() {
        let mut st = StatusRegister::default();
        st.set_carry(true);
        st.tick();
        assert!(st.carry());
        st.set_carry(false);
        st.tick();
        assert!(!st.carry());
    }

    #[test]
    fn set_bits_never_touches_privileged_bits_above_the_low_six() {
        let mut st = StatusRegister::default();
        st.set_execution_level(3);
        st.tick();
        st.set_carry(true);
        st.tick();
        let before = st.bits();

        st.set_bits(0xFFFF_FFFF); // MST replace mode, attacker-controlled mask
        st.tick();

        assert_eq!(st.bits() & 0x3F, 0x3F, "low 6 bits are the ones MST is allowed to replace");
        assert_eq!(st.bits() & !0x3Fu32, before & !0x3Fu32, "bits above the low 6 must survive untouched");
        assert_eq!(st.execution_level(), 3);
        assert!(st.carry());
    }

    #[test]
    fn set_mask_only_ors_in_the_low_six_bits() {
        let mut st = StatusRegister::default();
        st.set_execution_level(2);
        st.tick();

        st.set_mask(0xFFFF_FFFF);
        st.tick();

        assert_eq!(st.bits() & 0x3F, 0x3F);
        assert_eq!(st.execution_level(), 2, "set_mask must not leak into the execution-level field");
    }

    #[test]
    fn clear_mask_only_clears_the_low_six_bits() {
        let mut st = StatusRegister::default();
        st.set_execution_level(1);
        st.tick();
        st.set_carry(true);
        st.tick();
        st.set_bits(0x3F);
        st.tick();

        st.clear_mask(0xFFFF_FFFF);
        st.tick();

        assert_eq!(st.bits() & 0x3F, 0, "every low bit should have cleared");
        assert_eq!(st.execution_level(), 1, "clear_mask must not leak into the execution-level field");
        assert!(st.carry(), "clear_mask must not clear carry");
    }
}
