//! The `Core` orchestrator.
//!
//! Owns every architectural register file, the TLBs, the cache/memory
//! hierarchy, and the three pipeline latches, and drives them all through
//! one [`Core::clock_step_once`] per cycle: process phase (MA, then FD,
//! then EX — in that order, so EX's same-cycle bypass patch lands after
//! FD/MA have written their own pending operands this cycle) followed by
//! the tick phase that makes every `set()` this cycle visible.
//!
//! Grounded on the teacher's top-level `Cpu` driver loop (`process` then
//! `tick` across every owned component each cycle), generalized to this
//! machine's three-stage pipeline and segmented address space.

use crate::common::constants::{
    CR_TEMP_1, CR_TRAP_PARM_1, CR_TRAP_PARM_2, CR_TRAP_PARM_3, CR_TRAP_PSW_0, CR_TRAP_PSW_1,
    CR_TRAP_STAT, CR_TRAP_VECTOR_ADR, MAX_CYCLE_PER_INSTR, TRAP_CODE_BLOCK_SIZE,
};
use crate::common::{AccessType, ConfigError, TrapRecord};
use crate::config::{Configuration, L2Mode, MemoryRegionConfig, TlbMode};
use crate::core::pipeline::latches::{PipeLatch, StageLatch};
use crate::core::pipeline::{ex, fd, ma};
use crate::core::regs::{ControlRegisterFile, GeneralRegisterFile, SegmentRegisterFile, StatusRegister};
use crate::core::units::{CacheLayer, IoLayer, MemChain, PdcLayer, RamLayer, Tlb};
use crate::isa::OpCode;
use crate::stats::{LayerStats, Statistics};

/// Which physical region an address resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Main RAM, reachable through the cache hierarchy.
    Ram,
    /// Processor-Dependent Code ROM, always direct.
    Pdc,
    /// Memory-mapped I/O, always direct.
    Io,
}

/// Bookkeeping for an access that has been routed but may take several
/// cycles to complete, so its `begin()` is issued exactly once.
#[derive(Clone, Copy, Debug)]
pub struct AccessState {
    /// Resolved physical address.
    pub phys_addr: u32,
    /// Which physical region it falls in.
    pub route: Route,
    /// Whether the terminal layer's `begin()` has already been called for
    /// this access.
    pub started: bool,
    /// FD's instruction-gateway privilege level, when this access's fetch
    /// hit a `GATEWAY` page. Repurposed by MA as a sentinel
    /// (`ma::TLB_OP_MARKER`) to mark a TLB/cache-control op in flight.
    pub gate_level: Option<u8>,
}

/// The three disjoint physical regions a resolved address may land in.
#[derive(Clone, Copy, Debug)]
pub struct Regions {
    /// Main RAM region.
    pub phys_mem: MemoryRegionConfig,
    /// PDC ROM region.
    pub pdc_mem: MemoryRegionConfig,
    /// MMIO region.
    pub io_mem: MemoryRegionConfig,
}

impl Regions {
    fn covers(region: &MemoryRegionConfig, addr: u32) -> bool {
        addr >= region.start_adr && addr <= region.end_adr
    }

    /// Resolves a physical address to the region it falls in, or `None` if
    /// it matches none of the three (`PhysAddressCheck`).
    #[must_use]
    pub fn route_for(&self, addr: u32) -> Option<Route> {
        if Self::covers(&self.phys_mem, addr) {
            Some(Route::Ram)
        } else if Self::covers(&self.pdc_mem, addr) {
            Some(Route::Pdc)
        } else if Self::covers(&self.io_mem, addr) {
            Some(Route::Io)
        } else {
            None
        }
    }
}

/// The TLB configuration actually backing translation, per `TlbMode`.
///
/// Open Question resolution (see `DESIGN.md`): `Unified` shares one `Tlb`
/// instance, sized and timed by the `itlb` configuration entry (the `dtlb`
/// entry is ignored in that mode, since there is only one table to build).
#[derive(Clone, Debug)]
pub enum TlbUnit {
    /// Translation is always disabled.
    None,
    /// Independent instruction and data TLBs.
    Split {
        /// Instruction-side TLB.
        itlb: Tlb,
        /// Data-side TLB.
        dtlb: Tlb,
    },
    /// One TLB backing both instruction and data lookups.
    Unified(Tlb),
}

impl TlbUnit {
    fn new(config: &Configuration) -> Self {
        match config.tlb_mode {
            TlbMode::None => Self::None,
            TlbMode::SplitInstrData => Self::Split {
                itlb: Tlb::new(config.itlb.entries, config.itlb.latency),
                dtlb: Tlb::new(config.dtlb.entries, config.dtlb.latency),
            },
            TlbMode::Unified => Self::Unified(Tlb::new(config.itlb.entries, config.itlb.latency)),
        }
    }

    /// The instruction-side TLB, if translation is configured at all.
    pub fn itlb(&mut self) -> Option<&mut Tlb> {
        match self {
            Self::None => None,
            Self::Split { itlb, .. } => Some(itlb),
            Self::Unified(tlb) => Some(tlb),
        }
    }

    /// The data-side TLB, if translation is configured at all.
    pub fn dtlb(&mut self) -> Option<&mut Tlb> {
        match self {
            Self::None => None,
            Self::Split { dtlb, .. } => Some(dtlb),
            Self::Unified(tlb) => Some(tlb),
        }
    }

    fn itlb_ref(&self) -> Option<&Tlb> {
        match self {
            Self::None => None,
            Self::Split { itlb, .. } => Some(itlb),
            Self::Unified(tlb) => Some(tlb),
        }
    }

    fn dtlb_ref(&self) -> Option<&Tlb> {
        match self {
            Self::None => None,
            Self::Split { dtlb, .. } => Some(dtlb),
            Self::Unified(tlb) => Some(tlb),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::None => {}
            Self::Split { itlb, dtlb } => {
                itlb.reset();
                dtlb.reset();
            }
            Self::Unified(tlb) => tlb.reset(),
        }
    }
}

/// A fully assembled processor core: registers, TLBs, the cache/memory
/// hierarchy, and the three pipeline latches, driven one cycle at a time.
#[derive(Clone, Debug)]
pub struct Core {
    pub(crate) greg: GeneralRegisterFile,
    pub(crate) sreg: SegmentRegisterFile,
    pub(crate) creg: ControlRegisterFile,
    pub(crate) status: StatusRegister,

    pub(crate) fd_pc: PipeLatch<(u32, u32)>,
    pub(crate) fd_latch: PipeLatch<StageLatch>,
    pub(crate) ma_latch: PipeLatch<StageLatch>,

    pub(crate) tlb: TlbUnit,
    pub(crate) l1_icache: CacheLayer,
    pub(crate) l1_dcache: CacheLayer,
    pub(crate) l2_cache: Option<CacheLayer>,
    pub(crate) ram: RamLayer,
    pub(crate) pdc: PdcLayer,
    pub(crate) io: IoLayer,

    pub(crate) fd_mem: MemChain,
    pub(crate) ma_mem: MemChain,

    pub(crate) fd_access: Option<AccessState>,
    pub(crate) ma_access: Option<AccessState>,
    pub(crate) ma_pending: Option<(StageLatch, AccessType, Option<u32>, bool)>,

    pub(crate) itlb_pending_index: Option<usize>,
    pub(crate) dtlb_pending_index: Option<usize>,

    pub(crate) fd_retiring: bool,
    pub(crate) ma_retiring: bool,

    pub(crate) fd_priority: u8,
    pub(crate) ma_priority: u8,

    pub(crate) regions: Regions,
    pub(crate) stats: Statistics,
}

impl Core {
    /// Builds a core from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] `Configuration::validate` finds.
    pub fn new(config: Configuration) -> Result<Self, ConfigError> {
        config.validate()?;

        let l2_cache = match config.l2_mode {
            L2Mode::None => None,
            L2Mode::Unified => Some(CacheLayer::new(
                config.l2_cache.block_entries,
                config.l2_cache.block_size,
                config.l2_cache.sets,
                config.l2_cache.latency,
                config.l2_cache.priority,
            )),
        };

        Ok(Self {
            greg: GeneralRegisterFile::default(),
            sreg: SegmentRegisterFile::default(),
            creg: ControlRegisterFile::default(),
            status: StatusRegister::default(),

            fd_pc: PipeLatch::new((0, 0)),
            fd_latch: PipeLatch::new(StageLatch::nop()),
            ma_latch: PipeLatch::new(StageLatch::nop()),

            tlb: TlbUnit::new(&config),
            l1_icache: CacheLayer::new(
                config.l1_icache.block_entries,
                config.l1_icache.block_size,
                config.l1_icache.sets,
                config.l1_icache.latency,
                config.l1_icache.priority,
            ),
            l1_dcache: CacheLayer::new(
                config.l1_dcache.block_entries,
                config.l1_dcache.block_size,
                config.l1_dcache.sets,
                config.l1_dcache.latency,
                config.l1_dcache.priority,
            ),
            l2_cache,
            ram: RamLayer::new(
                config.phys_mem.size_bytes() as usize,
                config.phys_mem.latency,
                config.phys_mem.priority,
            ),
            pdc: PdcLayer::new(
                config.pdc_mem.start_adr,
                config.pdc_mem.size_bytes() as usize,
                config.pdc_mem.latency,
                config.pdc_mem.priority,
            ),
            io: IoLayer::new(
                config.io_mem.start_adr,
                config.io_mem.size_bytes(),
                config.io_mem.latency,
                config.io_mem.priority,
            ),

            fd_mem: MemChain::default(),
            ma_mem: MemChain::default(),

            fd_access: None,
            ma_access: None,
            ma_pending: None,

            itlb_pending_index: None,
            dtlb_pending_index: None,

            fd_retiring: false,
            ma_retiring: false,

            fd_priority: config.l1_icache.priority,
            ma_priority: config.l1_dcache.priority,

            regions: Regions {
                phys_mem: config.phys_mem,
                pdc_mem: config.pdc_mem,
                io_mem: config.io_mem,
            },
            stats: Statistics::default(),
        })
    }

    /// Resets architectural and microarchitectural state to power-on
    /// defaults. Performance counters are left untouched; see
    /// [`Self::clear_stats`].
    pub fn reset(&mut self) {
        self.greg.reset();
        self.sreg.reset();
        self.creg.reset();
        self.status.reset();

        self.fd_pc.load((0, 0));
        self.fd_latch.load(StageLatch::nop());
        self.ma_latch.load(StageLatch::nop());

        self.tlb.reset();
        self.l1_icache.reset();
        self.l1_dcache.reset();
        if let Some(l2) = self.l2_cache.as_mut() {
            l2.reset();
        }
        self.ram.reset();
        self.pdc.reset();
        self.io.reset();

        self.fd_mem = MemChain::default();
        self.ma_mem = MemChain::default();

        self.fd_access = None;
        self.ma_access = None;
        self.ma_pending = None;
        self.itlb_pending_index = None;
        self.dtlb_pending_index = None;
        self.fd_retiring = false;
        self.ma_retiring = false;
    }

    /// Zeros the performance-counter block (`Statistics`) without touching
    /// any architectural or microarchitectural state. Per-layer counters
    /// inside the caches/TLBs themselves are cumulative for the object's
    /// lifetime and have no independent reset hook, so the snapshot
    /// `stats()` returns right after this call still reflects their
    /// lifetime totals; only the cycle/instruction/stall/trap counters in
    /// `Statistics` itself are actually zeroed.
    pub fn clear_stats(&mut self) {
        self.stats = Statistics::default();
    }

    /// A snapshot of current performance counters, with the per-layer
    /// cache/TLB fields freshly filled in from their live owners.
    #[must_use]
    pub fn stats(&self) -> Statistics {
        let mut s = self.stats;
        s.l1_icache = *self.l1_icache.stats();
        s.l1_dcache = *self.l1_dcache.stats();
        s.l2_cache = self.l2_cache.as_ref().map_or(LayerStats::default(), |l| *l.stats());
        s.itlb = self.tlb.itlb_ref().map_or(LayerStats::default(), |t| *t.stats());
        s.dtlb = self.tlb.dtlb_ref().map_or(LayerStats::default(), |t| *t.stats());
        s
    }

    /// Advances the core by `n` cycles.
    pub fn clock_step(&mut self, n: u64) {
        for _ in 0..n {
            self.clock_step_once();
        }
    }

    /// Advances the core by exactly one cycle: process phase (MA, FD, then
    /// EX) followed by the tick that commits every latch/register written
    /// this cycle.
    pub fn clock_step_once(&mut self) {
        self.stats.cycles += 1;

        let ex_should_run = self.ma_retiring;
        let fd_retiring_before_ma = self.fd_retiring;

        let ma_outcome = ma::process(self);
        self.ma_retiring = ma_outcome.produced;
        fd::process(self);

        if fd_retiring_before_ma && !ma_outcome.produced && self.ma_access.is_none() {
            // FD had something ready but MA is neither consuming it (still
            // gated) nor mid-flight on an older access: a genuine
            // structural stall, not a memory wait.
            self.stats.stalls_structural += 1;
        }
        if self.ma_access.is_some() || self.fd_access.is_some() {
            self.stats.stalls_memory += 1;
        }

        if ex_should_run {
            let op = self.ma_latch.get().instr.op;
            let outcome = ex::process(self);
            self.apply_ex_outcome(outcome, op);
        }

        self.fd_pc.tick(false);
        self.fd_latch.tick(false);
        self.ma_latch.tick(false);
        self.greg.tick();
        self.sreg.tick();
        self.creg.tick();
        self.status.tick();
    }

    fn apply_ex_outcome(&mut self, outcome: ex::ExOutcome, op: OpCode) {
        if let Some(trap) = outcome.trap {
            self.handle_traps(trap);
            return;
        }

        if outcome.retired {
            self.stats.instructions_retired += 1;
            self.record_retired_class(op);
        }

        if matches!(op, OpCode::Cbr | OpCode::Cbru) {
            if matches!(outcome.redirect, ex::ExRedirect::Mispredict { .. }) {
                self.stats.branch_mispredictions += 1;
            } else {
                self.stats.branch_predictions_correct += 1;
            }
        }

        if let ex::ExRedirect::Mispredict { seg, ofs } = outcome.redirect {
            self.squash_after_mispredict(seg, ofs);
        }
    }

    fn record_retired_class(&mut self, op: OpCode) {
        match op {
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
            | OpCode::Mr
            | OpCode::Mst => self.stats.inst_alu += 1,
            OpCode::Ld => self.stats.inst_load += 1,
            OpCode::St => self.stats.inst_store += 1,
            OpCode::B
            | OpCode::Br
            | OpCode::Bv
            | OpCode::Be
            | OpCode::Bl
            | OpCode::Blr
            | OpCode::Bvr
            | OpCode::Ble
            | OpCode::Cbr
            | OpCode::Cbru
            | OpCode::Gate
            | OpCode::Rfi => self.stats.inst_branch += 1,
            OpCode::ItlbA | OpCode::ItlbP | OpCode::Ptlb | OpCode::Pca | OpCode::Brk => self.stats.inst_system += 1,
            OpCode::Illegal => {}
        }
    }

    /// Squashes FD's and MA's this-cycle work on a resolved branch
    /// misprediction: both stages already advanced speculatively past the
    /// branch now retiring in EX, so both their in-flight state and
    /// whatever they just latched this cycle are discarded in favor of the
    /// redirect target.
    fn squash_after_mispredict(&mut self, seg: u32, ofs: u32) {
        self.fd_pc.load((seg, ofs));
        self.fd_latch.load(StageLatch::nop());
        self.fd_mem.abort();
        if let Some(tlb) = self.tlb.itlb() {
            tlb.abort_op();
        }
        self.fd_access = None;
        self.fd_retiring = false;

        self.ma_latch.load(StageLatch::nop());
        self.ma_mem.abort();
        if let Some(tlb) = self.tlb.dtlb() {
            tlb.abort_op();
        }
        self.ma_access = None;
        self.ma_pending = None;
        self.ma_retiring = false;

        self.stats.stalls_control += 1;
    }

    /// Commits a trap: writes the `TEMP_1`/`TRAP_PSW_*`/`TRAP_STAT`/
    /// `TRAP_PARM_*` control registers, computes the handler address from
    /// `TRAP_VECTOR_ADR + trapId * TRAP_CODE_BLOCK_SIZE`, and flushes the
    /// entire pipeline to fetch the handler next cycle.
    ///
    /// Open Question resolution: the trap vector lives in segment 0 (there
    /// is no dedicated "trap segment" register in this encoding); see
    /// `DESIGN.md`.
    pub fn handle_traps(&mut self, trap: TrapRecord) {
        self.creg.load(CR_TEMP_1, trap.id as u32);
        self.creg.load(CR_TRAP_PSW_0, trap.psw0);
        self.creg.load(CR_TRAP_PSW_1, trap.psw1);
        self.creg.load(CR_TRAP_STAT, self.status.bits());
        self.creg.load(CR_TRAP_PARM_1, trap.parm1);
        self.creg.load(CR_TRAP_PARM_2, trap.parm2);
        self.creg.load(CR_TRAP_PARM_3, trap.parm3);

        let vector = self.creg.get(CR_TRAP_VECTOR_ADR);
        let handler_ofs = vector.wrapping_add((trap.id as u32) * TRAP_CODE_BLOCK_SIZE);

        self.status.load_bits(0);
        self.fd_pc.load((0, handler_ofs));
        self.fd_latch.load(StageLatch::nop());
        self.ma_latch.load(StageLatch::nop());
        self.fd_mem.abort();
        self.ma_mem.abort();
        if let Some(tlb) = self.tlb.itlb() {
            tlb.abort_op();
        }
        if let Some(tlb) = self.tlb.dtlb() {
            tlb.abort_op();
        }
        self.fd_access = None;
        self.ma_access = None;
        self.ma_pending = None;
        self.itlb_pending_index = None;
        self.dtlb_pending_index = None;
        self.fd_retiring = false;
        self.ma_retiring = false;

        self.stats.traps_taken += 1;
    }

    /// Steps the core until `n` instructions have retired (or been
    /// trapped), each bounded by `MAX_CYCLE_PER_INSTR` cycles to guard
    /// against a runaway stall. Returns the number of instructions actually
    /// retired, which is less than `n` only if a runaway was hit.
    pub fn instr_step(&mut self, n: u64) -> u64 {
        let mut retired = 0;
        for _ in 0..n {
            let start = self.stats.instructions_retired;
            let mut cycles = 0u64;
            while self.stats.instructions_retired == start {
                self.clock_step_once();
                cycles += 1;
                if cycles >= MAX_CYCLE_PER_INSTR {
                    break;
                }
            }
            if self.stats.instructions_retired == start {
                break;
            }
            retired += 1;
        }
        retired
    }

    /// Reads `gReg[id]`.
    #[must_use]
    pub fn general_reg(&self, id: usize) -> u32 {
        self.greg.get(id)
    }

    /// Forces `gReg[id]` immediately (external driver, not pipeline logic).
    pub fn set_general_reg(&mut self, id: usize, val: u32) {
        self.greg.load(id, val);
    }

    /// Reads `sReg[id]`.
    #[must_use]
    pub fn segment_reg(&self, id: usize) -> u32 {
        self.sreg.get(id)
    }

    /// Forces `sReg[id]` immediately.
    pub fn set_segment_reg(&mut self, id: usize, val: u32) {
        self.sreg.load(id, val);
    }

    /// Reads `cReg[id]`.
    #[must_use]
    pub fn control_reg(&self, id: usize) -> u32 {
        self.creg.get(id)
    }

    /// Forces `cReg[id]` immediately.
    pub fn set_control_reg(&mut self, id: usize, val: u32) {
        self.creg.load(id, val);
    }

    /// Current `(segment, offset)` program counter.
    #[must_use]
    pub fn pc(&self) -> (u32, u32) {
        *self.fd_pc.get()
    }

    /// Forces the program counter to `(seg, ofs)` and flushes the
    /// pipeline, for use before the first cycle after loading a program.
    pub fn set_pc(&mut self, seg: u32, ofs: u32) {
        self.fd_pc.load((seg, ofs));
        self.fd_latch.load(StageLatch::nop());
        self.ma_latch.load(StageLatch::nop());
        self.fd_mem.abort();
        self.ma_mem.abort();
        self.fd_access = None;
        self.ma_access = None;
        self.ma_pending = None;
        self.fd_retiring = false;
        self.ma_retiring = false;
    }

    /// The raw status word.
    #[must_use]
    pub fn status_bits(&self) -> u32 {
        self.status.bits()
    }

    /// Forces the raw status word immediately (external driver, not
    /// pipeline logic), e.g. to set up execution level or translation
    /// enables before a test program runs.
    pub fn set_status_bits(&mut self, bits: u32) {
        self.status.load_bits(bits);
    }

    /// Loads a boot ROM image into the PDC layer, bypassing latency.
    pub fn load_pdc_image(&mut self, image: &[u8]) {
        self.pdc.load_image(image);
    }

    /// Writes bytes directly into RAM, bypassing latency (external driver
    /// loading a program image).
    pub fn write_ram(&mut self, addr: u32, data: &[u8]) {
        self.ram.write_block(addr, data);
    }

    /// Reads `len` bytes directly from RAM, bypassing latency.
    #[must_use]
    pub fn read_ram(&self, addr: u32, len: usize) -> Vec<u8> {
        self.ram.read_block(addr, len)
    }
}
