//! Configuration system for the core simulator.
//!
//! Defines the construction-time descriptor tree a driver supplies to
//! `Core::new` (`spec.md` section 6): TLB mode, cache/memory layer layout,
//! and per-layer timing. Deserializable from JSON so an external driver can
//! load it from a file without this crate knowing the file format.

use serde::Deserialize;

use crate::common::ConfigError;

/// Baseline hardware constants used when a `Configuration` field is left at
/// its `Default`.
mod defaults {
    /// End of the main RAM physical region (16 MiB).
    pub const PHYS_MEM_END: u32 = 16 * 1024 * 1024 - 1;

    /// Start of the PDC (Processor-Dependent Code) physical region.
    pub const PDC_MEM_START: u32 = 0xF000_0000;
    /// End of the PDC physical region (64 KiB window).
    pub const PDC_MEM_END: u32 = 0xF000_FFFF;

    /// Start of the MMIO physical region.
    pub const IO_MEM_START: u32 = 0xF800_0000;
    /// End of the MMIO physical region.
    pub const IO_MEM_END: u32 = 0xF800_FFFF;

    /// Default TLB entry count (rounded up to a power of two by `Tlb::new`).
    pub const TLB_ENTRIES: usize = 16;
    /// Default TLB operation latency, in cycles, per `ITLB.A`/`ITLB.P` half.
    pub const TLB_LATENCY: u32 = 2;

    /// Default L1 cache block count.
    pub const L1_BLOCK_ENTRIES: usize = 128;
    /// Default L1 cache block size in bytes.
    pub const L1_BLOCK_SIZE: usize = 32;
    /// Default L1 cache associativity.
    pub const L1_SETS: usize = 2;
    /// Default L1 cache latency in cycles.
    pub const L1_LATENCY: u32 = 1;

    /// Default L2 cache block count.
    pub const L2_BLOCK_ENTRIES: usize = 512;
    /// Default L2 cache block size in bytes.
    pub const L2_BLOCK_SIZE: usize = 64;
    /// Default L2 cache associativity.
    pub const L2_SETS: usize = 4;
    /// Default L2 cache latency in cycles.
    pub const L2_LATENCY: u32 = 8;

    /// Default RAM access latency in cycles.
    pub const MEM_LATENCY: u32 = 20;
    /// Default PDC access latency in cycles.
    pub const PDC_LATENCY: u32 = 4;
    /// Default IO access latency in cycles.
    pub const IO_LATENCY: u32 = 12;

    /// Default request priority for a CPU-issued memory operation.
    pub const DEFAULT_PRIORITY: u8 = 1;
}

/// TLB configuration mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlbMode {
    /// No TLB; translation is always disabled.
    None,
    /// Separate instruction and data TLBs.
    #[default]
    SplitInstrData,
    /// A single unified TLB, dual-ported (two independent lookup ports over
    /// one shared table; see `DESIGN.md` for the arbitration rule).
    Unified,
}

/// L2 cache configuration mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum L2Mode {
    /// No L2; L1 misses go straight to physical memory.
    #[default]
    None,
    /// A unified L2 cache sits between both L1s and physical memory.
    Unified,
}

/// Configuration for one TLB instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct TlbConfig {
    /// Requested entry count (rounded up to the next power of two, capped
    /// at `u16::MAX as usize + 1`).
    pub entries: usize,
    /// Cycles consumed by each half of the `ITLB.A`/`ITLB.P` insert
    /// protocol, and by a `PTLB` purge.
    pub latency: u32,
}

impl Default for TlbConfig {
    fn default() -> Self {
        Self {
            entries: defaults::TLB_ENTRIES,
            latency: defaults::TLB_LATENCY,
        }
    }
}

impl TlbConfig {
    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.entries == 0 {
            return Err(ConfigError::ZeroTlbEntries(name));
        }
        Ok(())
    }
}

/// Configuration for one cache layer (L1 or L2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Number of cache blocks (sum across all sets).
    pub block_entries: usize,
    /// Block (line) size in bytes; must be a power of two.
    pub block_size: u32,
    /// Associativity: number of ways per index (`sets` in `spec.md`).
    pub sets: usize,
    /// Access latency in cycles, added on a hit.
    pub latency: u32,
    /// Arbitration priority when multiple requesters arrive the same cycle.
    pub priority: u8,
}

impl CacheConfig {
    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if !self.block_size.is_power_of_two() {
            return Err(ConfigError::BlockSizeNotPowerOfTwo(self.block_size, name));
        }
        if self.sets == 0 {
            return Err(ConfigError::ZeroAssociativity(name));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_entries: defaults::L1_BLOCK_ENTRIES,
            block_size: defaults::L1_BLOCK_SIZE as u32,
            sets: defaults::L1_SETS,
            latency: defaults::L1_LATENCY,
            priority: defaults::DEFAULT_PRIORITY,
        }
    }
}

/// Configuration for a directly-indexed physical region (RAM, PDC, or IO).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct MemoryRegionConfig {
    /// First physical address in the region (inclusive).
    pub start_adr: u32,
    /// Last physical address in the region (inclusive).
    pub end_adr: u32,
    /// Access latency in cycles.
    pub latency: u32,
    /// Arbitration priority.
    pub priority: u8,
}

impl MemoryRegionConfig {
    /// Number of bytes in the region.
    #[must_use]
    pub const fn size_bytes(&self) -> u32 {
        self.end_adr - self.start_adr + 1
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.start_adr <= other.end_adr && other.start_adr <= self.end_adr
    }
}

/// Top-level configuration descriptor consumed by `Core::new`.
///
/// Mirrors `spec.md` section 6's configuration surface: TLB mode, L1/L2
/// cache mode, and per-layer parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Configuration {
    /// TLB mode (none, split I/D, or unified).
    pub tlb_mode: TlbMode,
    /// Instruction TLB configuration (ignored when `tlb_mode` is `None`).
    pub itlb: TlbConfig,
    /// Data TLB configuration (ignored when `tlb_mode` is `None`).
    pub dtlb: TlbConfig,
    /// L2 cache mode.
    pub l2_mode: L2Mode,
    /// L1 instruction cache configuration.
    pub l1_icache: CacheConfig,
    /// L1 data cache configuration.
    pub l1_dcache: CacheConfig,
    /// L2 cache configuration (ignored when `l2_mode` is `None`).
    pub l2_cache: CacheConfig,
    /// Main RAM region.
    pub phys_mem: MemoryRegionConfig,
    /// PDC ROM region.
    pub pdc_mem: MemoryRegionConfig,
    /// MMIO region.
    pub io_mem: MemoryRegionConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            tlb_mode: TlbMode::default(),
            itlb: TlbConfig::default(),
            dtlb: TlbConfig::default(),
            l2_mode: L2Mode::default(),
            l1_icache: CacheConfig::default(),
            l1_dcache: CacheConfig::default(),
            l2_cache: CacheConfig {
                block_entries: defaults::L2_BLOCK_ENTRIES,
                block_size: defaults::L2_BLOCK_SIZE as u32,
                sets: defaults::L2_SETS,
                latency: defaults::L2_LATENCY,
                priority: defaults::DEFAULT_PRIORITY,
            },
            phys_mem: MemoryRegionConfig {
                start_adr: 0,
                end_adr: defaults::PHYS_MEM_END,
                latency: defaults::MEM_LATENCY,
                priority: defaults::DEFAULT_PRIORITY,
            },
            pdc_mem: MemoryRegionConfig {
                start_adr: defaults::PDC_MEM_START,
                end_adr: defaults::PDC_MEM_END,
                latency: defaults::PDC_LATENCY,
                priority: defaults::DEFAULT_PRIORITY,
            },
            io_mem: MemoryRegionConfig {
                start_adr: defaults::IO_MEM_START,
                end_adr: defaults::IO_MEM_END,
                latency: defaults::IO_LATENCY,
                priority: defaults::DEFAULT_PRIORITY,
            },
        }
    }
}

impl Configuration {
    /// Validates the descriptor before it is consumed by `Core::new`.
    ///
    /// Checks power-of-two block sizes, nonzero associativity/TLB entries,
    /// non-overlapping physical regions, and that an upstream cache's block
    /// size does not exceed its downstream layer's (`spec.md` section 4.2's
    /// block-size rule).
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.itlb.validate("itlb")?;
        self.dtlb.validate("dtlb")?;
        self.l1_icache.validate("l1_icache")?;
        self.l1_dcache.validate("l1_dcache")?;
        if matches!(self.l2_mode, L2Mode::Unified) {
            self.l2_cache.validate("l2_cache")?;
            if self.l1_icache.block_size > self.l2_cache.block_size {
                return Err(ConfigError::BlockSizeExceedsDownstream(
                    "l1_icache",
                    self.l1_icache.block_size,
                    "l2_cache",
                    self.l2_cache.block_size,
                ));
            }
            if self.l1_dcache.block_size > self.l2_cache.block_size {
                return Err(ConfigError::BlockSizeExceedsDownstream(
                    "l1_dcache",
                    self.l1_dcache.block_size,
                    "l2_cache",
                    self.l2_cache.block_size,
                ));
            }
        }

        if self.phys_mem.overlaps(&self.pdc_mem) {
            return Err(ConfigError::OverlappingRegions("phys_mem", "pdc_mem"));
        }
        if self.phys_mem.overlaps(&self.io_mem) {
            return Err(ConfigError::OverlappingRegions("phys_mem", "io_mem"));
        }
        if self.pdc_mem.overlaps(&self.io_mem) {
            return Err(ConfigError::OverlappingRegions("pdc_mem", "io_mem"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheConfig, ConfigError, Configuration, L2Mode};

    #[test]
    fn default_configuration_is_valid() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn non_power_of_two_block_size_is_rejected() {
        let mut cfg = Configuration::default();
        cfg.l1_icache.block_size = 3;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::BlockSizeNotPowerOfTwo(3, "l1_icache"))
        );
    }

    #[test]
    fn zero_associativity_is_rejected() {
        let mut cfg = Configuration::default();
        cfg.l1_dcache.sets = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroAssociativity("l1_dcache"))
        );
    }

    #[test]
    fn overlapping_regions_are_rejected() {
        let mut cfg = Configuration::default();
        cfg.pdc_mem.start_adr = cfg.phys_mem.start_adr;
        cfg.pdc_mem.end_adr = cfg.phys_mem.end_adr;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::OverlappingRegions("phys_mem", "pdc_mem"))
        );
    }

    #[test]
    fn l1_block_larger_than_l2_is_rejected() {
        let mut cfg = Configuration::default();
        cfg.l2_mode = L2Mode::Unified;
        cfg.l2_cache = CacheConfig {
            block_size: 16,
            ..cfg.l2_cache
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BlockSizeExceedsDownstream(..))
        ));
    }
}
