//! Simulation statistics collection.
//!
//! Tracks the performance counters an external driver would want to render:
//! cycle/instruction counts, per-class instruction mix, branch prediction
//! accuracy, stall-cycle breakdown, trap counts, and per-layer cache/TLB
//! hit/miss/wait counts. `Core::clear_stats` resets this block without
//! touching architectural state.

/// Per-layer hit/miss/wait counters shared by every cache and TLB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerStats {
    /// Number of accesses that hit.
    pub hits: u64,
    /// Number of accesses that missed.
    pub misses: u64,
    /// Number of inserts (TLB) or fills (cache).
    pub inserts: u64,
    /// Number of purges/invalidations.
    pub deletes: u64,
    /// Total cycles callers spent waiting on this layer (not-completed
    /// polls plus latency countdowns).
    pub wait_cycles: u64,
}

impl LayerStats {
    /// Hit rate in `[0.0, 1.0]`, or `0.0` if there have been no accesses.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Simulation-wide statistics block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Total cycles elapsed (`clock_step` invocations).
    pub cycles: u64,
    /// Instructions committed (reached `EX` without stalling or trapping).
    pub instructions_retired: u64,

    /// Arithmetic/logical/bit-field instructions retired.
    pub inst_alu: u64,
    /// Load instructions retired.
    pub inst_load: u64,
    /// Store instructions retired.
    pub inst_store: u64,
    /// Branch/control instructions retired.
    pub inst_branch: u64,
    /// TLB/cache-control instructions retired.
    pub inst_system: u64,

    /// Branch predictions that matched the resolved outcome.
    pub branch_predictions_correct: u64,
    /// Branch predictions that were wrong (mispredictions, triggering a flush).
    pub branch_mispredictions: u64,

    /// Cycles lost to structural (RAW-address) stalls in FD.
    pub stalls_structural: u64,
    /// Cycles lost waiting on memory/TLB requests in MA.
    pub stalls_memory: u64,
    /// Cycles lost to control-flow flushes.
    pub stalls_control: u64,

    /// Traps taken (handler entry reached in `handle_traps`).
    pub traps_taken: u64,

    /// L1 instruction cache stats.
    pub l1_icache: LayerStats,
    /// L1 data cache stats.
    pub l1_dcache: LayerStats,
    /// L2 cache stats (zeroed if no L2 is configured).
    pub l2_cache: LayerStats,
    /// Instruction TLB stats.
    pub itlb: LayerStats,
    /// Data TLB stats.
    pub dtlb: LayerStats,
}

impl Statistics {
    /// Instructions retired per cycle, or `0.0` before any cycles elapse.
    #[must_use]
    pub fn ipc(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.instructions_retired as f64 / self.cycles as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LayerStats, Statistics};

    #[test]
    fn ipc_is_zero_before_any_cycles() {
        assert_eq!(Statistics::default().ipc(), 0.0);
    }

    #[test]
    fn hit_rate_is_zero_with_no_accesses() {
        assert_eq!(LayerStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_computes_correctly() {
        let s = LayerStats {
            hits: 3,
            misses: 1,
            ..LayerStats::default()
        };
        assert!((s.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
