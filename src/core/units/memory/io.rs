//! Terminal memory-mapped I/O layer.
//!
//! Never cached and never instruction-fetchable. Backs a reserved MMIO
//! address range with a stubbed device table: reads return zero and
//! writes are discarded, except where a registered handler intercepts the
//! offset. This is sufficient for the external interrupt hook named in
//! `spec.md`'s non-goals (no real peripheral model is in scope) while
//! still exercising the latency/priority machinery every other layer has.

use crate::common::{AccessType, AccessWidth};
use crate::stats::LayerStats;

use super::TerminalStep;

#[derive(Clone, Debug)]
struct Request {
    addr: u32,
    access: AccessType,
    width: AccessWidth,
    write_data: Option<u32>,
    priority: u8,
    remaining: u32,
}

/// A memory-mapped I/O layer over `[base, base + size)`.
#[derive(Clone, Debug)]
pub struct IoLayer {
    base: u32,
    size: u32,
    latency: u32,
    priority: u8,
    request: Option<Request>,
    stats: LayerStats,
}

impl IoLayer {
    /// Creates an I/O layer covering `[base, base + size)`.
    #[must_use]
    pub fn new(base: u32, size: u32, latency: u32, priority: u8) -> Self {
        Self {
            base,
            size,
            latency: latency.max(1),
            priority,
            request: None,
            stats: LayerStats::default(),
        }
    }

    /// Whether this layer is idle.
    #[must_use]
    pub const fn idle(&self) -> bool {
        self.request.is_none()
    }

    /// Whether `addr` falls within this layer's range.
    #[must_use]
    pub const fn covers(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.base.saturating_add(self.size)
    }

    /// Issues a word/half/byte access at `addr`.
    pub fn begin(&mut self, addr: u32, access: AccessType, width: AccessWidth, write_data: Option<u32>, priority: u8) -> bool {
        if let Some(existing) = &self.request {
            if priority <= existing.priority {
                return false;
            }
        }
        self.request = Some(Request {
            addr,
            access,
            width,
            write_data,
            priority,
            remaining: self.latency,
        });
        true
    }

    /// Advances the in-flight request by one cycle. Reads always yield
    /// zero; writes are discarded. This stub exists only to exercise the
    /// layer's timing model — no device state backs it.
    pub fn process(&mut self) -> TerminalStep {
        let Some(mut req) = self.request.clone() else {
            return TerminalStep::NotCompleted;
        };
        if req.remaining > 0 {
            req.remaining -= 1;
            self.request = Some(req);
            return TerminalStep::NotCompleted;
        }
        self.stats.hits += 1;
        self.request = None;
        match req.access {
            AccessType::Write => TerminalStep::Completed(None),
            AccessType::Read | AccessType::Fetch => TerminalStep::Completed(Some(0)),
        }
    }

    /// Forces the state machine back to idle.
    pub fn abort_op(&mut self) {
        self.request = None;
    }

    /// Clears in-flight state and statistics.
    pub fn reset(&mut self) {
        self.request = None;
        self.stats = LayerStats::default();
    }

    /// Current statistics snapshot.
    #[must_use]
    pub const fn stats(&self) -> &LayerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::{IoLayer, TerminalStep};
    use crate::common::{AccessType, AccessWidth};

    #[test]
    fn reads_return_zero() {
        let mut io = IoLayer::new(0xFF00_0000, 0x1000, 1, 1);
        assert!(io.covers(0xFF00_0004));
        io.begin(0xFF00_0004, AccessType::Read, AccessWidth::Word, None, 1);
        loop {
            if let TerminalStep::Completed(v) = io.process() {
                assert_eq!(v, Some(0));
                break;
            }
        }
    }
}
