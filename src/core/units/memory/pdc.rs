//! Terminal PDC (boot ROM) layer.
//!
//! Directly fetchable by FD (bypassing the I-cache) and readable by the
//! D-path; never cached. Writable here for implementation simplicity —
//! enforcing true read-only semantics is left to the page-type access
//! check on the covering TLB entry, not to this layer (see `DESIGN.md`).

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

/// Flat byte-addressable PDC ROM image.
#[derive(Clone, Debug)]
pub struct PdcLayer {
    bytes: Vec<u8>,
    base: u32,
    latency: u32,
    priority: u8,
    request: Option<Request>,
    stats: LayerStats,
}

impl PdcLayer {
    /// Creates a PDC layer covering `[base, base + size_bytes)`.
    #[must_use]
    pub fn new(base: u32, size_bytes: usize, latency: u32, priority: u8) -> Self {
        Self {
            bytes: vec![0u8; size_bytes],
            base,
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

    /// Advances the in-flight request by one cycle.
    pub fn process(&mut self) -> TerminalStep {
        let Some(mut req) = self.request.clone() else {
            return TerminalStep::NotCompleted;
        };
        if req.remaining > 0 {
            req.remaining -= 1;
            self.request = Some(req);
            return TerminalStep::NotCompleted;
        }
        let base = (req.addr - self.base) as usize % self.bytes.len().max(1);
        let result = match req.access {
            AccessType::Write => {
                write_width(&mut self.bytes, base, req.width, req.write_data.unwrap_or(0));
                None
            }
            AccessType::Read | AccessType::Fetch => Some(read_width(&self.bytes, base, req.width)),
        };
        self.stats.hits += 1;
        self.request = None;
        TerminalStep::Completed(result)
    }

    /// Loads a boot image directly, bypassing latency (used by the
    /// external driver, not by the pipeline).
    pub fn load_image(&mut self, image: &[u8]) {
        let n = image.len().min(self.bytes.len());
        self.bytes[..n].copy_from_slice(&image[..n]);
    }

    /// Forces the state machine back to idle.
    pub fn abort_op(&mut self) {
        self.request = None;
    }

    /// Clears statistics and in-flight state (used by `reset()`); storage
    /// is left intact since PDC is conceptually ROM.
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

fn read_width(bytes: &[u8], base: usize, width: AccessWidth) -> u32 {
    match width {
        AccessWidth::Byte => u32::from(bytes[base]),
        AccessWidth::Half => u32::from(u16::from_be_bytes([bytes[base], bytes[base + 1]])),
        AccessWidth::Word => u32::from_be_bytes([bytes[base], bytes[base + 1], bytes[base + 2], bytes[base + 3]]),
    }
}

fn write_width(bytes: &mut [u8], base: usize, width: AccessWidth, value: u32) {
    match width {
        AccessWidth::Byte => bytes[base] = value as u8,
        AccessWidth::Half => {
            let b = (value as u16).to_be_bytes();
            bytes[base..base + 2].copy_from_slice(&b);
        }
        AccessWidth::Word => {
            let b = value.to_be_bytes();
            bytes[base..base + 4].copy_from_slice(&b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PdcLayer, TerminalStep};
    use crate::common::{AccessType, AccessWidth};

    #[test]
    fn fetch_reads_loaded_image() {
        let mut pdc = PdcLayer::new(0xF000_0000, 256, 1, 1);
        pdc.load_image(&[0xDE, 0xAD, 0xBE, 0xEF]);
        pdc.begin(0xF000_0000, AccessType::Fetch, AccessWidth::Word, None, 1);
        loop {
            if let TerminalStep::Completed(Some(v)) = pdc.process() {
                assert_eq!(v, 0xDEAD_BEEF);
                break;
            }
        }
    }
}
