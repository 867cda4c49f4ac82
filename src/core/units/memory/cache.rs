//! Set-associative, byte-storage cache layer.
//!
//! Unlike a penalty-only timing model, this cache owns real byte storage so
//! that a write followed by a read of the same word round-trips the
//! written value even before any write-back to the backing store
//! (`spec.md` section 8). Replacement is round-robin per index, as the
//! component design calls for, rather than LRU/FIFO/random.

use crate::common::{AccessType, AccessWidth};
use crate::stats::LayerStats;

use super::{CacheStep, DownstreamReq, DownstreamResult};

#[derive(Clone, Copy, Debug, Default)]
struct Line {
    valid: bool,
    dirty: bool,
    tag: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Counting down the layer's own latency.
    Busy,
    /// Waiting for the dirty victim's block to be written downstream.
    AwaitingWriteback,
    /// Waiting for the miss's block to be fetched from downstream.
    AwaitingFill,
}

#[derive(Clone, Debug)]
struct Request {
    addr: u32,
    access: AccessType,
    width: AccessWidth,
    write_data: Option<u32>,
    priority: u8,
    remaining: u32,
    line: usize,
    hit: bool,
    phase: Phase,
    downstream_issued: bool,
}

/// A single cache layer: L1I, L1D, or the optional unified L2.
#[derive(Clone, Debug)]
pub struct CacheLayer {
    block_size: u32,
    /// Number of index slots (`block_entries / sets`).
    num_index: usize,
    sets: usize,
    latency: u32,
    priority: u8,
    lines: Vec<Line>,
    bytes: Vec<u8>,
    victim_ptr: Vec<usize>,
    request: Option<Request>,
    stats: LayerStats,
}

impl CacheLayer {
    /// Creates a cache with `block_entries` total lines split into
    /// `sets`-way associative sets, each line `block_size` bytes.
    #[must_use]
    pub fn new(block_entries: usize, block_size: u32, sets: usize, latency: u32, priority: u8) -> Self {
        let sets = sets.max(1);
        let block_entries = block_entries.max(sets);
        let num_index = block_entries / sets;
        Self {
            block_size: block_size.max(1),
            num_index: num_index.max(1),
            sets,
            latency: latency.max(1),
            priority,
            lines: vec![Line::default(); num_index.max(1) * sets],
            bytes: vec![0u8; num_index.max(1) * sets * block_size.max(1) as usize],
            victim_ptr: vec![0usize; num_index.max(1)],
            request: None,
            stats: LayerStats::default(),
        }
    }

    /// This layer's configured block size, for the block-size rule checked
    /// against whatever sits upstream of it.
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Current statistics snapshot.
    #[must_use]
    pub const fn stats(&self) -> &LayerStats {
        &self.stats
    }

    fn index_of(&self, addr: u32) -> usize {
        ((addr / self.block_size) as usize) % self.num_index
    }

    fn tag_of(&self, addr: u32) -> u32 {
        addr / (self.block_size * self.num_index as u32)
    }

    fn probe(&self, addr: u32) -> Option<usize> {
        let index = self.index_of(addr);
        let tag = self.tag_of(addr);
        for way in 0..self.sets {
            let line = index * self.sets + way;
            if self.lines[line].valid && self.lines[line].tag == tag {
                return Some(line);
            }
        }
        None
    }

    fn choose_victim(&mut self, addr: u32) -> usize {
        let index = self.index_of(addr);
        let way = self.victim_ptr[index];
        self.victim_ptr[index] = (way + 1) % self.sets;
        index * self.sets + way
    }

    fn line_block_addr(&self, line: usize) -> u32 {
        let index = line / self.sets;
        (self.lines[line].tag * self.num_index as u32 + index as u32) * self.block_size
    }

    fn line_bytes_range(&self, line: usize) -> std::ops::Range<usize> {
        let start = line * self.block_size as usize;
        start..start + self.block_size as usize
    }

    /// Whether this layer is idle (able to accept a new request).
    #[must_use]
    pub const fn idle(&self) -> bool {
        self.request.is_none()
    }

    /// Whether an in-flight request would be pre-empted by a request of
    /// `incoming_priority` (strictly higher priority wins arbitration).
    #[must_use]
    pub fn loses_arbitration(&self, incoming_priority: u8) -> bool {
        self.request
            .as_ref()
            .is_some_and(|r| incoming_priority <= r.priority)
    }

    /// Issues a request. Returns `false` (and does nothing) if the layer is
    /// busy with a request of equal or higher priority.
    pub fn begin(&mut self, addr: u32, access: AccessType, width: AccessWidth, write_data: Option<u32>, priority: u8) -> bool {
        if let Some(existing) = &self.request {
            if priority <= existing.priority {
                return false;
            }
        }
        let hit = self.probe(addr).is_some();
        let line = self.probe(addr).unwrap_or_else(|| self.choose_victim(addr));
        self.request = Some(Request {
            addr,
            access,
            width,
            write_data,
            priority,
            remaining: self.latency,
            line,
            hit,
            phase: Phase::Busy,
            downstream_issued: false,
        });
        true
    }

    /// Forces the state machine back to idle, discarding any in-flight
    /// request (pipeline flush `abortOp()`).
    pub fn abort_op(&mut self) {
        self.request = None;
    }

    fn apply_hit(&mut self, req: &Request) -> Option<u32> {
        let base = req.line * self.block_size as usize + (req.addr % self.block_size) as usize;
        match req.access {
            AccessType::Write => {
                let data = req.write_data.unwrap_or(0);
                write_width(&mut self.bytes, base, req.width, data);
                self.lines[req.line].dirty = true;
                None
            }
            AccessType::Read | AccessType::Fetch => Some(read_width(&self.bytes, base, req.width)),
        }
    }

    /// Advances the in-flight request by one cycle.
    ///
    /// `downstream` carries the result of driving the downstream layer
    /// this same cycle, if the caller has one ready; pass `None` while
    /// still waiting.
    pub fn process(&mut self, downstream: Option<DownstreamResult>) -> CacheStep {
        let Some(mut req) = self.request.clone() else {
            return CacheStep::NotCompleted;
        };

        match req.phase {
            Phase::Busy => {
                if req.remaining > 0 {
                    req.remaining -= 1;
                    self.request = Some(req);
                    return CacheStep::NotCompleted;
                }
                if req.hit {
                    self.stats.hits += 1;
                    let result = self.apply_hit(&req);
                    self.request = None;
                    return CacheStep::Completed(result);
                }
                self.stats.misses += 1;
                if self.lines[req.line].valid && self.lines[req.line].dirty {
                    req.phase = Phase::AwaitingWriteback;
                } else {
                    req.phase = Phase::AwaitingFill;
                }
                req.downstream_issued = false;
                self.request = Some(req);
                self.process(None)
            }
            Phase::AwaitingWriteback => {
                if !req.downstream_issued {
                    req.downstream_issued = true;
                    let block_addr = self.line_block_addr(req.line);
                    let bytes = self.bytes[self.line_bytes_range(req.line)].to_vec();
                    self.request = Some(req);
                    return CacheStep::NeedsDownstream(DownstreamReq::Writeback { block_addr, bytes });
                }
                match downstream {
                    Some(DownstreamResult::WrittenBack) => {
                        self.lines[req.line].dirty = false;
                        req.phase = Phase::AwaitingFill;
                        req.downstream_issued = false;
                        self.request = Some(req);
                        self.process(None)
                    }
                    _ => {
                        self.request = Some(req);
                        CacheStep::NotCompleted
                    }
                }
            }
            Phase::AwaitingFill => {
                if !req.downstream_issued {
                    req.downstream_issued = true;
                    let index = self.index_of(req.addr);
                    let block_addr = (self.tag_of(req.addr) * self.num_index as u32 + index as u32) * self.block_size;
                    self.request = Some(req);
                    return CacheStep::NeedsDownstream(DownstreamReq::Fetch { block_addr });
                }
                match downstream {
                    Some(DownstreamResult::Fetched(fill)) => {
                        let tag = self.tag_of(req.addr);
                        let range = self.line_bytes_range(req.line);
                        let n = range.len().min(fill.len());
                        self.bytes[range.start..range.start + n].copy_from_slice(&fill[..n]);
                        self.lines[req.line] = Line {
                            valid: true,
                            dirty: false,
                            tag,
                        };
                        self.stats.inserts += 1;
                        let result = self.apply_hit(&req);
                        self.request = None;
                        CacheStep::Completed(result)
                    }
                    _ => {
                        self.request = Some(req);
                        CacheStep::NotCompleted
                    }
                }
            }
        }
    }

    /// Issues a whole-block read as this layer's upstream-facing miss
    /// service, used when this layer sits downstream of another cache (an
    /// L2 servicing an L1 fill). Latency-wise this is just an ordinary
    /// access; the caller reads the resulting bytes via [`Self::read_block`]
    /// once it completes.
    pub fn begin_block_read(&mut self, addr: u32, priority: u8) -> bool {
        self.begin(addr, AccessType::Read, AccessWidth::Word, None, priority)
    }

    /// Returns `len` bytes starting at `addr`, assuming the containing
    /// line is already resident (called immediately after a completed
    /// [`Self::begin_block_read`]). Reads outside a resident line return
    /// zero bytes rather than panicking, since a flushed/aborted access
    /// can race a caller that still holds the stale address.
    #[must_use]
    pub fn read_block(&self, addr: u32, len: usize) -> Vec<u8> {
        let Some(line) = self.probe(addr) else {
            return vec![0u8; len];
        };
        let start = line * self.block_size as usize + (addr % self.block_size) as usize;
        let end = (start + len).min(self.bytes.len());
        let mut out = self.bytes[start..end].to_vec();
        out.resize(len, 0);
        out
    }

    /// Writes `data` starting at `addr` into an already-resident line
    /// (the other half of the upstream-facing block interface), marking
    /// it dirty. A no-op if the line is not resident.
    pub fn write_block(&mut self, addr: u32, data: &[u8]) {
        let Some(line) = self.probe(addr) else {
            return;
        };
        let start = line * self.block_size as usize + (addr % self.block_size) as usize;
        let end = (start + data.len()).min(self.bytes.len());
        let n = end - start;
        self.bytes[start..start + n].copy_from_slice(&data[..n]);
        self.lines[line].dirty = true;
    }

    /// `PCA` purge: marks the block containing `addr` invalid. A dirty
    /// block must be flushed first; the caller (MA) is responsible for
    /// sequencing a flush before a purge when required.
    pub fn purge_block(&mut self, addr: u32) {
        if let Some(line) = self.probe(addr) {
            self.lines[line] = Line::default();
            self.stats.deletes += 1;
        }
    }

    /// `PCA` flush: if the block containing `addr` is dirty, returns its
    /// bytes and the block's physical address for the caller to write
    /// downstream, then marks it clean.
    pub fn flush_block(&mut self, addr: u32) -> Option<(u32, Vec<u8>)> {
        let line = self.probe(addr)?;
        if !self.lines[line].dirty {
            return None;
        }
        let block_addr = self.line_block_addr(line);
        let bytes = self.bytes[self.line_bytes_range(line)].to_vec();
        self.lines[line].dirty = false;
        Some((block_addr, bytes))
    }

    /// Invalidates every line (used by `reset()`).
    pub fn reset(&mut self) {
        for line in &mut self.lines {
            *line = Line::default();
        }
        self.bytes.fill(0);
        self.victim_ptr.fill(0);
        self.request = None;
        self.stats = LayerStats::default();
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
    use super::{CacheLayer, CacheStep};
    use crate::common::{AccessType, AccessWidth};
    use crate::core::units::memory::DownstreamResult;

    fn fill(bytes: u8, n: usize) -> Vec<u8> {
        vec![bytes; n]
    }

    #[test]
    fn miss_then_fill_then_write_then_read_round_trips() {
        let mut cache = CacheLayer::new(4, 16, 1, 1, 1);
        assert!(cache.begin(0x100, AccessType::Write, AccessWidth::Word, Some(0xDEAD_BEEF), 1));

        let mut step = cache.process(None);
        loop {
            match step {
                CacheStep::NotCompleted => step = cache.process(None),
                CacheStep::NeedsDownstream(_) => {
                    step = cache.process(Some(DownstreamResult::Fetched(fill(0, 16))));
                }
                CacheStep::Completed(_) => break,
            }
        }

        assert!(cache.begin(0x100, AccessType::Read, AccessWidth::Word, None, 1));
        loop {
            match cache.process(None) {
                CacheStep::Completed(Some(word)) => {
                    assert_eq!(word, 0xDEAD_BEEF);
                    break;
                }
                CacheStep::NotCompleted => {}
                other => panic!("unexpected step {other:?}"),
            }
        }
    }

    #[test]
    fn purge_invalidates_and_flush_reports_dirty_bytes() {
        let mut cache = CacheLayer::new(4, 16, 1, 1, 1);
        cache.begin(0x20, AccessType::Write, AccessWidth::Word, Some(7), 1);
        loop {
            match cache.process(None) {
                CacheStep::NeedsDownstream(_) => {
                    let _ = cache.process(Some(DownstreamResult::Fetched(fill(0, 16))));
                }
                CacheStep::Completed(_) => break,
                CacheStep::NotCompleted => {}
            }
        }
        let flushed = cache.flush_block(0x20);
        assert!(flushed.is_some());
        assert!(cache.flush_block(0x20).is_none());
        cache.purge_block(0x20);
        assert!(cache.probe(0x20).is_none());
    }
}
