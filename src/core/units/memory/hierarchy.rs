//! Drives a cache access down through an optional L2 to RAM.
//!
//! [`CacheLayer::process`] only ever reports [`CacheStep::NeedsDownstream`]
//! once per miss (the transition into `AwaitingFill`/`AwaitingWriteback`);
//! every following poll returns `NotCompleted` until fed the matching
//! [`DownstreamResult`]. The functions here own that bookkeeping so FD and
//! MA can each just call [`drive`] once per cycle and get back `None`
//! (still in flight) or `Some(word)` (done), without caring whether the
//! request bottomed out at L2 or had to fall through to RAM.
//!
//! A layer always asks its downstream neighbor for a block sized to
//! *its own* `block_size`, per `spec.md` section 4.2's sub-block rule: an
//! L2 with a larger block than L1 still only ever hands back/accepts the
//! L1-sized slice L1 asked for.

use super::{CacheLayer, CacheStep, DownstreamReq, DownstreamResult, RamLayer, TerminalStep};
use crate::common::{AccessType, AccessWidth};

/// Persisted "have I issued to my downstream yet" state for one in-flight
/// L1 access, across however many cycles it takes to drain.
#[derive(Clone, Debug, Default)]
pub struct MemChain {
    /// L1's outstanding request to whatever sits below it, if any.
    l1_req: Option<DownstreamReq>,
    /// Whether `l1_req` has already been accepted by L2 (or RAM, if there
    /// is no L2). A downstream layer already busy with a higher- or
    /// equal-priority request (e.g. the other chain's access) rejects
    /// `begin`; this stays `false` until one try is actually accepted, so a
    /// lost arbitration round is retried next cycle rather than silently
    /// dropped.
    issued_below_l1: bool,
    /// L2's own outstanding request to RAM, if L2 itself missed servicing
    /// `l1_req`.
    l2_req: Option<DownstreamReq>,
    /// Whether `l2_req` has already been issued to RAM.
    issued_to_ram: bool,
    /// Whether `l1.begin` has already been called for the access this chain
    /// is currently driving. `CacheLayer::begin` resets the requesting
    /// layer's own latency countdown every time it is called, so the owning
    /// stage must call it exactly once per access and then only poll via
    /// [`Self::step`] — never call `begin` again while `active`.
    active: bool,
}

impl MemChain {
    /// Whether this chain is mid-flight (a request has been started and has
    /// not yet completed).
    #[must_use]
    pub const fn busy(&self) -> bool {
        self.active
    }

    /// Discards all in-flight bookkeeping (pipeline flush).
    pub fn abort(&mut self) {
        *self = Self::default();
    }

    /// Drives one cycle of an access, calling `begin` to start it the first
    /// time this is invoked for a fresh (non-`active`) chain. Returns `None`
    /// while in flight, `Some(word)` once `l1` completes. If `begin` itself
    /// loses arbitration (the layer is busy with a higher-or-equal-priority
    /// request), this chain stays inactive and the caller should retry with
    /// the same `begin` next cycle.
    pub fn step(
        &mut self,
        l1: &mut CacheLayer,
        l2: Option<&mut CacheLayer>,
        ram: &mut RamLayer,
        priority: u8,
        begin: impl FnOnce(&mut CacheLayer) -> bool,
    ) -> Option<Option<u32>> {
        if !self.active {
            if !begin(l1) {
                return None;
            }
            self.active = true;
        }
        let result = drive(l1, l2, ram, self, priority);
        if result.is_some() {
            self.active = false;
        }
        result
    }
}

/// Drives one cycle of an access already begun on `l1`. Returns `None`
/// while still in flight, `Some(word)` once `l1` completes (the read word,
/// or `None` within that for a write).
pub fn drive(l1: &mut CacheLayer, l2: Option<&mut CacheLayer>, ram: &mut RamLayer, chain: &mut MemChain, priority: u8) -> Option<Option<u32>> {
    let l1_block_len = l1.block_size() as usize;
    let feed = if let Some(req) = chain.l1_req.clone() {
        resolve(&req, l1_block_len, l2, ram, chain, priority)
    } else {
        None
    };
    if feed.is_some() {
        chain.l1_req = None;
        chain.issued_below_l1 = false;
    }

    match l1.process(feed) {
        CacheStep::Completed(word) => {
            chain.abort();
            Some(word)
        }
        CacheStep::NotCompleted => None,
        CacheStep::NeedsDownstream(req) => {
            chain.l1_req = Some(req);
            None
        }
    }
}

fn resolve(
    req: &DownstreamReq,
    want_len: usize,
    l2: Option<&mut CacheLayer>,
    ram: &mut RamLayer,
    chain: &mut MemChain,
    priority: u8,
) -> Option<DownstreamResult> {
    match l2 {
        None => resolve_terminal(req, want_len, ram, &mut chain.issued_to_ram, priority),
        Some(l2) => {
            let l2_block_len = l2.block_size() as usize;
            let nested_feed = if let Some(nested) = chain.l2_req.clone() {
                resolve_terminal(&nested, l2_block_len, ram, &mut chain.issued_to_ram, priority)
            } else {
                None
            };
            if nested_feed.is_some() {
                chain.l2_req = None;
            }

            if !chain.issued_below_l1 {
                let accepted = match req {
                    DownstreamReq::Fetch { block_addr } => l2.begin_block_read(*block_addr, priority),
                    DownstreamReq::Writeback { block_addr, .. } => {
                        l2.begin(*block_addr, AccessType::Write, AccessWidth::Word, None, priority)
                    }
                };
                chain.issued_below_l1 = accepted;
            }

            match l2.process(nested_feed) {
                CacheStep::Completed(_) => Some(complete(req, want_len, |addr, len| l2.read_block(addr, len), |addr, bytes| l2.write_block(addr, bytes))),
                CacheStep::NotCompleted => None,
                CacheStep::NeedsDownstream(nested_req) => {
                    chain.l2_req = Some(nested_req);
                    None
                }
            }
        }
    }
}

fn resolve_terminal(req: &DownstreamReq, want_len: usize, ram: &mut RamLayer, issued: &mut bool, priority: u8) -> Option<DownstreamResult> {
    if !*issued {
        let accepted = match req {
            DownstreamReq::Fetch { block_addr } => ram.begin_block_read(*block_addr, priority),
            DownstreamReq::Writeback { block_addr, .. } => {
                ram.begin(*block_addr, AccessType::Write, AccessWidth::Word, None, priority)
            }
        };
        *issued = accepted;
    }
    match ram.process() {
        TerminalStep::Completed(_) => {
            *issued = false;
            Some(complete(req, want_len, |addr, len| ram.read_block(addr, len), |addr, bytes| ram.write_block(addr, bytes)))
        }
        TerminalStep::NotCompleted => None,
    }
}

fn complete(req: &DownstreamReq, want_len: usize, read_block: impl FnOnce(u32, usize) -> Vec<u8>, write_block: impl FnOnce(u32, &[u8])) -> DownstreamResult {
    match req {
        DownstreamReq::Fetch { block_addr } => DownstreamResult::Fetched(read_block(*block_addr, want_len)),
        DownstreamReq::Writeback { block_addr, bytes } => {
            write_block(*block_addr, bytes);
            DownstreamResult::WrittenBack
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{drive, MemChain};
    use crate::common::{AccessType, AccessWidth};
    use crate::core::units::memory::{CacheLayer, RamLayer};

    #[test]
    fn single_level_fill_from_ram_round_trips() {
        let mut l1 = CacheLayer::new(4, 16, 1, 2, 1);
        let mut ram = RamLayer::new(4096, 1, 1);
        ram.write_block(0x100, &[9; 16]);
        let mut chain = MemChain::default();

        l1.begin(0x100, AccessType::Read, AccessWidth::Byte, None, 1);
        loop {
            if let Some(Some(v)) = drive(&mut l1, None, &mut ram, &mut chain, 1) {
                assert_eq!(v, 9);
                break;
            }
        }
    }

    #[test]
    fn two_level_fill_cascades_through_l2() {
        let mut l1 = CacheLayer::new(4, 8, 1, 2, 1);
        let mut l2 = CacheLayer::new(4, 16, 1, 2, 1);
        let mut ram = RamLayer::new(4096, 1, 1);
        ram.write_block(0x200, &[7; 16]);
        let mut chain = MemChain::default();

        l1.begin(0x200, AccessType::Read, AccessWidth::Byte, None, 1);
        loop {
            if let Some(Some(v)) = drive(&mut l1, Some(&mut l2), &mut ram, &mut chain, 1) {
                assert_eq!(v, 7);
                break;
            }
        }
    }
}
