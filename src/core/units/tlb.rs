//! Translation Lookaside Buffer.
//!
//! A hashed, direct-mapped-per-index TLB whose lookup is purely
//! combinational but whose mutating operations (insert, purge) are
//! multi-cycle state machines, matching the two-step `ITLB.A`/`ITLB.P`
//! hardware protocol: the address half clears the entry's valid bit, the
//! protection half sets it. Each half and the purge op consume `latency`
//! cycles, counted down the same way a memory layer's request does
//! (`spec.md` section 4.3).

use crate::common::{AccessType, PageType};
use crate::stats::LayerStats;

/// A single TLB entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TlbEntry {
    /// Entry is valid and may be matched.
    pub valid: bool,
    /// Entry has been written since insertion (unused by lookup; tracked
    /// for parity with the cache/memory layer entity shape).
    pub dirty: bool,
    /// Page type: read-only, read-write, execute, or gateway.
    pub page_type: PageType,
    /// Privilege level required for the weakest allowed access (L1).
    pub priv_l1: u8,
    /// Privilege level required for the strongest allowed access (L2).
    pub priv_l2: u8,
    /// 16-bit protection id, checked against `cReg[PROTECT_ID_n]` when
    /// protect-id checking is enabled.
    pub protect_id: u16,
    /// Virtual page number, segment half.
    pub vpn_seg: u16,
    /// Virtual page number, offset half (already shifted right by
    /// `PAGE_BITS`).
    pub vpn_ofs: u32,
    /// Physical page number (physical address with the page offset bits
    /// cleared).
    pub ppn: u32,
}

/// Outcome of a combinational [`Tlb::lookup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupResult {
    /// Matched at the given index; the entry's access rights still need
    /// checking against the requested [`AccessType`] and privilege level
    /// by the caller (FD or MA).
    Hit(usize),
    /// No valid entry matched.
    Miss,
}

/// The in-flight multi-cycle operation a [`Tlb`] is performing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
enum Op {
    /// `ITLB.A`: write the address half of the entry at `index`, clearing
    /// valid.
    InsertAddr {
        index: usize,
        vpn_seg: u16,
        vpn_ofs: u32,
    },
    /// `ITLB.P`: write the protection half of the entry at `index`,
    /// setting valid.
    InsertProt {
        index: usize,
        page_type: PageType,
        priv_l1: u8,
        priv_l2: u8,
        protect_id: u16,
        ppn: u32,
    },
    /// `PTLB`: invalidate the entry at `index`.
    Purge { index: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Request {
    op: Op,
    remaining: u32,
}

/// A translation lookaside buffer.
#[derive(Clone, Debug)]
pub struct Tlb {
    entries: Vec<TlbEntry>,
    latency: u32,
    request: Option<Request>,
    stats: LayerStats,
}

impl Tlb {
    /// Creates a TLB with `entries` slots (rounded up to the next power of
    /// two, per `spec.md` section 4.3), each op taking `latency` cycles.
    #[must_use]
    pub fn new(entries: usize, latency: u32) -> Self {
        let entries = entries.max(1).next_power_of_two();
        Self {
            entries: vec![TlbEntry::default(); entries],
            latency: latency.max(1),
            request: None,
            stats: LayerStats::default(),
        }
    }

    /// Current statistics snapshot.
    #[must_use]
    pub const fn stats(&self) -> &LayerStats {
        &self.stats
    }

    /// Computes the hashed index for a (segment, offset) virtual address,
    /// per `spec.md` section 4.3: `(seg << k) ^ (ofs >> PAGE_BITS) mod
    /// entries`.
    #[must_use]
    pub fn hash_index(&self, seg: u16, vpn_ofs: u32) -> usize {
        let shifted_seg = u32::from(seg) << 4;
        ((shifted_seg ^ vpn_ofs) as usize) % self.entries.len()
    }

    /// Combinational lookup. Never consumes latency; the caller (FD/MA)
    /// is responsible for statistics and any follow-on fault generation.
    pub fn lookup(&mut self, seg: u16, vpn_ofs: u32) -> LookupResult {
        let index = self.hash_index(seg, vpn_ofs);
        let entry = &self.entries[index];
        if entry.valid && entry.vpn_seg == seg && entry.vpn_ofs == vpn_ofs {
            self.stats.hits += 1;
            LookupResult::Hit(index)
        } else {
            self.stats.misses += 1;
            LookupResult::Miss
        }
    }

    /// Entry at `index`, for access-rights checking after a [`LookupResult::Hit`].
    #[must_use]
    pub fn entry(&self, index: usize) -> &TlbEntry {
        &self.entries[index]
    }

    /// Checks whether `access` is permitted by `entry` at privilege level
    /// `level`, per `spec.md` section 4 MA-stage rules: reads require
    /// `ReadOnly`/`ReadWrite` and `level <= priv_l1`; writes require
    /// `ReadWrite` and `level <= priv_l2`. This simulator does not model a
    /// separate modify-exec bit on `Execute`/`Gateway` pages, so those page
    /// types never permit writes; see `DESIGN.md`.
    #[must_use]
    pub fn check_rights(entry: &TlbEntry, access: AccessType, level: u8) -> bool {
        match access {
            AccessType::Fetch => {
                matches!(entry.page_type, PageType::Execute | PageType::Gateway) && level <= entry.priv_l1
            }
            AccessType::Read => {
                matches!(entry.page_type, PageType::ReadOnly | PageType::ReadWrite) && level <= entry.priv_l1
            }
            AccessType::Write => matches!(entry.page_type, PageType::ReadWrite) && level <= entry.priv_l2,
        }
    }

    /// Begins the address half of an insert (`ITLB.A`). No-op if a request
    /// is already in flight.
    pub fn begin_insert_addr(&mut self, seg: u16, vpn_ofs: u32) {
        if self.request.is_some() {
            return;
        }
        let index = self.hash_index(seg, vpn_ofs);
        self.request = Some(Request {
            op: Op::InsertAddr {
                index,
                vpn_seg: seg,
                vpn_ofs,
            },
            remaining: self.latency,
        });
    }

    /// Begins the protection half of an insert (`ITLB.P`) targeting the
    /// entry at `index` (as previously hashed by `ITLB.A`).
    pub fn begin_insert_prot(
        &mut self,
        index: usize,
        page_type: PageType,
        priv_l1: u8,
        priv_l2: u8,
        protect_id: u16,
        ppn: u32,
    ) {
        if self.request.is_some() {
            return;
        }
        self.request = Some(Request {
            op: Op::InsertProt {
                index,
                page_type,
                priv_l1,
                priv_l2,
                protect_id,
                ppn,
            },
            remaining: self.latency,
        });
    }

    /// Begins a purge (`PTLB`) of the entry at `index`.
    pub fn begin_purge(&mut self, index: usize) {
        if self.request.is_some() {
            return;
        }
        self.request = Some(Request {
            op: Op::Purge { index },
            remaining: self.latency,
        });
    }

    /// Whether a request is currently in flight.
    #[must_use]
    pub const fn busy(&self) -> bool {
        self.request.is_some()
    }

    /// Advances the in-flight request by one cycle. Returns `true` once
    /// the request has fully completed (and has been retired); returns
    /// `false` (not completed) every cycle before that, including the
    /// cycle the request was issued.
    pub fn process(&mut self) -> bool {
        let Some(mut req) = self.request else {
            return false;
        };
        if req.remaining > 0 {
            req.remaining -= 1;
            self.request = Some(req);
            return false;
        }

        match req.op {
            Op::InsertAddr { index, vpn_seg, vpn_ofs } => {
                self.entries[index].valid = false;
                self.entries[index].vpn_seg = vpn_seg;
                self.entries[index].vpn_ofs = vpn_ofs;
            }
            Op::InsertProt {
                index,
                page_type,
                priv_l1,
                priv_l2,
                protect_id,
                ppn,
            } => {
                let entry = &mut self.entries[index];
                entry.page_type = page_type;
                entry.priv_l1 = priv_l1;
                entry.priv_l2 = priv_l2;
                entry.protect_id = protect_id;
                entry.ppn = ppn;
                entry.valid = true;
                self.stats.inserts += 1;
            }
            Op::Purge { index } => {
                self.entries[index] = TlbEntry::default();
                self.stats.deletes += 1;
            }
        }
        self.request = None;
        true
    }

    /// Aborts any in-flight request without retiring it, per the pipeline
    /// flush `abortOp()` convention.
    pub fn abort_op(&mut self) {
        self.request = None;
    }

    /// Invalidates every entry (used by `reset()`).
    pub fn reset(&mut self) {
        for e in &mut self.entries {
            *e = TlbEntry::default();
        }
        self.request = None;
        self.stats = LayerStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::{PageType, Tlb};
    use crate::common::AccessType;

    #[test]
    fn lookup_misses_on_empty_tlb() {
        let mut tlb = Tlb::new(16, 2);
        assert!(matches!(tlb.lookup(0, 5), super::LookupResult::Miss));
    }

    #[test]
    fn two_step_insert_completes_and_is_found() {
        let mut tlb = Tlb::new(16, 2);
        tlb.begin_insert_addr(0, 5);
        assert!(!tlb.process());
        assert!(!tlb.process());
        assert!(tlb.process());

        let index = tlb.hash_index(0, 5);
        assert!(!tlb.entries[index].valid);

        tlb.begin_insert_prot(index, PageType::ReadWrite, 0, 0, 0, 0x1000);
        assert!(!tlb.process());
        assert!(!tlb.process());
        assert!(tlb.process());

        assert!(matches!(tlb.lookup(0, 5), super::LookupResult::Hit(_)));
    }

    #[test]
    fn purge_invalidates_entry() {
        let mut tlb = Tlb::new(16, 1);
        tlb.begin_insert_addr(0, 5);
        tlb.process();
        let index = tlb.hash_index(0, 5);
        tlb.begin_insert_prot(index, PageType::ReadOnly, 0, 0, 0, 0);
        tlb.process();
        assert!(matches!(tlb.lookup(0, 5), super::LookupResult::Hit(_)));

        tlb.begin_purge(index);
        tlb.process();
        assert!(matches!(tlb.lookup(0, 5), super::LookupResult::Miss));
    }

    #[test]
    fn abort_discards_in_flight_insert() {
        let mut tlb = Tlb::new(16, 5);
        tlb.begin_insert_addr(0, 5);
        tlb.process();
        tlb.abort_op();
        assert!(!tlb.busy());
    }

    #[test]
    fn rights_check_allows_read_for_read_write_page() {
        let entry = super::TlbEntry {
            valid: true,
            page_type: PageType::ReadWrite,
            priv_l1: 2,
            priv_l2: 2,
            ..super::TlbEntry::default()
        };
        assert!(Tlb::check_rights(&entry, AccessType::Read, 1));
        assert!(!Tlb::check_rights(&entry, AccessType::Read, 3));
    }
}
