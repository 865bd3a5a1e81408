//! Coherency Checker.
//!
//! Scans every cacheable and shareable line of the address space across all caches and
//! records MOESI violations against the backing memory. It enforces:
//! 1. **Clean exclusivity:** An `Exclusive` line must match memory.
//! 2. **Dirty ownership:** If any copy differs from memory, some cache must hold the line
//!    `Owned` or `Modified`.
//! 3. **Pairwise compatibility:** Every pair of caches holding the line must satisfy
//!    [`LineState::compatible`].
//!
//! Lines marked outstanding in any cache are skipped. Violations are collected into a
//! [`CoherencyReport`]; the scan never stops early and never corrects state.

use std::fmt;

use tracing::{debug, info};

use crate::cache::state::LineState;
use crate::common::error::MemoryError;
use crate::fleet::CacheFleet;

/// A cache holding a copy of the checked line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Holder {
    /// Master index.
    pub cache: usize,
    /// State of the copy.
    pub state: LineState,
    /// Set index.
    pub set: usize,
    /// Way index.
    pub way: usize,
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache {} {} (set {:#x}, way {})",
            self.cache, self.state, self.set, self.way
        )
    }
}

/// One coherency finding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// An `Exclusive` line holds data that differs from memory.
    DirtyExclusive {
        /// Line address.
        addr: u64,
        /// The offending copy.
        holder: Holder,
    },

    /// A copy differs from memory but no cache owns the line.
    UnownedDirty {
        /// Line address.
        addr: u64,
        /// Every cache holding the line.
        holders: Vec<Holder>,
    },

    /// Two caches hold the line in states that cannot coexist.
    Incompatible {
        /// Line address.
        addr: u64,
        /// Lower-indexed holder.
        first: Holder,
        /// Higher-indexed holder.
        second: Holder,
    },
}

impl Violation {
    /// Address of the line the finding concerns.
    pub const fn addr(&self) -> u64 {
        match self {
            Self::DirtyExclusive { addr, .. }
            | Self::UnownedDirty { addr, .. }
            | Self::Incompatible { addr, .. } => *addr,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirtyExclusive { addr, holder } => {
                write!(f, "{addr:#x}: modified line in EXCLUSIVE state, {holder}")
            }
            Self::UnownedDirty { addr, holders } => {
                write!(f, "{addr:#x}: modified line without owner, held by")?;
                for holder in holders {
                    write!(f, " [{holder}]")?;
                }
                Ok(())
            }
            Self::Incompatible {
                addr,
                first,
                second,
            } => write!(
                f,
                "{addr:#x}: incompatible states, {first} vs {second}"
            ),
        }
    }
}

/// Outcome of one scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoherencyReport {
    /// Lines examined.
    pub checked: usize,
    /// Lines skipped because of an outstanding transaction.
    pub skipped: Vec<u64>,
    /// Findings, in scan order.
    pub violations: Vec<Violation>,
}

impl CoherencyReport {
    /// True when no violation was found.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Scans every coherent line of `fleet`.
///
/// # Errors
///
/// [`MemoryError::UndefinedMemoryRanges`] when the fleet has no address space.
pub fn check_coherency(fleet: &CacheFleet) -> Result<CoherencyReport, MemoryError> {
    let line_bytes = fleet.cacheline_bytes();
    let mut report = CoherencyReport::default();

    for range in fleet.ranges()? {
        let mut addr = range.start();
        while addr
            .checked_add(line_bytes as u64)
            .is_some_and(|end| end <= range.end())
        {
            if range.attributes(addr).coherent() {
                if fleet.is_outstanding(addr) {
                    info!(addr = %format_args!("{addr:#x}"), "skipping line with outstanding transaction");
                    report.skipped.push(addr);
                } else if let Some(memory) = range.read(addr, line_bytes) {
                    check_line(fleet, addr, memory, &mut report.violations);
                    report.checked += 1;
                }
            }
            addr += line_bytes as u64;
        }
    }
    Ok(report)
}

/// Applies all three invariants to one line.
fn check_line(fleet: &CacheFleet, addr: u64, memory: &[u8], violations: &mut Vec<Violation>) {
    let mut holders = Vec::new();
    let mut modified = false;
    let mut owner_found = false;

    for (cache, array) in fleet.caches().iter().enumerate() {
        let Some(hit) = array.lookup(addr) else {
            continue;
        };
        let holder = Holder {
            cache,
            state: hit.state,
            set: hit.set,
            way: hit.way,
        };
        debug!(addr = %format_args!("{addr:#x}"), %holder, "line found");

        let differs = hit.data != memory;
        if differs && hit.state.is_valid() {
            modified = true;
        }
        if differs && hit.state == LineState::Exclusive {
            violations.push(Violation::DirtyExclusive { addr, holder });
        }
        owner_found |= hit.state.is_owner();
        holders.push(holder);
    }

    if modified && !owner_found {
        violations.push(Violation::UnownedDirty {
            addr,
            holders: holders.clone(),
        });
    }

    for (i, first) in holders.iter().enumerate() {
        for second in &holders[i + 1..] {
            if !first.state.compatible(second.state) {
                violations.push(Violation::Incompatible {
                    addr,
                    first: *first,
                    second: *second,
                });
            }
        }
    }
}
