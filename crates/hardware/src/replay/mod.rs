//! Log Reconstruction Engine.
//!
//! Replays the external simulator's per-cache and main-memory diff logs into a
//! [`CacheFleet`] one time window at a time, running the coherency checker after each
//! window. It provides:
//! 1. **Windowing:** The next boundary is the smallest cache-stream stamp after the clock;
//!    the memory stream is applied inside windows but never opens one.
//! 2. **Window-atomic visibility:** Every stream's records for a window are applied before
//!    the checker runs.
//! 3. **Termination:** The engine is `Done` once no cache stream has a stamp after the clock.

/// Diff-log line formats and time-ordered streams.
pub mod log;

use tracing::{info, warn};

use self::log::{CacheDiff, DiffStream, MemoryDiff};
use crate::check::{CoherencyReport, Violation, check_coherency};
use crate::common::error::Result;
use crate::fleet::CacheFleet;
use crate::sim::artifacts::ArtifactPaths;

/// Proof that the external simulation finished writing its logs.
///
/// Replay only starts once the caller hands one in; producing it (e.g. waiting for the
/// operator) is the caller's concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct SimulationReady;

impl SimulationReady {
    /// Asserts that the logs are complete.
    pub const fn confirm() -> Self {
        Self
    }
}

/// Engine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayState {
    /// Windows remain; `clock` is the end of the last applied window (`None` before the first).
    Replaying {
        /// Current simulated time.
        clock: Option<u64>,
    },
    /// Every stamp has been consumed.
    Done,
}

/// Report of one window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    /// Window end: the stamp whose state was checked.
    pub time: u64,
    /// Diff records that could not be applied to the fleet.
    pub rejected: usize,
    /// Checker output for this instant.
    pub report: CoherencyReport,
}

/// Every checkpoint of a replay.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Checkpoints in increasing time order.
    pub checkpoints: Vec<Checkpoint>,
}

impl RunReport {
    /// Total findings across all checkpoints.
    pub fn violation_count(&self) -> usize {
        self.checkpoints
            .iter()
            .map(|cp| cp.report.violations.len())
            .sum()
    }

    /// True when no checkpoint recorded a violation.
    pub fn passed(&self) -> bool {
        self.violation_count() == 0
    }

    /// Every finding with the time it was observed.
    pub fn violations(&self) -> impl Iterator<Item = (u64, &Violation)> + '_ {
        self.checkpoints
            .iter()
            .flat_map(|cp| cp.report.violations.iter().map(move |v| (cp.time, v)))
    }
}

/// Replays diff logs into a fleet.
#[derive(Debug)]
pub struct Reconstructor {
    caches: Vec<DiffStream<CacheDiff>>,
    memory: DiffStream<MemoryDiff>,
    state: ReplayState,
}

impl Reconstructor {
    /// Creates an engine over one stream per cache plus the memory stream.
    pub fn new(caches: Vec<DiffStream<CacheDiff>>, memory: DiffStream<MemoryDiff>) -> Self {
        Self {
            caches,
            memory,
            state: ReplayState::Replaying { clock: None },
        }
    }

    /// Loads `cache_diff_{i}.txt` for each cache and `main_mem_diff.txt` from `paths`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] for unreadable files; missing files are empty streams.
    pub fn load(paths: &ArtifactPaths, n_caches: usize) -> Result<Self> {
        let caches = (0..n_caches)
            .map(|i| DiffStream::load(&paths.cache_diff(i)))
            .collect::<Result<Vec<_>>>()?;
        let memory = DiffStream::load(&paths.main_mem_diff())?;
        Ok(Self::new(caches, memory))
    }

    /// Current state.
    pub const fn state(&self) -> ReplayState {
        self.state
    }

    /// End of the next window, if any.
    pub fn next_boundary(&self) -> Option<u64> {
        match self.state {
            ReplayState::Replaying { clock } => self
                .caches
                .iter()
                .filter_map(|stream| stream.next_after(clock))
                .min(),
            ReplayState::Done => None,
        }
    }

    /// Applies the next window to `fleet` and checks it.
    ///
    /// Returns `None` once the engine is `Done`.
    ///
    /// # Errors
    ///
    /// Propagates checker preconditions such as `UndefinedMemoryRanges`.
    pub fn step(&mut self, fleet: &mut CacheFleet) -> Result<Option<Checkpoint>> {
        let ReplayState::Replaying { clock } = self.state else {
            return Ok(None);
        };
        let Some(until) = self.next_boundary() else {
            self.state = ReplayState::Done;
            return Ok(None);
        };

        let mut rejected = 0;
        for (idx, stream) in self.caches.iter().enumerate() {
            for (time, diff) in stream.window(clock, until) {
                if !apply_cache_diff(fleet, idx, diff) {
                    warn!(cache = idx, time, ?diff, "cache diff does not fit the fleet");
                    rejected += 1;
                }
            }
        }
        for (time, diff) in self.memory.window(clock, until) {
            if let Err(e) = fleet.memory_mut().write(diff.addr, &diff.data) {
                warn!(time, error = %e, "memory diff does not fit the address space");
                rejected += 1;
            }
        }

        info!(time = until, "==================== TIMESTAMP ====================");
        let report = check_coherency(fleet)?;
        self.state = ReplayState::Replaying { clock: Some(until) };
        Ok(Some(Checkpoint {
            time: until,
            rejected,
            report,
        }))
    }

    /// Replays every window.
    ///
    /// # Errors
    ///
    /// As [`Reconstructor::step`].
    pub fn run(mut self, _ready: SimulationReady, fleet: &mut CacheFleet) -> Result<RunReport> {
        let mut report = RunReport::default();
        while let Some(checkpoint) = self.step(fleet)? {
            report.checkpoints.push(checkpoint);
        }
        Ok(report)
    }
}

/// Applies one cache diff; false if it names a cache or slot the fleet lacks.
fn apply_cache_diff(fleet: &mut CacheFleet, idx: usize, diff: &CacheDiff) -> bool {
    let Some(cache) = fleet.cache_mut(idx) else {
        return false;
    };
    match diff {
        CacheDiff::Slot { set, way, update } => cache.write_slot(*set, *way, update.clone()).is_ok(),
        CacheDiff::Outstanding(addr) => {
            cache.mark_outstanding(*addr);
            true
        }
        CacheDiff::Retired(addr) => {
            cache.retire_outstanding(*addr);
            true
        }
    }
}
