//! Coherency Test Session.
//!
//! Ties the pieces together for one test directory. It performs:
//! 1. **Setup:** Builds the fleet and address space from a [`Config`].
//! 2. **Generation:** Random memory plus a synthesized MOESI-valid cache state.
//! 3. **Hand-off:** Writes the cache and memory images the external simulation preloads.
//! 4. **Verification:** Reloads the images, replays the simulation's diff logs and checks
//!    every window.

use std::fs;

use tracing::{error, info, warn};

use crate::cache::state::LineState;
use crate::check::{CoherencyReport, check_coherency};
use crate::common::error::{Error, Result};
use crate::config::Config;
use crate::fleet::CacheFleet;
use crate::memory::MemoryRange;
use crate::replay::{Reconstructor, RunReport, SimulationReady};
use crate::sim::artifacts::ArtifactPaths;
use crate::synth::{SeedSummary, Synthesizer};

/// Outcome of [`CoherencyTest::prepare`].
#[derive(Clone, Debug)]
pub struct Prepared {
    /// Synthesizer counts.
    pub seeded: SeedSummary,
    /// Check of the generated state before it was saved.
    pub initial: CoherencyReport,
}

/// One coherency test: configuration, fleet, artifacts and RNG.
#[derive(Debug)]
pub struct CoherencyTest {
    config: Config,
    fleet: CacheFleet,
    paths: ArtifactPaths,
    synth: Synthesizer,
}

impl CoherencyTest {
    /// Creates a session for a configuration, validating it first.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let fleet = CacheFleet::from_config(&config)?;
        let paths = ArtifactPaths::new(&config.target_dir);
        let synth = Synthesizer::new(config.seed);
        Ok(Self {
            config,
            fleet,
            paths,
            synth,
        })
    }

    /// Session configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Current fleet state.
    pub const fn fleet(&self) -> &CacheFleet {
        &self.fleet
    }

    /// Mutable fleet state.
    pub const fn fleet_mut(&mut self) -> &mut CacheFleet {
        &mut self.fleet
    }

    /// Artifact locations.
    pub const fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Registers an additional address range.
    pub fn add_memory_range(&mut self, range: MemoryRange) {
        self.fleet.add_memory_range(range);
    }

    /// Plants one line in cache `n_cache`.
    ///
    /// # Errors
    ///
    /// `SetFull` when the set has no free way, `UnknownCache` for a bad index.
    pub fn set_cache_line(&mut self, n_cache: usize, addr: u64, data: &[u8], state: LineState) -> Result<()> {
        let _ = self.fleet.set_cache_line(n_cache, addr, data, state)?;
        Ok(())
    }

    /// Fills every range with random bytes.
    ///
    /// # Errors
    ///
    /// `UndefinedMemoryRanges` when no range is registered.
    pub fn generate_random_memory(&mut self) -> Result<()> {
        self.fleet.memory_mut().randomize(self.synth.rng())?;
        Ok(())
    }

    /// Synthesizes `attempts` random MOESI-valid lines.
    ///
    /// # Errors
    ///
    /// `UndefinedMemoryRanges` when no range is registered.
    pub fn generate_random_caches(&mut self, attempts: usize) -> Result<SeedSummary> {
        let summary = self.synth.populate(&mut self.fleet, attempts)?;
        info!(planted = summary.planted, skipped = summary.skipped, "seeded caches");
        Ok(summary)
    }

    /// Random memory followed by `initial_lines` synthesizer attempts.
    ///
    /// # Errors
    ///
    /// As [`CoherencyTest::generate_random_memory`].
    pub fn generate(&mut self) -> Result<SeedSummary> {
        self.generate_random_memory()?;
        self.generate_random_caches(self.config.initial_lines)
    }

    /// Generates a fixture, checks it and writes it out for the simulation.
    ///
    /// The images are written even when the initial check fails so the offending state
    /// can be inspected.
    ///
    /// # Errors
    ///
    /// As [`CoherencyTest::generate`] and [`CoherencyTest::save_state`].
    pub fn prepare(&mut self) -> Result<Prepared> {
        let seeded = self.generate()?;
        let initial = self.check_coherency()?;
        if initial.is_clean() {
            info!(lines = initial.checked, "initial state is coherent");
        } else {
            warn!(violations = initial.violations.len(), "initial state is incoherent");
        }
        self.save_state()?;
        Ok(Prepared { seeded, initial })
    }

    /// Writes every cache image and the memory image under the target directory.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] naming the file that failed.
    pub fn save_state(&self) -> Result<()> {
        fs::create_dir_all(self.paths.root()).map_err(|e| Error::io(self.paths.root(), e))?;
        for (i, cache) in self.fleet.caches().iter().enumerate() {
            cache.save_state(
                &self.paths.data_mem(i),
                &self.paths.tag_mem(i),
                &self.paths.state_mem(i),
            )?;
        }
        self.fleet
            .memory()
            .save(&self.paths.main_mem(), self.fleet.cacheline_bytes())?;
        info!(dir = %self.paths.root().display(), "saved cache and memory images");
        Ok(())
    }

    /// Rebuilds the fleet from images previously written by [`CoherencyTest::save_state`].
    ///
    /// # Errors
    ///
    /// [`Error::Io`] or [`crate::ArtifactError`] for missing or malformed images.
    pub fn load_state(&mut self) -> Result<()> {
        let mut fleet = CacheFleet::from_config(&self.config)?;
        for i in 0..fleet.len() {
            if let Some(cache) = fleet.cache_mut(i) {
                cache.load_state(
                    &self.paths.data_mem(i),
                    &self.paths.tag_mem(i),
                    &self.paths.state_mem(i),
                )?;
            }
        }
        fleet.memory_mut().load(&self.paths.main_mem())?;
        self.fleet = fleet;
        Ok(())
    }

    /// Checks the current fleet state once.
    ///
    /// # Errors
    ///
    /// `UndefinedMemoryRanges` when no range is registered.
    pub fn check_coherency(&self) -> Result<CoherencyReport> {
        let report = check_coherency(&self.fleet)?;
        for violation in &report.violations {
            error!(%violation, "coherency violation");
        }
        Ok(report)
    }

    /// Replays the simulation's diff logs over the current fleet and checks every window.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] for unreadable logs, `UndefinedMemoryRanges` with no ranges.
    pub fn reconstruct(&mut self, ready: SimulationReady) -> Result<RunReport> {
        let engine = Reconstructor::load(&self.paths, self.fleet.len())?;
        let report = engine.run(ready, &mut self.fleet)?;
        for (time, violation) in report.violations() {
            error!(time, %violation, "coherency violation");
        }
        info!(
            checkpoints = report.checkpoints.len(),
            violations = report.violation_count(),
            "coherency check finished"
        );
        Ok(report)
    }
}
