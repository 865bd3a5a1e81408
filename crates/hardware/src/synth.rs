//! Consistent-State Synthesizer.
//!
//! Plants random but MOESI-valid lines across a fleet. For each attempt it picks a random
//! line-aligned address from a random range, a random non-empty subset of caches to hold it,
//! and whether the line is dirty:
//!
//! | Holders | Dirty | Owner state | Other holders |
//! |---------|-------|-------------|---------------|
//! | 1       | yes   | Modified    | -             |
//! | > 1     | yes   | Owned       | Shared        |
//! | 1       | no    | -           | Exclusive     |
//! | > 1     | no    | -           | Shared        |
//!
//! The owner receives fresh random data; every other holder copies memory. Attempts whose
//! address is already cached, or whose set is full in any cache, are skipped. Seeding is
//! best-effort.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::cache::state::LineState;
use crate::common::error::MemoryError;
use crate::fleet::CacheFleet;

/// Counts from one [`Synthesizer::populate`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Lines planted in at least one cache.
    pub planted: usize,
    /// Attempts skipped (address already cached, set full, or range too small).
    pub skipped: usize,
}

/// Random fixture generator.
#[derive(Debug)]
pub struct Synthesizer {
    rng: ChaCha8Rng,
}

impl Synthesizer {
    /// Deterministic generator for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Seeded when `seed` is given, entropy-seeded otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Underlying RNG, shared with memory generation so one seed fixes the whole fixture.
    pub const fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Random cache-line data.
    fn random_line(&mut self, len: usize) -> Vec<u8> {
        let mut data = vec![0; len];
        self.rng.fill(data.as_mut_slice());
        data
    }

    /// Makes `attempts` planting attempts on `fleet`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::UndefinedMemoryRanges`] when the fleet has no ranges.
    pub fn populate(&mut self, fleet: &mut CacheFleet, attempts: usize) -> Result<SeedSummary, MemoryError> {
        let _ = fleet.ranges()?;
        let mut summary = SeedSummary::default();
        for _ in 0..attempts {
            if self.plant_one(fleet)? {
                summary.planted += 1;
            } else {
                summary.skipped += 1;
            }
        }
        debug!(planted = summary.planted, skipped = summary.skipped, "synthesized initial cache state");
        Ok(summary)
    }

    fn plant_one(&mut self, fleet: &mut CacheFleet) -> Result<bool, MemoryError> {
        let line_bytes = fleet.cacheline_bytes();
        let n_caches = fleet.len();
        if n_caches == 0 {
            return Ok(false);
        }

        let (addr, clean) = {
            let ranges = fleet.ranges()?;
            let Some(range) = ranges.choose(&mut self.rng) else {
                return Ok(false);
            };
            let Some(addr) = range.random_line_addr(&mut self.rng, line_bytes) else {
                return Ok(false);
            };
            let Some(clean) = range.read(addr, line_bytes) else {
                return Ok(false);
            };
            (addr, clean.to_vec())
        };

        let set = fleet.layout().index(addr);
        if fleet.caches().iter().any(|cache| cache.free_way(set).is_none()) {
            return Ok(false);
        }
        if fleet.caches().iter().any(|cache| cache.lookup(addr).is_some()) {
            return Ok(false);
        }

        let n_holders = self.rng.gen_range(1..=n_caches);
        let holders = rand::seq::index::sample(&mut self.rng, n_caches, n_holders).into_vec();
        let dirty = self.rng.gen_bool(0.5);
        let shared = holders.len() > 1;
        let owner = if dirty { holders.choose(&mut self.rng).copied() } else { None };

        let mut planted = false;
        for &idx in &holders {
            let (data, state) = if Some(idx) == owner {
                let state = if shared { LineState::Owned } else { LineState::Modified };
                (self.random_line(line_bytes), state)
            } else {
                let state = if shared { LineState::Shared } else { LineState::Exclusive };
                (clean.clone(), state)
            };
            match fleet.set_cache_line(idx, addr, &data, state) {
                Ok(_) => planted = true,
                Err(e) => debug!(cache = idx, addr = %format_args!("{addr:#x}"), error = %e, "skipping seeded line"),
            }
        }
        Ok(planted)
    }
}
