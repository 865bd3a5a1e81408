//! Cache fleet: every master's cache plus the address space they cover.
//!
//! The fleet is the unit the synthesizer seeds, the replay engine mutates and the checker
//! scans. Cache identity is its index in the fleet, used in every report.

use crate::cache::CacheArray;
use crate::cache::state::LineState;
use crate::common::addr::AddressLayout;
use crate::common::error::{CacheError, ConfigError, MemoryError};
use crate::config::Config;
use crate::memory::{MainMemory, MemoryRange};

/// One cache per bus master plus the backing memory.
#[derive(Clone, Debug)]
pub struct CacheFleet {
    layout: AddressLayout,
    caches: Vec<CacheArray>,
    memory: MainMemory,
}

impl CacheFleet {
    /// Creates `n_caches` empty caches with the same geometry and no memory ranges.
    pub fn new(layout: AddressLayout, ways: usize, n_caches: usize) -> Self {
        Self {
            layout,
            caches: (0..n_caches).map(|_| CacheArray::new(layout, ways)).collect(),
            memory: MainMemory::new(),
        }
    }

    /// Builds the fleet described by a validated configuration, registering its ranges.
    ///
    /// # Errors
    ///
    /// Returns the geometry error if `config` was not validated.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut fleet = Self::new(config.layout()?, config.ways, config.n_caches);
        for range in &config.memory_ranges {
            fleet.add_memory_range(range.into());
        }
        Ok(fleet)
    }

    /// Shared address layout.
    pub const fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    /// Cache line size in bytes.
    pub const fn cacheline_bytes(&self) -> usize {
        self.layout.cacheline_bytes()
    }

    /// Number of caches.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// True for a fleet without caches.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// All caches, by master index.
    pub fn caches(&self) -> &[CacheArray] {
        &self.caches
    }

    /// Cache of master `idx`.
    pub fn cache(&self, idx: usize) -> Option<&CacheArray> {
        self.caches.get(idx)
    }

    /// Mutable cache of master `idx`.
    pub fn cache_mut(&mut self, idx: usize) -> Option<&mut CacheArray> {
        self.caches.get_mut(idx)
    }

    /// Backing memory.
    pub const fn memory(&self) -> &MainMemory {
        &self.memory
    }

    /// Mutable backing memory.
    pub const fn memory_mut(&mut self) -> &mut MainMemory {
        &mut self.memory
    }

    /// Registers an address range.
    pub fn add_memory_range(&mut self, range: MemoryRange) {
        self.memory.add_range(range);
    }

    /// Registered ranges, or `UndefinedMemoryRanges` if none.
    ///
    /// # Errors
    ///
    /// [`MemoryError::UndefinedMemoryRanges`] when no range is registered.
    pub fn ranges(&self) -> Result<&[MemoryRange], MemoryError> {
        self.memory.require_ranges()
    }

    /// Allocates a line in cache `idx`.
    ///
    /// # Errors
    ///
    /// [`CacheError::SetFull`] when the target set is full,
    /// [`CacheError::InvalidFill`] for an `Invalid` state, or
    /// [`CacheError::UnknownCache`] for an unknown cache index.
    pub fn set_cache_line(
        &mut self,
        idx: usize,
        addr: u64,
        data: &[u8],
        state: LineState,
    ) -> Result<usize, CacheError> {
        self.caches
            .get_mut(idx)
            .ok_or(CacheError::UnknownCache { idx })?
            .allocate(addr, data, state)
    }

    /// Whether any cache marks `addr` as outstanding.
    pub fn is_outstanding(&self, addr: u64) -> bool {
        self.caches.iter().any(|cache| cache.is_outstanding(addr))
    }
}
