//! Configuration for a coherency test run.
//!
//! This module defines the parameters that shape the cache fleet, the address space and the
//! on-disk artifacts. It provides:
//! 1. **Structures:** The root [`Config`] and the per-range [`MemoryRangeConfig`].
//! 2. **Validation:** Geometry checks performed once at construction.
//! 3. **Derived values:** Cache line size and [`AddressLayout`].
//!
//! Configuration is supplied as JSON. Every geometry field is required; a missing field is a
//! [`ConfigError::Parse`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::addr::AddressLayout;
use crate::common::error::{ConfigError, Error, Result};

/// Root configuration structure.
///
/// # Examples
///
/// ```
/// use moesi_core::config::Config;
///
/// let json = r#"{
///     "addr_width": 32,
///     "data_width": 64,
///     "word_width": 64,
///     "cacheline_words": 4,
///     "ways": 8,
///     "sets": 256,
///     "n_caches": 4,
///     "n_transactions": 100,
///     "target_dir": "build/coherency",
///     "check": false,
///     "memory_ranges": [
///         { "start": 2147483648, "size": 4096, "cacheable": true, "shareable": true }
///     ]
/// }"#;
///
/// let config = Config::from_json_str(json).unwrap();
/// assert_eq!(config.cacheline_bytes(), 32);
/// assert_eq!(config.layout().unwrap().tag_bits(), 32 - 8 - 5);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address width in bits.
    pub addr_width: u32,
    /// Data bus width in bits.
    pub data_width: u32,
    /// Word width in bits.
    pub word_width: u32,
    /// Words per cache line.
    pub cacheline_words: usize,
    /// Associativity (ways per set).
    pub ways: usize,
    /// Number of sets; must be a power of two.
    pub sets: usize,
    /// Number of caches (one per bus master).
    pub n_caches: usize,
    /// Number of transactions per master requested from the transaction generator.
    pub n_transactions: usize,
    /// Directory holding generated artifacts and simulator diff logs.
    pub target_dir: PathBuf,
    /// When true, wait for the external simulation and then replay and check its logs.
    pub check: bool,

    /// Address ranges forming the checked address space.
    #[serde(default)]
    pub memory_ranges: Vec<MemoryRangeConfig>,

    /// Number of random lines the synthesizer attempts to plant.
    #[serde(default)]
    pub initial_lines: usize,

    /// Seed for reproducible fixtures; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// One address range and its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MemoryRangeConfig {
    /// First byte address of the range.
    pub start: u64,
    /// Size in bytes.
    pub size: u64,
    /// Whether lines in this range may be cached.
    #[serde(default = "MemoryRangeConfig::default_true")]
    pub cacheable: bool,
    /// Whether lines in this range may be shared between masters.
    #[serde(default = "MemoryRangeConfig::default_true")]
    pub shareable: bool,
}

impl MemoryRangeConfig {
    const fn default_true() -> bool {
        true
    }
}

impl Config {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or missing fields, or a
    /// validation error from [`Config::validate`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as [`Config::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&text)
    }

    /// Cache line size in bytes: `cacheline_words * word_width / 8`.
    pub const fn cacheline_bytes(&self) -> usize {
        self.cacheline_words * (self.word_width as usize) / 8
    }

    /// Address layout derived from the geometry.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `sets` or the line size is not a power of two, or
    /// the address width cannot hold the index and block-offset fields.
    pub fn layout(&self) -> std::result::Result<AddressLayout, ConfigError> {
        AddressLayout::new(self.addr_width, self.sets, self.cacheline_bytes())
    }

    /// Checks every geometry constraint.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint as a [`ConfigError`].
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (field, value) in [
            ("ways", self.ways),
            ("n_caches", self.n_caches),
            ("cacheline_words", self.cacheline_words),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        for (field, value) in [
            ("word_width", self.word_width),
            ("data_width", self.data_width),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
            if value % 8 != 0 {
                return Err(ConfigError::NotByteMultiple { field, value });
            }
        }

        let layout = self.layout()?;
        let line = layout.cacheline_bytes() as u64;
        let limit = if layout.addr_width() >= u64::BITS {
            u64::MAX
        } else {
            1u64 << layout.addr_width()
        };
        for range in &self.memory_ranges {
            let reject = |reason| ConfigError::BadRange {
                start: range.start,
                size: range.size,
                reason,
            };
            if range.size == 0 {
                return Err(reject("range is empty"));
            }
            if range.start % line != 0 || range.size % line != 0 {
                return Err(reject("range is not cache-line aligned"));
            }
            match range.start.checked_add(range.size) {
                Some(end) if end <= limit => {}
                _ => return Err(reject("range exceeds the address width")),
            }
        }
        Ok(())
    }
}
