//! Error types for the coherency model.
//!
//! This module defines every fatal condition the crate can report. It provides:
//! 1. **Cache errors:** Capacity failures (`SetFull`) and out-of-range slot writes.
//! 2. **Memory errors:** The `UndefinedMemoryRanges` usage-order precondition and unmapped accesses.
//! 3. **Configuration errors:** Parse and validation failures for [`Config`](crate::config::Config).
//! 4. **Artifact errors:** Malformed persisted `.mem` files.
//!
//! Coherency violations are not errors; they are findings collected in a
//! [`CoherencyReport`](crate::check::CoherencyReport).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by a single [`CacheArray`](crate::cache::CacheArray).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Every way of the target set already holds a valid line; no replacement is modeled.
    #[error("set {set:#x} has no free way")]
    SetFull {
        /// Set index that was full.
        set: usize,
    },

    /// A direct slot write addressed a set or way outside the array geometry.
    #[error("slot (set {set:#x}, way {way}) is outside the cache geometry")]
    SlotOutOfRange {
        /// Requested set index.
        set: usize,
        /// Requested way index.
        way: usize,
    },

    /// The fleet has no cache with this master index.
    #[error("no cache with index {idx}")]
    UnknownCache {
        /// Requested master index.
        idx: usize,
    },

    /// Allocation was asked to plant a line in the `Invalid` state.
    #[error("cannot allocate an invalid line at {addr:#x}")]
    InvalidFill {
        /// Address of the rejected line.
        addr: u64,
    },

    /// Line data did not match the configured cache line size.
    #[error("line data has {got} bytes, expected {expected}")]
    LineSize {
        /// Configured cache line size in bytes.
        expected: usize,
        /// Length of the supplied data.
        got: usize,
    },
}

/// Failures raised by the backing memory model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// An operation that needs the address space ran before any range was registered.
    #[error("no memory ranges defined; register at least one range first")]
    UndefinedMemoryRanges,

    /// The access does not fall entirely inside one registered range.
    #[error("access of {len} bytes at {addr:#x} is not mapped by any memory range")]
    Unmapped {
        /// Start address of the access.
        addr: u64,
        /// Length of the access in bytes.
        len: usize,
    },
}

/// Configuration parse and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON document was malformed or a required field was missing.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A geometry parameter must be a power of two.
    #[error("`{field}` must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// Name of the offending parameter.
        field: &'static str,
        /// Supplied value.
        value: usize,
    },

    /// A count or width parameter must be non-zero.
    #[error("`{field}` must be non-zero")]
    Zero {
        /// Name of the offending parameter.
        field: &'static str,
    },

    /// A bit width must be a whole number of bytes.
    #[error("`{field}` must be a multiple of 8 bits, got {value}")]
    NotByteMultiple {
        /// Name of the offending parameter.
        field: &'static str,
        /// Supplied value.
        value: u32,
    },

    /// The address cannot hold the index and block-offset fields.
    #[error("addr_width {addr_width} cannot hold {required} index and block-offset bits")]
    AddressTooNarrow {
        /// Configured address width.
        addr_width: u32,
        /// Bits needed for index plus block offset.
        required: u32,
    },

    /// Addresses are modeled as `u64`.
    #[error("addr_width {0} exceeds 64 bits")]
    AddressTooWide(u32),

    /// A memory range does not fit the configured address width or line size.
    #[error("memory range at {start:#x} (+{size:#x}): {reason}")]
    BadRange {
        /// Range start address.
        start: u64,
        /// Range size in bytes.
        size: u64,
        /// Why the range was rejected.
        reason: &'static str,
    },
}

/// A persisted cache or memory artifact could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    /// A line did not follow the `@<hex> <fields...>` layout.
    #[error("{artifact} line {line}: {reason}")]
    Malformed {
        /// Artifact kind (`data`, `tag`, `state`, `memory`).
        artifact: &'static str,
        /// 1-based line number.
        line: usize,
        /// Parse failure detail.
        reason: String,
    },

    /// The data, tag and state files of one cache did not describe the same lines.
    #[error("parallel cache artifacts disagree at record {record}")]
    Misaligned {
        /// 0-based record index where the files diverge.
        record: usize,
    },
}

/// Top-level error for fallible crate operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Cache capacity or geometry failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Backing memory failure.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persisted artifact failure.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Filesystem failure on a named artifact.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wraps an I/O error with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for fallible crate operations.
pub type Result<T> = std::result::Result<T, Error>;
