//! Common types shared by the cache model, checker and replay engine.
//!
//! This module provides:
//! 1. **Address Layout:** Decomposition of addresses into tag, index and block offset.
//! 2. **Error Handling:** Typed errors for cache, memory, configuration and artifact failures.

/// Address bit-field layout.
pub mod addr;

/// Error types and the crate `Result` alias.
pub mod error;

pub use addr::AddressLayout;
pub use error::{ArtifactError, CacheError, ConfigError, Error, MemoryError, Result};
