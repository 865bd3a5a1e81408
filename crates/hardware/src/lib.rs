//! MOESI cache coherency test harness library.
//!
//! This crate models a fleet of set-associative caches kept coherent by a MOESI protocol
//! and verifies the behavior of an external simulation against it:
//! 1. **Cache model:** Line states, set-associative arrays and their on-disk images.
//! 2. **Memory:** Address ranges with attributes and the backing byte store.
//! 3. **Checker:** Clean-exclusivity, dirty-ownership and pairwise-compatibility rules.
//! 4. **Replay:** Time-windowed reconstruction of the simulation's diff logs.
//! 5. **Synthesis:** Random but MOESI-valid initial cache state.
//! 6. **Session:** Generation, hand-off and verification of one test directory.

/// Common types (address layout, errors).
pub mod common;
/// Test configuration (geometry, address space, artifacts).
pub mod config;
/// Set-associative cache arrays, line states and cache images.
pub mod cache;
/// Backing memory ranges and the memory image.
pub mod memory;
/// One cache per master plus the shared address space.
pub mod fleet;
/// MOESI invariant checker.
pub mod check;
/// Diff-log reconstruction engine.
pub mod replay;
/// Random consistent-state synthesizer.
pub mod synth;
/// Test session and artifact naming.
pub mod sim;

/// Cache array type; one per bus master.
pub use crate::cache::CacheArray;
/// MOESI line state.
pub use crate::cache::state::LineState;
/// Checker entry point and its report.
pub use crate::check::{CoherencyReport, Violation, check_coherency};
/// Error types and the crate `Result` alias.
pub use crate::common::{ArtifactError, CacheError, ConfigError, Error, MemoryError, Result};
/// Root configuration type; deserialize from JSON with `Config::from_file`.
pub use crate::config::Config;
/// The caches under test together with backing memory.
pub use crate::fleet::CacheFleet;
/// Replay engine, its readiness token and its report.
pub use crate::replay::{Reconstructor, RunReport, SimulationReady};
/// End-to-end test session.
pub use crate::sim::CoherencyTest;
