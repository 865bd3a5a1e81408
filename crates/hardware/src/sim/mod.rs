//! Test session orchestration and artifact naming.
//!
//! Provides the session that generates fixtures for the external simulation and
//! verifies its logs afterwards.

/// Artifact file names.
pub mod artifacts;

/// Generation, hand-off and verification of one test directory.
pub mod session;

pub use artifacts::ArtifactPaths;
pub use session::{CoherencyTest, Prepared};
