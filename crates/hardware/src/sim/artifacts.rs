//! File names exchanged with the external simulation.

use std::path::{Path, PathBuf};

/// Paths of every artifact under one target directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    /// Artifacts rooted at `target_dir`.
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: target_dir.into(),
        }
    }

    /// Target directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Initial data RAM of cache `i`.
    pub fn data_mem(&self, i: usize) -> PathBuf {
        self.root.join(format!("data_mem_{i}.mem"))
    }

    /// Initial tag RAM of cache `i`.
    pub fn tag_mem(&self, i: usize) -> PathBuf {
        self.root.join(format!("tag_mem_{i}.mem"))
    }

    /// Initial state RAM of cache `i`.
    pub fn state_mem(&self, i: usize) -> PathBuf {
        self.root.join(format!("state_{i}.mem"))
    }

    /// Initial main memory image.
    pub fn main_mem(&self) -> PathBuf {
        self.root.join("main_mem.mem")
    }

    /// Diff log of cache `i` written by the simulation.
    pub fn cache_diff(&self, i: usize) -> PathBuf {
        self.root.join(format!("cache_diff_{i}.txt"))
    }

    /// Main memory diff log written by the simulation.
    pub fn main_mem_diff(&self) -> PathBuf {
        self.root.join("main_mem_diff.txt")
    }
}
