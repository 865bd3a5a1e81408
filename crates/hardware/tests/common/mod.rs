//! Fixtures shared by the unit tests.
//!
//! Every fixture uses the same tiny geometry so addresses are easy to reason about:
//!
//! - 32-bit addresses, 4 sets, 4-byte lines, 2 ways
//! - block offset = bits [1:0], index = bits [3:2], tag = bits [31:4]
//! - one coherent range at `0x1000..0x1040` (16 lines)

use std::fs;
use std::path::Path;

use moesi_core::CacheFleet;
use moesi_core::common::AddressLayout;
use moesi_core::memory::{MemoryRange, RangeAttributes};

/// Line size of the fixture geometry.
pub const LINE: usize = 4;
/// Ways per set of the fixture geometry.
pub const WAYS: usize = 2;
/// Start of the fixture range.
pub const BASE: u64 = 0x1000;
/// Size of the fixture range in bytes.
pub const RANGE_BYTES: usize = 64;

/// Fixture address layout.
pub fn layout() -> AddressLayout {
    AddressLayout::new(32, 4, LINE).unwrap()
}

/// Cacheable and shareable attributes.
pub const fn coherent() -> RangeAttributes {
    RangeAttributes {
        cacheable: true,
        shareable: true,
    }
}

/// A fleet of `n_caches` empty caches over one zero-filled coherent range.
pub fn fleet(n_caches: usize) -> CacheFleet {
    let mut fleet = CacheFleet::new(layout(), WAYS, n_caches);
    fleet.add_memory_range(MemoryRange::new(BASE, RANGE_BYTES, coherent()));
    fleet
}

/// Routes `tracing` output through the test harness; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("moesi_core=debug")
        .with_test_writer()
        .try_init();
}

/// Writes `lines` to `path`, one per line.
pub fn write_log(path: &Path, lines: &[&str]) {
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(path, body).unwrap();
}

/// A JSON configuration matching the fixture geometry, rooted at `target_dir`.
pub fn config_json(target_dir: &Path, n_caches: usize, seed: u64) -> String {
    format!(
        r#"{{
            "addr_width": 32,
            "data_width": 32,
            "word_width": 8,
            "cacheline_words": {LINE},
            "ways": {WAYS},
            "sets": 4,
            "n_caches": {n_caches},
            "n_transactions": 10,
            "target_dir": {dir},
            "check": true,
            "memory_ranges": [ {{ "start": {BASE}, "size": {RANGE_BYTES} }} ],
            "initial_lines": 12,
            "seed": {seed}
        }}"#,
        dir = serde_json::to_string(&target_dir.display().to_string()).unwrap(),
    )
}
