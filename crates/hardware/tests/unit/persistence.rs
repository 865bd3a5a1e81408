//! # Artifact Persistence Tests
//!
//! Verifies the `@<set>`-prefixed data, tag and state images of a cache, the
//! `@<addr>`-prefixed memory image, and that reading them back rebuilds the same state.

use std::io::Cursor;

use moesi_core::cache::CacheArray;
use moesi_core::common::AddressLayout;
use moesi_core::memory::{MainMemory, MemoryRange};
use moesi_core::{ArtifactError, Error, LineState};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::common::{LINE, WAYS, coherent, layout};

fn populated() -> CacheArray {
    let mut cache = CacheArray::new(layout(), WAYS);
    let _ = cache.allocate(0x1004, &[0x0a, 0xff, 0x00, 0x01], LineState::Owned).unwrap();
    let _ = cache.allocate(0x1034, &[1, 2, 3, 4], LineState::Shared).unwrap();
    let _ = cache.allocate(0x1008, &[0xde, 0xad, 0xbe, 0xef], LineState::Exclusive).unwrap();
    cache
}

fn render(write: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>) -> String {
    let mut out = Vec::new();
    write(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn images_list_valid_ways_in_set_order() {
    let cache = populated();
    assert_eq!(
        render(|out| cache.write_data(out)),
        "@1 a ff 0 1\n@1 1 2 3 4\n@2 de ad be ef\n"
    );
    assert_eq!(render(|out| cache.write_tags(out)), "@1 100\n@1 103\n@2 100\n");
    assert_eq!(render(|out| cache.write_states(out)), "@1 111\n@1 011\n@2 001\n");
}

#[test]
fn empty_cache_writes_empty_images() {
    let cache = CacheArray::new(layout(), WAYS);
    assert_eq!(render(|out| cache.write_data(out)), "");
    assert_eq!(render(|out| cache.write_states(out)), "");
}

#[test]
fn save_then_load_rebuilds_cache() {
    let dir = tempdir().unwrap();
    let (data, tags, states) = (
        dir.path().join("data_mem_0.mem"),
        dir.path().join("tag_mem_0.mem"),
        dir.path().join("state_0.mem"),
    );
    let original = populated();
    original.save_state(&data, &tags, &states).unwrap();

    let mut restored = CacheArray::new(layout(), WAYS);
    restored.load_state(&data, &tags, &states).unwrap();

    let lines = |cache: &CacheArray| {
        cache
            .valid_lines()
            .map(|(set, way, line)| (set, way, line.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(lines(&restored), lines(&original));
    assert_eq!(restored.lookup(0x1034).unwrap().state, LineState::Shared);
}

#[test]
fn restore_rejects_undefined_state_triple() {
    let mut cache = CacheArray::new(layout(), WAYS);
    let err = cache
        .restore(
            Cursor::new("@0 1 2 3 4\n"),
            Cursor::new("@0 100\n"),
            Cursor::new("@0 110\n"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Artifact(ArtifactError::Malformed {
            artifact: "state",
            line: 1,
            ..
        })
    ));
}

#[test]
fn restore_rejects_files_of_different_length() {
    let mut cache = CacheArray::new(layout(), WAYS);
    let err = cache
        .restore(
            Cursor::new("@0 1 2 3 4\n@1 1 2 3 4\n"),
            Cursor::new("@0 100\n"),
            Cursor::new("@0 001\n@1 001\n"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Artifact(ArtifactError::Misaligned { record: 1 })
    ));
}

#[test]
fn restore_rejects_missing_set_prefix() {
    let mut cache = CacheArray::new(layout(), WAYS);
    let err = cache
        .restore(
            Cursor::new("0 1 2 3 4\n"),
            Cursor::new("@0 100\n"),
            Cursor::new("@0 001\n"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Artifact(ArtifactError::Malformed {
            artifact: "data",
            ..
        })
    ));
}

#[test]
fn restore_rejects_set_outside_geometry() {
    let mut cache = CacheArray::new(layout(), WAYS);
    let err = cache
        .restore(
            Cursor::new("@5 1 2 3 4\n"),
            Cursor::new("@5 1\n"),
            Cursor::new("@5 001\n"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Artifact(ArtifactError::Malformed {
            artifact: "data",
            line: 1,
            ..
        })
    ));
    // Set 5 must not alias onto set 1.
    assert_eq!(cache.valid_lines().count(), 0);
}

#[test]
fn restore_rejects_tag_wider_than_tag_bits() {
    let mut cache = CacheArray::new(layout(), WAYS);
    assert_eq!(cache.layout().tag_bits(), 28);
    let err = cache
        .restore(
            Cursor::new("@0 1 2 3 4\n@1 1 2 3 4\n"),
            Cursor::new("@0 fffffff\n@1 10000000\n"),
            Cursor::new("@0 001\n@1 001\n"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Artifact(ArtifactError::Malformed {
            artifact: "tag",
            line: 2,
            ..
        })
    ));
}

#[test]
fn restore_accepts_full_width_tag() {
    let layout = AddressLayout::new(64, 1, 1).unwrap();
    assert_eq!(layout.tag_bits(), 64);
    let mut cache = CacheArray::new(layout, 1);
    cache
        .restore(
            Cursor::new("@0 5a\n"),
            Cursor::new("@0 ffffffffffffffff\n"),
            Cursor::new("@0 101\n"),
        )
        .unwrap();
    let hit = cache.lookup(u64::MAX).unwrap();
    assert_eq!(hit.state, LineState::Modified);
    assert_eq!(hit.data, &[0x5a][..]);
}

#[test]
fn load_reports_missing_file_path() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("data_mem_7.mem");
    let mut cache = CacheArray::new(layout(), WAYS);
    let err = cache.load_state(&missing, &missing, &missing).unwrap_err();
    match err {
        Error::Io { path, .. } => assert_eq!(path, missing),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn memory_image_round_trip() {
    let mut memory = MainMemory::new();
    memory.add_range(MemoryRange::new(0x2000, 8, coherent()));
    memory.write(0x2000, &[0x10, 0x20, 0x30, 0x40, 0, 0, 0, 0xff]).unwrap();

    let image = render(|out| memory.write_image(out, LINE));
    assert_eq!(image, "@2000 10 20 30 40\n@2004 0 0 0 ff\n");

    let mut reloaded = MainMemory::new();
    reloaded.add_range(MemoryRange::new(0x2000, 8, coherent()));
    reloaded.load_image(Cursor::new(image)).unwrap();
    assert_eq!(reloaded.read(0x2000, 8).unwrap(), memory.read(0x2000, 8).unwrap());
}
