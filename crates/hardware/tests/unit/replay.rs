//! # Log Reconstruction Tests
//!
//! Verifies diff-log parsing, stream windowing and the replay engine: window boundaries come
//! from cache streams only, every record of a window lands before the check runs, and the
//! engine finishes once no cache stream has a later stamp.

use std::io::Cursor;

use moesi_core::{LineState, check_coherency};
use moesi_core::cache::SlotUpdate;
use moesi_core::check::Violation;
use moesi_core::replay::log::{CacheDiff, DiffRecord, DiffStream, MemoryDiff, parse_time};
use moesi_core::replay::{Reconstructor, ReplayState, SimulationReady};
use moesi_core::sim::ArtifactPaths;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::tempdir;

use crate::common::{fleet, init_tracing, write_log};

fn cache_stream(lines: &[&str]) -> DiffStream<CacheDiff> {
    DiffStream::parse("cache", Cursor::new(lines.join("\n"))).unwrap()
}

fn memory_stream(lines: &[&str]) -> DiffStream<MemoryDiff> {
    DiffStream::parse("memory", Cursor::new(lines.join("\n"))).unwrap()
}

#[rstest]
#[case("TIME:42 SET:0", Some(42))]
#[case("@TIME:7 foo", Some(7))]
#[case("TIME:1 x TIME:3", Some(3))]
#[case("TIME:abc SET:0", None)]
#[case("SET:0 WAY:1", None)]
#[case("", None)]
fn timestamps(#[case] line: &str, #[case] expected: Option<u64>) {
    assert_eq!(parse_time(line), expected);
}

#[test]
fn parses_full_slot_write() {
    let diffs = CacheDiff::parse("TIME:5 SET:3 WAY:1 TAG:1a STATE:111 DATA:aa,b,0,ff").unwrap();
    assert_eq!(
        diffs,
        vec![CacheDiff::Slot {
            set: 3,
            way: 1,
            update: SlotUpdate {
                tag: Some(0x1a),
                state: Some(LineState::Owned),
                data: Some(vec![0xaa, 0x0b, 0x00, 0xff]),
            },
        }]
    );
}

#[test]
fn parses_markers_and_ignores_unknown_tokens() {
    let diffs = CacheDiff::parse("TIME:9 SNOOP:rd OUTSTANDING:1010 RETIRED:0x2000").unwrap();
    assert_eq!(
        diffs,
        vec![CacheDiff::Outstanding(0x1010), CacheDiff::Retired(0x2000)]
    );
}

#[rstest]
#[case("TIME:1 SET:0 WAY:0 STATE:110")]
#[case("TIME:1 SET:0 WAY:x STATE:001")]
#[case("TIME:1 SET:zz WAY:0 TAG:1")]
#[case("TIME:1 STATE:001")]
#[case("TIME:1 SET:0 WAY:0 DATA:1,2,zz")]
fn malformed_cache_lines(#[case] line: &str) {
    assert!(CacheDiff::parse(line).is_err(), "{line}");
}

#[test]
fn parses_memory_write() {
    assert_eq!(
        MemoryDiff::parse("TIME:3 ADDR:1010 DATA:1,2,3,4").unwrap(),
        vec![MemoryDiff {
            addr: 0x1010,
            data: vec![1, 2, 3, 4],
        }]
    );
    assert!(MemoryDiff::parse("TIME:3 ADDR:1010").is_err());
    assert!(MemoryDiff::parse("TIME:3 note").unwrap().is_empty());
}

#[test]
fn stream_drops_unstamped_and_malformed_lines() {
    let stream = cache_stream(&[
        "# header",
        "TIME:5 SET:0 WAY:0 STATE:001",
        "TIME:6 SET:0 WAY:0 STATE:010",
        "SET:0 WAY:0 STATE:101",
        "TIME:7 OUTSTANDING:1000",
    ]);
    assert_eq!(stream.len(), 2);
    assert_eq!(stream.next_after(None), Some(5));
    assert_eq!(stream.next_after(Some(5)), Some(7));
}

#[test]
fn stream_windows_are_half_open_on_the_left() {
    let stream = cache_stream(&[
        "TIME:10 OUTSTANDING:3",
        "TIME:0 OUTSTANDING:0",
        "TIME:5 OUTSTANDING:1",
        "TIME:5 OUTSTANDING:2",
    ]);
    assert_eq!(stream.next_after(None), Some(0));
    let window: Vec<_> = stream.window(Some(0), 5).map(|(_, diff)| diff.clone()).collect();
    // Equal stamps keep file order.
    assert_eq!(
        window,
        vec![CacheDiff::Outstanding(1), CacheDiff::Outstanding(2)]
    );
    assert_eq!(stream.window(None, 0).count(), 1);
    assert_eq!(stream.next_after(Some(10)), None);
}

/// Both records stamped 5 land before the first check, so the transient dirty `Exclusive`
/// written by the first one is never observed.
#[test]
fn equal_stamps_are_applied_before_checking() {
    init_tracing();
    let caches = vec![
        cache_stream(&[
            "TIME:5 SET:0 WAY:0 TAG:101 STATE:001 DATA:aa,bb,cc,dd",
            "TIME:5 SET:0 WAY:0 STATE:101",
            "TIME:10 SET:1 WAY:0 TAG:101 STATE:001 DATA:0,0,0,0",
        ]),
        DiffStream::default(),
    ];
    let engine = Reconstructor::new(caches, DiffStream::default());
    let mut fleet = fleet(2);
    let report = engine.run(SimulationReady::confirm(), &mut fleet).unwrap();

    let times: Vec<_> = report.checkpoints.iter().map(|cp| cp.time).collect();
    assert_eq!(times, vec![5, 10]);
    assert!(report.passed());
    assert_eq!(
        fleet.cache(0).unwrap().lookup(0x1010).unwrap().state,
        LineState::Modified
    );
}

/// Cache 0 upgrades its shared copy while cache 1 drops its own at the same stamp. Checking
/// between the two streams would see `Modified` next to `Shared`.
#[test]
fn equal_stamps_across_streams_are_applied_before_checking() {
    init_tracing();
    let mut fleet = fleet(2);
    for idx in 0..2 {
        let _ = fleet
            .set_cache_line(idx, 0x1010, &[0; 4], LineState::Shared)
            .unwrap();
    }
    assert!(check_coherency(&fleet).unwrap().is_clean());

    let caches = vec![
        cache_stream(&["TIME:5 SET:0 WAY:0 STATE:101 DATA:aa,bb,cc,dd"]),
        cache_stream(&[
            "TIME:5 SET:0 WAY:0 STATE:000",
            "TIME:10 SET:1 WAY:1 TAG:101 STATE:001 DATA:0,0,0,0",
        ]),
    ];
    let engine = Reconstructor::new(caches, DiffStream::default());
    let report = engine.run(SimulationReady::confirm(), &mut fleet).unwrap();

    let times: Vec<_> = report.checkpoints.iter().map(|cp| cp.time).collect();
    assert_eq!(times, vec![5, 10]);
    assert!(report.passed());
    assert_eq!(
        fleet.cache(0).unwrap().lookup(0x1010).unwrap().state,
        LineState::Modified
    );
    assert!(fleet.cache(1).unwrap().lookup(0x1010).is_none());
    assert_eq!(
        fleet.cache(1).unwrap().lookup(0x1014).unwrap().state,
        LineState::Exclusive
    );
}

#[test]
fn memory_stream_never_opens_a_window() {
    init_tracing();
    let caches = vec![
        cache_stream(&[
            "TIME:5 SET:0 WAY:0 TAG:101 STATE:001 DATA:0,0,0,0",
            "TIME:10 OUTSTANDING:1030",
        ]),
        cache_stream(&[]),
    ];
    let memory = memory_stream(&["TIME:7 ADDR:1010 DATA:1,2,3,4", "TIME:20 ADDR:1000 DATA:9"]);
    let mut engine = Reconstructor::new(caches, memory);
    let mut fleet = fleet(2);

    let first = engine.step(&mut fleet).unwrap().unwrap();
    assert_eq!(first.time, 5);
    assert!(first.report.is_clean());

    // The memory write at 7 lands in (5, 10] and leaves the Exclusive copy stale.
    let second = engine.step(&mut fleet).unwrap().unwrap();
    assert_eq!(second.time, 10);
    assert!(matches!(
        second.report.violations.first(),
        Some(Violation::DirtyExclusive { addr: 0x1010, .. })
    ));
    assert_eq!(second.report.skipped, vec![0x1030]);

    assert_eq!(engine.step(&mut fleet).unwrap(), None);
    assert_eq!(engine.state(), ReplayState::Done);
    // Stamp 20 exists only in the memory stream and is never applied.
    assert_eq!(fleet.memory().read(0x1000, 1).unwrap(), &[0]);
}

#[test]
fn time_zero_records_are_applied() {
    let caches = vec![cache_stream(&["TIME:0 SET:2 WAY:1 TAG:100 STATE:001 DATA:0,0,0,0"])];
    let mut engine = Reconstructor::new(caches, DiffStream::default());
    let mut fleet = fleet(1);
    assert_eq!(engine.next_boundary(), Some(0));
    let checkpoint = engine.step(&mut fleet).unwrap().unwrap();
    assert_eq!(checkpoint.time, 0);
    assert!(fleet.cache(0).unwrap().lookup(0x1008).is_some());
}

#[test]
fn retiring_a_line_resumes_checking_it() {
    let caches = vec![
        cache_stream(&[
            "TIME:1 SET:0 WAY:0 TAG:101 STATE:001 DATA:aa,aa,aa,aa OUTSTANDING:1010",
            "TIME:2 RETIRED:1010",
        ]),
        cache_stream(&[]),
    ];
    let report = Reconstructor::new(caches, DiffStream::default())
        .run(SimulationReady::confirm(), &mut fleet(2))
        .unwrap();
    assert_eq!(report.checkpoints.len(), 2);
    assert!(report.checkpoints[0].report.is_clean());
    assert_eq!(report.checkpoints[0].report.skipped, vec![0x1010]);
    assert!(!report.checkpoints[1].report.is_clean());
    assert!(report.violations().all(|(time, _)| time == 2));
}

#[test]
fn diffs_outside_the_fleet_are_rejected() {
    let caches = vec![cache_stream(&[
        "TIME:3 SET:9 WAY:0 STATE:001",
        "TIME:3 SET:0 WAY:0 TAG:100 STATE:001 DATA:0,0",
    ])];
    let memory = memory_stream(&["TIME:3 ADDR:9000 DATA:1"]);
    let report = Reconstructor::new(caches, memory)
        .run(SimulationReady::confirm(), &mut fleet(1))
        .unwrap();
    assert_eq!(report.checkpoints.len(), 1);
    assert_eq!(report.checkpoints[0].rejected, 3);
    assert!(report.passed());
}

#[test]
fn no_stamps_means_no_checkpoints() {
    let mut engine = Reconstructor::new(vec![DiffStream::default(); 3], DiffStream::default());
    assert_eq!(engine.next_boundary(), None);
    assert_eq!(engine.step(&mut fleet(3)).unwrap(), None);
    assert_eq!(engine.state(), ReplayState::Done);
}

#[test]
fn loads_logs_from_target_directory() {
    let dir = tempdir().unwrap();
    let paths = ArtifactPaths::new(dir.path());
    write_log(
        &paths.cache_diff(1),
        &["TIME:4 SET:0 WAY:0 TAG:101 STATE:101 DATA:1,1,1,1"],
    );
    write_log(&paths.main_mem_diff(), &["TIME:4 ADDR:1020 DATA:5,5,5,5"]);

    // cache_diff_0.txt is absent and reads as an empty stream.
    let engine = Reconstructor::load(&paths, 2).unwrap();
    let mut fleet = fleet(2);
    let report = engine.run(SimulationReady::confirm(), &mut fleet).unwrap();
    assert_eq!(report.checkpoints.len(), 1);
    assert!(report.passed());
    assert_eq!(fleet.memory().read(0x1020, 4).unwrap(), &[5, 5, 5, 5]);
}
