#![forbid(unsafe_code)]
//! End-to-end checks of the engine's external contract: determinism under
//! the fixed seed, uniqueness of returned states, and graceful exhaustion.

use fcrash_harness::{explore, load_trace_fixture, TraceFixture};
use fcrash_permute::{EpochBuilder, Permuter};
use fcrash_types::{DiskWrite, PermuteTestResult, WriteFlags};
use std::collections::HashSet;
use std::io::Write as _;

fn write(symbols: &str, sector: u32, size: u32) -> DiskWrite {
    DiskWrite::new(
        WriteFlags::from_symbols(symbols).expect("valid flag symbols"),
        sector,
        size,
    )
}

/// A workload shaped like a real journal commit: data writes, a split
/// flush+data barrier, checkpoints, and a trailing open epoch.
fn journal_like_trace() -> Vec<DiskWrite> {
    vec![
        write("W", 0, 4096),
        write("WM", 8, 512),
        write("WBF", 16, 512),
        write("C", 0, 0),
        write("W", 64, 1024),
        write("W", 96, 1024),
        write("B", 0, 0),
        write("C", 0, 0),
        write("W", 128, 512),
        write("W", 160, 512),
    ]
}

#[test]
fn identically_seeded_engines_agree_call_by_call() {
    let trace = journal_like_trace();

    let mut left = Permuter::random();
    let mut right = Permuter::random();
    left.init_data(&trace);
    right.init_data(&trace);

    let mut left_out = Vec::new();
    let mut right_out = Vec::new();
    let mut left_log = PermuteTestResult::default();
    let mut right_log = PermuteTestResult::default();

    for call in 0..200 {
        let l = left.generate_crash_state(&mut left_out, &mut left_log);
        let r = right.generate_crash_state(&mut right_out, &mut right_log);
        assert_eq!(l, r, "return values diverged at call {call}");
        assert_eq!(left_out, right_out, "outputs diverged at call {call}");
        assert_eq!(left_log, right_log, "logs diverged at call {call}");
        if !l {
            break;
        }
    }
}

#[test]
fn fresh_states_have_pairwise_distinct_fingerprints() {
    let trace = journal_like_trace();
    let mut permuter = Permuter::random();
    permuter.init_data(&trace);

    let mut out = Vec::new();
    let mut log = PermuteTestResult::default();
    let mut seen: HashSet<Vec<u32>> = HashSet::new();

    for _ in 0..50 {
        if !permuter.generate_crash_state(&mut out, &mut log) {
            break;
        }
        assert!(
            seen.insert(log.crash_state.clone()),
            "fingerprint {:?} returned twice",
            log.crash_state
        );
        assert_eq!(out.len(), log.crash_state.len());
    }

    assert_eq!(seen.len(), permuter.unique_states());
}

#[test]
fn small_state_space_exhausts_and_stops_growing() {
    // Two epochs of a data write plus a barrier each: four reachable
    // states in total.
    let trace = vec![
        write("W", 0, 512),
        write("B", 0, 0),
        write("W", 8, 512),
        write("B", 0, 0),
    ];

    let report = explore(&trace, 100);
    assert!(report.exhausted);
    assert_eq!(report.states.len(), 4);
    assert_eq!(report.unique_states, 4);

    let fingerprints: HashSet<Vec<u32>> = report
        .states
        .iter()
        .map(|state| state.crash_state.clone())
        .collect();
    assert_eq!(fingerprints.len(), 4);
}

#[test]
fn exploration_respects_the_state_limit() {
    let report = explore(&journal_like_trace(), 5);
    assert!(!report.exhausted);
    assert_eq!(report.states.len(), 5);
    assert_eq!(report.unique_states, 5);
}

#[test]
fn fixture_file_round_trips_and_splits_flush_barriers() {
    let fixture = TraceFixture::from_trace(&journal_like_trace());
    let json = serde_json::to_string_pretty(&fixture).expect("serialize fixture");

    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(json.as_bytes()).expect("write fixture");

    let trace = load_trace_fixture(file.path()).expect("load fixture");
    assert_eq!(trace, journal_like_trace());

    let epochs = EpochBuilder::new().build(&trace);
    // The flush+data barrier at raw index 2 splits: its flush half ends
    // epoch 0 and its data half opens epoch 1, both at abs_index 2.
    assert!(epochs[0].has_barrier);
    assert_eq!(epochs[0].ops.last().expect("nonempty").abs_index, 2);
    assert_eq!(
        epochs[0].ops.last().expect("nonempty").op.flags.symbols(),
        "F"
    );
    assert_eq!(epochs[1].ops[0].abs_index, 2);
    assert_eq!(epochs[1].ops[0].op.write_sector, 16);
}

#[test]
fn missing_fixture_reports_the_path() {
    let err = load_trace_fixture(std::path::Path::new("/nonexistent/trace.json"))
        .expect_err("missing file");
    assert!(format!("{err:#}").contains("/nonexistent/trace.json"));
}
