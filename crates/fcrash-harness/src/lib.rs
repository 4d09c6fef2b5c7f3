#![forbid(unsafe_code)]
//! Harness support for the crash-state engine: JSON trace fixtures, an
//! exploration driver that runs a permuter to exhaustion, and the report
//! types the `fcrash` CLI prints.

use anyhow::{Context, Result};
use fcrash_permute::{Epoch, Permuter};
use fcrash_types::{DiskWrite, PermuteTestResult, WriteFlags};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// On-disk trace fixture: an ordered list of writes with symbolic flags.
///
/// ```json
/// { "writes": [ { "flags": "W", "sector": 0, "size": 512 },
///               { "flags": "WBF", "sector": 8, "size": 512 } ] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFixture {
    pub writes: Vec<FixtureWrite>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureWrite {
    pub flags: String,
    pub sector: u32,
    pub size: u32,
}

impl TraceFixture {
    /// Convert the fixture into the engine's trace representation.
    pub fn to_trace(&self) -> Result<Vec<DiskWrite>> {
        self.writes
            .iter()
            .enumerate()
            .map(|(index, write)| {
                let flags = WriteFlags::from_symbols(&write.flags)
                    .with_context(|| format!("invalid flags for write {index}"))?;
                Ok(DiskWrite::new(flags, write.sector, write.size))
            })
            .collect()
    }

    /// Build a fixture back from a trace (used to persist generated
    /// workloads).
    #[must_use]
    pub fn from_trace(trace: &[DiskWrite]) -> Self {
        Self {
            writes: trace
                .iter()
                .map(|write| FixtureWrite {
                    flags: write.flags.symbols(),
                    sector: write.write_sector,
                    size: write.size,
                })
                .collect(),
        }
    }
}

/// Parse a fixture document and convert it to a trace.
pub fn parse_trace_fixture(text: &str) -> Result<Vec<DiskWrite>> {
    let fixture: TraceFixture =
        serde_json::from_str(text).context("invalid trace fixture json")?;
    fixture.to_trace()
}

/// Load a trace fixture from disk.
pub fn load_trace_fixture(path: &Path) -> Result<Vec<DiskWrite>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    parse_trace_fixture(&text)
        .with_context(|| format!("invalid fixture {}", path.display()))
}

/// Flat, serializable view of one epoch for reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSummary {
    pub index: usize,
    pub ops: usize,
    pub abs_indexes: Vec<u32>,
    pub has_barrier: bool,
    pub overlaps: bool,
    pub num_meta: u32,
    pub checkpoint_epoch: i32,
}

#[must_use]
pub fn summarize_epochs(epochs: &[Epoch]) -> Vec<EpochSummary> {
    epochs
        .iter()
        .enumerate()
        .map(|(index, epoch)| EpochSummary {
            index,
            ops: epoch.ops.len(),
            abs_indexes: epoch.ops.iter().map(|eo| eo.abs_index).collect(),
            has_barrier: epoch.has_barrier,
            overlaps: epoch.overlaps,
            num_meta: epoch.num_meta,
            checkpoint_epoch: epoch.checkpoint_epoch,
        })
        .collect()
}

/// One unique crash state discovered during exploration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashStateRecord {
    pub crash_state: Vec<u32>,
    pub last_checkpoint: i32,
}

/// Aggregate result of driving a permuter over a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationReport {
    pub epochs: Vec<EpochSummary>,
    pub states: Vec<CrashStateRecord>,
    pub unique_states: usize,
    /// Whether exploration stopped because the permuter signalled
    /// exhaustion (as opposed to hitting the state limit).
    pub exhausted: bool,
}

/// Drive the default random permuter over `trace`, collecting up to
/// `limit` unique crash states or stopping early on exhaustion.
#[must_use]
pub fn explore(trace: &[DiskWrite], limit: usize) -> ExplorationReport {
    let mut permuter = Permuter::random();
    permuter.init_data(trace);

    let mut states = Vec::new();
    let mut out: Vec<DiskWrite> = Vec::new();
    let mut log = PermuteTestResult::default();
    let mut exhausted = false;

    while states.len() < limit {
        if !permuter.generate_crash_state(&mut out, &mut log) {
            exhausted = true;
            break;
        }
        states.push(CrashStateRecord {
            crash_state: log.crash_state.clone(),
            last_checkpoint: log.last_checkpoint,
        });
    }

    ExplorationReport {
        epochs: summarize_epochs(permuter.epochs()),
        unique_states: permuter.unique_states(),
        states,
        exhausted,
    }
}
