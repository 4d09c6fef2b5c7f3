//! Epoch extraction from a recorded write trace.
//!
//! Splits the ordered bio stream into epochs at barrier writes, dividing
//! combined flush+data bios across the boundary, stripping checkpoint
//! markers, and flagging overlapping sector ranges.

use fcrash_types::DiskWrite;
use tracing::{debug, trace};

/// One operation positioned within the original trace.
///
/// `abs_index` is the 0-based position of the bio in the raw trace:
/// checkpoint markers consume an index but are never emitted, and the two
/// halves of a split flush+data barrier share the barrier's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochOp {
    pub abs_index: u32,
    pub op: DiskWrite,
}

/// A maximal contiguous run of writes terminated by at most one barrier.
///
/// When `has_barrier` is set the barrier is always the last element of
/// `ops`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Epoch {
    /// Ops in original trace order.
    pub ops: Vec<EpochOp>,
    pub has_barrier: bool,
    /// Whether any op in this epoch covers a sector range overlapping a
    /// previously recorded range (see [`EpochBuilderConfig`] for scope).
    pub overlaps: bool,
    /// Count of ops whose meta flag is set.
    pub num_meta: u32,
    /// Checkpoint counter value at this epoch's end; −1 before the first
    /// checkpoint marker.
    pub checkpoint_epoch: i32,
}

/// Configuration for [`EpochBuilder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochBuilderConfig {
    /// Reset the sector-range list at each epoch boundary instead of
    /// accumulating ranges across the whole trace. The accumulating
    /// default matches the recorded-trace profiler this engine consumes
    /// and must stay the default.
    pub reset_ranges_per_epoch: bool,
}

/// An inclusive-start, exclusive-end sector range, kept in a list ordered
/// by start sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectorRange {
    start: u32,
    end: u32,
}

/// Builds the epoch model a permutation strategy runs against.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochBuilder {
    config: EpochBuilderConfig,
}

impl EpochBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: EpochBuilderConfig) -> Self {
        Self { config }
    }

    /// Scan the trace once and produce the ordered epoch sequence.
    ///
    /// Malformed inputs never fail: a barrier with no preceding data op
    /// yields a single-element epoch, a checkpoint-only trace yields one
    /// epoch with empty `ops`, and an empty trace yields no epochs.
    #[must_use]
    pub fn build(&self, trace: &[DiskWrite]) -> Vec<Epoch> {
        let mut epochs: Vec<Epoch> = Vec::new();
        let mut ranges: Vec<SectorRange> = Vec::new();
        let mut curr_checkpoint_epoch: i32 = -1;
        let mut abs_index: u32 = 0;
        // Data half of a split flush+data barrier, carried into the next
        // epoch. Shares the barrier's abs_index.
        let mut carried: Option<EpochOp> = None;
        let mut idx = 0_usize;

        while idx < trace.len() || carried.is_some() {
            let mut epoch = Epoch {
                checkpoint_epoch: curr_checkpoint_epoch,
                ..Epoch::default()
            };
            if self.config.reset_ranges_per_epoch {
                ranges.clear();
            }

            if let Some(data_half) = carried.take() {
                if data_half.op.is_meta() {
                    epoch.num_meta += 1;
                }
                epoch.ops.push(data_half);
            }

            // Everything up to the next barrier belongs to this epoch.
            while idx < trace.len() && !trace[idx].is_barrier_write() {
                let op = trace[idx];
                if op.is_checkpoint() {
                    curr_checkpoint_epoch += 1;
                    epoch.checkpoint_epoch = curr_checkpoint_epoch;
                    idx += 1;
                    abs_index += 1;
                    continue;
                }

                if record_range(&mut ranges, op) {
                    epoch.overlaps = true;
                }
                if op.is_meta() {
                    epoch.num_meta += 1;
                }
                epoch.ops.push(EpochOp { abs_index, op });
                abs_index += 1;
                idx += 1;
            }

            if idx < trace.len() {
                let barrier = trace[idx];
                if barrier.is_write()
                    && (barrier.has_flush_flag() || barrier.has_flush_seq_flag())
                    && !barrier.has_fua_flag()
                {
                    // Split: the flush semantics terminate this epoch, the
                    // data lands at the start of the next one. Both halves
                    // keep the barrier's abs_index.
                    let mut flag_half = DiskWrite::default();
                    let mut data_half = barrier;
                    if barrier.has_flush_flag() {
                        flag_half.set_flush_flag();
                        data_half.clear_flush_flag();
                    }
                    if barrier.has_flush_seq_flag() {
                        flag_half.set_flush_seq_flag();
                        data_half.clear_flush_seq_flag();
                    }

                    epoch.ops.push(EpochOp {
                        abs_index,
                        op: flag_half,
                    });
                    epoch.has_barrier = true;
                    carried = Some(EpochOp {
                        abs_index,
                        op: data_half,
                    });
                } else {
                    if barrier.is_meta() {
                        epoch.num_meta += 1;
                    }
                    epoch.ops.push(EpochOp {
                        abs_index,
                        op: barrier,
                    });
                    epoch.has_barrier = true;
                }
                abs_index += 1;
                idx += 1;
            }

            trace!(
                target: "fcrash::epoch",
                ops = epoch.ops.len(),
                has_barrier = epoch.has_barrier,
                overlaps = epoch.overlaps,
                num_meta = epoch.num_meta,
                checkpoint_epoch = epoch.checkpoint_epoch,
                "epoch_closed"
            );
            epochs.push(epoch);
        }

        debug!(
            target: "fcrash::epoch",
            epochs = epochs.len(),
            trace_len = trace.len(),
            checkpoints = curr_checkpoint_epoch + 1,
            "epoch_model_built"
        );
        epochs
    }
}

/// Record the op's sector range in the ordered list; returns `true` if it
/// overlaps a previously recorded range (in which case the new range is
/// not recorded).
fn record_range(ranges: &mut Vec<SectorRange>, op: DiskWrite) -> bool {
    let start = op.write_sector;
    let end = op.write_sector.saturating_add(op.size);

    for i in 0..ranges.len() {
        let r = ranges[i];
        if (r.start <= start && r.end >= start) || (r.start <= end && r.end >= end) {
            return true;
        }
        if r.start > end {
            ranges.insert(i, SectorRange { start, end });
            return false;
        }
    }

    ranges.push(SectorRange { start, end });
    false
}
