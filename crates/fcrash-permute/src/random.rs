//! Randomized prefix/truncation strategy.
//!
//! Picks a random epoch prefix and a random cut inside the final epoch,
//! dropping a random subset of that epoch's non-barrier ops. Both decision
//! streams are seeded with a fixed value so any emitted crash state can be
//! reproduced bit for bit from the same trace.

use crate::epoch::{Epoch, EpochOp};
use crate::permuter::PermuterStrategy;
use fcrash_types::PermuteTestResult;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Fixed seed for both decision streams. Failing crash states are replayed
/// by rebuilding the permuter over the same trace.
pub const RANDOM_PERMUTER_SEED: u64 = 42;

/// How the truncated tail epoch is materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TailSelection {
    /// Drop a random subset of the tail epoch's ops, keeping trace order.
    #[default]
    Subset,
    /// Emit the selected tail ops in draw order instead of trace order.
    /// Kept for experiments that model out-of-order completion; `Subset`
    /// is what the runner uses.
    Shuffled,
}

/// Random prefix/truncation strategy with two independent seeded streams:
/// `rand` drives the epoch-count and request-count draws, `subset_rand` is
/// consumed by the tail-subset shuffle.
pub struct RandomPermuter {
    rand: ChaCha8Rng,
    subset_rand: ChaCha8Rng,
    tail_selection: TailSelection,
}

impl RandomPermuter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(RANDOM_PERMUTER_SEED)
    }

    /// Seed both streams with `seed`. Harness experiments only; the
    /// runner-facing default is [`RANDOM_PERMUTER_SEED`].
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rand: ChaCha8Rng::seed_from_u64(seed),
            subset_rand: ChaCha8Rng::seed_from_u64(seed),
            tail_selection: TailSelection::default(),
        }
    }

    #[must_use]
    pub fn with_tail_selection(mut self, tail_selection: TailSelection) -> Self {
        self.tail_selection = tail_selection;
        self
    }

    /// Copy `req_size` of `epoch`'s ops into `out`, never picking the
    /// terminal barrier unless the request spans the whole epoch, and
    /// preserving trace order among the picks.
    fn subset_epoch(&mut self, epoch: &Epoch, req_size: usize, out: &mut Vec<EpochOp>) {
        debug_assert!(req_size <= epoch.ops.len());

        let mut slots = epoch.ops.len();
        if epoch.has_barrier {
            slots -= 1;
        }
        let picks = req_size.min(slots);

        let mut indices: Vec<usize> = (0..slots).collect();
        indices.shuffle(&mut self.subset_rand);
        indices.truncate(picks);
        // Back into trace order: a truncated epoch keeps the original
        // ordering of whatever survived.
        indices.sort_unstable();

        for index in indices {
            out.push(epoch.ops[index]);
        }

        if req_size > picks {
            // Only a full-epoch request can reach past the non-barrier
            // slots, and only a barrier can occupy the remaining slot.
            debug_assert!(epoch.has_barrier);
            if let Some(barrier) = epoch.ops.last().copied() {
                out.push(barrier);
            }
        }
    }

    /// Legacy variant of [`Self::subset_epoch`]: same selection contract,
    /// but the picked ops are emitted in draw order.
    fn permute_epoch(&mut self, epoch: &Epoch, req_size: usize, out: &mut Vec<EpochOp>) {
        debug_assert!(req_size <= epoch.ops.len());

        let mut slots = epoch.ops.len();
        if epoch.has_barrier {
            slots -= 1;
        }
        let picks = req_size.min(slots);

        let mut empty_slots: Vec<usize> = (0..slots).collect();
        for _ in 0..picks {
            let chosen = self.rand.gen_range(0..empty_slots.len());
            out.push(epoch.ops[empty_slots[chosen]]);
            empty_slots.remove(chosen);
        }

        if req_size > picks {
            debug_assert!(epoch.has_barrier);
            if let Some(barrier) = epoch.ops.last().copied() {
                out.push(barrier);
            }
        }
    }
}

impl Default for RandomPermuter {
    fn default() -> Self {
        Self::new()
    }
}

impl PermuterStrategy for RandomPermuter {
    fn init(&mut self, _epochs: &[Epoch]) {}

    fn gen_one_state(
        &mut self,
        epochs: &[Epoch],
        out: &mut Vec<EpochOp>,
        log: &mut PermuteTestResult,
    ) -> bool {
        if epochs.is_empty() {
            return false;
        }

        let num_epochs = self.rand.gen_range(1..=epochs.len());
        let target = &epochs[num_epochs - 1];
        // An epoch with no ops (checkpoint-only trace tail) contributes
        // nothing; everything else draws over a nonempty range so a whole
        // epoch can be emitted.
        let num_requests = if target.ops.is_empty() {
            0
        } else {
            self.rand.gen_range(1..=target.ops.len())
        };

        let total: usize = epochs[..num_epochs - 1]
            .iter()
            .map(|epoch| epoch.ops.len())
            .sum::<usize>()
            + num_requests;

        out.clear();
        out.reserve(total);

        // Report the most recent checkpoint that is durable in this state.
        // Truncating the target means its terminal barrier never landed, so
        // any checkpoint it introduced is not durable either.
        if num_requests == target.ops.len() {
            log.last_checkpoint = target.checkpoint_epoch;
        } else {
            log.last_checkpoint = if num_epochs > 1 {
                epochs[num_epochs - 2].checkpoint_epoch
            } else {
                0
            };
        }

        for (i, epoch) in epochs[..num_epochs].iter().enumerate() {
            if i + 1 < num_epochs || num_requests == target.ops.len() {
                out.extend_from_slice(&epoch.ops);
            } else {
                match self.tail_selection {
                    TailSelection::Subset => self.subset_epoch(epoch, num_requests, out),
                    TailSelection::Shuffled => self.permute_epoch(epoch, num_requests, out),
                }
            }
        }
        debug_assert_eq!(out.len(), total);

        log.crash_state.clear();
        log.crash_state.extend(out.iter().map(|eo| eo.abs_index));

        trace!(
            target: "fcrash::permute",
            num_epochs,
            num_requests,
            total,
            last_checkpoint = log.last_checkpoint,
            "crash_state_drawn"
        );
        true
    }
}
