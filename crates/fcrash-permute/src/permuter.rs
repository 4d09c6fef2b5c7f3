//! Strategy contract, fingerprint deduplication, and the retry-loop driver.

use crate::epoch::{Epoch, EpochBuilder, EpochOp};
use crate::random::RandomPermuter;
use fcrash_types::{DiskWrite, PermuteTestResult};
use std::collections::HashSet;
use tracing::{debug, trace};

/// Retry floor per `generate_crash_state` call.
pub const MIN_RETRIES: u64 = 1000;
/// Scales the retry budget with the number of states already discovered,
/// so a small state space terminates while a large one keeps exploring.
pub const RETRY_MULTIPLIER: u64 = 2;

/// A crash-state generation algorithm.
///
/// Implementations must be deterministic given their construction seed:
/// with an identical epoch model and identical internal state, successive
/// calls must reproduce the same outputs bit for bit.
pub trait PermuterStrategy {
    /// One-shot hook called after the epoch model is built, for strategies
    /// that precompute tables.
    fn init(&mut self, epochs: &[Epoch]);

    /// Populate `out` with one candidate crash state and fill in `log`.
    /// Returns `false` when no state can be produced (empty model or
    /// strategy exhaustion).
    fn gen_one_state(
        &mut self,
        epochs: &[Epoch],
        out: &mut Vec<EpochOp>,
        log: &mut PermuteTestResult,
    ) -> bool;
}

/// Construct a built-in strategy by name. `"random"` is currently the only
/// registered strategy.
#[must_use]
pub fn strategy_by_name(name: &str) -> Option<Box<dyn PermuterStrategy>> {
    match name {
        "random" => Some(Box::new(RandomPermuter::new())),
        _ => None,
    }
}

/// Drives a strategy against a fixed epoch model, deduplicating emitted
/// states by their abs_index fingerprint.
///
/// The dedup set grows monotonically for the lifetime of the permuter; a
/// single instance is not meant to be shared between threads.
pub struct Permuter {
    epochs: Vec<Epoch>,
    completed_permutations: HashSet<Vec<u32>>,
    strategy: Box<dyn PermuterStrategy>,
}

impl Permuter {
    #[must_use]
    pub fn new(strategy: Box<dyn PermuterStrategy>) -> Self {
        Self {
            epochs: Vec::new(),
            completed_permutations: HashSet::new(),
            strategy,
        }
    }

    /// Convenience constructor wiring up the default random strategy.
    #[must_use]
    pub fn random() -> Self {
        Self::new(Box::new(RandomPermuter::new()))
    }

    /// Build the epoch model from a recorded trace and hand it to the
    /// strategy. The trace is only borrowed for the duration of the call.
    pub fn init_data(&mut self, trace: &[DiskWrite]) {
        self.epochs = EpochBuilder::new().build(trace);
        self.strategy.init(&self.epochs);
        debug!(
            target: "fcrash::permute",
            epochs = self.epochs.len(),
            trace_len = trace.len(),
            "epoch_model_loaded"
        );
    }

    /// Read-only view of the epoch model.
    #[must_use]
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Number of unique crash states recorded so far.
    #[must_use]
    pub fn unique_states(&self) -> usize {
        self.completed_permutations.len()
    }

    /// Produce one crash state that has not been returned before.
    ///
    /// Returns `true` for a fresh unique state. Returns `false` on
    /// exhaustion: either the strategy reported it cannot produce more
    /// states, or the retry budget ran out on duplicates — in the latter
    /// case `out` still holds the (duplicate) last attempt for inspection.
    pub fn generate_crash_state(
        &mut self,
        out: &mut Vec<DiskWrite>,
        log: &mut PermuteTestResult,
    ) -> bool {
        let mut crash_state: Vec<EpochOp> = Vec::new();
        let mut fingerprint: Vec<u32> = Vec::new();
        let mut retries: u64 = 0;
        let mut new_state;
        let mut exists;

        let discovered =
            u64::try_from(self.completed_permutations.len()).unwrap_or(u64::MAX);
        let max_retries = MIN_RETRIES.max(discovered.saturating_mul(RETRY_MULTIPLIER));

        loop {
            new_state = self
                .strategy
                .gen_one_state(&self.epochs, &mut crash_state, log);

            fingerprint.clear();
            fingerprint.extend(crash_state.iter().map(|eo| eo.abs_index));

            retries += 1;
            exists = self.completed_permutations.contains(&fingerprint);
            if !new_state || retries >= max_retries {
                // Either the strategy is done or we have likely seen the
                // whole state space; stop rather than spin on duplicates.
                break;
            }
            if !exists {
                break;
            }
        }

        out.clear();
        out.extend(crash_state.iter().map(|eo| eo.op));

        if !exists {
            self.completed_permutations.insert(fingerprint);
            return new_state;
        }

        trace!(
            target: "fcrash::permute",
            retries,
            unique_states = self.completed_permutations.len(),
            "retry_budget_exhausted"
        );
        false
    }

    /// Positions within an emitted crash state that belong to its deepest
    /// (possibly truncated) epoch.
    ///
    /// Relies on the driver invariant that all epochs before the deepest
    /// one are reproduced whole, so the split point is determined by the
    /// cumulative lengths of the full prefix epochs. Returns `None` for an
    /// empty state or one longer than the whole model.
    #[must_use]
    pub fn last_epoch_positions(&self, crash_state: &[u32]) -> Option<Vec<usize>> {
        if crash_state.is_empty() {
            return None;
        }

        let mut prefix_len = 0_usize;
        for epoch in &self.epochs {
            let next = prefix_len + epoch.ops.len();
            if next >= crash_state.len() {
                return Some((prefix_len..crash_state.len()).collect());
            }
            prefix_len = next;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcrash_types::WriteFlags;
    use std::collections::HashSet;

    fn write(symbols: &str, sector: u32, size: u32) -> DiskWrite {
        DiskWrite::new(
            WriteFlags::from_symbols(symbols).expect("valid flag symbols"),
            sector,
            size,
        )
    }

    /// Two epochs of two ops each (data + barrier). The random strategy can
    /// reach exactly four distinct states: [0], [0,1], [0,1,2], [0,1,2,3].
    fn two_epoch_trace() -> Vec<DiskWrite> {
        vec![
            write("W", 0, 512),
            write("B", 0, 0),
            write("W", 8, 512),
            write("B", 0, 0),
        ]
    }

    #[test]
    fn empty_trace_exhausts_immediately() {
        let mut permuter = Permuter::random();
        permuter.init_data(&[]);

        let mut out = Vec::new();
        let mut log = PermuteTestResult::default();
        assert!(!permuter.generate_crash_state(&mut out, &mut log));
        assert!(out.is_empty());
    }

    #[test]
    fn states_are_unique_until_exhaustion() {
        let mut permuter = Permuter::random();
        permuter.init_data(&two_epoch_trace());

        let mut out = Vec::new();
        let mut log = PermuteTestResult::default();
        let mut seen: HashSet<Vec<u32>> = HashSet::new();

        while permuter.generate_crash_state(&mut out, &mut log) {
            assert!(
                seen.insert(log.crash_state.clone()),
                "duplicate fingerprint {:?}",
                log.crash_state
            );
            assert!(seen.len() <= 4, "state space has only four members");
        }

        assert_eq!(seen.len(), 4);
        assert_eq!(permuter.unique_states(), 4);

        let expected: HashSet<Vec<u32>> = [
            vec![0_u32],
            vec![0, 1],
            vec![0, 1, 2],
            vec![0, 1, 2, 3],
        ]
        .into_iter()
        .collect();
        assert_eq!(seen, expected);

        // Once exhausted, the dedup set stops growing.
        assert!(!permuter.generate_crash_state(&mut out, &mut log));
        assert_eq!(permuter.unique_states(), 4);
    }

    #[test]
    fn emitted_ops_match_the_logged_fingerprint() {
        let mut permuter = Permuter::random();
        permuter.init_data(&two_epoch_trace());

        let mut out = Vec::new();
        let mut log = PermuteTestResult::default();
        assert!(permuter.generate_crash_state(&mut out, &mut log));
        assert_eq!(out.len(), log.crash_state.len());
    }

    #[test]
    fn single_op_trace_produces_that_op() {
        let mut permuter = Permuter::random();
        permuter.init_data(&[write("WB", 0, 512)]);

        let mut out = Vec::new();
        let mut log = PermuteTestResult::default();
        assert!(permuter.generate_crash_state(&mut out, &mut log));
        assert_eq!(log.crash_state, vec![0]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].write_sector, 0);

        assert!(!permuter.generate_crash_state(&mut out, &mut log));
    }

    #[test]
    fn last_epoch_positions_tracks_the_truncation_point() {
        let mut permuter = Permuter::random();
        permuter.init_data(&two_epoch_trace());

        // Full first epoch plus a truncated second one.
        assert_eq!(
            permuter.last_epoch_positions(&[0, 1, 2]),
            Some(vec![2])
        );
        // Exactly the first epoch.
        assert_eq!(permuter.last_epoch_positions(&[0, 1]), Some(vec![0, 1]));
        // Truncated first epoch.
        assert_eq!(permuter.last_epoch_positions(&[0]), Some(vec![0]));
        // Whole model.
        assert_eq!(
            permuter.last_epoch_positions(&[0, 1, 2, 3]),
            Some(vec![2, 3])
        );
        // Degenerate inputs.
        assert_eq!(permuter.last_epoch_positions(&[]), None);
        assert_eq!(permuter.last_epoch_positions(&[0, 1, 2, 3, 4]), None);
    }

    #[test]
    fn strategy_registry_knows_random() {
        assert!(strategy_by_name("random").is_some());
        assert!(strategy_by_name("exhaustive").is_none());
    }
}
