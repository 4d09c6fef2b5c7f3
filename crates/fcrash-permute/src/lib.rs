#![forbid(unsafe_code)]
//! Crash-state permutation engine.
//!
//! Consumes an ordered trace of block-layer writes recorded under a
//! filesystem workload and repeatedly synthesizes unique candidate crash
//! states: prefixes of the trace in which the final barrier-delimited
//! epoch is truncated and/or subset. Downstream tooling replays those
//! states against a filesystem checker.
//!
//! Pipeline: `&[DiskWrite]` → [`EpochBuilder`] → `Vec<Epoch>` →
//! [`PermuterStrategy`] → [`Permuter`] (fingerprint dedup) →
//! `Vec<DiskWrite>` plus a [`fcrash_types::PermuteTestResult`] log record.
//!
//! Everything is single-threaded, synchronous, and deterministic under a
//! fixed seed; determinism is the load-bearing contract for reproducing
//! filesystem-bug reports.

pub mod epoch;
pub mod permuter;
pub mod random;

pub use epoch::{Epoch, EpochBuilder, EpochBuilderConfig, EpochOp};
pub use permuter::{Permuter, PermuterStrategy, strategy_by_name, MIN_RETRIES, RETRY_MULTIPLIER};
pub use random::{RandomPermuter, TailSelection, RANDOM_PERMUTER_SEED};
