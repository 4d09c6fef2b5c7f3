#![forbid(unsafe_code)]
//! Shared value types for the FrankenCrash crash-state engine.
//!
//! Defines the `DiskWrite` bio record consumed from the block tracer, its
//! `WriteFlags` bitmask, and the `PermuteTestResult` log record handed back
//! to the test runner alongside each emitted crash state.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Flag bits recorded for one block-layer write.
///
/// The symbolic form used by fixtures and test notation maps one character
/// per bit: `W`=write, `B`=barrier, `F`=flush, `S`=flush_seq, `U`=FUA,
/// `M`=meta, `C`=checkpoint.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WriteFlags(pub u32);

impl WriteFlags {
    pub const WRITE: u32 = 1 << 0;
    pub const BARRIER: u32 = 1 << 1;
    pub const FLUSH: u32 = 1 << 2;
    pub const FLUSH_SEQ: u32 = 1 << 3;
    pub const FUA: u32 = 1 << 4;
    pub const META: u32 = 1 << 5;
    pub const CHECKPOINT: u32 = 1 << 6;

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits != 0
    }

    pub fn insert(&mut self, bits: u32) {
        self.0 |= bits;
    }

    pub fn remove(&mut self, bits: u32) {
        self.0 &= !bits;
    }

    /// Parse a symbol string such as `"WBF"` into a flag set.
    pub fn from_symbols(symbols: &str) -> Result<Self, FlagParseError> {
        let mut flags = Self::empty();
        for symbol in symbols.chars() {
            match symbol {
                'W' => flags.insert(Self::WRITE),
                'B' => flags.insert(Self::BARRIER),
                'F' => flags.insert(Self::FLUSH),
                'S' => flags.insert(Self::FLUSH_SEQ),
                'U' => flags.insert(Self::FUA),
                'M' => flags.insert(Self::META),
                'C' => flags.insert(Self::CHECKPOINT),
                other => return Err(FlagParseError::UnknownSymbol { symbol: other }),
            }
        }
        Ok(flags)
    }

    /// Render the flag set back into its symbol string.
    #[must_use]
    pub fn symbols(self) -> String {
        let mut out = String::new();
        for (bit, symbol) in [
            (Self::WRITE, 'W'),
            (Self::BARRIER, 'B'),
            (Self::FLUSH, 'F'),
            (Self::FLUSH_SEQ, 'S'),
            (Self::FUA, 'U'),
            (Self::META, 'M'),
            (Self::CHECKPOINT, 'C'),
        ] {
            if self.contains(bit) {
                out.push(symbol);
            }
        }
        out
    }
}

impl fmt::Display for WriteFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbols())
    }
}

/// Error parsing a symbolic flag string.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FlagParseError {
    #[error("unknown flag symbol {symbol:?} (expected one of W B F S U M C)")]
    UnknownSymbol { symbol: char },
}

/// One recorded block-layer operation (bio) from the write tracer.
///
/// A cheap-to-copy metadata record: the engine never inspects payload
/// bytes, only the sector range and the flag set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskWrite {
    /// Starting logical sector.
    pub write_sector: u32,
    /// Byte count; the covered range is `[write_sector, write_sector + size)`.
    pub size: u32,
    pub flags: WriteFlags,
}

impl DiskWrite {
    #[must_use]
    pub fn new(flags: WriteFlags, write_sector: u32, size: u32) -> Self {
        Self {
            write_sector,
            size,
            flags,
        }
    }

    #[must_use]
    pub fn is_write(&self) -> bool {
        self.flags.contains(WriteFlags::WRITE)
    }

    #[must_use]
    pub fn is_meta(&self) -> bool {
        self.flags.contains(WriteFlags::META)
    }

    /// Synthetic durability marker injected by the harness; stripped before
    /// permutation.
    #[must_use]
    pub fn is_checkpoint(&self) -> bool {
        self.flags.contains(WriteFlags::CHECKPOINT)
    }

    #[must_use]
    pub fn has_barrier_flag(&self) -> bool {
        self.flags.contains(WriteFlags::BARRIER)
    }

    #[must_use]
    pub fn has_flush_flag(&self) -> bool {
        self.flags.contains(WriteFlags::FLUSH)
    }

    #[must_use]
    pub fn has_flush_seq_flag(&self) -> bool {
        self.flags.contains(WriteFlags::FLUSH_SEQ)
    }

    #[must_use]
    pub fn has_fua_flag(&self) -> bool {
        self.flags.contains(WriteFlags::FUA)
    }

    /// A write that imposes ordering on the stream: any combination of
    /// barrier, flush, or force-unit-access semantics. Checkpoint markers
    /// carry none of these and are never barriers.
    #[must_use]
    pub fn is_barrier_write(&self) -> bool {
        self.flags.contains(
            WriteFlags::BARRIER | WriteFlags::FLUSH | WriteFlags::FLUSH_SEQ | WriteFlags::FUA,
        )
    }

    pub fn set_flush_flag(&mut self) {
        self.flags.insert(WriteFlags::FLUSH);
    }

    pub fn clear_flush_flag(&mut self) {
        self.flags.remove(WriteFlags::FLUSH);
    }

    pub fn set_flush_seq_flag(&mut self) {
        self.flags.insert(WriteFlags::FLUSH_SEQ);
    }

    pub fn clear_flush_seq_flag(&mut self) {
        self.flags.remove(WriteFlags::FLUSH_SEQ);
    }
}

impl fmt::Display for DiskWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.flags.symbols(),
            self.write_sector,
            self.size
        )
    }
}

/// Log record describing one emitted crash state, shared with the external
/// test runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermuteTestResult {
    /// The `abs_index` sequence of the emitted state, in emission order.
    pub crash_state: Vec<u32>,
    /// Most recently durable checkpoint epoch for this state; −1 when no
    /// checkpoint was durable.
    pub last_checkpoint: i32,
}
