//! Memory atomicity modes and their ordering lattice
//!
//! ```text
//!            SEQUENTIALLY_CONSISTENT
//!              /               \
//!          ACQUIRE           RELEASE
//!              \               /
//!                  UNORDERED
//! ```
//!
//! Acquire and release are incomparable. The fence optimizer may only move a
//! node's mode downward; [`ModeCell::weaken_to`] is the only mutator and
//! refuses anything else.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};

/// Atomicity mode of a load, store, fence or call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryAtomicityMode {
    /// No ordering constraint
    Unordered,
    /// Later accesses may not move before this one
    Acquire,
    /// Earlier accesses may not move after this one
    Release,
    /// Total order over all sequentially consistent operations
    SequentiallyConsistent,
}

impl MemoryAtomicityMode {
    fn to_bits(self) -> u8 {
        match self {
            MemoryAtomicityMode::Unordered => 0,
            MemoryAtomicityMode::Acquire => 1,
            MemoryAtomicityMode::Release => 2,
            MemoryAtomicityMode::SequentiallyConsistent => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => MemoryAtomicityMode::Unordered,
            1 => MemoryAtomicityMode::Acquire,
            2 => MemoryAtomicityMode::Release,
            _ => MemoryAtomicityMode::SequentiallyConsistent,
        }
    }

    /// True if this mode carries at least the guarantees of release
    pub fn is_release_or_stronger(self) -> bool {
        matches!(
            self,
            MemoryAtomicityMode::Release | MemoryAtomicityMode::SequentiallyConsistent
        )
    }

    /// True if this mode carries at least the guarantees of acquire
    pub fn is_acquire_or_stronger(self) -> bool {
        matches!(
            self,
            MemoryAtomicityMode::Acquire | MemoryAtomicityMode::SequentiallyConsistent
        )
    }

    /// LLVM spelling of the ordering, `None` for plain accesses
    pub fn llvm_ordering(self) -> Option<&'static str> {
        match self {
            MemoryAtomicityMode::Unordered => None,
            MemoryAtomicityMode::Acquire => Some("acquire"),
            MemoryAtomicityMode::Release => Some("release"),
            MemoryAtomicityMode::SequentiallyConsistent => Some("seq_cst"),
        }
    }
}

impl PartialOrd for MemoryAtomicityMode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use MemoryAtomicityMode::*;
        match (self, other) {
            (a, b) if a == b => Some(Ordering::Equal),
            (Unordered, _) => Some(Ordering::Less),
            (_, Unordered) => Some(Ordering::Greater),
            (SequentiallyConsistent, _) => Some(Ordering::Greater),
            (_, SequentiallyConsistent) => Some(Ordering::Less),
            // acquire vs release
            _ => None,
        }
    }
}

impl fmt::Display for MemoryAtomicityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryAtomicityMode::Unordered => "UNORDERED",
            MemoryAtomicityMode::Acquire => "ACQUIRE",
            MemoryAtomicityMode::Release => "RELEASE",
            MemoryAtomicityMode::SequentiallyConsistent => "SEQUENTIALLY_CONSISTENT",
        };
        f.write_str(name)
    }
}

/// Mutable, thread-safe holder for a node's atomicity mode
pub struct ModeCell(AtomicU8);

impl ModeCell {
    /// Create a cell holding `mode`
    pub fn new(mode: MemoryAtomicityMode) -> Self {
        Self(AtomicU8::new(mode.to_bits()))
    }

    /// Current mode
    pub fn get(&self) -> MemoryAtomicityMode {
        MemoryAtomicityMode::from_bits(self.0.load(AtomicOrdering::Acquire))
    }

    /// Move the mode down to `target`.
    ///
    /// Returns `true` if the mode changed. A target that is not strictly
    /// below the current mode leaves the cell untouched.
    pub fn weaken_to(&self, target: MemoryAtomicityMode) -> bool {
        self.0
            .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |bits| {
                let current = MemoryAtomicityMode::from_bits(bits);
                if target < current {
                    Some(target.to_bits())
                } else {
                    None
                }
            })
            .is_ok()
    }
}

impl Clone for ModeCell {
    fn clone(&self) -> Self {
        ModeCell::new(self.get())
    }
}

impl fmt::Debug for ModeCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}
