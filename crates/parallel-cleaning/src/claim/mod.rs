//! Lock-free claim primitives.
//!
//! Everything a cleaning pass shares between workers goes through one of
//! these two types:
//! - [`SingleClaimGate`] for work that exactly one worker must do
//! - [`BatchCursor`] for handing out runs of a linked sequence
//!
//! Neither type ever blocks. A worker that loses a race either gives up (gate)
//! or retries straight away from the newer position (cursor).

pub mod cursor;
pub mod gate;

/// Atomics the claim primitives are built on. Under `--cfg loom` these are
/// loom's model-checked atomics.
mod sync {
    #[cfg(loom)]
    pub(crate) use loom::sync::atomic::{AtomicBool, AtomicUsize};
    #[cfg(not(loom))]
    pub(crate) use std::sync::atomic::{AtomicBool, AtomicUsize};
}

pub use cursor::{ArenaHandle, BatchCursor, LinkedSequence};
pub use gate::SingleClaimGate;
