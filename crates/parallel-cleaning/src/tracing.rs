//! Cleaning pass tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! tracing spans and events for cleaning passes and their phases.

use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identifier for a cleaning pass.
///
/// Correlates every event emitted by one pass. It is a monotonically
/// increasing counter that starts at 1 and is shared by the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub u64);

/// Global counter for generating unique pass IDs.
static NEXT_PASS_ID: AtomicU64 = AtomicU64::new(1);

/// Generate the next unique pass ID.
pub fn next_pass_id() -> PassId {
    PassId(NEXT_PASS_ID.fetch_add(1, Ordering::Relaxed))
}

/// The sub-phases every worker runs through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningPhase {
    /// Release compiler metadata handles.
    Jvmci,
    /// Unload dead compiled code.
    CodeCache,
    /// Unlink dead entries from the deduplication table.
    StringDedup,
    /// Rebuild the subclass tree and clean per-class weak links.
    Klass,
}

#[cfg(feature = "tracing")]
pub mod internal {
    use tracing::{span, Level, Span};

    use super::{CleaningPhase, PassId};

    /// Create the span for an entire cleaning pass.
    ///
    /// Not entered here: the pass is shared by every worker thread, and each
    /// one enters it for the duration of its own `run_worker` call.
    pub fn trace_cleaning_pass(pass: PassId, num_workers: u32, unloading_occurred: bool) -> Span {
        span!(
            Level::DEBUG,
            "parallel_cleaning",
            pass_id = pass.0,
            num_workers,
            unloading_occurred
        )
    }

    /// Create a span for one worker's phase.
    pub fn trace_phase(pass: PassId, worker_id: u32, phase: CleaningPhase) -> span::EnteredSpan {
        span!(
            Level::TRACE,
            "cleaning_phase",
            pass_id = pass.0,
            worker_id,
            phase = ?phase
        )
        .entered()
    }

    /// Log that a worker finished a phase and how many items it handled.
    pub fn log_phase_end(worker_id: u32, phase: CleaningPhase, items: usize) {
        tracing::trace!(worker_id, phase = ?phase, items, "phase_end");
    }
}
