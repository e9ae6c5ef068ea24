//! Cleaning pass metrics and statistics.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{const_mutex, Mutex};

use crate::tracing::PassId;

/// Number of passes kept by [`recent_cleaning_metrics`].
pub const HISTORY_SIZE: usize = 64;

/// Statistics from one parallel cleaning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleaningMetrics {
    /// The pass these numbers belong to.
    pub pass: PassId,
    /// Whether class unloading happened in the triggering collection.
    pub unloading_occurred: bool,
    /// Workers that entered the pass.
    pub workers_run: usize,
    /// Compiled units handed to `unload`, sentinel included.
    pub units_unloaded: usize,
    /// Non-empty batches claimed from the code cache cursor.
    pub batches_claimed: usize,
    /// Cursor compare-and-swap attempts lost to other workers.
    pub claim_retries: usize,
    /// Instance classes whose weak links were cleaned.
    pub classes_cleaned: usize,
    /// Non-instance classes skipped by the class iterator.
    pub classes_skipped: usize,
    /// Whether the subclass tree was rebuilt.
    pub subclass_tree_rebuilt: bool,
    /// Whether compiler metadata was unloaded.
    pub compiler_metadata_unloaded: bool,
    /// Calls made into the dedup table's parallel unlink.
    pub dedup_partitions: usize,
    /// Time from task construction to task drop.
    pub duration: Duration,
}

impl Default for CleaningMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CleaningMetrics {
    /// Create a new `CleaningMetrics` with all fields set to zero/defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pass: PassId(0),
            unloading_occurred: false,
            workers_run: 0,
            units_unloaded: 0,
            batches_claimed: 0,
            claim_retries: 0,
            classes_cleaned: 0,
            classes_skipped: 0,
            subclass_tree_rebuilt: false,
            compiler_metadata_unloaded: false,
            dedup_partitions: 0,
            duration: Duration::ZERO,
        }
    }
}

/// Live counters shared by the workers of one pass.
///
/// Every update is `Relaxed`: the numbers are only read after the worker pool
/// has joined, and the join provides the ordering.
#[derive(Debug, Default)]
pub struct CleaningStats {
    pub(crate) workers_run: AtomicUsize,
    pub(crate) units_unloaded: AtomicUsize,
    pub(crate) batches_claimed: AtomicUsize,
    pub(crate) claim_retries: AtomicUsize,
    pub(crate) classes_cleaned: AtomicUsize,
    pub(crate) classes_skipped: AtomicUsize,
    pub(crate) subclass_tree_rebuilt: AtomicBool,
    pub(crate) compiler_metadata_unloaded: AtomicBool,
    pub(crate) dedup_partitions: AtomicUsize,
}

impl CleaningStats {
    /// Create zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            workers_run: AtomicUsize::new(0),
            units_unloaded: AtomicUsize::new(0),
            batches_claimed: AtomicUsize::new(0),
            claim_retries: AtomicUsize::new(0),
            classes_cleaned: AtomicUsize::new(0),
            classes_skipped: AtomicUsize::new(0),
            subclass_tree_rebuilt: AtomicBool::new(false),
            compiler_metadata_unloaded: AtomicBool::new(false),
            dedup_partitions: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set(flag: &AtomicBool) {
        flag.store(true, Ordering::Relaxed);
    }

    /// Copy the counters into a snapshot.
    #[must_use]
    pub fn snapshot(&self, pass: PassId, unloading_occurred: bool) -> CleaningMetrics {
        CleaningMetrics {
            pass,
            unloading_occurred,
            workers_run: self.workers_run.load(Ordering::Relaxed),
            units_unloaded: self.units_unloaded.load(Ordering::Relaxed),
            batches_claimed: self.batches_claimed.load(Ordering::Relaxed),
            claim_retries: self.claim_retries.load(Ordering::Relaxed),
            classes_cleaned: self.classes_cleaned.load(Ordering::Relaxed),
            classes_skipped: self.classes_skipped.load(Ordering::Relaxed),
            subclass_tree_rebuilt: self.subclass_tree_rebuilt.load(Ordering::Relaxed),
            compiler_metadata_unloaded: self.compiler_metadata_unloaded.load(Ordering::Relaxed),
            dedup_partitions: self.dedup_partitions.load(Ordering::Relaxed),
            duration: Duration::ZERO,
        }
    }
}

/// Process-wide totals across every recorded pass.
#[derive(Debug)]
pub struct GlobalMetrics {
    passes: AtomicU64,
    passes_with_unloading: AtomicU64,
    units_unloaded: AtomicU64,
    classes_cleaned: AtomicU64,
    claim_retries: AtomicU64,
    pass_ns: AtomicU64,
}

impl GlobalMetrics {
    const fn new() -> Self {
        Self {
            passes: AtomicU64::new(0),
            passes_with_unloading: AtomicU64::new(0),
            units_unloaded: AtomicU64::new(0),
            classes_cleaned: AtomicU64::new(0),
            claim_retries: AtomicU64::new(0),
            pass_ns: AtomicU64::new(0),
        }
    }

    /// Passes recorded since process start.
    #[inline]
    #[must_use]
    pub fn total_passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Passes that ran with `unloading_occurred` set.
    #[inline]
    #[must_use]
    pub fn total_passes_with_unloading(&self) -> u64 {
        self.passes_with_unloading.load(Ordering::Relaxed)
    }

    /// Compiled units unloaded across all passes.
    #[inline]
    #[must_use]
    pub fn total_units_unloaded(&self) -> u64 {
        self.units_unloaded.load(Ordering::Relaxed)
    }

    /// Classes cleaned across all passes.
    #[inline]
    #[must_use]
    pub fn total_classes_cleaned(&self) -> u64 {
        self.classes_cleaned.load(Ordering::Relaxed)
    }

    /// Cursor races lost across all passes.
    #[inline]
    #[must_use]
    pub fn total_claim_retries(&self) -> u64 {
        self.claim_retries.load(Ordering::Relaxed)
    }

    /// Wall time spent in passes, in nanoseconds.
    #[inline]
    #[must_use]
    pub fn total_pass_ns(&self) -> u64 {
        self.pass_ns.load(Ordering::Relaxed)
    }
}

static GLOBAL_METRICS: GlobalMetrics = GlobalMetrics::new();

static HISTORY: Mutex<VecDeque<CleaningMetrics>> = const_mutex(VecDeque::new());

/// Get the process-wide cleaning totals.
#[must_use]
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}

thread_local! {
    static LAST_METRICS: Cell<CleaningMetrics> = const { Cell::new(CleaningMetrics::new()) };
}

/// Get metrics from the last pass recorded on this thread.
#[must_use]
pub fn last_cleaning_metrics() -> CleaningMetrics {
    LAST_METRICS.with(Cell::get)
}

/// Get up to `n` of the most recent passes recorded by any thread, newest first.
#[must_use]
pub fn recent_cleaning_metrics(n: usize) -> Vec<CleaningMetrics> {
    HISTORY.lock().iter().rev().take(n).copied().collect()
}

/// Record metrics for a finished pass.
pub fn record_metrics(metrics: CleaningMetrics) {
    LAST_METRICS.with(|m| m.set(metrics));

    let g = global_metrics();
    g.passes.fetch_add(1, Ordering::Relaxed);
    if metrics.unloading_occurred {
        g.passes_with_unloading.fetch_add(1, Ordering::Relaxed);
    }
    g.units_unloaded
        .fetch_add(metrics.units_unloaded as u64, Ordering::Relaxed);
    g.classes_cleaned
        .fetch_add(metrics.classes_cleaned as u64, Ordering::Relaxed);
    g.claim_retries
        .fetch_add(metrics.claim_retries as u64, Ordering::Relaxed);
    g.pass_ns.fetch_add(
        metrics.duration.as_nanos().try_into().unwrap_or(u64::MAX),
        Ordering::Relaxed,
    );

    let mut history = HISTORY.lock();
    if history.len() == HISTORY_SIZE {
        history.pop_front();
    }
    history.push_back(metrics);
}
