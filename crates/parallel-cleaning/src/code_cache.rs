//! Parallel unloading of dead compiled code.
//!
//! Workers share one [`BatchCursor`] over the code cache's alive units and
//! claim them in batches. The first alive unit is found before any worker
//! starts and is unloaded by worker 0 outside the cursor, so the cursor never
//! has to be initialized concurrently.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::claim::{ArenaHandle, BatchCursor, LinkedSequence, SingleClaimGate};
use crate::error::{fatal, InvariantViolation};
use crate::liveness::{IsAlive, UnloadingScope};
use crate::metrics::CleaningStats;
use crate::tracing::PassId;

/// Handle to one compiled unit in the code cache arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeId(usize);

impl CodeId {
    /// Handle for the unit stored at `index`.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Arena position of this unit.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl ArenaHandle for CodeId {
    fn index(self) -> usize {
        self.0
    }

    fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// The compiled code registry, as seen by the cleaning pass.
///
/// Nothing else mutates the registry while a pass runs, so the alive relation
/// is stable for the whole pass.
pub trait CodeCache: Sync {
    /// The first alive unit, if any.
    fn first_alive(&self) -> Option<CodeId>;

    /// The next alive unit after `unit`.
    fn next_alive(&self, unit: CodeId) -> Option<CodeId>;

    /// Unload whatever `unit` holds that died in this collection.
    ///
    /// Called exactly once per alive unit per pass.
    fn unload(&self, unit: CodeId, scope: &UnloadingScope<'_>, unloading_occurred: bool);

    /// Consistency checks to run once all workers have finished.
    ///
    /// # Errors
    ///
    /// Returns the violation found. The pass treats any error as fatal.
    fn verify_after_unloading(&self) -> Result<(), InvariantViolation> {
        Ok(())
    }
}

/// Walks a code cache's alive units.
struct AliveUnits<'a, C: ?Sized>(&'a C);

impl<C: CodeCache + ?Sized> LinkedSequence<CodeId> for AliveUnits<'_, C> {
    fn next_after(&self, unit: CodeId) -> Option<CodeId> {
        self.0.next_alive(unit)
    }
}

/// Distributes code cache unloading across the workers of one pass.
pub struct CodeCacheUnloadingTask<'a, C: CodeCache + ?Sized> {
    code_cache: &'a C,
    scope: UnloadingScope<'a>,
    unloading_occurred: bool,
    num_workers: u32,
    batch_size: NonZeroUsize,
    first: Option<CodeId>,
    first_gate: SingleClaimGate,
    cursor: BatchCursor<CodeId>,
    /// Alive units counted before the pass, if verification is on.
    expected_units: Option<usize>,
    unloaded: AtomicUsize,
    workers_run: AtomicUsize,
    stats: Option<Arc<CleaningStats>>,
}

impl<'a, C: CodeCache + ?Sized> CodeCacheUnloadingTask<'a, C> {
    /// Prepare the task. Must be called before any worker starts.
    ///
    /// With `verify` set, the whole alive list is walked once here so the
    /// unload count can be checked when the task is dropped.
    pub fn new(
        code_cache: &'a C,
        is_alive: &'a dyn IsAlive,
        pass: PassId,
        num_workers: u32,
        unloading_occurred: bool,
        batch_size: NonZeroUsize,
        verify: bool,
    ) -> Self {
        debug_assert!(num_workers >= 1, "a cleaning pass needs at least one worker");

        let first = code_cache.first_alive();
        let expected_units = verify.then(|| {
            std::iter::successors(first, |&unit| code_cache.next_alive(unit)).count()
        });

        Self {
            code_cache,
            scope: UnloadingScope::new(is_alive, pass),
            unloading_occurred,
            num_workers,
            batch_size,
            first,
            first_gate: SingleClaimGate::new(),
            cursor: BatchCursor::new(first),
            expected_units,
            unloaded: AtomicUsize::new(0),
            workers_run: AtomicUsize::new(0),
            stats: None,
        }
    }

    /// Report progress into `stats` as well.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<CleaningStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// The unit found by the pre-pass scan.
    #[must_use]
    pub const fn first_unit(&self) -> Option<CodeId> {
        self.first
    }

    /// Claim the next batch of alive units into `out`.
    ///
    /// `out` is empty on return only when no alive units are left. Returns the
    /// number of cursor races lost along the way.
    pub fn claim_batch(&self, out: &mut Vec<CodeId>) -> usize {
        self.cursor
            .claim_batch_into(&AliveUnits(self.code_cache), self.batch_size, out)
    }

    /// Unload this worker's share of the code cache.
    pub fn run_worker(&self, worker_id: u32) -> usize {
        debug_assert!(
            worker_id < self.num_workers,
            "worker {worker_id} out of range for {} workers",
            self.num_workers
        );
        self.workers_run.fetch_add(1, Ordering::Relaxed);

        let mut unloaded = 0;

        // The cursor starts at the first unit, so it never hands it out.
        if worker_id == 0 {
            if let Some(first) = self.first {
                if self.first_gate.try_claim() {
                    self.unload(first);
                    unloaded += 1;
                }
            }
        }

        let mut batch = Vec::with_capacity(self.batch_size.get());
        loop {
            let lost_races = self.claim_batch(&mut batch);
            if let Some(stats) = &self.stats {
                CleaningStats::add(&stats.claim_retries, lost_races);
            }

            if batch.is_empty() {
                break;
            }

            if let Some(stats) = &self.stats {
                CleaningStats::add(&stats.batches_claimed, 1);
            }
            for &unit in &batch {
                self.unload(unit);
            }
            unloaded += batch.len();
        }

        unloaded
    }

    fn unload(&self, unit: CodeId) {
        self.code_cache
            .unload(unit, &self.scope, self.unloading_occurred);
        self.unloaded.fetch_add(1, Ordering::Relaxed);
        if let Some(stats) = &self.stats {
            CleaningStats::add(&stats.units_unloaded, 1);
        }
    }

    /// Units unloaded so far by all workers.
    #[must_use]
    pub fn units_unloaded(&self) -> usize {
        self.unloaded.load(Ordering::Acquire)
    }

    /// Check the finished pass.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: a mismatch against the pre-pass
    /// count, or whatever the code cache's own verification reports.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        check_unload_count(self.expected_units, self.units_unloaded())?;
        self.code_cache.verify_after_unloading()
    }
}

impl<C: CodeCache + ?Sized> Drop for CodeCacheUnloadingTask<'_, C> {
    fn drop(&mut self) {
        // A pass that never started, or one torn down by a worker panic, has
        // nothing meaningful to verify.
        if std::thread::panicking() || self.workers_run.load(Ordering::Acquire) == 0 {
            return;
        }

        if let Err(violation) = self.verify() {
            fatal(&violation);
        }
    }
}

/// Compare the unload count against the pre-pass scan.
///
/// # Errors
///
/// Returns [`InvariantViolation::UnloadCountMismatch`] if both are known and
/// they differ.
pub fn check_unload_count(
    expected: Option<usize>,
    unloaded: usize,
) -> Result<(), InvariantViolation> {
    match expected {
        Some(expected) if expected != unloaded => {
            Err(InvariantViolation::UnloadCountMismatch { expected, unloaded })
        }
        _ => Ok(()),
    }
}
