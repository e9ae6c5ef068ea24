//! String deduplication table cleaning.
//!
//! The dedup subsystem partitions its own table between workers, so this task
//! only brackets the parallel unlink with the subsystem's begin and end hooks.
//! The begin hook runs when the task is created and the end hook runs when it
//! is dropped, which covers a worker panicking inside the subsystem too.

use std::fmt;
use std::sync::Arc;

use crate::gang::GangTask;
use crate::liveness::{IsAlive, KeepAlive, ObjectRef};
use crate::metrics::CleaningStats;

/// The string deduplication subsystem.
pub trait StringDedup: Sync {
    /// Whether deduplication is switched on.
    fn is_enabled(&self) -> bool;

    /// Prepare the table for a cleaning pass, resizing it if asked to.
    fn begin_pass(&self, resize_table: bool);

    /// Finish the cleaning pass.
    fn end_pass(&self);

    /// Unlink dead entries from the part of the table `worker_id` owns.
    fn unlink_partition(&self, closure: &DedupUnlinkClosure<'_>, worker_id: u32);
}

/// Liveness and keep-alive callbacks handed to the dedup subsystem.
#[derive(Clone, Copy)]
pub struct DedupUnlinkClosure<'a> {
    is_alive: &'a dyn IsAlive,
    keep_alive: Option<&'a dyn KeepAlive>,
}

impl<'a> DedupUnlinkClosure<'a> {
    /// Bundle the callbacks.
    #[must_use]
    pub fn new(is_alive: &'a dyn IsAlive, keep_alive: Option<&'a dyn KeepAlive>) -> Self {
        Self {
            is_alive,
            keep_alive,
        }
    }

    /// `true` if `obj` survived the collection.
    #[must_use]
    pub fn is_alive(&self, obj: ObjectRef) -> bool {
        self.is_alive.is_alive(obj)
    }

    /// Keep `obj` alive. A no-op when the pass has no keep-alive callback.
    pub fn keep_alive(&self, obj: ObjectRef) {
        if let Some(keep_alive) = self.keep_alive {
            keep_alive.keep_alive(obj);
        }
    }

    /// Whether a keep-alive callback is installed.
    #[must_use]
    pub const fn has_keep_alive(&self) -> bool {
        self.keep_alive.is_some()
    }
}

impl fmt::Debug for DedupUnlinkClosure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupUnlinkClosure")
            .field("has_keep_alive", &self.has_keep_alive())
            .finish_non_exhaustive()
    }
}

/// Cleans the string dedup table in parallel.
pub struct StringDedupCleaningTask<'a, D: StringDedup + ?Sized> {
    dedup: &'a D,
    closure: DedupUnlinkClosure<'a>,
    /// Sampled once at creation so the end hook always matches the begin hook.
    enabled: bool,
    stats: Option<Arc<CleaningStats>>,
}

impl<'a, D: StringDedup + ?Sized> StringDedupCleaningTask<'a, D> {
    /// Open a dedup cleaning pass.
    ///
    /// Calls `begin_pass` right away if deduplication is enabled.
    pub fn new(
        dedup: &'a D,
        is_alive: &'a dyn IsAlive,
        keep_alive: Option<&'a dyn KeepAlive>,
        resize_table: bool,
    ) -> Self {
        let enabled = dedup.is_enabled();
        if enabled {
            dedup.begin_pass(resize_table);
        }

        Self {
            dedup,
            closure: DedupUnlinkClosure::new(is_alive, keep_alive),
            enabled,
            stats: None,
        }
    }

    /// Report progress into `stats` as well.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<CleaningStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Whether this pass talks to the dedup subsystem at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Unlink this worker's partition of the table.
    pub fn run_worker(&self, worker_id: u32) {
        if !self.enabled {
            return;
        }

        self.dedup.unlink_partition(&self.closure, worker_id);
        if let Some(stats) = &self.stats {
            CleaningStats::add(&stats.dedup_partitions, 1);
        }
    }

    /// Close the pass now instead of waiting for the task to go out of scope.
    pub fn finish(self) {
        drop(self);
    }
}

impl<D: StringDedup + ?Sized> Drop for StringDedupCleaningTask<'_, D> {
    fn drop(&mut self) {
        if self.enabled {
            self.dedup.end_pass();
        }
    }
}

impl<D: StringDedup + ?Sized> GangTask for StringDedupCleaningTask<'_, D> {
    fn name(&self) -> &'static str {
        "String Dedup Cleaning"
    }

    fn work(&self, worker_id: u32) {
        self.run_worker(worker_id);
    }
}
