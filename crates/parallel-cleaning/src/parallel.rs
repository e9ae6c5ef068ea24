//! The parallel cleaning orchestrator.
//!
//! One [`ParallelCleaningTask`] is built per collection. Every worker calls
//! [`ParallelCleaningTask::run_worker`] once, and each call goes through the
//! sub-tasks in a fixed order:
//!
//! 1. compiler metadata (a single claim, so it goes first while contention on
//!    the gate is lowest)
//! 2. code cache unloading
//! 3. string dedup unlinking
//! 4. class metadata cleaning, only if classes were unloaded
//!
//! Workers never wait on each other between phases. A worker that runs out of
//! work in one phase moves straight on to the next.

use std::sync::Arc;
use std::time::Instant;

use crate::code_cache::{CodeCache, CodeCacheUnloadingTask};
use crate::config::CleaningConfig;
use crate::gang::GangTask;
use crate::jvmci::{CompilerMetadata, JvmciCleaningTask};
use crate::klass::{ClassRegistry, KlassCleaningTask};
use crate::liveness::IsAlive;
use crate::metrics::{record_metrics, CleaningMetrics, CleaningStats};
use crate::string_dedup::{StringDedup, StringDedupCleaningTask};
use crate::tracing::{next_pass_id, PassId};

#[cfg(feature = "tracing")]
use crate::tracing::{internal, CleaningPhase};

/// The registries and subsystems one runtime exposes to the cleaning pass.
pub trait CleaningRuntime: Sync {
    /// Compiled code registry.
    type CodeCache: CodeCache;
    /// Loaded class registry.
    type Classes: ClassRegistry;
    /// String deduplication subsystem.
    type StringDedup: StringDedup;
    /// Compiler integration, or [`NoCompilerMetadata`](crate::NoCompilerMetadata).
    type CompilerMetadata: CompilerMetadata;

    /// The code cache.
    fn code_cache(&self) -> &Self::CodeCache;

    /// The class registry.
    fn classes(&self) -> &Self::Classes;

    /// The dedup subsystem.
    fn string_dedup(&self) -> &Self::StringDedup;

    /// The compiler integration.
    fn compiler_metadata(&self) -> &Self::CompilerMetadata;
}

/// Runs the whole post-collection cleanup across a gang of workers.
///
/// Field order is drop order: class cleaning, then compiler metadata, then
/// code cache verification, and last the dedup end hook. That is the reverse
/// of construction order.
pub struct ParallelCleaningTask<'a, R: CleaningRuntime> {
    klass: KlassCleaningTask<'a, R::Classes>,
    jvmci: JvmciCleaningTask<'a, R::CompilerMetadata>,
    code_cache: CodeCacheUnloadingTask<'a, R::CodeCache>,
    string_dedup: StringDedupCleaningTask<'a, R::StringDedup>,
    stats: Arc<CleaningStats>,
    unloading_occurred: bool,
    num_workers: u32,
    pass: PassId,
    started: Instant,
    /// One span for the whole pass, entered by every worker.
    #[cfg(feature = "tracing")]
    span: tracing::Span,
}

impl<'a, R: CleaningRuntime> ParallelCleaningTask<'a, R> {
    /// Task name reported to worker gangs.
    pub const NAME: &'static str = "Parallel Cleaning";

    /// Prepare a pass for `num_workers` workers with default tuning.
    pub fn new(
        runtime: &'a R,
        is_alive: &'a dyn IsAlive,
        num_workers: u32,
        unloading_occurred: bool,
        resize_dedup_table: bool,
    ) -> Self {
        let mut config = CleaningConfig::new(num_workers);
        config.set_resize_dedup_table(resize_dedup_table);
        Self::with_config(runtime, is_alive, unloading_occurred, &config)
    }

    /// Prepare a pass from a full configuration.
    pub fn with_config(
        runtime: &'a R,
        is_alive: &'a dyn IsAlive,
        unloading_occurred: bool,
        config: &CleaningConfig,
    ) -> Self {
        let pass = next_pass_id();
        let stats = Arc::new(CleaningStats::new());
        let num_workers = config.effective_workers();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            pass_id = pass.0,
            num_workers,
            unloading_occurred,
            batch_size = config.claim_batch_size.get(),
            "parallel_cleaning_prepare"
        );

        let string_dedup = StringDedupCleaningTask::new(
            runtime.string_dedup(),
            is_alive,
            None,
            config.resize_dedup_table,
        )
        .with_stats(Arc::clone(&stats));
        let code_cache = CodeCacheUnloadingTask::new(
            runtime.code_cache(),
            is_alive,
            pass,
            num_workers,
            unloading_occurred,
            config.claim_batch_size,
            config.verify_after_pass,
        )
        .with_stats(Arc::clone(&stats));
        let jvmci =
            JvmciCleaningTask::new(runtime.compiler_metadata()).with_stats(Arc::clone(&stats));
        let klass = KlassCleaningTask::new(runtime.classes()).with_stats(Arc::clone(&stats));

        Self {
            klass,
            jvmci,
            code_cache,
            string_dedup,
            stats,
            unloading_occurred,
            num_workers,
            pass,
            started: Instant::now(),
            #[cfg(feature = "tracing")]
            span: internal::trace_cleaning_pass(pass, num_workers, unloading_occurred),
        }
    }

    /// The id of this pass.
    #[must_use]
    pub const fn pass(&self) -> PassId {
        self.pass
    }

    /// Number of workers this pass was prepared for.
    #[must_use]
    pub const fn num_workers(&self) -> u32 {
        self.num_workers
    }

    /// Whether class unloading happened in the triggering collection.
    #[must_use]
    pub const fn unloading_occurred(&self) -> bool {
        self.unloading_occurred
    }

    /// The parallel work done by one worker.
    pub fn run_worker(&self, worker_id: u32) {
        debug_assert!(
            worker_id < self.num_workers,
            "worker {worker_id} out of range for {} workers",
            self.num_workers
        );
        CleaningStats::add(&self.stats.workers_run, 1);

        #[cfg(feature = "tracing")]
        let _pass = self.span.enter();

        // Serial task, so get it out of the way first.
        {
            #[cfg(feature = "tracing")]
            let _phase = internal::trace_phase(self.pass, worker_id, CleaningPhase::Jvmci);
            let ran = self.jvmci.run_worker(self.unloading_occurred);
            #[cfg(feature = "tracing")]
            internal::log_phase_end(worker_id, CleaningPhase::Jvmci, usize::from(ran));
            #[cfg(not(feature = "tracing"))]
            let _ = ran;
        }

        {
            #[cfg(feature = "tracing")]
            let _phase = internal::trace_phase(self.pass, worker_id, CleaningPhase::CodeCache);
            let unloaded = self.code_cache.run_worker(worker_id);
            #[cfg(feature = "tracing")]
            internal::log_phase_end(worker_id, CleaningPhase::CodeCache, unloaded);
            #[cfg(not(feature = "tracing"))]
            let _ = unloaded;
        }

        {
            #[cfg(feature = "tracing")]
            let _phase = internal::trace_phase(self.pass, worker_id, CleaningPhase::StringDedup);
            self.string_dedup.run_worker(worker_id);
        }

        // Weak class metadata only needs cleaning if something was unloaded.
        if self.unloading_occurred {
            #[cfg(feature = "tracing")]
            let _phase = internal::trace_phase(self.pass, worker_id, CleaningPhase::Klass);
            let cleaned = self.klass.run_worker();
            #[cfg(feature = "tracing")]
            internal::log_phase_end(worker_id, CleaningPhase::Klass, cleaned);
            #[cfg(not(feature = "tracing"))]
            let _ = cleaned;
        }
    }

    /// Snapshot of this pass's counters so far.
    #[must_use]
    pub fn metrics(&self) -> CleaningMetrics {
        CleaningMetrics {
            duration: self.started.elapsed(),
            ..self.stats.snapshot(self.pass, self.unloading_occurred)
        }
    }
}

impl<R: CleaningRuntime> Drop for ParallelCleaningTask<'_, R> {
    fn drop(&mut self) {
        let metrics = self.metrics();

        #[cfg(feature = "tracing")]
        let _pass = self.span.enter();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            pass_id = self.pass.0,
            units_unloaded = metrics.units_unloaded,
            classes_cleaned = metrics.classes_cleaned,
            claim_retries = metrics.claim_retries,
            duration_us = u64::try_from(metrics.duration.as_micros()).unwrap_or(u64::MAX),
            "parallel_cleaning_done"
        );

        record_metrics(metrics);
    }
}

impl<R: CleaningRuntime> GangTask for ParallelCleaningTask<'_, R> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn work(&self, worker_id: u32) {
        self.run_worker(worker_id);
    }
}
