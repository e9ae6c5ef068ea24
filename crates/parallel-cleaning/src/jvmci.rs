//! Compiler metadata cleanup.
//!
//! Only runtimes with an external compiler integration have metadata handles
//! to release. Runtimes without one plug in [`NoCompilerMetadata`] and the
//! task turns into a no-op, so the orchestrator runs the same sequence either
//! way.

use std::sync::Arc;

use crate::claim::SingleClaimGate;
use crate::metrics::CleaningStats;

/// Optional compiler-integration capability.
pub trait CompilerMetadata: Sync {
    /// Whether the integration is switched on in this process.
    fn is_enabled(&self) -> bool;

    /// Release metadata handles that point at unloaded code or classes.
    fn unload_metadata(&self, unloading_occurred: bool);
}

/// Stand-in for runtimes built without a compiler integration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoCompilerMetadata;

impl CompilerMetadata for NoCompilerMetadata {
    fn is_enabled(&self) -> bool {
        false
    }

    fn unload_metadata(&self, _unloading_occurred: bool) {}
}

/// Runs the compiler metadata cleanup on exactly one worker.
pub struct JvmciCleaningTask<'a, M: CompilerMetadata + ?Sized> {
    metadata: &'a M,
    gate: SingleClaimGate,
    stats: Option<Arc<CleaningStats>>,
}

impl<'a, M: CompilerMetadata + ?Sized> JvmciCleaningTask<'a, M> {
    /// Prepare the task.
    #[allow(clippy::missing_const_for_fn)] // gate construction is not const under loom
    pub fn new(metadata: &'a M) -> Self {
        Self {
            metadata,
            gate: SingleClaimGate::new(),
            stats: None,
        }
    }

    /// Report progress into `stats` as well.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<CleaningStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// `true` for exactly one caller per pass.
    pub fn claim_cleaning_task(&self) -> bool {
        self.gate.try_claim()
    }

    /// Unload compiler metadata if nobody has yet.
    ///
    /// Does nothing unless classes were unloaded and the integration is on.
    /// Returns `true` if this call did the cleanup.
    pub fn run_worker(&self, unloading_occurred: bool) -> bool {
        if !(unloading_occurred && self.metadata.is_enabled() && self.claim_cleaning_task()) {
            return false;
        }

        self.metadata.unload_metadata(unloading_occurred);
        if let Some(stats) = &self.stats {
            CleaningStats::set(&stats.compiler_metadata_unloaded);
        }
        true
    }
}
