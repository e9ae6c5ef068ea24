//! Lock-free parallel cleaning for the pause that follows a garbage collection.
//!
//! After marking, a managed runtime has to scrub everything that still points
//! at dead objects or unloaded classes. `parallel-cleaning` spreads that work
//! across a fixed gang of workers without any worker ever blocking on
//! another:
//!
//! - **Code cache**: dead compiled code is unloaded in batches claimed from a
//!   shared compare-and-swap cursor.
//! - **Class metadata**: one worker rebuilds the subclass tree, and everyone
//!   shares out the per-class weak-link cleaning.
//! - **String dedup**: the dedup table's own parallel unlink runs between
//!   begin and end hooks that always fire as a pair.
//! - **Compiler metadata**: released by a single worker, if the runtime has a
//!   compiler integration at all.
//!
//! # Quick Start
//!
//! ```ignore
//! use parallel_cleaning::{ParallelCleaningTask, WorkGang};
//!
//! // `runtime` implements `CleaningRuntime`, `is_alive` comes from marking.
//! let task = ParallelCleaningTask::new(&runtime, &is_alive, 4, true, false);
//! WorkGang::new("gc worker", 4).run_task(&task);
//! drop(task); // verifies the pass and closes the dedup pass
//! ```
//!
//! # Guarantees
//!
//! Within one pass every alive compiled unit is unloaded exactly once, every
//! instance class is cleaned exactly once, and each single-claim task runs at
//! most once. A broken guarantee is detected after the pass where possible
//! and aborts the process.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod claim;
pub mod code_cache;
pub mod config;
pub mod error;
pub mod gang;
pub mod jvmci;
pub mod klass;
mod liveness;
mod metrics;
mod parallel;
pub mod string_dedup;
mod tracing;

// Re-export public API
pub use claim::{ArenaHandle, BatchCursor, LinkedSequence, SingleClaimGate};
pub use code_cache::{CodeCache, CodeCacheUnloadingTask, CodeId};
pub use config::{CleaningConfig, DEFAULT_CLAIM_BATCH_SIZE};
pub use error::InvariantViolation;
pub use gang::{GangTask, WorkGang};
pub use jvmci::{CompilerMetadata, JvmciCleaningTask, NoCompilerMetadata};
pub use klass::{
    AtomicClassIterator, ClassId, ClassIterator, ClassKind, ClassRegistry, KlassCleaningTask,
};
pub use liveness::{IsAlive, KeepAlive, ObjectRef, UnloadingScope};
pub use metrics::{
    global_metrics, last_cleaning_metrics, recent_cleaning_metrics, CleaningMetrics,
    CleaningStats, GlobalMetrics,
};
pub use parallel::{CleaningRuntime, ParallelCleaningTask};
pub use string_dedup::{DedupUnlinkClosure, StringDedup, StringDedupCleaningTask};
pub use crate::tracing::{next_pass_id, CleaningPhase, PassId};
