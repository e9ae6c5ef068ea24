//! Invariant violations and the fatal path.
//!
//! A cleaning pass has no recoverable errors. Running out of work is the
//! normal way for a phase to end. Anything reported here means a registry is
//! now in an unknown state, and the only safe response is to stop the process.

use thiserror::Error;

use crate::code_cache::CodeId;

/// A broken exactly-once guarantee in the code cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// The number of unload calls does not match the alive units counted
    /// before the pass.
    #[error("{unloaded} compiled units unloaded but {expected} were alive when the pass started")]
    UnloadCountMismatch {
        /// Alive units found by the pre-pass scan.
        expected: usize,
        /// Units actually handed to `unload`.
        unloaded: usize,
    },

    /// A compiled unit was unloaded more than once.
    #[error("compiled unit {unit:?} unloaded {count} times")]
    DuplicateUnload {
        /// The offending unit.
        unit: CodeId,
        /// How many times it was unloaded.
        count: u32,
    },

    /// An alive compiled unit was never unloaded.
    #[error("compiled unit {0:?} was alive but never unloaded")]
    MissedUnload(CodeId),

    /// The code cache's own consistency check failed.
    #[error("code cache verification failed: {0}")]
    CodeCache(String),
}

/// Report `violation` and abort the process.
///
/// Never unwinds: continuing, or letting destructors run against a corrupted
/// registry, is not safe.
#[cold]
pub fn fatal(violation: &InvariantViolation) -> ! {
    #[cfg(feature = "tracing")]
    tracing::error!(%violation, "parallel cleaning invariant violated");

    eprintln!("parallel cleaning invariant violated: {violation} - aborting process");
    std::process::abort()
}
