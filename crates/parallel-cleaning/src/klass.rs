//! Parallel cleaning of class metadata after class unloading.
//!
//! Two kinds of work:
//! - one global rebuild of the subclass/sibling tree, done by whichever
//!   worker wins a [`SingleClaimGate`]
//! - per-class cleaning of weak links, handed out by a shared
//!   [`ClassIterator`] so every instance class is cleaned by exactly one
//!   worker

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;

use crate::claim::SingleClaimGate;
use crate::metrics::CleaningStats;

/// Handle to one loaded class in the class registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

impl ClassId {
    /// Handle for the class stored at `index`.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Arena position of this class.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Layout category of a loaded class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// A class describing an object layout. The only kind that gets cleaned.
    Instance,
    /// An array of references.
    ObjectArray,
    /// An array of primitives.
    TypeArray,
}

impl ClassKind {
    /// Whether classes of this kind carry weak links that need cleaning.
    #[must_use]
    pub const fn is_instance(self) -> bool {
        matches!(self, Self::Instance)
    }
}

/// Shared iterator over every loaded class.
///
/// `next_class` may be called from many threads at once. Across all callers
/// every class is returned exactly once, after which every call returns
/// `None`.
pub trait ClassIterator: Sync {
    /// Claim the next class nobody has seen yet.
    fn next_class(&self) -> Option<ClassId>;
}

/// The loaded-class registry, as seen by the cleaning pass.
pub trait ClassRegistry: Sync {
    /// Iterator type handed out for one pass.
    type Iter: ClassIterator;

    /// A fresh iterator over every loaded class, instance or not.
    fn class_iterator(&self) -> Self::Iter;

    /// Layout category of `class`.
    fn kind(&self, class: ClassId) -> ClassKind;

    /// Drop unloaded classes from the subclass/sibling tree.
    ///
    /// Called at most once per pass.
    fn clean_subclass_tree(&self);

    /// Release the stale metadata references held by `class`.
    ///
    /// Only called for instance classes, at most once per class per pass.
    fn clean_weak_class_links(&self, class: ClassId);
}

/// [`ClassIterator`] over a registry stored as a dense arena `0..len`.
///
/// Each claim is a compare-and-swap on the next unclaimed index. The index
/// never moves past `len`, so an exhausted iterator stays exhausted no matter
/// how many workers keep polling it.
#[derive(Debug)]
pub struct AtomicClassIterator {
    next: CachePadded<AtomicUsize>,
    len: usize,
}

impl AtomicClassIterator {
    /// Iterate over classes `0..len`.
    #[must_use]
    pub const fn new(len: usize) -> Self {
        Self {
            next: CachePadded::new(AtomicUsize::new(0)),
            len,
        }
    }

    /// Classes not yet claimed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.len - self.next.load(Ordering::Acquire)
    }
}

impl ClassIterator for AtomicClassIterator {
    fn next_class(&self) -> Option<ClassId> {
        let mut current = self.next.load(Ordering::Acquire);
        loop {
            if current >= self.len {
                return None;
            }

            match self.next.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(ClassId(current)),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Distributes class metadata cleaning across the workers of one pass.
pub struct KlassCleaningTask<'a, R: ClassRegistry + ?Sized> {
    registry: &'a R,
    tree_gate: SingleClaimGate,
    classes: R::Iter,
    stats: Option<Arc<CleaningStats>>,
}

impl<'a, R: ClassRegistry + ?Sized> KlassCleaningTask<'a, R> {
    /// Prepare the task with a fresh class iterator.
    pub fn new(registry: &'a R) -> Self {
        Self {
            registry,
            tree_gate: SingleClaimGate::new(),
            classes: registry.class_iterator(),
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
    pub fn claim_subclass_tree_rebuild(&self) -> bool {
        self.tree_gate.try_claim()
    }

    /// Claim the next instance class, skipping every other kind.
    pub fn claim_next_class(&self) -> Option<ClassId> {
        let mut skipped = 0;
        let claimed = loop {
            match self.classes.next_class() {
                Some(class) if self.registry.kind(class).is_instance() => break Some(class),
                Some(_) => skipped += 1,
                None => break None,
            }
        };

        if let Some(stats) = &self.stats {
            CleaningStats::add(&stats.classes_skipped, skipped);
        }
        claimed
    }

    /// Do this worker's share of class cleaning. Returns the number of classes
    /// it cleaned.
    pub fn run_worker(&self) -> usize {
        if self.claim_subclass_tree_rebuild() {
            self.registry.clean_subclass_tree();
            if let Some(stats) = &self.stats {
                CleaningStats::set(&stats.subclass_tree_rebuilt);
            }
        }

        let mut cleaned = 0;
        while let Some(class) = self.claim_next_class() {
            self.registry.clean_weak_class_links(class);
            cleaned += 1;
        }

        if let Some(stats) = &self.stats {
            CleaningStats::add(&stats.classes_cleaned, cleaned);
        }
        cleaned
    }
}
