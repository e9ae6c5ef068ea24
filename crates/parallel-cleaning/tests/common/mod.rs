//! Arena-backed stand-ins for the registries a cleaning pass walks.
//!
//! Every callback is counted so tests can check exactly-once behaviour after
//! the pass.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use parallel_cleaning::{
    AtomicClassIterator, ClassId, ClassKind, ClassRegistry, CleaningRuntime, CodeCache, CodeId,
    CompilerMetadata, DedupUnlinkClosure, InvariantViolation, ObjectRef, StringDedup,
    UnloadingScope,
};

/// Compiled units `0..len`; only the ones flagged alive take part in a pass.
pub struct MockCodeCache {
    alive: Vec<bool>,
    unloads: Vec<AtomicU32>,
    /// Every unload, in the order workers performed them.
    pub log: SegQueue<(CodeId, bool)>,
}

impl MockCodeCache {
    pub fn new(alive: Vec<bool>) -> Self {
        let unloads = alive.iter().map(|_| AtomicU32::new(0)).collect();
        Self {
            alive,
            unloads,
            log: SegQueue::new(),
        }
    }

    pub fn all_alive(len: usize) -> Self {
        Self::new(vec![true; len])
    }

    pub fn unload_counts(&self) -> Vec<u32> {
        self.unloads
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    pub fn total_unloads(&self) -> u32 {
        self.unload_counts().iter().sum()
    }

    /// Each alive unit unloaded exactly once, no dead unit touched.
    pub fn assert_exactly_once(&self) {
        for (index, (&alive, count)) in self.alive.iter().zip(self.unload_counts()).enumerate() {
            let expected = u32::from(alive);
            assert_eq!(
                count, expected,
                "unit {index} (alive: {alive}) unloaded {count} times"
            );
        }
    }
}

impl CodeCache for MockCodeCache {
    fn first_alive(&self) -> Option<CodeId> {
        self.alive.iter().position(|&a| a).map(CodeId::new)
    }

    fn next_alive(&self, unit: CodeId) -> Option<CodeId> {
        let start = unit.index() + 1;
        self.alive[start..]
            .iter()
            .position(|&a| a)
            .map(|offset| CodeId::new(start + offset))
    }

    fn unload(&self, unit: CodeId, scope: &UnloadingScope<'_>, unloading_occurred: bool) {
        // Ask the predicate about an embedded oop, like a real unit would.
        let _ = scope.is_alive(ObjectRef(unit.index()));
        self.unloads[unit.index()].fetch_add(1, Ordering::Relaxed);
        self.log.push((unit, unloading_occurred));
    }

    fn verify_after_unloading(&self) -> Result<(), InvariantViolation> {
        for (index, (&alive, count)) in self.alive.iter().zip(self.unload_counts()).enumerate() {
            let unit = CodeId::new(index);
            match (alive, count) {
                (true, 0) => return Err(InvariantViolation::MissedUnload(unit)),
                (true, 1) | (false, 0) => {}
                (_, count) => return Err(InvariantViolation::DuplicateUnload { unit, count }),
            }
        }
        Ok(())
    }
}

pub struct MockClasses {
    kinds: Vec<ClassKind>,
    cleaned: Vec<AtomicU32>,
    pub tree_rebuilds: AtomicU32,
}

impl MockClasses {
    pub fn new(kinds: Vec<ClassKind>) -> Self {
        let cleaned = kinds.iter().map(|_| AtomicU32::new(0)).collect();
        Self {
            kinds,
            cleaned,
            tree_rebuilds: AtomicU32::new(0),
        }
    }

    /// `instances` instance classes with an array class after every third one.
    pub fn mixed(instances: usize) -> Self {
        let mut kinds = Vec::new();
        for i in 0..instances {
            kinds.push(ClassKind::Instance);
            if i % 3 == 2 {
                kinds.push(if i % 2 == 0 {
                    ClassKind::ObjectArray
                } else {
                    ClassKind::TypeArray
                });
            }
        }
        Self::new(kinds)
    }

    pub fn clean_counts(&self) -> Vec<u32> {
        self.cleaned
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    pub fn total_cleaned(&self) -> u32 {
        self.clean_counts().iter().sum()
    }

    pub fn instance_count(&self) -> usize {
        self.kinds.iter().filter(|k| k.is_instance()).count()
    }

    /// Each instance class cleaned exactly once, no array class touched.
    pub fn assert_exactly_once(&self) {
        for (index, (kind, count)) in self.kinds.iter().zip(self.clean_counts()).enumerate() {
            let expected = u32::from(kind.is_instance());
            assert_eq!(count, expected, "class {index} ({kind:?}) cleaned {count} times");
        }
    }
}

impl ClassRegistry for MockClasses {
    type Iter = AtomicClassIterator;

    fn class_iterator(&self) -> Self::Iter {
        AtomicClassIterator::new(self.kinds.len())
    }

    fn kind(&self, class: ClassId) -> ClassKind {
        self.kinds[class.index()]
    }

    fn clean_subclass_tree(&self) {
        self.tree_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    fn clean_weak_class_links(&self, class: ClassId) {
        self.cleaned[class.index()].fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupEvent {
    Begin { resize: bool },
    Unlink { worker_id: u32 },
    End,
}

pub struct MockStringDedup {
    enabled: bool,
    pub events: Mutex<Vec<DedupEvent>>,
    /// Worker that panics inside `unlink_partition`, if any.
    pub fail_worker: Option<u32>,
}

impl MockStringDedup {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Mutex::new(Vec::new()),
            fail_worker: None,
        }
    }

    pub fn events(&self) -> Vec<DedupEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&DedupEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl StringDedup for MockStringDedup {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn begin_pass(&self, resize_table: bool) {
        self.events.lock().push(DedupEvent::Begin {
            resize: resize_table,
        });
    }

    fn end_pass(&self) {
        self.events.lock().push(DedupEvent::End);
    }

    fn unlink_partition(&self, closure: &DedupUnlinkClosure<'_>, worker_id: u32) {
        assert!(!closure.has_keep_alive());
        self.events.lock().push(DedupEvent::Unlink { worker_id });
        if self.fail_worker == Some(worker_id) {
            panic!("dedup unlink failed on worker {worker_id}");
        }
    }
}

pub struct MockCompilerMetadata {
    enabled: bool,
    pub unloads: AtomicU32,
}

impl MockCompilerMetadata {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            unloads: AtomicU32::new(0),
        }
    }

    pub fn unload_count(&self) -> u32 {
        self.unloads.load(Ordering::Relaxed)
    }
}

impl CompilerMetadata for MockCompilerMetadata {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn unload_metadata(&self, _unloading_occurred: bool) {
        self.unloads.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct MockRuntime {
    pub code: MockCodeCache,
    pub classes: MockClasses,
    pub dedup: MockStringDedup,
    pub compiler: MockCompilerMetadata,
}

impl MockRuntime {
    pub fn new(code: MockCodeCache, classes: MockClasses) -> Self {
        Self {
            code,
            classes,
            dedup: MockStringDedup::new(true),
            compiler: MockCompilerMetadata::new(true),
        }
    }

    #[must_use]
    pub fn with_dedup(mut self, dedup: MockStringDedup) -> Self {
        self.dedup = dedup;
        self
    }

    #[must_use]
    pub fn with_compiler(mut self, compiler: MockCompilerMetadata) -> Self {
        self.compiler = compiler;
        self
    }
}

impl CleaningRuntime for MockRuntime {
    type CodeCache = MockCodeCache;
    type Classes = MockClasses;
    type StringDedup = MockStringDedup;
    type CompilerMetadata = MockCompilerMetadata;

    fn code_cache(&self) -> &Self::CodeCache {
        &self.code
    }

    fn classes(&self) -> &Self::Classes {
        &self.classes
    }

    fn string_dedup(&self) -> &Self::StringDedup {
        &self.dedup
    }

    fn compiler_metadata(&self) -> &Self::CompilerMetadata {
        &self.compiler
    }
}

pub fn everything_alive(_obj: ObjectRef) -> bool {
    true
}
