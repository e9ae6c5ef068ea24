//! Liveness and keep-alive callbacks supplied by the collector.

use std::fmt;

use crate::tracing::PassId;

/// Opaque reference to a heap object.
///
/// The cleaning pass never dereferences it; it only hands it back to the
/// collector's callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub usize);

/// Answers whether an object survived the collection that triggered the pass.
///
/// Must give the same answer for the same object for the whole pass.
pub trait IsAlive: Sync {
    /// `true` if `obj` is reachable.
    fn is_alive(&self, obj: ObjectRef) -> bool;
}

impl<F> IsAlive for F
where
    F: Fn(ObjectRef) -> bool + Sync,
{
    fn is_alive(&self, obj: ObjectRef) -> bool {
        self(obj)
    }
}

/// Called on referents that must be retained past this pass.
pub trait KeepAlive: Sync {
    /// Keep `obj` alive.
    fn keep_alive(&self, obj: ObjectRef);
}

impl<F> KeepAlive for F
where
    F: Fn(ObjectRef) + Sync,
{
    fn keep_alive(&self, obj: ObjectRef) {
        self(obj);
    }
}

/// Liveness context for compiled code unloading.
///
/// Lives exactly as long as the code cache task of one pass. Compiled units
/// consult it to decide whether the objects they embed are dead.
#[derive(Clone, Copy)]
pub struct UnloadingScope<'a> {
    is_alive: &'a dyn IsAlive,
    pass: PassId,
}

impl<'a> UnloadingScope<'a> {
    /// Open a scope for `pass`.
    #[must_use]
    pub fn new(is_alive: &'a dyn IsAlive, pass: PassId) -> Self {
        Self { is_alive, pass }
    }

    /// `true` if `obj` survived the collection.
    #[must_use]
    pub fn is_alive(&self, obj: ObjectRef) -> bool {
        self.is_alive.is_alive(obj)
    }

    /// The pass this scope belongs to.
    #[must_use]
    pub const fn pass(&self) -> PassId {
        self.pass
    }
}

impl fmt::Debug for UnloadingScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnloadingScope")
            .field("pass", &self.pass)
            .finish_non_exhaustive()
    }
}
