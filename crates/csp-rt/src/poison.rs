//! Transitive termination over explicit capture graphs.
//!
//! When a process observes the poison signal, the runtime walks everything
//! the process captured at construction and poisons every reachable channel.
//! The graph is declared up front: a [`Captures`] set lists the channels,
//! processes, and combinators a process can reach, and aggregates expose
//! their own referents recursively. Shared objects key themselves into the
//! walk's visited set by stable address, so the traversal poisons each
//! channel exactly once and terminates on cyclic graphs.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::debug;

// ---------------------------------------------------------------------------
// PoisonWalk
// ---------------------------------------------------------------------------

/// Cycle-safe traversal state for one poison propagation.
#[derive(Default)]
pub struct PoisonWalk {
    visited: FxHashSet<usize>,
}

impl PoisonWalk {
    /// Create an empty walk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` as visited. Returns `true` the first time a key is seen.
    ///
    /// Shared objects (channels, processes) use their shared-core address as
    /// the key; a `false` return means the object was already handled and
    /// the visitor must not recurse into it again.
    pub fn mark(&mut self, key: usize) -> bool {
        self.visited.insert(key)
    }
}

// ---------------------------------------------------------------------------
// Poisonable
// ---------------------------------------------------------------------------

/// An object reachable from a process's captures during poison propagation.
///
/// Channels poison themselves; processes and combinators recurse over the
/// channels they hold. Implementations for shared handles must `mark` their
/// identity before acting so repeated references and cycles stay idempotent.
pub trait Poisonable: Send + Sync {
    /// Visit this object, poisoning every channel reachable from it.
    fn poison_walk(&self, walk: &mut PoisonWalk);
}

// ---------------------------------------------------------------------------
// Captures
// ---------------------------------------------------------------------------

/// The explicit capture set a process propagates poison through.
///
/// Anything a process body can reach that should die with it belongs here:
/// the channels it reads and writes, nested processes, whole combinators.
/// Cloning a `Captures` clones the references, not the referents.
#[derive(Clone, Default)]
pub struct Captures {
    targets: Vec<Arc<dyn Poisonable>>,
}

impl Captures {
    /// Create an empty capture set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, target: impl Poisonable + 'static) -> Self {
        self.push(target);
        self
    }

    /// Add a capture.
    pub fn push(&mut self, target: impl Poisonable + 'static) {
        self.targets.push(Arc::new(target));
    }

    /// Append every capture of `other` (shared, not deep-copied).
    pub fn merge(&mut self, other: &Captures) {
        self.targets.extend(other.targets.iter().cloned());
    }

    /// Number of directly held captures.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the set holds no captures.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Poison every channel transitively reachable from this set.
    pub fn poison_all(&self) {
        let mut walk = PoisonWalk::new();
        self.poison_walk(&mut walk);
        debug!(targets = self.targets.len(), "poison propagation complete");
    }
}

impl Poisonable for Captures {
    fn poison_walk(&self, walk: &mut PoisonWalk) {
        for target in &self.targets {
            target.poison_walk(walk);
        }
    }
}

impl std::fmt::Debug for Captures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Captures")
            .field("len", &self.targets.len())
            .finish()
    }
}
