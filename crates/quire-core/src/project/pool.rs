//! Instance pools: the live resources backing a project snapshot.
//!
//! A pool is an ordered list of shared [`Resource`] handles. Snapshots derived
//! from one another share resources by `Arc`, so stopping a superseded pool
//! must spare every resource the successor still references (the keep-alive
//! set).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a live resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(Uuid);

impl ResourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res_{}", self.0.simple())
    }
}

/// What a resource is running on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceKind {
    /// A running module instance.
    Module { module_id: String },
    /// A live subscription carrying data along a connection.
    Subscription { from: String, to: String },
    /// A worker in a named worker pool.
    Worker { pool: String },
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module { module_id } => write!(f, "module {}", module_id),
            Self::Subscription { from, to } => write!(f, "subscription {} -> {}", from, to),
            Self::Worker { pool } => write!(f, "worker in {}", pool),
        }
    }
}

/// A live runtime resource. Started on creation, stopped at most once.
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    kind: ResourceKind,
    running: AtomicBool,
}

impl Resource {
    /// Create a running resource.
    pub fn start(kind: ResourceKind) -> Arc<Self> {
        let resource = Arc::new(Self {
            id: ResourceId::new(),
            kind,
            running: AtomicBool::new(true),
        });
        tracing::trace!("Started {} ({})", resource.id, resource.kind);
        resource
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the resource. Returns `true` if it was running.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            tracing::debug!("Stopped {} ({})", self.id, self.kind);
        }
        was_running
    }
}

/// The set of live resources owned by a snapshot.
#[derive(Debug, Clone, Default)]
pub struct InstancePool {
    resources: Vec<Arc<Resource>>,
}

impl InstancePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new resource and add it to the pool.
    pub fn spawn(&mut self, kind: ResourceKind) -> Arc<Resource> {
        let resource = Resource::start(kind);
        self.resources.push(resource.clone());
        resource
    }

    /// Share an existing resource with this pool.
    pub fn adopt(&mut self, resource: Arc<Resource>) {
        if !self.contains(resource.id()) {
            self.resources.push(resource);
        }
    }

    /// Remove resources matching `predicate` from the pool without stopping them.
    ///
    /// Released resources stay alive as long as another pool references them;
    /// teardown of the superseded snapshot takes care of the rest.
    pub fn release(&mut self, predicate: impl Fn(&Resource) -> bool) -> Vec<Arc<Resource>> {
        let (released, kept) = self
            .resources
            .drain(..)
            .partition(|resource| predicate(resource));
        self.resources = kept;
        released
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    pub fn get(&self, id: ResourceId) -> Option<&Arc<Resource>> {
        self.resources.iter().find(|r| r.id() == id)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.iter().any(|r| r.id() == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources.iter().map(|r| r.id())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of resources still running.
    pub fn running_count(&self) -> usize {
        self.resources.iter().filter(|r| r.is_running()).count()
    }

    /// Stop every resource not referenced by `keep_alive`.
    ///
    /// Returns the number of resources actually stopped.
    pub fn stop(&self, keep_alive: Option<&InstancePool>) -> usize {
        let keep: FxHashSet<ResourceId> = keep_alive
            .map(|pool| pool.ids().collect())
            .unwrap_or_default();
        self.stop_except(&keep)
    }

    /// Stop every resource whose id is not in `keep`.
    pub fn stop_except(&self, keep: &FxHashSet<ResourceId>) -> usize {
        self.resources
            .iter()
            .filter(|r| !keep.contains(&r.id()))
            .filter(|r| r.stop())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(pool: &str) -> ResourceKind {
        ResourceKind::Worker {
            pool: pool.to_string(),
        }
    }

    #[test]
    fn test_stop_keeps_shared_workers_alive() {
        let mut pool_a = InstancePool::new();
        let w1 = pool_a.spawn(worker("p"));
        let w2 = pool_a.spawn(worker("p"));

        let mut pool_b = InstancePool::new();
        pool_b.adopt(w1.clone());

        let stopped = pool_a.stop(Some(&pool_b));

        assert_eq!(stopped, 1);
        assert!(w1.is_running());
        assert!(!w2.is_running());
    }

    #[test]
    fn test_stop_without_keep_alive() {
        let mut pool = InstancePool::new();
        pool.spawn(worker("p"));
        pool.spawn(ResourceKind::Module {
            module_id: "m".to_string(),
        });

        assert_eq!(pool.stop(None), 2);
        assert_eq!(pool.running_count(), 0);
        // Stopping twice is a no-op
        assert_eq!(pool.stop(None), 0);
    }

    #[test]
    fn test_release_does_not_stop() {
        let mut pool = InstancePool::new();
        let w = pool.spawn(worker("a"));
        pool.spawn(worker("b"));

        let released = pool.release(|r| matches!(r.kind(), ResourceKind::Worker { pool } if pool == "a"));

        assert_eq!(released.len(), 1);
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(w.id()));
        assert!(w.is_running());
    }

    #[test]
    fn test_adopt_is_idempotent() {
        let mut source = InstancePool::new();
        let w = source.spawn(worker("p"));

        let mut pool = InstancePool::new();
        pool.adopt(w.clone());
        pool.adopt(w);
        assert_eq!(pool.len(), 1);
    }
}
