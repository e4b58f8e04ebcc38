//! Snapshot store: the cache of per-cell execution results.
//!
//! The entry for a cell is the snapshot left behind right after that cell
//! ran, i.e. the result of executing every cell up to and including it.
//! Entries are keyed by [`CellId`], never by position.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::CellId;
use crate::project::{ProjectSnapshot, ResourceId};

/// Cache mapping a cell to the snapshot produced immediately after it.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    entries: FxHashMap<CellId, Arc<ProjectSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cell: CellId) -> Option<&Arc<ProjectSnapshot>> {
        self.entries.get(&cell)
    }

    pub fn set(&mut self, cell: CellId, snapshot: Arc<ProjectSnapshot>) {
        self.entries.insert(cell, snapshot);
    }

    pub fn contains(&self, cell: CellId) -> bool {
        self.entries.contains_key(&cell)
    }

    pub fn remove(&mut self, cell: CellId) -> Option<Arc<ProjectSnapshot>> {
        self.entries.remove(&cell)
    }

    /// Remove the entries of exactly the given cells.
    ///
    /// Returns the cells that actually had an entry.
    pub fn invalidate_from(&mut self, cells: &[CellId]) -> Vec<CellId> {
        let invalidated: Vec<CellId> = cells
            .iter()
            .copied()
            .filter(|cell| self.entries.remove(cell).is_some())
            .collect();

        if !invalidated.is_empty() {
            tracing::debug!("Invalidated {} cached snapshots", invalidated.len());
        }
        invalidated
    }

    /// Move the entry of `old` to `new`.
    ///
    /// With `preserve_state` false, or when `old` has no entry, the old entry
    /// is dropped and `new` is left uncached. Returns whether an entry moved.
    pub fn rekey(&mut self, old: CellId, new: CellId, preserve_state: bool) -> bool {
        match self.entries.remove(&old) {
            Some(snapshot) if preserve_state => {
                self.entries.insert(new, snapshot);
                true
            }
            _ => {
                self.entries.remove(&new);
                false
            }
        }
    }

    /// The cached cells among `order`, in that order.
    pub fn cached_in_order(&self, order: &[CellId]) -> Vec<CellId> {
        order
            .iter()
            .copied()
            .filter(|cell| self.entries.contains_key(cell))
            .collect()
    }

    /// Every resource referenced by any cached snapshot.
    pub fn resource_ids(&self) -> FxHashSet<ResourceId> {
        self.entries
            .values()
            .flat_map(|snapshot| snapshot.resource_ids())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<CellId> {
        (0..n).map(CellId::new).collect()
    }

    fn filled(cells: &[CellId]) -> SnapshotStore {
        let mut store = SnapshotStore::new();
        for &cell in cells {
            store.set(cell, Arc::new(ProjectSnapshot::empty()));
        }
        store
    }

    #[test]
    fn test_invalidate_from_removes_exactly_given_cells() {
        let cells = ids(4);
        let mut store = filled(&cells[..3]);

        let removed = store.invalidate_from(&cells[1..]);

        assert_eq!(removed, vec![CellId::new(1), CellId::new(2)]);
        assert!(store.contains(CellId::new(0)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rekey_preserves_entry() {
        let mut store = filled(&ids(1));
        let snapshot = store.get(CellId::new(0)).cloned().unwrap();

        assert!(store.rekey(CellId::new(0), CellId::new(9), true));

        assert!(!store.contains(CellId::new(0)));
        assert!(Arc::ptr_eq(store.get(CellId::new(9)).unwrap(), &snapshot));
    }

    #[test]
    fn test_rekey_without_preserve_drops_entry() {
        let mut store = filled(&ids(1));

        assert!(!store.rekey(CellId::new(0), CellId::new(9), false));

        assert!(store.is_empty());
    }

    #[test]
    fn test_rekey_missing_entry() {
        let mut store = SnapshotStore::new();
        assert!(!store.rekey(CellId::new(0), CellId::new(1), true));
        assert!(store.is_empty());
    }
}
