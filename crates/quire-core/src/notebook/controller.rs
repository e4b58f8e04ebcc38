//! The notebook controller.
//!
//! Owns the cell sequence, the snapshot store and the displayed snapshot, and
//! keeps them coherent across execution and structural edits.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellEnv, CellId, CellMode, CellOutput};
use crate::config::NotebookConfig;
use crate::error::{Error, Result};
use crate::execute::{BatchExecutor, BatchPlan, Callbacks, ExecutionCallback};
use crate::project::{ProjectSnapshot, ResourceId};
use crate::store::SnapshotStore;
use crate::tabs::{PanelKind, Tab, TabManager};

use super::events::{NotebookEvent, NotebookListener};
use super::source::{CellSource, NotebookSource};
use super::view::{CellView, TocEntry};

/// Where [`Notebook::insert_cell`] places the new cell relative to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    Before,
    After,
}

/// Result of a successful [`Notebook::execute`].
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    /// The snapshot after the target cell, now current.
    pub snapshot: Arc<ProjectSnapshot>,
    /// Cells that actually ran (cached prefix excluded).
    pub executed: Vec<CellId>,
    /// Cached cells after invalidation, in sequence order.
    pub cached: Vec<CellId>,
}

/// A notebook: ordered cells plus the cache of their results.
pub struct Notebook {
    config: NotebookConfig,
    env: CellEnv,
    cells: Vec<Cell>,
    next_id: usize,
    store: SnapshotStore,
    /// The canonical empty snapshot every batch starts from.
    empty: Arc<ProjectSnapshot>,
    /// The displayed snapshot.
    current: Arc<ProjectSnapshot>,
    /// Snapshot installed by the most recent successful execute.
    last_executed: Option<Arc<ProjectSnapshot>>,
    outputs: FxHashMap<CellId, Vec<CellOutput>>,
    tabs: TabManager,
    listeners: Vec<Arc<dyn NotebookListener>>,
    callback: Option<Box<dyn ExecutionCallback>>,
}

impl Notebook {
    /// Create an empty notebook.
    pub fn new(config: NotebookConfig) -> Self {
        let empty = Arc::new(ProjectSnapshot::empty());
        Self {
            env: config.cell_env(),
            config,
            cells: Vec::new(),
            next_id: 0,
            store: SnapshotStore::new(),
            current: Arc::clone(&empty),
            empty,
            last_executed: None,
            outputs: FxHashMap::default(),
            tabs: TabManager::new(),
            listeners: Vec::new(),
            callback: None,
        }
    }

    /// Load a notebook from its persisted form.
    ///
    /// Leading markdown cells are cached with the empty snapshot, since they
    /// cannot change it.
    pub fn from_source(source: &NotebookSource, config: NotebookConfig) -> Self {
        let mut notebook = Self::new(config);
        for cell in &source.cells {
            let id = notebook.allocate_id();
            notebook.cells.push(Cell::new(id, cell.mode, cell.content.clone()));
        }
        for cell in &notebook.cells {
            if cell.mode() != CellMode::Markdown {
                break;
            }
            notebook.store.set(cell.id(), Arc::clone(&notebook.empty));
        }
        tracing::info!("Loaded notebook with {} cells", notebook.cells.len());
        notebook
    }

    /// Register a listener notified after every state change.
    pub fn add_listener(&mut self, listener: impl NotebookListener + 'static) {
        self.listeners.push(Arc::new(listener));
    }

    /// Set the execution callback for progress reporting.
    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.callback = Some(Box::new(callback));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &NotebookConfig {
        &self.config
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id() == id)
    }

    pub fn cell_ids(&self) -> Vec<CellId> {
        self.cells.iter().map(Cell::id).collect()
    }

    pub fn index_of(&self, id: CellId) -> Option<usize> {
        self.cells.iter().position(|c| c.id() == id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn current(&self) -> &Arc<ProjectSnapshot> {
        &self.current
    }

    pub fn last_executed(&self) -> Option<&Arc<ProjectSnapshot>> {
        self.last_executed.as_ref()
    }

    pub fn empty_snapshot(&self) -> &Arc<ProjectSnapshot> {
        &self.empty
    }

    pub fn outputs(&self, id: CellId) -> &[CellOutput] {
        self.outputs.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tabs(&self) -> &TabManager {
        &self.tabs
    }

    /// The serializable form of the cells, as persisted.
    pub fn source(&self) -> NotebookSource {
        NotebookSource::new(
            self.cells
                .iter()
                .map(|cell| CellSource {
                    mode: cell.mode(),
                    content: cell.source().to_string(),
                })
                .collect(),
        )
    }

    /// Per-cell rendering state, in sequence order.
    pub fn cell_views(&self) -> Vec<CellView> {
        self.cells
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                let cached = self.store.contains(cell.id());
                let next_cached = self
                    .cells
                    .get(index + 1)
                    .is_some_and(|next| self.store.contains(next.id()));
                CellView {
                    id: cell.id(),
                    mode: cell.mode(),
                    source: cell.source().to_string(),
                    cached,
                    frontier: cached && !next_cached,
                    outputs: self.outputs(cell.id()).to_vec(),
                }
            })
            .collect()
    }

    /// Headings of the markdown cells, in sequence order.
    pub fn table_of_contents(&self) -> Vec<TocEntry> {
        self.cells
            .iter()
            .flat_map(|cell| {
                cell.sections().into_iter().map(|section| TocEntry {
                    cell_id: cell.id(),
                    level: section.level,
                    title: section.title,
                })
            })
            .collect()
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute every cell up to and including `target` (the last cell if `None`).
    ///
    /// Cells covered by the longest cached prefix are not re-run. On success
    /// every intermediate snapshot is cached, entries after the target are
    /// dropped, the superseded execution is torn down and the new snapshot
    /// becomes current. On failure nothing is committed: the error is
    /// appended to the failing cell's outputs and returned.
    pub fn execute(&mut self, target: Option<CellId>) -> Result<ExecuteOutcome> {
        let target_index = match target {
            Some(id) => self.index_of(id).ok_or(Error::CellNotFound(id))?,
            None => self
                .cells
                .len()
                .checked_sub(1)
                .ok_or_else(|| Error::InvalidOperation("notebook has no cells".to_string()))?,
        };

        let ids = self.cell_ids();
        let (prefix, remaining) = ids.split_at(target_index + 1);
        let plan = BatchPlan::resume(prefix, &self.store, &self.empty);
        tracing::debug!(
            "Executing up to {} ({} cached, {} remaining after)",
            prefix[target_index],
            plan.skip,
            remaining.len()
        );

        let result = {
            let listeners = ListenerCallback(&self.listeners);
            let mut callbacks: Vec<&dyn ExecutionCallback> = vec![&listeners];
            if let Some(callback) = &self.callback {
                callbacks.push(&**callback);
            }
            let callbacks = Callbacks(callbacks);
            let cells: Vec<&Cell> = self.cells[..=target_index].iter().collect();
            BatchExecutor::new(&self.env)
                .with_callback(&callbacks)
                .run(&cells, plan)
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(failure) => {
                let mut keep = self.live_resources();
                if let Some(last) = &self.last_executed {
                    keep.extend(last.resource_ids());
                }
                let discarded: Vec<_> = failure
                    .completed
                    .into_iter()
                    .map(|step| {
                        self.outputs.insert(step.cell, step.outputs);
                        step.snapshot
                    })
                    .collect();
                let stopped = stop_all(&discarded, &keep);
                self.notify_stopped(stopped);

                let mut outputs = failure.outputs;
                outputs.push(CellOutput::Error {
                    message: failure.error.to_string(),
                });
                self.outputs.insert(failure.cell, outputs);
                return Err(failure.error);
            }
        };

        let snapshot = Arc::clone(outcome.snapshot());
        let executed: Vec<CellId> = outcome.steps.iter().map(|step| step.cell).collect();
        for step in outcome.steps {
            self.store.set(step.cell, step.snapshot);
            self.outputs.insert(step.cell, step.outputs);
        }

        let mut detached: Vec<Arc<ProjectSnapshot>> = remaining
            .iter()
            .filter_map(|cell| self.store.get(*cell).cloned())
            .collect();
        self.store.invalidate_from(remaining);

        let previous = std::mem::replace(&mut self.current, Arc::clone(&snapshot));
        if !Arc::ptr_eq(&previous, &snapshot) {
            detached.push(previous);
        }
        if let Some(last) = self.last_executed.replace(Arc::clone(&snapshot))
            && !Arc::ptr_eq(&last, &snapshot)
        {
            detached.push(last);
        }
        let stopped = stop_all(&detached, &self.live_resources());

        tracing::info!(
            "Installed snapshot {} after {} cells ({} executed)",
            snapshot.id(),
            target_index + 1,
            executed.len()
        );
        self.notify_store();
        self.notify_stopped(stopped);
        self.emit(NotebookEvent::SnapshotInstalled {
            snapshot_id: snapshot.id(),
        });
        self.reconcile_tabs();

        Ok(ExecuteOutcome {
            snapshot,
            executed,
            cached: self.store.cached_in_order(&ids),
        })
    }

    /// Drop the cached results of `id` and every cell after it.
    ///
    /// Nothing is re-run and the displayed snapshot is unchanged. Returns the
    /// cells whose entries were removed.
    pub fn invalidate_cell(&mut self, id: CellId) -> Result<Vec<CellId>> {
        let index = self.index_of(id).ok_or(Error::CellNotFound(id))?;
        Ok(self.invalidate_from_index(index, Vec::new()))
    }

    /// Replace a cell's source and invalidate it. Returns `false` if unchanged.
    pub fn set_source(&mut self, id: CellId, source: impl Into<String>) -> Result<bool> {
        let cell = self
            .cells
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or(Error::CellNotFound(id))?;
        if !cell.set_source(source.into()) {
            return Ok(false);
        }
        self.emit(NotebookEvent::SourceEdited { cell_id: id });
        self.invalidate_cell(id)?;
        Ok(true)
    }

    // =========================================================================
    // Structural edits
    // =========================================================================

    /// Insert a new code cell next to `reference`, or at the head if `None`.
    ///
    /// The reference cell keeps its entry when the new cell goes after it.
    /// Everything from the new cell on is uncached. Without
    /// `state_preserved`, the whole store is dropped.
    pub fn insert_cell(
        &mut self,
        reference: Option<CellId>,
        position: InsertPosition,
    ) -> Result<CellId> {
        let index = match reference {
            None => 0,
            Some(reference) => {
                let index = self
                    .index_of(reference)
                    .ok_or(Error::CellNotFound(reference))?;
                match position {
                    InsertPosition::Before => index,
                    InsertPosition::After => index + 1,
                }
            }
        };

        let id = self.allocate_id();
        let cell = Cell::new(id, CellMode::Code, self.config.placeholder_body.clone());
        self.cells.insert(index, cell);
        tracing::debug!("Inserted {} at {}", id, index);
        self.notify_cells();

        let from = if self.config.state_preserved { index } else { 0 };
        self.invalidate_from_index(from, Vec::new());
        Ok(id)
    }

    /// Remove a cell with its cached entry and outputs.
    ///
    /// Every cell after it loses its entry too, since its prefix changed.
    pub fn delete_cell(&mut self, id: CellId) -> Result<()> {
        let index = self.index_of(id).ok_or(Error::CellNotFound(id))?;
        self.cells.remove(index);
        self.outputs.remove(&id);
        let detached: Vec<_> = self.store.remove(id).into_iter().collect();
        tracing::debug!("Deleted {} at {}", id, index);
        self.notify_cells();

        self.invalidate_from_index(index, detached);
        Ok(())
    }

    /// Move a cell by `delta` positions.
    ///
    /// An out-of-range target is logged and ignored (`Ok(false)`). Otherwise
    /// the cache is invalidated from the cell now preceding the moved one.
    pub fn move_cell(&mut self, id: CellId, delta: isize) -> Result<bool> {
        let old_index = self.index_of(id).ok_or(Error::CellNotFound(id))?;
        let Some(new_index) = old_index
            .checked_add_signed(delta)
            .filter(|index| *index < self.cells.len())
        else {
            tracing::warn!(
                "Cannot move {} at {} by {}: out of range 0..{}",
                id,
                old_index,
                delta,
                self.cells.len()
            );
            return Ok(false);
        };
        if delta == 0 {
            return Ok(true);
        }

        let cell = self.cells.remove(old_index);
        self.cells.insert(new_index, cell);
        tracing::debug!("Moved {} from {} to {}", id, old_index, new_index);
        self.notify_cells();

        self.invalidate_from_index(old_index.min(new_index.saturating_sub(1)), Vec::new());
        Ok(true)
    }

    /// Replace a cell by one of `mode` with the same source, at the same position.
    ///
    /// The replacement gets a new id, which is returned. Entries of the cells
    /// before it are never touched. A code cell that left the project
    /// unchanged becomes a markdown cell without invalidating anything.
    pub fn change_cell_mode(&mut self, id: CellId, mode: CellMode) -> Result<CellId> {
        let index = self.index_of(id).ok_or(Error::CellNotFound(id))?;
        if self.cells[index].mode() == mode {
            return Ok(id);
        }

        let new_id = self.allocate_id();
        self.cells[index] = self.cells[index].with_mode(new_id, mode);
        self.outputs.remove(&id);
        tracing::debug!("Changed {} to {} as {}", id, mode, new_id);
        self.notify_cells();

        let predecessor = match index {
            0 => Some(Arc::clone(&self.empty)),
            _ => self.store.get(self.cells[index - 1].id()).cloned(),
        };
        let old_entry = self.store.get(id).cloned();
        let acted_as_identity = matches!(
            (&old_entry, &predecessor),
            (Some(old), Some(pred)) if Arc::ptr_eq(old, pred)
        );

        match (mode, predecessor) {
            (CellMode::Markdown, _) if acted_as_identity => {
                self.store.rekey(id, new_id, true);
                self.notify_store();
            }
            (CellMode::Markdown, Some(predecessor)) => {
                let had_entry = old_entry.is_some();
                self.store.rekey(id, new_id, false);
                self.store.set(new_id, predecessor);
                let invalidated =
                    self.invalidate_from_index(index + 1, old_entry.into_iter().collect());
                if invalidated.is_empty() && !had_entry {
                    self.notify_store();
                }
            }
            _ => {
                self.store.rekey(id, new_id, false);
                self.invalidate_from_index(index, old_entry.into_iter().collect());
            }
        }
        Ok(new_id)
    }

    /// Display the cached snapshot of `id`.
    ///
    /// Worksheets running under the previously displayed snapshot are
    /// stopped. Returns `false` when the cell is uncached or already displayed.
    pub fn select_cell(&mut self, id: CellId) -> Result<bool> {
        if self.index_of(id).is_none() {
            return Err(Error::CellNotFound(id));
        }
        let Some(snapshot) = self.store.get(id).cloned() else {
            return Ok(false);
        };
        if Arc::ptr_eq(&snapshot, &self.current) {
            return Ok(false);
        }

        let stopped = self.current.stop_worksheets(&snapshot.resource_ids());
        self.current = snapshot;
        self.notify_stopped(stopped);
        self.emit(NotebookEvent::DisplayChanged {
            snapshot_id: self.current.id(),
        });
        self.reconcile_tabs();
        Ok(true)
    }

    // =========================================================================
    // Tabs
    // =========================================================================

    /// Open a tab if it refers to something in the displayed snapshot.
    pub fn open_tab(&mut self, tab: Tab) -> bool {
        if !tab.liveness.is_alive(&self.current) {
            tracing::debug!("Not opening tab {}: not in the current project", tab.id);
            return false;
        }
        self.tabs.open_tab(tab);
        self.notify_tabs();
        true
    }

    pub fn close_tab(&mut self, id: &str) -> bool {
        let closed = self.tabs.close_tab(id);
        if closed {
            self.notify_tabs();
        }
        closed
    }

    /// Select an open tab.
    ///
    /// Returns `false` if no such tab is open.
    pub fn select_tab(&mut self, id: &str) -> bool {
        let changed = self.tabs.selected() != Some(id);
        if !self.tabs.select(id) {
            return false;
        }
        if changed {
            self.notify_tabs();
        }
        true
    }

    /// Open a side panel for a module of the displayed snapshot.
    pub fn open_panel(&mut self, kind: PanelKind, module_id: &str) -> bool {
        if self.current.module(module_id).is_none() {
            tracing::debug!("Not opening {:?} panel: no module '{}'", kind, module_id);
            return false;
        }
        if self.tabs.open_panel(kind, module_id) {
            self.notify_tabs();
        }
        true
    }

    pub fn close_panel(&mut self, kind: PanelKind, module_id: &str) -> bool {
        let closed = self.tabs.close_panel(kind, module_id);
        if closed {
            self.notify_tabs();
        }
        closed
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn allocate_id(&mut self) -> CellId {
        let id = CellId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Drop the entries of every cell from `index` on.
    ///
    /// `detached` holds snapshots the caller already took out of the store.
    /// When anything was dropped and an execution exists, the previous
    /// execution and the dropped snapshots are stopped, sparing resources
    /// still referenced by the current snapshot or the store.
    fn invalidate_from_index(
        &mut self,
        index: usize,
        mut detached: Vec<Arc<ProjectSnapshot>>,
    ) -> Vec<CellId> {
        let tail: Vec<CellId> = self.cells[index.min(self.cells.len())..]
            .iter()
            .map(Cell::id)
            .collect();
        detached.extend(tail.iter().filter_map(|cell| self.store.get(*cell).cloned()));
        let invalidated = self.store.invalidate_from(&tail);

        if invalidated.is_empty() && detached.is_empty() {
            return invalidated;
        }
        if let Some(last) = &self.last_executed {
            detached.push(Arc::clone(last));
            let stopped = stop_all(&detached, &self.live_resources());
            self.notify_stopped(stopped);
        }
        self.notify_store();
        invalidated
    }

    /// Resources referenced by the current snapshot or any cached snapshot.
    fn live_resources(&self) -> FxHashSet<ResourceId> {
        let mut keep = self.store.resource_ids();
        keep.extend(self.current.resource_ids());
        keep
    }

    fn reconcile_tabs(&mut self) {
        let (closed, panels) = self.tabs.reconcile(&self.current);
        if !closed.is_empty() || panels > 0 {
            self.notify_tabs();
        }
    }

    fn emit(&self, event: NotebookEvent) {
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }

    fn notify_cells(&self) {
        self.emit(NotebookEvent::CellsChanged {
            cells: self.cell_ids(),
        });
    }

    fn notify_store(&self) {
        self.emit(NotebookEvent::StoreChanged {
            cached: self.store.cached_in_order(&self.cell_ids()),
        });
    }

    fn notify_stopped(&self, count: usize) {
        if count > 0 {
            tracing::info!("Stopped {} superseded resources", count);
            self.emit(NotebookEvent::ResourcesStopped { count });
        }
    }

    fn notify_tabs(&self) {
        self.emit(NotebookEvent::TabsChanged {
            open: self.tabs.tabs().iter().map(|t| t.id.clone()).collect(),
            selected: self.tabs.selected().map(str::to_string),
            panels: self.tabs.panels().clone(),
        });
    }
}

fn stop_all(snapshots: &[Arc<ProjectSnapshot>], keep: &FxHashSet<ResourceId>) -> usize {
    snapshots.iter().map(|snapshot| snapshot.stop(keep)).sum()
}

/// Forwards batch progress to notebook listeners.
struct ListenerCallback<'a>(&'a [Arc<dyn NotebookListener>]);

impl ListenerCallback<'_> {
    fn emit(&self, event: NotebookEvent) {
        for listener in self.0 {
            listener.on_event(&event);
        }
    }
}

impl ExecutionCallback for ListenerCallback<'_> {
    fn on_cell_started(&self, cell_id: CellId) {
        self.emit(NotebookEvent::CellStarted { cell_id });
    }

    fn on_cell_completed(&self, cell_id: CellId, duration: Duration) {
        self.emit(NotebookEvent::CellCompleted {
            cell_id,
            duration_ms: duration.as_millis() as u64,
        });
    }

    fn on_cell_error(&self, cell_id: CellId, error: &Error) {
        self.emit(NotebookEvent::CellFailed {
            cell_id,
            error: error.to_string(),
        });
    }
}
