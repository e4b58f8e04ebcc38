//! Notifications sent to notebook listeners after each state change.

use serde::Serialize;
use uuid::Uuid;

use crate::cell::CellId;
use crate::tabs::ModulePanels;

/// A change to notebook state, delivered synchronously to every listener.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotebookEvent {
    /// The cell sequence changed (insert, delete, move, mode change).
    CellsChanged { cells: Vec<CellId> },

    /// A cell's source was edited.
    SourceEdited { cell_id: CellId },

    /// The set of cached cells changed.
    StoreChanged { cached: Vec<CellId> },

    CellStarted { cell_id: CellId },

    CellCompleted { cell_id: CellId, duration_ms: u64 },

    CellFailed { cell_id: CellId, error: String },

    /// A successful execute installed a new current snapshot.
    SnapshotInstalled { snapshot_id: Uuid },

    /// A different snapshot is displayed after selecting a cell.
    DisplayChanged { snapshot_id: Uuid },

    /// Superseded resources were stopped.
    ResourcesStopped { count: usize },

    /// Open tabs, the selected tab or module panels changed.
    TabsChanged {
        open: Vec<String>,
        selected: Option<String>,
        panels: ModulePanels,
    },
}

/// Receives notebook events.
pub trait NotebookListener: Send + Sync {
    fn on_event(&self, event: &NotebookEvent);
}

impl<F> NotebookListener for F
where
    F: Fn(&NotebookEvent) + Send + Sync,
{
    fn on_event(&self, event: &NotebookEvent) {
        self(event)
    }
}
