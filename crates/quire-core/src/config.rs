//! Notebook configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cell::CellEnv;

/// Body given to freshly inserted code cells.
pub const PLACEHOLDER_BODY: &str = "// |project, cell, env|\nproject";

/// Default debounce window before the cell sources are persisted.
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 2000;

/// Configuration for a notebook and the cells it executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookConfig {
    /// Keep ancestor snapshots cached when a cell is inserted.
    ///
    /// When false, inserting a cell drops the whole snapshot store.
    pub state_preserved: bool,

    /// Source of newly inserted code cells.
    pub placeholder_body: String,

    /// Quiet period after the last edit before the sources are saved.
    pub autosave_debounce_ms: u64,

    /// Toolboxes that `env.install(..)` may load. Empty means unrestricted.
    pub toolboxes: Vec<String>,

    /// Upper bound for `project.spawn_workers(..)`.
    pub max_workers_per_pool: usize,

    /// Entries kept in a cell's output log; older entries are dropped first.
    pub max_outputs_per_cell: usize,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            state_preserved: true,
            placeholder_body: PLACEHOLDER_BODY.to_string(),
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            toolboxes: Vec::new(),
            max_workers_per_pool: 8,
            max_outputs_per_cell: 100,
        }
    }
}

impl NotebookConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The autosave debounce window as a [`Duration`].
    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    /// Build the environment handed to code cells.
    pub fn cell_env(&self) -> CellEnv {
        CellEnv::new(self.toolboxes.iter().cloned(), self.max_workers_per_pool)
            .with_max_outputs(self.max_outputs_per_cell)
    }
}
