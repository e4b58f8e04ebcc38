//! What a cell sees while it runs, and what it hands back.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::project::ProjectSnapshot;

/// Services available to code cells through `env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEnv {
    catalog: FxHashSet<String>,
    max_workers_per_pool: usize,
    max_outputs: usize,
}

impl Default for CellEnv {
    fn default() -> Self {
        crate::config::NotebookConfig::default().cell_env()
    }
}

impl CellEnv {
    /// Create an environment exposing `toolboxes`. An empty catalog allows any toolbox.
    pub fn new(toolboxes: impl IntoIterator<Item = String>, max_workers_per_pool: usize) -> Self {
        Self {
            catalog: toolboxes.into_iter().collect(),
            max_workers_per_pool,
            max_outputs: usize::MAX,
        }
    }

    pub fn with_max_outputs(mut self, max_outputs: usize) -> Self {
        self.max_outputs = max_outputs;
        self
    }

    /// Whether `env.install(toolbox)` may load `toolbox`.
    pub fn allows(&self, toolbox: &str) -> bool {
        self.catalog.is_empty() || self.catalog.contains(toolbox)
    }

    pub fn max_workers_per_pool(&self) -> usize {
        self.max_workers_per_pool
    }

    pub fn max_outputs(&self) -> usize {
        self.max_outputs
    }
}

/// Context passed to a cell: the prior snapshot and the environment.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub project: &'a Arc<ProjectSnapshot>,
    pub env: &'a CellEnv,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(project: &'a Arc<ProjectSnapshot>, env: &'a CellEnv) -> Self {
        Self { project, env }
    }
}

/// One entry of a cell's output log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CellOutput {
    /// A value passed to `cell.emit(..)`.
    Value { value: serde_json::Value },
    /// The error that aborted the cell.
    Error { message: String },
}

/// Outcome of running a single cell.
///
/// Outputs are kept even when the run fails, so the cell can show what it
/// emitted before the error.
#[derive(Debug)]
pub struct CellRun {
    pub outputs: Vec<CellOutput>,
    pub result: Result<Arc<ProjectSnapshot>>,
}

impl CellRun {
    pub(crate) fn identity(project: &Arc<ProjectSnapshot>) -> Self {
        Self {
            outputs: Vec::new(),
            result: Ok(Arc::clone(project)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_catalog_allows_everything() {
        let env = CellEnv::new(Vec::new(), 4);
        assert!(env.allows("anything"));
    }

    #[test]
    fn test_catalog_restricts_toolboxes() {
        let env = CellEnv::new(vec!["std".to_string()], 4);
        assert!(env.allows("std"));
        assert!(!env.allows("gpu"));
    }

    #[test]
    fn test_output_serializes_tagged() {
        let output = CellOutput::Error {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }
}
