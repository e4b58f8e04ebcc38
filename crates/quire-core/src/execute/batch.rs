//! Batch executor: sequential replay of a cell prefix.

use std::sync::Arc;
use std::time::Instant;

use crate::cell::{Cell, CellEnv, CellId, CellOutput, ExecutionContext};
use crate::error::Error;
use crate::project::ProjectSnapshot;
use crate::store::SnapshotStore;

use super::callback::ExecutionCallback;

/// Where a batch starts: the cells already covered by the cache and the
/// snapshot to resume from.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Number of leading cells whose snapshot is reused.
    pub skip: usize,
    /// Snapshot fed to the first executed cell.
    pub start: Arc<ProjectSnapshot>,
}

impl BatchPlan {
    /// Resume after the longest fully cached prefix of `prefix`.
    ///
    /// A cell's entry is only trusted when every cell before it is cached as
    /// well; otherwise execution restarts from `empty`.
    pub fn resume(prefix: &[CellId], store: &SnapshotStore, empty: &Arc<ProjectSnapshot>) -> Self {
        let mut plan = Self {
            skip: 0,
            start: Arc::clone(empty),
        };
        for &cell in prefix {
            match store.get(cell) {
                Some(snapshot) => {
                    plan.skip += 1;
                    plan.start = Arc::clone(snapshot);
                }
                None => break,
            }
        }
        plan
    }

    /// Run every cell, ignoring the cache.
    pub fn from_scratch(empty: &Arc<ProjectSnapshot>) -> Self {
        Self {
            skip: 0,
            start: Arc::clone(empty),
        }
    }
}

/// A cell that ran as part of a batch.
#[derive(Debug, Clone)]
pub struct BatchStep {
    pub cell: CellId,
    pub snapshot: Arc<ProjectSnapshot>,
    pub outputs: Vec<CellOutput>,
}

/// Result of a successful batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub start: Arc<ProjectSnapshot>,
    pub steps: Vec<BatchStep>,
}

impl BatchOutcome {
    /// The snapshot after the last cell of the batch.
    pub fn snapshot(&self) -> &Arc<ProjectSnapshot> {
        self.steps.last().map_or(&self.start, |step| &step.snapshot)
    }
}

/// A batch aborted by a failing cell.
#[derive(Debug)]
pub struct BatchFailure {
    pub cell: CellId,
    pub error: Error,
    /// Output the failing cell emitted before the error.
    pub outputs: Vec<CellOutput>,
    /// Cells that ran before the failure. Their snapshots are never committed.
    pub completed: Vec<BatchStep>,
}

/// Folds cell execution over an ordered prefix of cells.
///
/// Cells run strictly one after the other: each one receives the snapshot
/// left by its predecessor. The first failure aborts the batch.
pub struct BatchExecutor<'a> {
    env: &'a CellEnv,
    callback: Option<&'a dyn ExecutionCallback>,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(env: &'a CellEnv) -> Self {
        Self {
            env,
            callback: None,
        }
    }

    /// Set the callback for progress reporting.
    pub fn with_callback(mut self, callback: &'a dyn ExecutionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Execute `cells` in order starting from `plan.start`, skipping the first
    /// `plan.skip` of them.
    pub fn run(&self, cells: &[&Cell], plan: BatchPlan) -> Result<BatchOutcome, BatchFailure> {
        let to_run = &cells[plan.skip.min(cells.len())..];
        tracing::debug!(
            "Batch: {} cached, {} to execute",
            cells.len() - to_run.len(),
            to_run.len()
        );
        if let Some(callback) = self.callback {
            callback.on_batch_started(cells.len() - to_run.len(), to_run.len());
        }

        let mut steps: Vec<BatchStep> = Vec::with_capacity(to_run.len());
        let mut project = Arc::clone(&plan.start);

        for cell in to_run {
            let cell_id = cell.id();
            if let Some(callback) = self.callback {
                callback.on_cell_started(cell_id);
            }

            let started = Instant::now();
            let run = cell.execute(&ExecutionContext::new(&project, self.env));

            match run.result {
                Ok(snapshot) => {
                    let elapsed = started.elapsed();
                    tracing::debug!("Executed {} in {:?}", cell_id, elapsed);
                    if let Some(callback) = self.callback {
                        callback.on_cell_completed(cell_id, elapsed);
                    }
                    project = Arc::clone(&snapshot);
                    steps.push(BatchStep {
                        cell: cell_id,
                        snapshot,
                        outputs: run.outputs,
                    });
                }
                Err(error) => {
                    tracing::warn!("Cell {} failed: {}", cell_id, error);
                    if let Some(callback) = self.callback {
                        callback.on_cell_error(cell_id, &error);
                    }
                    return Err(BatchFailure {
                        cell: cell_id,
                        error,
                        outputs: run.outputs,
                        completed: steps,
                    });
                }
            }
        }

        Ok(BatchOutcome {
            start: plan.start,
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::cell::CellMode;

    fn code(id: usize, source: &str) -> Cell {
        Cell::new(CellId::new(id), CellMode::Code, source)
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ExecutionCallback for Recorder {
        fn on_cell_started(&self, cell_id: CellId) {
            self.0.lock().unwrap().push(format!("start {}", cell_id));
        }

        fn on_cell_completed(&self, cell_id: CellId, _duration: Duration) {
            self.0.lock().unwrap().push(format!("done {}", cell_id));
        }

        fn on_cell_error(&self, cell_id: CellId, _error: &Error) {
            self.0.lock().unwrap().push(format!("error {}", cell_id));
        }
    }

    #[test]
    fn test_folds_in_order() {
        let cells = [
            code(0, "env.install(\"std\");\nproject"),
            code(1, "project.add_module(\"a\", \"std/source\");\nproject"),
            code(2, "project.add_module(\"b\", \"std/sink\");\nproject.connect(\"a\", \"b\");\nproject"),
        ];
        let refs: Vec<&Cell> = cells.iter().collect();
        let empty = Arc::new(ProjectSnapshot::empty());
        let env = CellEnv::default();

        let outcome = BatchExecutor::new(&env)
            .run(&refs, BatchPlan::from_scratch(&empty))
            .unwrap();

        assert_eq!(outcome.steps.len(), 3);
        assert_eq!(outcome.snapshot().workflow.connections.len(), 1);
        assert!(outcome.steps[1].snapshot.module("b").is_none());
    }

    #[test]
    fn test_fail_fast() {
        let cells = [
            code(0, "panic!(\"first\");\nproject"),
            code(1, "project"),
        ];
        let refs: Vec<&Cell> = cells.iter().collect();
        let empty = Arc::new(ProjectSnapshot::empty());
        let env = CellEnv::default();
        let recorder = Recorder::default();

        let failure = BatchExecutor::new(&env)
            .with_callback(&recorder)
            .run(&refs, BatchPlan::from_scratch(&empty))
            .unwrap_err();

        assert_eq!(failure.cell, CellId::new(0));
        assert!(failure.completed.is_empty());
        assert_eq!(*recorder.0.lock().unwrap(), vec!["start cell_0", "error cell_0"]);
    }

    #[test]
    fn test_resume_uses_longest_cached_prefix() {
        let empty = Arc::new(ProjectSnapshot::empty());
        let cached = Arc::new(ProjectSnapshot::empty());
        let mut store = SnapshotStore::new();
        store.set(CellId::new(0), cached.clone());
        // A cached entry after a gap is not trusted
        store.set(CellId::new(2), Arc::new(ProjectSnapshot::empty()));

        let prefix = [CellId::new(0), CellId::new(1), CellId::new(2)];
        let plan = BatchPlan::resume(&prefix, &store, &empty);

        assert_eq!(plan.skip, 1);
        assert!(Arc::ptr_eq(&plan.start, &cached));
    }

    #[test]
    fn test_fully_cached_batch_runs_nothing() {
        let cells = [code(0, "panic!(\"must not run\");\nproject")];
        let refs: Vec<&Cell> = cells.iter().collect();
        let empty = Arc::new(ProjectSnapshot::empty());
        let cached = Arc::new(ProjectSnapshot::empty());
        let mut store = SnapshotStore::new();
        store.set(CellId::new(0), cached.clone());
        let env = CellEnv::default();

        let outcome = BatchExecutor::new(&env)
            .run(&refs, BatchPlan::resume(&[CellId::new(0)], &store, &empty))
            .unwrap();

        assert!(outcome.steps.is_empty());
        assert!(Arc::ptr_eq(outcome.snapshot(), &cached));
    }
}
