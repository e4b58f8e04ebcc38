//! Progress reporting for batch execution.

use std::time::Duration;

use crate::cell::CellId;
use crate::error::Error;

/// Callback trait for execution progress reporting.
pub trait ExecutionCallback: Send + Sync {
    /// Called when a cell starts executing.
    fn on_cell_started(&self, cell_id: CellId);

    /// Called when a cell completes successfully.
    fn on_cell_completed(&self, cell_id: CellId, duration: Duration);

    /// Called when a cell execution fails.
    fn on_cell_error(&self, cell_id: CellId, error: &Error);

    /// Called before the batch runs, with the number of cells skipped
    /// because their snapshot was already cached.
    fn on_batch_started(&self, _skipped: usize, _to_run: usize) {}
}

/// Fans progress out to several callbacks.
pub(crate) struct Callbacks<'a>(pub(crate) Vec<&'a dyn ExecutionCallback>);

impl ExecutionCallback for Callbacks<'_> {
    fn on_cell_started(&self, cell_id: CellId) {
        for callback in &self.0 {
            callback.on_cell_started(cell_id);
        }
    }

    fn on_cell_completed(&self, cell_id: CellId, duration: Duration) {
        for callback in &self.0 {
            callback.on_cell_completed(cell_id, duration);
        }
    }

    fn on_cell_error(&self, cell_id: CellId, error: &Error) {
        for callback in &self.0 {
            callback.on_cell_error(cell_id, error);
        }
    }

    fn on_batch_started(&self, skipped: usize, to_run: usize) {
        for callback in &self.0 {
            callback.on_batch_started(skipped, to_run);
        }
    }
}
