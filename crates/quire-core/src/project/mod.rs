//! Workflow projects produced by notebook execution.
//!
//! This module provides:
//! - Project snapshots (workflow, macros, views, worksheets, environment)
//! - Instance pools of live resources with keep-alive teardown

mod pool;
mod snapshot;

pub use pool::{InstancePool, Resource, ResourceId, ResourceKind};
pub use snapshot::{
    Connection, Environment, MAIN_WORKFLOW_ID, MacroDef, ModuleInstance, ProjectSnapshot,
    SnapshotSummary, View, WorkerPool, Workflow, Worksheet,
};
