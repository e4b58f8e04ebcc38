//! Core engine for Quire notebooks.
//!
//! This crate provides:
//! - Cells (code and markdown) and the interpreter for code cell bodies
//! - Project snapshots and the live resources backing them
//! - The snapshot store caching per-cell results
//! - Batch execution of cell prefixes
//! - The notebook controller and tab tracking

pub mod cell;
pub mod config;
pub mod error;
pub mod execute;
pub mod notebook;
pub mod project;
pub mod store;
pub mod tabs;

pub use cell::{Cell, CellEnv, CellId, CellMode, CellOutput, CellRun, ExecutionContext};
pub use config::NotebookConfig;
pub use error::{Error, Result};
pub use execute::{BatchExecutor, BatchFailure, BatchOutcome, BatchPlan, ExecutionCallback};
pub use notebook::{
    CellSource, CellView, ExecuteOutcome, InsertPosition, Notebook, NotebookEvent,
    NotebookListener, NotebookSource, TocEntry,
};
pub use project::{ProjectSnapshot, ResourceId, SnapshotSummary};
pub use store::SnapshotStore;
pub use tabs::{Liveness, ModulePanels, PanelKind, Tab, TabCategory, TabInfo, TabManager};
