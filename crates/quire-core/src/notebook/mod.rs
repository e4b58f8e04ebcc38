//! Notebook controller, its events and its persisted form.

mod controller;
mod events;
mod source;
mod view;

pub use controller::{ExecuteOutcome, InsertPosition, Notebook};
pub use events::{NotebookEvent, NotebookListener};
pub use source::{CellSource, NotebookSource};
pub use view::{CellView, TocEntry};
