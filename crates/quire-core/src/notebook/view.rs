//! Read-only projections of notebook state for UIs.

use serde::Serialize;

use crate::cell::{CellId, CellMode, CellOutput};

/// Everything a UI needs to render one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellView {
    pub id: CellId,
    pub mode: CellMode,
    pub source: String,
    /// The cell has a snapshot in the store.
    pub cached: bool,
    /// The cell is cached and nothing after it is: the edge of valid results.
    pub frontier: bool,
    pub outputs: Vec<CellOutput>,
}

/// A table of contents entry taken from a markdown heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub cell_id: CellId,
    pub level: u8,
    pub title: String,
}
