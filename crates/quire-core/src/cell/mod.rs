//! Notebook cells.
//!
//! A cell is either code or markdown. Both run against the snapshot left by
//! the previous cell: markdown hands it back unchanged, code runs its body
//! and hands back the next snapshot.

mod code;
mod context;
mod markdown;
pub mod script;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use code::CodeCell;
pub use context::{CellEnv, CellOutput, CellRun, ExecutionContext};
pub use markdown::{MarkdownCell, Section};

/// Unique identifier for a cell within a notebook.
///
/// Ids are never reused: editing keeps the id, a mode change allocates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub(crate) usize);

impl CellId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellMode {
    Code,
    Markdown,
}

impl fmt::Display for CellMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Markdown => write!(f, "markdown"),
        }
    }
}

/// A notebook cell.
#[derive(Debug, Clone)]
pub enum Cell {
    Code(CodeCell),
    Markdown(MarkdownCell),
}

impl Cell {
    pub fn new(id: CellId, mode: CellMode, source: impl Into<String>) -> Self {
        match mode {
            CellMode::Code => Self::Code(CodeCell::new(id, source)),
            CellMode::Markdown => Self::Markdown(MarkdownCell::new(id, source)),
        }
    }

    pub fn id(&self) -> CellId {
        match self {
            Self::Code(cell) => cell.id(),
            Self::Markdown(cell) => cell.id(),
        }
    }

    pub fn mode(&self) -> CellMode {
        match self {
            Self::Code(_) => CellMode::Code,
            Self::Markdown(_) => CellMode::Markdown,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Code(cell) => cell.source(),
            Self::Markdown(cell) => cell.source(),
        }
    }

    /// Replace the source in place. Returns `false` if it was unchanged.
    pub fn set_source(&mut self, source: String) -> bool {
        if self.source() == source {
            return false;
        }
        match self {
            Self::Code(cell) => cell.set_source(source),
            Self::Markdown(cell) => cell.set_source(source),
        }
        true
    }

    /// A cell of `mode` under `id`, carrying this cell's source.
    pub fn with_mode(&self, id: CellId, mode: CellMode) -> Self {
        Self::new(id, mode, self.source())
    }

    /// Run the cell against `ctx.project`.
    pub fn execute(&self, ctx: &ExecutionContext<'_>) -> CellRun {
        match self {
            Self::Code(cell) => cell.execute(ctx),
            Self::Markdown(_) => CellRun::identity(ctx.project),
        }
    }

    /// Headings contributed to the table of contents.
    pub fn sections(&self) -> Vec<Section> {
        match self {
            Self::Code(_) => Vec::new(),
            Self::Markdown(cell) => cell.sections(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::project::ProjectSnapshot;

    #[test]
    fn test_markdown_is_identity() {
        let empty = Arc::new(ProjectSnapshot::empty());
        let env = CellEnv::default();
        let cell = Cell::new(CellId::new(0), CellMode::Markdown, "# Title");

        let run = cell.execute(&ExecutionContext::new(&empty, &env));

        assert!(Arc::ptr_eq(&run.result.unwrap(), &empty));
        assert!(run.outputs.is_empty());
    }

    #[test]
    fn test_with_mode_keeps_source() {
        let cell = Cell::new(CellId::new(1), CellMode::Markdown, "project");
        let code = cell.with_mode(CellId::new(2), CellMode::Code);

        assert_eq!(code.id(), CellId::new(2));
        assert_eq!(code.mode(), CellMode::Code);
        assert_eq!(code.source(), "project");
    }

    #[test]
    fn test_set_source_reports_change() {
        let mut cell = Cell::new(CellId::new(0), CellMode::Code, "project");
        assert!(!cell.set_source("project".to_string()));
        assert!(cell.set_source("return project;".to_string()));
        assert_eq!(cell.source(), "return project;");
    }

    #[test]
    fn test_display() {
        assert_eq!(CellId::new(7).to_string(), "cell_7");
        assert_eq!(CellMode::Markdown.to_string(), "markdown");
    }
}
