//! Session protocol messages.
//!
//! Defines the message types exchanged between a UI client and a session.

use quire_core::{
    CellId, CellMode, CellView, InsertPosition, ModulePanels, NotebookEvent, PanelKind,
    SnapshotSummary, Tab, TabCategory, TabInfo, TocEntry,
};
use serde::{Deserialize, Serialize};

/// Messages sent from client to session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request current notebook state.
    GetState,

    /// Execute up to a cell. `None` executes the whole notebook.
    Execute {
        #[serde(default)]
        cell_id: Option<CellId>,
    },

    /// Replace a cell's source.
    CellEdit {
        /// Cell identifier.
        cell_id: CellId,
        /// New source text.
        source: String,
    },

    /// Insert a new code cell.
    InsertCell {
        /// Reference cell. None = insert at the head.
        #[serde(default)]
        reference: Option<CellId>,
        position: InsertPosition,
    },

    /// Delete a cell.
    DeleteCell { cell_id: CellId },

    /// Move a cell by a signed offset.
    MoveCell { cell_id: CellId, delta: isize },

    /// Switch a cell between code and markdown.
    ChangeMode { cell_id: CellId, mode: CellMode },

    /// Display the snapshot after a cell.
    SelectCell { cell_id: CellId },

    /// Open a tab for a project entity.
    OpenTab { category: TabCategory, name: String },

    /// Close a tab by id.
    CloseTab { tab_id: String },

    /// Select an open tab.
    SelectTab { tab_id: String },

    /// Open a module side panel.
    OpenPanel { kind: PanelKind, module_id: String },

    /// Close a module side panel.
    ClosePanel { kind: PanelKind, module_id: String },
}

impl ClientMessage {
    /// Whether handling this message can change the notebook source.
    pub fn edits_source(&self) -> bool {
        matches!(
            self,
            Self::CellEdit { .. }
                | Self::InsertCell { .. }
                | Self::DeleteCell { .. }
                | Self::MoveCell { .. }
                | Self::ChangeMode { .. }
        )
    }
}

/// Build the tab a client asked for.
pub fn tab_for(category: TabCategory, name: &str) -> Tab {
    match category {
        TabCategory::Workflow => Tab::workflow(),
        TabCategory::Macro => Tab::macro_def(name),
        TabCategory::Worksheet => Tab::worksheet(name),
        TabCategory::View => Tab::view(name),
        TabCategory::Module => Tab::module(name),
        TabCategory::Toolbox => Tab::toolbox(name),
    }
}

/// Messages sent from session to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full notebook state (sent on request or after structural changes).
    NotebookState {
        cells: Vec<CellView>,
        toc: Vec<TocEntry>,
        tabs: Vec<TabInfo>,
        selected_tab: Option<String>,
        panels: ModulePanels,
        /// The currently displayed snapshot.
        current: SnapshotSummary,
    },

    /// A notebook event, forwarded as it happens.
    Event { event: NotebookEvent },

    /// A request failed.
    Error {
        message: String,
        /// Cell the failure is attributed to, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        cell_id: Option<CellId>,
    },

    /// The notebook was saved to the asset store.
    Saved { asset_id: String, bytes: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_without_cell_defaults_to_all() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"execute"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Execute { cell_id: None });
    }

    #[test]
    fn test_edits_source() {
        assert!(ClientMessage::DeleteCell { cell_id: CellId::new(0) }.edits_source());
        assert!(!ClientMessage::GetState.edits_source());
        assert!(!ClientMessage::Execute { cell_id: None }.edits_source());
    }

    #[test]
    fn test_tab_for_category() {
        assert_eq!(tab_for(TabCategory::Workflow, "ignored").id, "workflow:main");
        let tab = tab_for(TabCategory::Module, "a");
        assert_eq!(tab.category, TabCategory::Module);
        assert_eq!(tab.name, "a");
    }
}
