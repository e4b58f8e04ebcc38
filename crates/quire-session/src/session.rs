//! Notebook session management.
//!
//! A session owns one [`Notebook`], forwards its events to every subscriber
//! and publishes the notebook source whenever an edit changes it.

use std::sync::Arc;

use quire_core::{Notebook, NotebookConfig, NotebookEvent, NotebookSource};
use quire_sync::{AssetStore, load_notebook};
use tokio::sync::{RwLock, broadcast, watch};

use crate::error::{ServerError, ServerResult};
use crate::protocol::{ClientMessage, ServerMessage, tab_for};

/// Shared handle to a session.
///
/// Writers queue on the lock in arrival order, so overlapping requests run
/// one after another.
pub type SessionHandle = Arc<RwLock<NotebookSession>>;

/// Capacity for the broadcast channel.
/// If clients fall behind, older messages will be dropped.
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// A notebook session.
pub struct NotebookSession {
    notebook: Notebook,

    /// Broadcast channel for server messages.
    tx: broadcast::Sender<ServerMessage>,

    /// Latest notebook source, for autosave.
    source_tx: watch::Sender<NotebookSource>,
}

impl NotebookSession {
    /// Wrap a notebook. Returns the session and a first subscriber.
    pub fn new(mut notebook: Notebook) -> (Self, broadcast::Receiver<ServerMessage>) {
        let (tx, rx) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);

        let events = tx.clone();
        notebook.add_listener(move |event: &NotebookEvent| {
            // No subscribers is not an error.
            let _ = events.send(ServerMessage::Event {
                event: event.clone(),
            });
        });

        let (source_tx, _) = watch::channel(notebook.source());

        (
            Self {
                notebook,
                tx,
                source_tx,
            },
            rx,
        )
    }

    /// Open the notebook stored under `asset_id`.
    pub fn load(
        store: &dyn AssetStore,
        asset_id: &str,
        config: NotebookConfig,
    ) -> ServerResult<(Self, broadcast::Receiver<ServerMessage>)> {
        let source = load_notebook(store, asset_id)?;
        tracing::info!("Loaded asset {} with {} cells", asset_id, source.cells.len());
        Ok(Self::new(Notebook::from_source(&source, config)))
    }

    pub fn into_handle(self) -> SessionHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn notebook(&self) -> &Notebook {
        &self.notebook
    }

    /// Subscribe to server messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    /// Watch the notebook source. The receiver starts at the current source.
    pub fn watch_source(&self) -> watch::Receiver<NotebookSource> {
        self.source_tx.subscribe()
    }

    pub(crate) fn sender(&self) -> broadcast::Sender<ServerMessage> {
        self.tx.clone()
    }

    /// Broadcast a message to all subscribers.
    pub fn broadcast(&self, msg: ServerMessage) {
        let _ = self.tx.send(msg);
    }

    /// Full state for clients.
    pub fn get_state(&self) -> ServerMessage {
        let tabs = self.notebook.tabs();
        ServerMessage::NotebookState {
            cells: self.notebook.cell_views(),
            toc: self.notebook.table_of_contents(),
            tabs: tabs.infos(),
            selected_tab: tabs.selected().map(str::to_string),
            panels: tabs.panels().clone(),
            current: self.notebook.current().summary(),
        }
    }

    /// Apply one client message.
    ///
    /// Returns the direct reply, if the message has one. Everything else
    /// reaches clients through the broadcast channel.
    pub fn handle(&mut self, msg: ClientMessage) -> ServerResult<Option<ServerMessage>> {
        let edits_source = msg.edits_source();
        let mut structural = false;

        let reply = match msg {
            ClientMessage::GetState => Some(self.get_state()),

            ClientMessage::Execute { cell_id } => {
                let outcome = self.notebook.execute(cell_id)?;
                tracing::info!(
                    "Executed {} cells, {} cached",
                    outcome.executed.len(),
                    outcome.cached.len()
                );
                None
            }

            ClientMessage::CellEdit { cell_id, source } => {
                self.notebook.set_source(cell_id, source)?;
                None
            }

            ClientMessage::InsertCell {
                reference,
                position,
            } => {
                self.notebook.insert_cell(reference, position)?;
                structural = true;
                None
            }

            ClientMessage::DeleteCell { cell_id } => {
                self.notebook.delete_cell(cell_id)?;
                structural = true;
                None
            }

            ClientMessage::MoveCell { cell_id, delta } => {
                structural = self.notebook.move_cell(cell_id, delta)?;
                None
            }

            ClientMessage::ChangeMode { cell_id, mode } => {
                self.notebook.change_cell_mode(cell_id, mode)?;
                structural = true;
                None
            }

            ClientMessage::SelectCell { cell_id } => {
                self.notebook.select_cell(cell_id)?;
                None
            }

            ClientMessage::OpenTab { category, name } => {
                if !self.notebook.open_tab(tab_for(category, &name)) {
                    return Err(ServerError::InvalidOperation(format!(
                        "{:?} '{}' is not in the current project",
                        category, name
                    )));
                }
                None
            }

            ClientMessage::CloseTab { tab_id } => {
                self.notebook.close_tab(&tab_id);
                None
            }

            ClientMessage::SelectTab { tab_id } => {
                if !self.notebook.select_tab(&tab_id) {
                    return Err(ServerError::InvalidOperation(format!(
                        "tab '{}' is not open",
                        tab_id
                    )));
                }
                None
            }

            ClientMessage::OpenPanel { kind, module_id } => {
                if !self.notebook.open_panel(kind, &module_id) {
                    return Err(ServerError::InvalidOperation(format!(
                        "module '{}' is not in the current project",
                        module_id
                    )));
                }
                None
            }

            ClientMessage::ClosePanel { kind, module_id } => {
                self.notebook.close_panel(kind, &module_id);
                None
            }
        };

        if structural {
            self.broadcast(self.get_state());
        }
        if edits_source {
            self.publish_source();
        }
        Ok(reply)
    }

    /// Parse and apply a JSON-encoded client message.
    pub fn handle_json(&mut self, text: &str) -> ServerResult<Option<ServerMessage>> {
        let msg: ClientMessage = serde_json::from_str(text)?;
        self.handle(msg)
    }

    fn publish_source(&self) {
        let source = self.notebook.source();
        self.source_tx.send_if_modified(|current| {
            if *current == source {
                false
            } else {
                *current = source;
                true
            }
        });
    }
}

/// Handle one client message against a shared session.
///
/// Failures come back as [`ServerMessage::Error`]; session state is left as
/// the failed operation found it.
pub async fn dispatch(handle: &SessionHandle, msg: ClientMessage) -> Option<ServerMessage> {
    let mut session = handle.write().await;
    match session.handle(msg) {
        Ok(reply) => reply,
        Err(e) => Some(error_message(&e)),
    }
}

fn error_message(e: &ServerError) -> ServerMessage {
    let cell_id = match e {
        ServerError::Core(core) => core.cell(),
        _ => None,
    };
    if e.is_execution_error() {
        tracing::debug!("Execution failed: {}", e);
    } else {
        tracing::warn!("Request failed: {}", e);
    }
    ServerMessage::Error {
        message: e.to_string(),
        cell_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_core::{CellSource, InsertPosition};

    fn session() -> (NotebookSession, broadcast::Receiver<ServerMessage>) {
        let source = NotebookSource::new(vec![
            CellSource::code("env.install(\"std\");\nproject.add_module(\"a\", \"std/source\");\nproject"),
            CellSource::code("project"),
        ]);
        NotebookSession::new(Notebook::from_source(&source, NotebookConfig::default()))
    }

    #[test]
    fn test_get_state_replies() {
        let (mut session, _rx) = session();
        let reply = session.handle(ClientMessage::GetState).unwrap();
        match reply {
            Some(ServerMessage::NotebookState { cells, .. }) => assert_eq!(cells.len(), 2),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_edit_publishes_source() {
        let (mut session, _rx) = session();
        let mut source_rx = session.watch_source();
        let cell_id = session.notebook().cell_ids()[1];

        session
            .handle(ClientMessage::CellEdit {
                cell_id,
                source: "project".to_string(),
            })
            .unwrap();
        assert!(!source_rx.has_changed().unwrap());

        session
            .handle(ClientMessage::CellEdit {
                cell_id,
                source: "cell.emit(1);\nproject".to_string(),
            })
            .unwrap();
        assert!(source_rx.has_changed().unwrap());
        assert_eq!(
            source_rx.borrow_and_update().cells[1].content,
            "cell.emit(1);\nproject"
        );
    }

    #[test]
    fn test_insert_broadcasts_state() {
        let (mut session, mut rx) = session();
        session
            .handle(ClientMessage::InsertCell {
                reference: None,
                position: InsertPosition::After,
            })
            .unwrap();

        let mut saw_state = false;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::NotebookState { cells, .. } = msg {
                assert_eq!(cells.len(), 3);
                saw_state = true;
            }
        }
        assert!(saw_state);
    }

    #[test]
    fn test_handle_json_rejects_garbage() {
        let (mut session, _rx) = session();
        assert!(matches!(
            session.handle_json("{\"type\":\"nope\"}"),
            Err(ServerError::Json(_))
        ));
    }
}
