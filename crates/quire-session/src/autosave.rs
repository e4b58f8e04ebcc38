//! Debounced saving of the notebook source.
//!
//! Edits arrive in bursts while someone types. The autosave task waits until
//! the source has been quiet for the configured debounce before packing it
//! and uploading it to an [`AssetStore`]. When the session goes away a pending
//! change is still flushed.

use std::sync::Arc;
use std::time::Duration;

use quire_core::NotebookSource;
use quire_sync::{AssetStore, save_notebook};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::protocol::ServerMessage;
use crate::session::NotebookSession;

/// Start saving `session` to `store` under `asset_id`.
///
/// The task ends after the session is dropped.
pub fn spawn_autosave(
    session: &NotebookSession,
    store: Arc<dyn AssetStore>,
    asset_id: impl Into<String>,
) -> JoinHandle<()> {
    let autosave = Autosave {
        store,
        asset_id: asset_id.into(),
        debounce: session.notebook().config().autosave_debounce(),
        tx: session.sender(),
    };
    tokio::spawn(autosave.run(session.watch_source()))
}

struct Autosave {
    store: Arc<dyn AssetStore>,
    asset_id: String,
    debounce: Duration,
    tx: broadcast::Sender<ServerMessage>,
}

impl Autosave {
    async fn run(self, mut rx: watch::Receiver<NotebookSource>) {
        while rx.changed().await.is_ok() {
            let open = settle(&mut rx, self.debounce).await;
            let source = rx.borrow_and_update().clone();
            self.save(source).await;
            if !open {
                break;
            }
        }
        tracing::debug!("Autosave for {} stopped", self.asset_id);
    }

    async fn save(&self, source: NotebookSource) {
        let store = Arc::clone(&self.store);
        let asset_id = self.asset_id.clone();
        let result =
            tokio::task::spawn_blocking(move || save_notebook(store.as_ref(), &asset_id, &source))
                .await;

        match result {
            Ok(Ok(bytes)) => {
                let _ = self.tx.send(ServerMessage::Saved {
                    asset_id: self.asset_id.clone(),
                    bytes,
                });
            }
            Ok(Err(e)) => tracing::warn!("Failed to save {}: {}", self.asset_id, e),
            Err(e) => tracing::error!("Save task for {} failed: {}", self.asset_id, e),
        }
    }
}

/// Wait until no change has arrived for `debounce`.
///
/// Returns `false` if the sender was dropped while waiting.
async fn settle(rx: &mut watch::Receiver<NotebookSource>, debounce: Duration) -> bool {
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            () = tokio::time::sleep(debounce) => return true,
        }
    }
}
