//! Async session layer for Quire notebooks.
//!
//! Wraps a [`quire_core::Notebook`] for use from async UI servers.
//!
//! # Architecture
//!
//! ```text
//!   client ──ClientMessage──▶ dispatch ──▶ SessionHandle (RwLock)
//!                                               │
//!                                       NotebookSession
//!                                        │            │
//!                     broadcast<ServerMessage>    watch<NotebookSource>
//!                                        │            │
//!                                    subscribers   autosave ──▶ AssetStore
//! ```
//!
//! - **Session**: owns the notebook, forwards its events, publishes source
//! - **Protocol**: client/server message types
//! - **Autosave**: debounced upload of the source to an asset store

pub mod autosave;
pub mod error;
pub mod protocol;
pub mod session;

pub use autosave::spawn_autosave;
pub use error::{ServerError, ServerResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{NotebookSession, SessionHandle, dispatch};
