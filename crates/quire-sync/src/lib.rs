//! Persistence for Quire notebooks.
//!
//! Notebooks are stored as their cell sources (`{ "cells": [{ "mode", "content" }] }`),
//! either as plain JSON files or packed into zip archives holding `source.json`.
//!
//! # Architecture
//!
//! ```text
//! NotebookSource ──► pack ──► source.zip ──► AssetStore::put
//!       ▲                                         │
//!       └──────── unpack ◄──── AssetStore::get ◄──┘
//! ```

mod archive;
mod assets;
mod error;
mod file;

pub use archive::{ARCHIVE_ENTRY, is_archive, pack, unpack};
pub use assets::{
    ASSET_FILE, AssetStore, FsAssetStore, MemoryAssetStore, load_notebook, save_notebook,
};
pub use error::{SyncError, SyncResult};
pub use file::{is_packed_path, read_notebook, write_notebook};
