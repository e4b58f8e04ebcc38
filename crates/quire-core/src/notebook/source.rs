//! The serializable form of a notebook: cell modes and contents.

use serde::{Deserialize, Serialize};

use crate::cell::CellMode;
use crate::error::Result;

/// A single cell as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSource {
    pub mode: CellMode,
    pub content: String,
}

impl CellSource {
    pub fn code(content: impl Into<String>) -> Self {
        Self {
            mode: CellMode::Code,
            content: content.into(),
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            mode: CellMode::Markdown,
            content: content.into(),
        }
    }
}

/// `{ "cells": [{ "mode": .., "content": .. }, ..] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookSource {
    pub cells: Vec<CellSource>,
}

impl NotebookSource {
    pub fn new(cells: Vec<CellSource>) -> Self {
        Self { cells }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let source = NotebookSource::new(vec![
            CellSource::markdown("# Title"),
            CellSource::code("project"),
        ]);
        let value: serde_json::Value = serde_json::from_str(&source.to_json().unwrap()).unwrap();

        assert_eq!(value["cells"][0]["mode"], "markdown");
        assert_eq!(value["cells"][1]["content"], "project");
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let err = NotebookSource::from_json(r#"{"cells":[{"mode":"raw","content":""}]}"#);
        assert!(err.is_err());
    }
}
