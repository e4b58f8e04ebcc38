//! Markdown cells: documentation that passes the project through unchanged.

use serde::Serialize;

use super::CellId;

/// A heading found in a markdown cell, used for the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// 1 for `#`, 2 for `##`, 3 for `###`.
    pub level: u8,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct MarkdownCell {
    id: CellId,
    source: String,
}

impl MarkdownCell {
    pub fn new(id: CellId, source: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: String) {
        self.source = source;
    }

    /// Headings of level 1 to 3, in document order.
    ///
    /// Lines inside fenced code blocks are skipped.
    pub fn sections(&self) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut in_fence = false;

        for line in self.source.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }

            let level = trimmed.bytes().take_while(|b| *b == b'#').count();
            if !(1..=3).contains(&level) {
                continue;
            }
            let rest = &trimmed[level..];
            if !rest.starts_with(' ') {
                continue;
            }
            let title = rest.trim().trim_end_matches('#').trim_end();
            if !title.is_empty() {
                sections.push(Section {
                    level: level as u8,
                    title: title.to_string(),
                });
            }
        }

        sections
    }
}
