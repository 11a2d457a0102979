//! Notebooks, cells and snippets.
//!
//! The records mirror what the document store persists. Ids are opaque
//! strings assigned by the store; timestamps are milliseconds since the Unix
//! epoch.

mod session;
mod store;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::language::Language;

pub use session::{CellOutput, Session};
pub use store::{InMemoryStore, NotebookStore, StoreError};

/// What a cell holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CellKind {
    /// Source code in `language`.
    Code {
        /// Language of the source.
        language: Language,
    },
    /// Markdown text, never executed.
    Markdown,
}

/// One unit of source in a notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Id, unique within its notebook.
    pub id: String,
    /// Code or markdown.
    #[serde(flatten)]
    pub kind: CellKind,
    /// Cell contents.
    #[serde(default)]
    pub source: String,
}

impl Cell {
    /// A code cell.
    pub fn code(id: impl Into<String>, language: Language, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: CellKind::Code { language },
            source: source.into(),
        }
    }

    /// A markdown cell.
    pub fn markdown(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: CellKind::Markdown,
            source: source.into(),
        }
    }

    /// The language of a code cell.
    pub fn language(&self) -> Option<Language> {
        match self.kind {
            CellKind::Code { language } => Some(language),
            CellKind::Markdown => None,
        }
    }
}

/// A stored notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    /// Store-assigned id.
    #[serde(default)]
    pub id: String,
    /// Display title.
    pub title: String,
    /// Cells in display order.
    #[serde(default)]
    pub cells: Vec<Cell>,
    /// Owner.
    #[serde(default)]
    pub user_id: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: u64,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: u64,
    /// Whether other users can list and read it.
    #[serde(default)]
    pub is_public: bool,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Fields of a notebook before the store assigns an id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotebook {
    /// Display title.
    pub title: String,
    /// Initial cells.
    #[serde(default)]
    pub cells: Vec<Cell>,
    /// Owner.
    pub user_id: String,
    /// Whether other users can list and read it.
    #[serde(default)]
    pub is_public: bool,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A reusable piece of code, expanded in the editor when its prefix is typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// Store-assigned id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Language of `code`.
    pub language: Language,
    /// The snippet body.
    pub code: String,
    /// Trigger text.
    pub prefix: String,
    /// Owner.
    pub user_id: String,
    /// Creation time.
    pub created_at: u64,
    /// Last modification time.
    pub updated_at: u64,
}

/// Fields of a snippet before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSnippet {
    /// Display name.
    pub name: String,
    /// Language of `code`.
    pub language: Language,
    /// The snippet body.
    pub code: String,
    /// Trigger text.
    pub prefix: String,
    /// Owner.
    pub user_id: String,
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_cell_json_shape() {
        let cell = Cell::code("c1", Language::React, "render(<p />)");
        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(
            json,
            json!({"id": "c1", "type": "code", "language": "react", "source": "render(<p />)"})
        );

        let md: Cell = serde_json::from_value(json!({"id": "m", "type": "markdown"})).unwrap();
        assert_eq!(md, Cell::markdown("m", ""));
        assert_eq!(md.language(), None);
    }

    #[test]
    fn test_notebook_document_defaults() {
        let notebook: Notebook = serde_json::from_value(json!({
            "title": "Scratch",
            "cells": [{"id": "a", "type": "code", "language": "ts", "source": "let x = 1"}]
        }))
        .unwrap();

        assert_eq!(notebook.cells[0].language(), Some(Language::TypeScript));
        assert!(!notebook.is_public);
        assert!(notebook.id.is_empty());
    }
}
