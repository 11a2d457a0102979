//! Persistence contract for notebooks and snippets.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{NewNotebook, NewSnippet, Notebook, Snippet, now_ms};

/// Errors returned by a [`NotebookStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No notebook with this id
    #[error("notebook not found: {0}")]
    NotebookNotFound(String),
    /// No snippet with this id
    #[error("snippet not found: {0}")]
    SnippetNotFound(String),
    /// The backing store failed
    #[error("storage error: {0}")]
    Storage(String),
}

/// CRUD over notebooks and snippets, keyed by opaque string ids.
#[async_trait]
pub trait NotebookStore: Send + Sync {
    /// Store a new notebook and return it with its id and timestamps.
    async fn create_notebook(&self, notebook: NewNotebook) -> Result<Notebook, StoreError>;

    /// Fetch a notebook.
    async fn get_notebook(&self, id: &str) -> Result<Notebook, StoreError>;

    /// Replace a notebook's contents. `id`, `user_id` and `created_at` are
    /// kept from the stored record; `updated_at` is set by the store.
    async fn update_notebook(&self, notebook: Notebook) -> Result<Notebook, StoreError>;

    /// Delete a notebook.
    async fn delete_notebook(&self, id: &str) -> Result<(), StoreError>;

    /// A user's notebooks, most recently updated first.
    async fn list_notebooks(&self, user_id: &str) -> Result<Vec<Notebook>, StoreError>;

    /// All public notebooks, most recently updated first.
    async fn list_public_notebooks(&self) -> Result<Vec<Notebook>, StoreError>;

    /// Store a new snippet.
    async fn create_snippet(&self, snippet: NewSnippet) -> Result<Snippet, StoreError>;

    /// Fetch a snippet.
    async fn get_snippet(&self, id: &str) -> Result<Snippet, StoreError>;

    /// Replace a snippet's contents, with the same rules as
    /// [`update_notebook`](Self::update_notebook).
    async fn update_snippet(&self, snippet: Snippet) -> Result<Snippet, StoreError>;

    /// Delete a snippet.
    async fn delete_snippet(&self, id: &str) -> Result<(), StoreError>;

    /// A user's snippets ordered by prefix.
    async fn list_snippets(&self, user_id: &str) -> Result<Vec<Snippet>, StoreError>;

    /// A user's snippets whose prefix starts with `typed`, ordered by prefix.
    async fn find_snippets(&self, user_id: &str, typed: &str) -> Result<Vec<Snippet>, StoreError>;
}

#[derive(Default)]
struct Records {
    notebooks: BTreeMap<String, Notebook>,
    snippets: BTreeMap<String, Snippet>,
}

/// Process-local [`NotebookStore`].
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Records>,
    next_id: AtomicU64,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self, kind: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{kind}-{n:08}")
    }
}

fn newest_first(notebooks: &mut [Notebook]) {
    notebooks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl NotebookStore for InMemoryStore {
    async fn create_notebook(&self, notebook: NewNotebook) -> Result<Notebook, StoreError> {
        let now = now_ms();
        let record = Notebook {
            id: self.allocate_id("nb"),
            title: notebook.title,
            cells: notebook.cells,
            user_id: notebook.user_id,
            created_at: now,
            updated_at: now,
            is_public: notebook.is_public,
            tags: notebook.tags,
        };
        self.records
            .write()
            .await
            .notebooks
            .insert(record.id.clone(), record.clone());
        tracing::debug!(id = %record.id, "notebook created");
        Ok(record)
    }

    async fn get_notebook(&self, id: &str) -> Result<Notebook, StoreError> {
        self.records
            .read()
            .await
            .notebooks
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotebookNotFound(id.to_string()))
    }

    async fn update_notebook(&self, notebook: Notebook) -> Result<Notebook, StoreError> {
        let mut records = self.records.write().await;
        let stored = records
            .notebooks
            .get_mut(&notebook.id)
            .ok_or_else(|| StoreError::NotebookNotFound(notebook.id.clone()))?;
        let updated = Notebook {
            user_id: stored.user_id.clone(),
            created_at: stored.created_at,
            updated_at: now_ms().max(stored.updated_at),
            ..notebook
        };
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_notebook(&self, id: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .notebooks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotebookNotFound(id.to_string()))
    }

    async fn list_notebooks(&self, user_id: &str) -> Result<Vec<Notebook>, StoreError> {
        let mut notebooks: Vec<_> = self
            .records
            .read()
            .await
            .notebooks
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut notebooks);
        Ok(notebooks)
    }

    async fn list_public_notebooks(&self) -> Result<Vec<Notebook>, StoreError> {
        let mut notebooks: Vec<_> = self
            .records
            .read()
            .await
            .notebooks
            .values()
            .filter(|n| n.is_public)
            .cloned()
            .collect();
        newest_first(&mut notebooks);
        Ok(notebooks)
    }

    async fn create_snippet(&self, snippet: NewSnippet) -> Result<Snippet, StoreError> {
        let now = now_ms();
        let record = Snippet {
            id: self.allocate_id("sn"),
            name: snippet.name,
            language: snippet.language,
            code: snippet.code,
            prefix: snippet.prefix,
            user_id: snippet.user_id,
            created_at: now,
            updated_at: now,
        };
        self.records
            .write()
            .await
            .snippets
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_snippet(&self, id: &str) -> Result<Snippet, StoreError> {
        self.records
            .read()
            .await
            .snippets
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SnippetNotFound(id.to_string()))
    }

    async fn update_snippet(&self, snippet: Snippet) -> Result<Snippet, StoreError> {
        let mut records = self.records.write().await;
        let stored = records
            .snippets
            .get_mut(&snippet.id)
            .ok_or_else(|| StoreError::SnippetNotFound(snippet.id.clone()))?;
        let updated = Snippet {
            user_id: stored.user_id.clone(),
            created_at: stored.created_at,
            updated_at: now_ms().max(stored.updated_at),
            ..snippet
        };
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_snippet(&self, id: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .snippets
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::SnippetNotFound(id.to_string()))
    }

    async fn list_snippets(&self, user_id: &str) -> Result<Vec<Snippet>, StoreError> {
        self.find_snippets(user_id, "").await
    }

    async fn find_snippets(&self, user_id: &str, typed: &str) -> Result<Vec<Snippet>, StoreError> {
        let mut snippets: Vec<_> = self
            .records
            .read()
            .await
            .snippets
            .values()
            .filter(|s| s.user_id == user_id && s.prefix.starts_with(typed))
            .cloned()
            .collect();
        snippets.sort_by(|a, b| a.prefix.cmp(&b.prefix).then_with(|| a.id.cmp(&b.id)));
        Ok(snippets)
    }
}
