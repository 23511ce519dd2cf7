//! Persistence of the visible search state and the batch queue across
//! sessions.
//!
//! Backends store opaque bytes under string keys; the typed `save`/`load`
//! helpers wrap payloads in versioned envelopes.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metascout_model::{ItemStatus, ViewState, ViewStatus, WorkItem};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::config::PersistenceConfig;
use crate::error::{Result, ScoutError};

/// Bumped whenever the persisted layout of [`ViewState`] or [`WorkItem`]
/// changes.
pub const PERSIST_VERSION: u32 = 1;

#[async_trait]
pub trait Persistence: Send + Sync + fmt::Debug {
    /// Store raw bytes under `key`, replacing any previous entry.
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Raw bytes stored under `key`, or `None` when there are none.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn save(&self, key: &str, view: &ViewState) -> Result<()> {
        let bytes = serde_json::to_vec(&PersistedView::new(view))?;
        self.write(key, bytes).await
    }

    /// Load a previously saved state. Missing or incompatible entries load
    /// as `None`.
    async fn load(&self, key: &str) -> Result<Option<ViewState>> {
        Ok(self
            .read(key)
            .await?
            .and_then(|bytes| decode::<PersistedView>(&bytes))
            .and_then(PersistedView::into_view))
    }

    async fn save_items(&self, key: &str, items: &[WorkItem]) -> Result<()> {
        let bytes = serde_json::to_vec(&PersistedItems::new(items))?;
        self.write(key, bytes).await
    }

    /// Load a previously saved batch queue. Missing or incompatible entries
    /// load as `None`.
    async fn load_items(&self, key: &str) -> Result<Option<Vec<WorkItem>>> {
        Ok(self
            .read(key)
            .await?
            .and_then(|bytes| decode::<PersistedItems>(&bytes))
            .and_then(PersistedItems::into_items))
    }
}

/// Envelope written for the visible state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedView {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub view: ViewState,
}

impl PersistedView {
    pub fn new(view: &ViewState) -> Self {
        Self {
            version: PERSIST_VERSION,
            saved_at: Utc::now(),
            view: view.clone(),
        }
    }

    /// Unwrap into a state that is safe to display after a restart.
    ///
    /// Nothing can be in flight in a fresh process, so a persisted loading
    /// projection becomes idle and a paused batch is no longer paused.
    pub fn into_view(self) -> Option<ViewState> {
        if !version_matches(self.version) {
            return None;
        }
        let mut view = self.view;
        if view.status == ViewStatus::Loading {
            view.status = ViewStatus::Idle;
            view.progress_text.clear();
        }
        view.batch.paused = false;
        view.batch.running = false;
        view.scrape_progress.clear();
        Some(view)
    }
}

/// Envelope written for the batch queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedItems {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub items: Vec<WorkItem>,
}

impl PersistedItems {
    pub fn new(items: &[WorkItem]) -> Self {
        Self {
            version: PERSIST_VERSION,
            saved_at: Utc::now(),
            items: items.to_vec(),
        }
    }

    /// Unwrap into a queue that can be driven again. Items that were being
    /// searched when the state was saved go back to pending.
    pub fn into_items(self) -> Option<Vec<WorkItem>> {
        if !version_matches(self.version) {
            return None;
        }
        let mut items = self.items;
        for item in items
            .iter_mut()
            .filter(|item| item.status == ItemStatus::Searching)
        {
            item.reset();
        }
        Some(items)
    }
}

fn version_matches(version: u32) -> bool {
    if version == PERSIST_VERSION {
        return true;
    }
    warn!(
        version,
        expected = PERSIST_VERSION,
        "ignoring persisted entry with foreign version"
    );
    false
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    match serde_json::from_slice(bytes) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(error = %err, "discarding unreadable persisted entry");
            None
        }
    }
}

/// Process-local persistence, mostly for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryPersistence {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.entries.lock().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }
}

/// On-disk persistence backed by a `cacache` directory.
#[derive(Debug, Clone)]
pub struct CachePersistence {
    root: PathBuf,
}

impl CachePersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_key(key: &str) -> String {
        format!("metascout/v{PERSIST_VERSION}/{key}")
    }
}

#[async_trait]
impl Persistence for CachePersistence {
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        cacache::write(self.root.as_path(), Self::cache_key(key), bytes)
            .await
            .map_err(|e| {
                ScoutError::Persistence(format!("cacache write failed: {e}"))
            })?;
        debug!(key, root = %self.root.display(), "persisted entry");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match cacache::read(self.root.as_path(), Self::cache_key(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(e) => Err(ScoutError::Persistence(format!(
                "cacache read failed: {e}"
            ))),
        }
    }
}

/// Build the persistence backend selected by configuration.
pub fn from_config(config: &PersistenceConfig) -> Arc<dyn Persistence> {
    match &config.cache_dir {
        Some(dir) => Arc::new(CachePersistence::new(dir)),
        None => Arc::new(MemoryPersistence::new()),
    }
}
