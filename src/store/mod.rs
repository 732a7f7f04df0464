//! File-backed state shared by every session.
//!
//! Each store owns a single flat JSON document that is read once at startup
//! and rewritten wholly on every mutation:
//!
//! - [`MemoryStore`] - assistant memory (enabled flag, preferences, context, knowledge)
//! - [`ResumptionStore`] - the upstream session resumption handle
//!
//! Both stores are process-wide. Mutations go through a lock held for the
//! duration of the in-memory update and the file rewrite, so writers are
//! serialized and the file always reflects the last completed mutation.

mod memory;
mod resumption;

use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use memory::{MemoryCommand, MemoryRecord, MemoryReply, MemoryStore};
pub use resumption::ResumptionStore;

/// Errors raised while persisting a document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Run a store operation on the blocking pool. File rewrites happen under the
/// store lock and must not stall the async workers driving the relays.
async fn offload<T, F>(op: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

/// A single JSON document on disk.
///
/// Without a path the document lives only in memory, which is what tests
/// and ephemeral deployments use.
#[derive(Debug, Clone)]
pub struct JsonDocument<T> {
    path: Option<PathBuf>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Read the document, falling back to the default when the file is
    /// missing or unreadable.
    pub fn load(&self) -> T {
        let Some(path) = &self.path else {
            return T::default();
        };

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read document, using defaults: {}", e);
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Corrupt document, using defaults: {}", e);
                T::default()
            }
        }
    }

    /// Rewrite the whole document.
    ///
    /// The content goes to a sibling temp file first and is renamed over the
    /// target, so readers never observe a partially written document.
    pub fn save(&self, doc: &T) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec(doc)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })
    }

    /// Delete the document. A missing file is not an error.
    pub fn remove(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                path: path.clone(),
                source,
            }),
        }
    }
}
