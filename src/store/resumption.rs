//! Upstream session resumption handle.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{JsonDocument, StoreResult, offload};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HandleDocument {
    #[serde(default)]
    previous_session_handle: Option<String>,
}

/// Process-wide holder of the single resumption handle.
///
/// Every session started after an update resumes from the newest handle.
#[derive(Debug, Clone)]
pub struct ResumptionStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    doc: JsonDocument<HandleDocument>,
    handle: RwLock<Option<String>>,
}

impl ResumptionStore {
    pub fn open(path: Option<PathBuf>) -> Self {
        let doc: JsonDocument<HandleDocument> = JsonDocument::new(path);
        let handle = doc.load().previous_session_handle;
        if let Some(handle) = &handle {
            tracing::info!(handle = %handle, "Loaded previous session handle");
        }
        Self {
            inner: Arc::new(Inner {
                doc,
                handle: RwLock::new(handle),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(None)
    }

    pub fn current(&self) -> Option<String> {
        self.inner.handle.read().clone()
    }

    /// Replace the handle and persist it before returning.
    pub fn update(&self, handle: impl Into<String>) -> StoreResult<()> {
        let handle = handle.into();
        let mut current = self.inner.handle.write();
        self.inner.doc.save(&HandleDocument {
            previous_session_handle: Some(handle.clone()),
        })?;
        *current = Some(handle);
        Ok(())
    }

    /// [`update`](Self::update) on the blocking pool, for async callers.
    pub async fn update_offloaded(&self, handle: String) -> StoreResult<()> {
        let store = self.clone();
        offload(move || store.update(handle)).await
    }

    /// Forget the handle so the next session starts fresh.
    pub fn clear(&self) -> StoreResult<()> {
        let mut current = self.inner.handle.write();
        self.inner.doc.remove()?;
        *current = None;
        Ok(())
    }
}
