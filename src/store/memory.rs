//! Assistant memory record and the commands that mutate it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JsonDocument, StoreResult, offload};

/// The persisted memory document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryRecord {
    pub enabled: bool,
    pub preferences: BTreeMap<String, Value>,
    pub context: BTreeMap<String, Value>,
    pub knowledge: BTreeMap<String, Value>,
}

/// Commands accepted in the `memory` field of a client envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryCommand {
    Enable,
    Disable,
    Clear,
    Status,
    SetPreference,
    GetPreference,
}

impl std::str::FromStr for MemoryCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            "clear" => Ok(Self::Clear),
            "status" => Ok(Self::Status),
            "set_preference" => Ok(Self::SetPreference),
            "get_preference" => Ok(Self::GetPreference),
            other => Err(format!("unknown memory command: {other}")),
        }
    }
}

/// Outcome of a memory command, ready to be rendered for the client.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryReply {
    /// A short status label such as `enabled` or `cleared`
    Status(String),
    /// The full record, returned by `status`
    Record(MemoryRecord),
    /// The value stored under a preference key, `None` when absent
    Value(Option<Value>),
    /// Nothing is sent back
    Silent,
}

/// Process-wide memory store backed by one JSON document.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    doc: JsonDocument<MemoryRecord>,
    record: Mutex<MemoryRecord>,
}

impl MemoryStore {
    /// Load the record from `path`, or start from defaults.
    pub fn open(path: Option<PathBuf>) -> Self {
        let doc: JsonDocument<MemoryRecord> = JsonDocument::new(path);
        let record = doc.load();
        Self {
            inner: Arc::new(Inner {
                doc,
                record: Mutex::new(record),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(None)
    }

    /// Snapshot of the current record.
    pub fn snapshot(&self) -> MemoryRecord {
        self.inner.record.lock().clone()
    }

    pub fn enable(&self) -> StoreResult<()> {
        self.mutate(|record| record.enabled = true)
    }

    pub fn disable(&self) -> StoreResult<()> {
        self.mutate(|record| record.enabled = false)
    }

    /// Wipe preferences, context and knowledge; the enabled flag survives.
    pub fn clear(&self) -> StoreResult<()> {
        self.mutate(|record| {
            *record = MemoryRecord {
                enabled: record.enabled,
                ..Default::default()
            }
        })
    }

    pub fn set_preference(&self, key: &str, value: Value) -> StoreResult<()> {
        self.mutate(|record| {
            record.preferences.insert(key.to_string(), value);
        })
    }

    pub fn get_preference(&self, key: &str) -> Option<Value> {
        self.inner.record.lock().preferences.get(key).cloned()
    }

    /// Run a client memory command.
    pub fn execute(
        &self,
        command: MemoryCommand,
        key: Option<&str>,
        value: Option<Value>,
    ) -> StoreResult<MemoryReply> {
        let reply = match command {
            MemoryCommand::Enable => {
                self.enable()?;
                MemoryReply::Status("enabled".to_string())
            }
            MemoryCommand::Disable => {
                self.disable()?;
                MemoryReply::Status("disabled".to_string())
            }
            MemoryCommand::Clear => {
                self.clear()?;
                MemoryReply::Status("cleared".to_string())
            }
            MemoryCommand::Status => MemoryReply::Record(self.snapshot()),
            MemoryCommand::SetPreference => match key.filter(|k| !k.is_empty()) {
                Some(key) => {
                    let value = value.unwrap_or(Value::Null);
                    let label = format!("preference set: {key}={}", display_value(&value));
                    self.set_preference(key, value)?;
                    MemoryReply::Status(label)
                }
                None => {
                    tracing::warn!("set_preference without a key, ignoring");
                    MemoryReply::Silent
                }
            },
            MemoryCommand::GetPreference => {
                MemoryReply::Value(key.and_then(|k| self.get_preference(k)))
            }
        };
        Ok(reply)
    }

    /// [`execute`](Self::execute) on the blocking pool, for async callers.
    pub async fn execute_offloaded(
        &self,
        command: MemoryCommand,
        key: Option<String>,
        value: Option<Value>,
    ) -> StoreResult<MemoryReply> {
        let store = self.clone();
        offload(move || store.execute(command, key.as_deref(), value)).await
    }

    /// Apply `f` and rewrite the document while holding the lock.
    fn mutate<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut MemoryRecord),
    {
        let mut record = self.inner.record.lock();
        f(&mut record);
        self.inner.doc.save(&record)
    }
}

/// Strings are shown bare, everything else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let store = MemoryStore::in_memory();
        let record = store.snapshot();
        assert!(!record.enabled);
        assert!(record.preferences.is_empty());
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"enabled": false, "preferences": {}, "context": {}, "knowledge": {}})
        );
    }

    #[test]
    fn test_enable_then_status() {
        let store = MemoryStore::in_memory();
        let reply = store.execute(MemoryCommand::Enable, None, None).unwrap();
        assert_eq!(reply, MemoryReply::Status("enabled".to_string()));

        match store.execute(MemoryCommand::Status, None, None).unwrap() {
            MemoryReply::Record(record) => assert!(record.enabled),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_clear_preserves_enabled() {
        let store = MemoryStore::in_memory();
        store.enable().unwrap();
        store.set_preference("color", json!("blue")).unwrap();
        store.mutate(|r| {
            r.context.insert("topic".into(), json!("math"));
            r.knowledge.insert("fact".into(), json!(1));
        })
        .unwrap();

        store.execute(MemoryCommand::Clear, None, None).unwrap();
        let record = store.snapshot();
        assert!(record.enabled);
        assert!(record.preferences.is_empty());
        assert!(record.context.is_empty());
        assert!(record.knowledge.is_empty());
    }

    #[test]
    fn test_repeated_disable_is_stable() {
        let store = MemoryStore::in_memory();
        store.enable().unwrap();
        store.disable().unwrap();
        let first = store.snapshot();
        store.disable().unwrap();
        assert_eq!(store.snapshot(), first);
    }

    #[test]
    fn test_get_missing_preference_is_null() {
        let store = MemoryStore::in_memory();
        let reply = store
            .execute(MemoryCommand::GetPreference, Some("nope"), None)
            .unwrap();
        assert_eq!(reply, MemoryReply::Value(None));
    }

    #[test]
    fn test_set_preference_reply() {
        let store = MemoryStore::in_memory();
        let reply = store
            .execute(MemoryCommand::SetPreference, Some("lang"), Some(json!("fr")))
            .unwrap();
        assert_eq!(reply, MemoryReply::Status("preference set: lang=fr".to_string()));
        assert_eq!(store.get_preference("lang"), Some(json!("fr")));

        let reply = store
            .execute(MemoryCommand::SetPreference, Some("volume"), Some(json!(3)))
            .unwrap();
        assert_eq!(reply, MemoryReply::Status("preference set: volume=3".to_string()));
    }

    #[test]
    fn test_set_preference_without_key_is_silent() {
        let store = MemoryStore::in_memory();
        let reply = store
            .execute(MemoryCommand::SetPreference, None, Some(json!("x")))
            .unwrap();
        assert_eq!(reply, MemoryReply::Silent);
        assert!(store.snapshot().preferences.is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory_store.json");

        let store = MemoryStore::open(Some(path.clone()));
        store.enable().unwrap();
        store.set_preference("name", json!("Ada")).unwrap();
        drop(store);

        let reopened = MemoryStore::open(Some(path));
        assert!(reopened.snapshot().enabled);
        assert_eq!(reopened.get_preference("name"), Some(json!("Ada")));
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory_store.json");
        std::fs::write(&path, r#"{"enabled": true}"#).unwrap();

        let store = MemoryStore::open(Some(path));
        let record = store.snapshot();
        assert!(record.enabled);
        assert!(record.knowledge.is_empty());
    }

    #[tokio::test]
    async fn test_offloaded_execute_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory_store.json");

        let store = MemoryStore::open(Some(path.clone()));
        let reply = store
            .execute_offloaded(MemoryCommand::SetPreference, Some("city".into()), Some(json!("Oslo")))
            .await
            .unwrap();
        assert_eq!(reply, MemoryReply::Status("preference set: city=Oslo".to_string()));

        let reopened = MemoryStore::open(Some(path));
        assert_eq!(reopened.get_preference("city"), Some(json!("Oslo")));
    }

    #[test]
    fn test_command_names() {
        assert_eq!(
            "get_preference".parse::<MemoryCommand>(),
            Ok(MemoryCommand::GetPreference)
        );
        assert_eq!("clear".parse::<MemoryCommand>(), Ok(MemoryCommand::Clear));
        assert!("forget".parse::<MemoryCommand>().is_err());
    }
}
