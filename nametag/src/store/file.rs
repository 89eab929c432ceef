//! JSON file backed key-value store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// Store persisted as one JSON object in a single file.
///
/// The file is read on first access and rewritten in full after every
/// mutation. A missing file is an empty store; parent directories are created
/// on the first write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<Option<HashMap<String, Value>>>,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. Nothing is read until first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, Value>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(HashMap::new());
        }
        let raw = tokio::fs::read(&self.path).await?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(HashMap::new());
        }
        match serde_json::from_slice::<Value>(&raw)? {
            Value::Object(map) => {
                debug!(path = %self.path.display(), entries = map.len(), "loaded store file");
                Ok(map.into_iter().collect())
            }
            other => Err(Error::store(format!(
                "{} does not hold a JSON object (found {})",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    async fn persist(&self, entries: &HashMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }

    /// Run `f` against the loaded entries, persisting if it reports a change.
    async fn with_entries<T: Send>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Value>) -> (T, bool) + Send,
    ) -> Result<T> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let Some(entries) = guard.as_mut() else {
            return Err(Error::store("store state unavailable"));
        };
        let (out, changed) = f(entries);
        if changed {
            self.persist(entries).await?;
        }
        Ok(out)
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>> {
        self.with_entries(|entries| {
            let found = keys
                .iter()
                .filter_map(|k| entries.get(k).map(|v| (k.clone(), v.clone())))
                .collect();
            (found, false)
        })
        .await
    }

    async fn set(&self, new_entries: HashMap<String, Value>) -> Result<()> {
        if new_entries.is_empty() {
            return Ok(());
        }
        self.with_entries(|entries| {
            entries.extend(new_entries);
            ((), true)
        })
        .await
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        self.with_entries(|entries| {
            let before = entries.len();
            for key in keys {
                entries.remove(key);
            }
            ((), entries.len() != before)
        })
        .await
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        self.with_entries(|entries| (entries.clone(), false)).await
    }
}
