//! Key-value storage behind the resolution cache.
//!
//! The engine only talks to [`KeyValueStore`]. Two implementations ship with
//! the crate:
//!
//! - [`InMemoryStore`]: process-local, lost on exit.
//! - [`JsonFileStore`]: a single JSON object on disk, rewritten on every
//!   mutation.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Asynchronous string-keyed store of JSON values.
///
/// Implementations must be safe to share between tasks. Batch operations are
/// not required to be atomic.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the given keys. Keys that are absent are omitted from the map.
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>>;

    /// Insert or overwrite every entry.
    async fn set(&self, entries: HashMap<String, Value>) -> Result<()>;

    /// Remove the given keys. Absent keys are ignored.
    async fn remove(&self, keys: &[String]) -> Result<()>;

    /// Every stored entry.
    async fn get_all(&self) -> Result<HashMap<String, Value>>;
}
