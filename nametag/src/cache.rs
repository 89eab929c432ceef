//! TTL cache of resolved names over an injected [`KeyValueStore`].
//!
//! Each address maps to one store key, `"<prefix><0x lowercase hex>"`, holding
//! `{"name": string | null, "timestamp": ms}`. A `null` name is a negative
//! result and is cached exactly like a positive one. Expiry is checked at read
//! time; nothing sweeps stale entries.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::address::to_lower_hex;
use crate::config::Config;
use crate::error::Result;
use crate::name::Name;
use crate::store::KeyValueStore;
use crate::util::{saturating_millis, timestamp_ms};

/// Default namespace prefix for cache keys.
pub const DEFAULT_PREFIX: &str = Config::DEFAULT_CACHE_PREFIX;

/// A cached resolution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Resolved name, or `None` for a cached negative result.
    pub name: Option<Name>,
    /// When the entry was written, in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl CacheEntry {
    /// Entry written at `timestamp`.
    #[must_use]
    pub const fn new(name: Option<Name>, timestamp: u64) -> Self {
        Self { name, timestamp }
    }

    /// Whether the entry is younger than `ttl` at `now_ms`.
    #[must_use]
    pub fn is_fresh(&self, now_ms: u64, ttl: Duration) -> bool {
        now_ms.saturating_sub(self.timestamp) < saturating_millis(ttl)
    }

    /// Whether this is a negative entry.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.name.is_none()
    }
}

/// On-store representation. Names are re-sanitized when read back.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    name: Option<String>,
    timestamp: u64,
}

impl StoredEntry {
    fn from_value(value: Value) -> Option<CacheEntry> {
        let stored: Self = serde_json::from_value(value).ok()?;
        let name = stored.name.as_deref().and_then(Name::sanitize);
        Some(CacheEntry::new(name, stored.timestamp))
    }

    fn to_value(name: Option<&Name>, timestamp: u64) -> Result<Value> {
        let stored = Self {
            name: name.map(|n| n.as_str().to_owned()),
            timestamp,
        };
        Ok(serde_json::to_value(stored)?)
    }
}

/// Name cache with a fixed TTL and key prefix.
#[derive(Clone)]
pub struct ResolutionCache {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    ttl: Duration,
}

impl fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ResolutionCache {
    /// Create a cache over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            ttl,
        }
    }

    /// Create a cache using the prefix and TTL from `config`.
    #[must_use]
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self::new(store, config.cache_prefix.clone(), config.cache_ttl())
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Key namespace prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Store key for `address`.
    #[must_use]
    pub fn key(&self, address: &Address) -> String {
        format!("{}{}", self.prefix, to_lower_hex(address))
    }

    /// Fresh entry for `address`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get(&self, address: &Address) -> Result<Option<CacheEntry>> {
        Ok(self.get_many(std::slice::from_ref(address)).await?.remove(address))
    }

    /// Fresh entries for `addresses`. Stale, absent and unreadable entries are
    /// left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_many(&self, addresses: &[Address]) -> Result<HashMap<Address, CacheEntry>> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = addresses.iter().map(|a| self.key(a)).collect();
        let mut raw = self.store.get(&keys).await?;
        let now = timestamp_ms();

        let mut hits = HashMap::new();
        for (address, key) in addresses.iter().zip(&keys) {
            let Some(value) = raw.remove(key) else {
                continue;
            };
            match StoredEntry::from_value(value) {
                Some(entry) if entry.is_fresh(now, self.ttl) => {
                    hits.insert(*address, entry);
                }
                Some(_) => debug!(%address, "cache entry stale"),
                None => debug!(%address, "cache entry unreadable, ignoring"),
            }
        }
        Ok(hits)
    }

    /// Record a result for `address`, stamped now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn set(&self, address: &Address, name: Option<&Name>) -> Result<()> {
        let value = StoredEntry::to_value(name, timestamp_ms())?;
        self.store
            .set(HashMap::from([(self.key(address), value)]))
            .await
    }

    /// Record several results in one store write, all stamped now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn set_many(&self, results: &[(Address, Option<Name>)]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        let now = timestamp_ms();
        let mut entries = HashMap::with_capacity(results.len());
        for (address, name) in results {
            entries.insert(self.key(address), StoredEntry::to_value(name.as_ref(), now)?);
        }
        self.store.set(entries).await
    }

    /// Remove every key under this cache's prefix; returns how many.
    ///
    /// Keys outside the prefix are untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear(&self) -> Result<usize> {
        let keys: Vec<String> = self
            .store
            .get_all()
            .await?
            .into_keys()
            .filter(|k| k.starts_with(&self.prefix))
            .collect();
        if !keys.is_empty() {
            self.store.remove(&keys).await?;
        }
        debug!(removed = keys.len(), prefix = %self.prefix, "cache cleared");
        Ok(keys.len())
    }
}
