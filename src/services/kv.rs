//! Key/value storage with per-key expiry, used for session bindings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::SessionBackend;
use crate::db::Store;
use crate::services::clock::Clock;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),
}

impl From<anyhow::Error> for KvError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Overwrites any previous value. `ttl = None` never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Drops expired entries and reports how many went.
    async fn purge_expired(&self) -> Result<u64, KvError>;
}

fn expiry_from(now: DateTime<Utc>, ttl: Option<Duration>) -> Result<Option<DateTime<Utc>>, KvError> {
    ttl.map(|ttl| {
        chrono::Duration::from_std(ttl)
            .map(|d| now + d)
            .map_err(|e| KvError::Unavailable(format!("TTL out of range: {e}")))
    })
    .transpose()
}

struct MemoryEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Process-local store. Expired entries are evicted lazily on read and by
/// [`KeyValueStore::purge_expired`].
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = self.clock.now_utc();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let expires_at = expiry_from(self.clock.now_utc(), ttl)?;
        self.entries.write().await.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, KvError> {
        let now = self.clock.now_utc();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(u64::try_from(before - entries.len()).unwrap_or(u64::MAX))
    }
}

/// Store backed by the `kv_entries` table, shared by every process on the database.
pub struct DatabaseKeyValueStore {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl DatabaseKeyValueStore {
    #[must_use]
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl KeyValueStore for DatabaseKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = self.clock.now_utc().timestamp();
        Ok(self.store.kv_repo().get(key, now).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let expires_at = expiry_from(self.clock.now_utc(), ttl)?.map(|at| at.timestamp());
        Ok(self.store.kv_repo().set(key, value, expires_at).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        Ok(self.store.kv_repo().delete(key).await?)
    }

    async fn purge_expired(&self) -> Result<u64, KvError> {
        let now = self.clock.now_utc().timestamp();
        Ok(self.store.kv_repo().purge_expired(now).await?)
    }
}

#[must_use]
pub fn build_key_value_store(
    backend: SessionBackend,
    store: &Store,
    clock: Arc<dyn Clock>,
) -> Arc<dyn KeyValueStore> {
    match backend {
        SessionBackend::Memory => Arc::new(MemoryKeyValueStore::new(clock)),
        SessionBackend::Database => Arc::new(DatabaseKeyValueStore::new(store.clone(), clock)),
    }
}
