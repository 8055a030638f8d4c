//! Key-value persistence backends.

use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// A narrow key-value store with per-key expiry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a key. Missing or expired keys fail with [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<String, StoreError>;

    /// Writes a key that expires after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Lists the live keys starting with `prefix`.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Deletes a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(key, value, ttl).await
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).scan(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Process-local store. Expired entries are dropped when touched.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, StoredValue>,
}

impl InMemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live() {
                return Ok(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(key);
        }
        Err(StoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Backend(format!("ttl {ttl:?} overflows")))?;
        self.entries
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.entries.retain(|_, entry| entry.is_live());
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
