//! In-memory storage engine.
//!
//! Concurrent map with per-entry expiry and optional transparent value
//! compression. Suitable as a demo source of truth and as the backing
//! engine in tests.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Storage, StorageOptions};
use crate::compression::CompressionManager;
use crate::error::{Error, Result};

struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

/// Concurrent in-memory engine.
pub struct MemoryStorage {
    entries: DashMap<String, StoredValue>,
    options: StorageOptions,
    compression: Option<CompressionManager>,
}

impl MemoryStorage {
    pub fn new(options: StorageOptions) -> Self {
        let compression = options
            .compression
            .clone()
            .map(CompressionManager::new);
        Self {
            entries: DashMap::new(),
            options,
            compression,
        }
    }

    fn encode(&self, value: &[u8]) -> Vec<u8> {
        match &self.compression {
            Some(manager) => manager.encode(value),
            None => value.to_vec(),
        }
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        match &self.compression {
            Some(manager) => manager.decode(stored),
            None => Ok(stored.to_vec()),
        }
    }

    fn stored_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.value().data.len() as u64)
            .sum()
    }

    fn insert(&self, key: &str, value: &[u8], expires_at: Option<Instant>) -> Result<()> {
        let data = self.encode(value);
        if self.options.max_bytes > 0 {
            let replaced: u64 = self
                .entries
                .get(key)
                .map(|entry| entry.data.len() as u64)
                .unwrap_or(0);
            if self.stored_bytes() - replaced + data.len() as u64 > self.options.max_bytes {
                return Err(Error::Storage(format!(
                    "max size {} exceeded",
                    self.options.max_bytes
                )));
            }
        }
        self.entries
            .insert(key.to_string(), StoredValue { data, expires_at });
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        // Decide under the read guard, mutate after it is released.
        let live = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(self.decode(&entry.data)),
            Some(_) => None,
            None => return Err(Error::NotFound(key.to_string())),
        };
        match live {
            Some(result) => result,
            None => {
                self.entries.remove(key);
                Err(Error::NotFound(key.to_string()))
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.insert(key, value, None)
    }

    async fn set_with_expire(&self, key: &str, value: &[u8], expire: Duration) -> Result<()> {
        self.insert(key, value, Some(Instant::now() + expire))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        match self.entries.get(key) {
            Some(entry) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
