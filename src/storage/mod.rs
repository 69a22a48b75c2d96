//! Pluggable storage engines.
//!
//! A [`Storage`] is a standalone key-value engine a deployment can place
//! behind a cache group as its source of truth. The engine interface is
//! deliberately small; [`StorageLoader`] adapts any engine into a group
//! [`Loader`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::compression::CompressionConfig;
use crate::error::Result;
use crate::group::Loader;

mod memory;

pub use memory::MemoryStorage;

/// Storage engine interface.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch a value; `NotFound` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store a value without expiry.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Store a value that expires after `expire`.
    async fn set_with_expire(&self, key: &str, value: &[u8], expire: Duration) -> Result<()>;

    /// Remove a value.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether a live value exists for the key.
    async fn has(&self, key: &str) -> Result<bool>;

    /// All live keys.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Drop everything.
    async fn clear(&self) -> Result<()>;

    /// Release the engine.
    async fn close(&self) -> Result<()>;
}

/// Options shared by storage engines.
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Upper bound on stored value bytes; 0 means unbounded.
    pub max_bytes: u64,
    /// Transparent value compression.
    pub compression: Option<CompressionConfig>,
}

/// Adapter exposing a storage engine as a group loader.
pub struct StorageLoader {
    storage: Arc<dyn Storage>,
}

impl StorageLoader {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Loader for StorageLoader {
    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        self.storage.get(key).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::group::GroupRegistry;

    #[tokio::test]
    async fn test_storage_backed_group() {
        let storage = Arc::new(MemoryStorage::new(StorageOptions::default()));
        storage.set("Tom", b"630").await.unwrap();

        let registry = GroupRegistry::new();
        let group = registry.new_group(
            "scores",
            1 << 10,
            Arc::new(StorageLoader::new(storage.clone())),
        );

        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert!(matches!(
            group.get("missing").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
