//! In-memory key/value store
//!
//! Nothing survives the process. Used by tests and as the fallback backend
//! when no database is configured.

use async_trait::async_trait;
use cadence_core::KeyValueStore;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Key/value store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn write(&self, key: &str, value: &[u8]) -> cadence_core::Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn read(&self, key: &str) -> cadence_core::Result<Option<Vec<u8>>> {
        Ok(self.values.read().await.get(key).cloned())
    }
}
