//! In-memory session store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use serde_json::Value;
use session_sync_core::{SessionStore, StoreError};

/// In-memory store implementation.
///
/// Useful for tests and single-process deployments. Data is lost on
/// restart, matching the session-scoped lifetime of synced values.
pub struct MemoryStore {
    slots: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.slots
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(key.to_string(), value);

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .slots
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }
}
