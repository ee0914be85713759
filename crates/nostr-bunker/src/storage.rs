use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Namespaced string key/value store the signer persists its settings into.
pub trait StorageAdapter: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;
    fn put(&self, namespace: &str, key: &str, value: String) -> Result<()>;
    fn del(&self, namespace: &str, key: &str) -> Result<()>;
}

type Entries = HashMap<(String, String), String>;

#[derive(Clone)]
pub struct InMemoryStorage {
    store: Arc<Mutex<Entries>>,
    max_value_len: Option<usize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
            max_value_len: None,
        }
    }

    /// Rejects writes longer than `max_value_len` bytes, like a nearly full flash partition.
    pub fn with_value_limit(max_value_len: usize) -> Self {
        Self {
            max_value_len: Some(max_value_len),
            ..Self::new()
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.store
            .lock()
            .map_err(|_| Error::Storage("In-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageAdapter for InMemoryStorage {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn put(&self, namespace: &str, key: &str, value: String) -> Result<()> {
        if let Some(limit) = self.max_value_len {
            if value.len() > limit {
                return Err(Error::Storage(format!(
                    "No space left for {}/{} ({} bytes)",
                    namespace,
                    key,
                    value.len()
                )));
            }
        }
        self.lock()?
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }

    fn del(&self, namespace: &str, key: &str) -> Result<()> {
        self.lock()?
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}
