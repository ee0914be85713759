use crate::settings::{AUTH_CLIENTS_KEY, SETTINGS_NAMESPACE};
use crate::{Error, Result, StorageAdapter, AUTHORIZED_CLIENTS_DELIMITER, MAX_AUTHORIZED_CLIENTS};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// Client pubkeys allowed to issue requests, oldest first.
///
/// Persisted as a `|`-joined list under `signer/auth_clients`. Holds at most
/// `capacity` entries; adding beyond that evicts the oldest.
pub struct AuthorizedClients {
    clients: VecDeque<String>,
    capacity: usize,
    storage: Arc<dyn StorageAdapter>,
}

impl AuthorizedClients {
    pub fn load(storage: Arc<dyn StorageAdapter>) -> Result<Self> {
        Self::load_with_capacity(storage, MAX_AUTHORIZED_CLIENTS)
    }

    pub fn load_with_capacity(storage: Arc<dyn StorageAdapter>, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let stored = storage
            .get(SETTINGS_NAMESPACE, AUTH_CLIENTS_KEY)?
            .unwrap_or_default();
        let mut clients: VecDeque<String> = VecDeque::new();
        for entry in stored.split(AUTHORIZED_CLIENTS_DELIMITER) {
            let entry = entry.trim();
            if !entry.is_empty() && !clients.iter().any(|c| c == entry) {
                clients.push_back(entry.to_string());
            }
        }
        // A list persisted under a larger capacity keeps its newest entries.
        while clients.len() > capacity {
            clients.pop_front();
        }
        Ok(Self {
            clients,
            capacity,
            storage,
        })
    }

    pub fn is_authorized(&self, pubkey: &str) -> bool {
        self.clients.iter().any(|c| c == pubkey)
    }

    /// Returns `false` when the client was already present.
    pub fn add(&mut self, pubkey: &str) -> Result<bool> {
        if pubkey.is_empty() || pubkey.contains(AUTHORIZED_CLIENTS_DELIMITER) {
            return Err(Error::Format(format!("Invalid client pubkey {:?}", pubkey)));
        }
        if self.is_authorized(pubkey) {
            return Ok(false);
        }
        while self.clients.len() >= self.capacity {
            match self.clients.pop_front() {
                Some(evicted) => info!("Evicted oldest authorized client {}", evicted),
                None => break,
            }
        }
        self.clients.push_back(pubkey.to_string());
        info!(
            "Authorized client {} ({} total)",
            pubkey,
            self.clients.len()
        );

        if let Err(e) = self.persist() {
            warn!("Failed to persist authorized clients: {}; shedding older half", e);
            self.shed_half();
            self.persist()?;
        }
        Ok(true)
    }

    pub fn clear_all(&mut self) -> Result<()> {
        self.clients.clear();
        info!("Cleared all authorized clients");
        self.persist()
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remove_oldest(&mut self) -> Result<Option<String>> {
        let removed = self.clients.pop_front();
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Drops the older half of the list, keeping at least the newest entry.
    pub fn remove_half(&mut self) -> Result<usize> {
        let removed = self.shed_half();
        self.persist()?;
        Ok(removed)
    }

    fn shed_half(&mut self) -> usize {
        let remove = self.clients.len() / 2;
        self.clients.drain(..remove);
        remove
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(String::as_str)
    }

    fn persist(&self) -> Result<()> {
        let joined = self
            .clients
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(&AUTHORIZED_CLIENTS_DELIMITER.to_string());
        self.storage
            .put(SETTINGS_NAMESPACE, AUTH_CLIENTS_KEY, joined)
    }
}
