pub mod clients;
pub mod keys;
pub mod run;

use anyhow::{Context, Result};
use nostr_bunker::{FileStorageAdapter, StorageAdapter};
use std::path::Path;
use std::sync::Arc;

/// The signer's key/value store under `<data_dir>/store`.
pub fn open_storage(data_dir: &Path) -> Result<Arc<dyn StorageAdapter>> {
    let storage = FileStorageAdapter::new(data_dir.join("store"))
        .context("Failed to open signer store")?;
    Ok(Arc::new(storage))
}
