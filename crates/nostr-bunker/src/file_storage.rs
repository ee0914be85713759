use crate::{Error, Result, StorageAdapter};
use std::fs;
use std::path::PathBuf;

/// One file per key under `<base>/<namespace>/`.
pub struct FileStorageAdapter {
    base_path: PathBuf,
}

impl FileStorageAdapter {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path)
            .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        Ok(Self { base_path })
    }

    fn key_to_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.base_path
            .join(sanitize(namespace))
            .join(format!("{}.txt", sanitize(key)))
    }
}

fn sanitize(segment: &str) -> String {
    segment.replace(['/', '\\', ':', '.'], "_")
}

impl StorageAdapter for FileStorageAdapter {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_to_path(namespace, key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read file: {}", e))),
        }
    }

    fn put(&self, namespace: &str, key: &str, value: String) -> Result<()> {
        let path = self.key_to_path(namespace, key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create parent dir: {}", e)))?;
        }

        // Write then rename so a crash never leaves a truncated key behind.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)
            .map_err(|e| Error::Storage(format!("Failed to write file: {}", e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| Error::Storage(format!("Failed to replace file: {}", e)))?;

        Ok(())
    }

    fn del(&self, namespace: &str, key: &str) -> Result<()> {
        match fs::remove_file(self.key_to_path(namespace, key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to delete file: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_adapter_basic() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(adapter.get("signer", "relay_url").unwrap().is_none());

        adapter
            .put("signer", "relay_url", "wss://relay.example".to_string())
            .unwrap();
        assert_eq!(
            adapter.get("signer", "relay_url").unwrap(),
            Some("wss://relay.example".to_string())
        );

        adapter.del("signer", "relay_url").unwrap();
        assert!(adapter.get("signer", "relay_url").unwrap().is_none());
        adapter.del("signer", "relay_url").unwrap();
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let adapter = FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap();
            adapter
                .put("signer", "auth_clients", "aa|bb".to_string())
                .unwrap();
        }
        let adapter = FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(
            adapter.get("signer", "auth_clients").unwrap(),
            Some("aa|bb".to_string())
        );
    }

    #[test]
    fn test_key_segments_are_sanitized() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap();

        adapter.put("../escape", "a/b", "v".to_string()).unwrap();
        assert_eq!(adapter.get("../escape", "a/b").unwrap(), Some("v".to_string()));
        assert!(temp_dir.path().join("___escape").join("a_b.txt").exists());
    }
}
