use crate::{Error, KeyPair, Result, StorageAdapter, DEFAULT_RELAY_URL};
use std::sync::Arc;
use tracing::{info, warn};

pub const SETTINGS_NAMESPACE: &str = "signer";
pub const RELAY_URL_KEY: &str = "relay_url";
pub const USER_PRIVATE_KEY_KEY: &str = "user_private_key";
pub const USER_PUBLIC_KEY_KEY: &str = "user_public_key";
/// Slot used before the device and user keys were split.
pub const LEGACY_PRIVATE_KEY_KEY: &str = "private_key";
pub const DEVICE_PRIVATE_KEY_KEY: &str = "dev_priv_key";
pub const DEVICE_PUBLIC_KEY_KEY: &str = "dev_pub_key";
pub const AUTH_CLIENTS_KEY: &str = "auth_clients";

/// Persistent signer configuration.
///
/// The device key is generated on first load and never replaced afterwards.
pub struct Settings {
    storage: Arc<dyn StorageAdapter>,
    relay_url: String,
    user_keys: Option<KeyPair>,
    device_keys: KeyPair,
}

impl Settings {
    pub fn load(storage: Arc<dyn StorageAdapter>) -> Result<Self> {
        let relay_url = storage
            .get(SETTINGS_NAMESPACE, RELAY_URL_KEY)?
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string());

        let user_keys = load_user_keys(storage.as_ref())?;
        let device_keys = load_or_create_device_keys(storage.as_ref())?;

        Ok(Self {
            storage,
            relay_url,
            user_keys,
            device_keys,
        })
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    pub fn user_keys(&self) -> Option<&KeyPair> {
        self.user_keys.as_ref()
    }

    pub fn device_keys(&self) -> &KeyPair {
        &self.device_keys
    }

    pub fn set_relay_url(&mut self, relay_url: &str) -> Result<()> {
        let relay_url = relay_url.trim();
        if !(relay_url.starts_with("wss://") || relay_url.starts_with("ws://")) {
            return Err(Error::Format(format!(
                "Relay URL must start with ws:// or wss://, got {:?}",
                relay_url
            )));
        }
        self.storage
            .put(SETTINGS_NAMESPACE, RELAY_URL_KEY, relay_url.to_string())?;
        self.relay_url = relay_url.to_string();
        info!("Relay URL set to {}", self.relay_url);
        Ok(())
    }

    /// Validates the key, derives its pubkey and persists both.
    pub fn set_user_private_key(&mut self, private_key_hex: &str) -> Result<&KeyPair> {
        let keys = KeyPair::from_private_hex(private_key_hex)?;
        persist_user_keys(self.storage.as_ref(), &keys)?;
        info!("User key set, pubkey {}", keys.public_key_hex());
        Ok(self.user_keys.insert(keys))
    }
}

fn load_user_keys(storage: &dyn StorageAdapter) -> Result<Option<KeyPair>> {
    if let Some(stored) = storage.get(SETTINGS_NAMESPACE, USER_PRIVATE_KEY_KEY)? {
        if stored.trim().is_empty() {
            return Ok(None);
        }
        return match KeyPair::from_private_hex(&stored) {
            Ok(keys) => Ok(Some(keys)),
            Err(e) => {
                warn!("Ignoring stored user key: {}", e);
                Ok(None)
            }
        };
    }

    let Some(legacy) = storage.get(SETTINGS_NAMESPACE, LEGACY_PRIVATE_KEY_KEY)? else {
        return Ok(None);
    };
    match KeyPair::from_private_hex(&legacy) {
        Ok(keys) => {
            persist_user_keys(storage, &keys)?;
            info!("Migrated legacy private key to user key slot");
            Ok(Some(keys))
        }
        Err(e) => {
            warn!("Ignoring legacy private key: {}", e);
            Ok(None)
        }
    }
}

fn persist_user_keys(storage: &dyn StorageAdapter, keys: &KeyPair) -> Result<()> {
    storage.put(
        SETTINGS_NAMESPACE,
        USER_PRIVATE_KEY_KEY,
        keys.private_key_hex().to_string(),
    )?;
    storage.put(
        SETTINGS_NAMESPACE,
        USER_PUBLIC_KEY_KEY,
        keys.public_key_hex().to_string(),
    )?;
    storage.del(SETTINGS_NAMESPACE, LEGACY_PRIVATE_KEY_KEY)
}

fn load_or_create_device_keys(storage: &dyn StorageAdapter) -> Result<KeyPair> {
    if let Some(stored) = storage.get(SETTINGS_NAMESPACE, DEVICE_PRIVATE_KEY_KEY)? {
        match KeyPair::from_private_hex(&stored) {
            Ok(keys) => return Ok(keys),
            Err(e) => warn!("Stored device key is invalid ({}), generating a new one", e),
        }
    }

    let keys = KeyPair::generate();
    storage.put(
        SETTINGS_NAMESPACE,
        DEVICE_PRIVATE_KEY_KEY,
        keys.private_key_hex().to_string(),
    )?;
    storage.put(
        SETTINGS_NAMESPACE,
        DEVICE_PUBLIC_KEY_KEY,
        keys.public_key_hex().to_string(),
    )?;
    info!("Generated device key {}", keys.public_key_hex());
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;

    const USER_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults_on_empty_store() {
        let storage = Arc::new(InMemoryStorage::new());
        let settings = Settings::load(storage.clone()).unwrap();

        assert_eq!(settings.relay_url(), DEFAULT_RELAY_URL);
        assert!(settings.user_keys().is_none());
        assert_eq!(
            storage
                .get(SETTINGS_NAMESPACE, DEVICE_PUBLIC_KEY_KEY)
                .unwrap()
                .as_deref(),
            Some(settings.device_keys().public_key_hex())
        );
    }

    #[test]
    fn device_key_is_generated_once() {
        let storage = Arc::new(InMemoryStorage::new());
        let first = Settings::load(storage.clone()).unwrap();
        let second = Settings::load(storage).unwrap();
        assert_eq!(first.device_keys(), second.device_keys());
    }

    #[test]
    fn malformed_device_key_is_replaced() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .put(SETTINGS_NAMESPACE, DEVICE_PRIVATE_KEY_KEY, "short".to_string())
            .unwrap();
        let settings = Settings::load(storage.clone()).unwrap();
        assert_eq!(
            storage.get(SETTINGS_NAMESPACE, DEVICE_PRIVATE_KEY_KEY).unwrap().as_deref(),
            Some(settings.device_keys().private_key_hex())
        );
    }

    #[test]
    fn legacy_private_key_is_migrated() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .put(SETTINGS_NAMESPACE, LEGACY_PRIVATE_KEY_KEY, USER_KEY.to_string())
            .unwrap();

        let settings = Settings::load(storage.clone()).unwrap();
        let user = settings.user_keys().unwrap();
        assert_eq!(user.private_key_hex(), USER_KEY);
        assert_eq!(
            storage.get(SETTINGS_NAMESPACE, USER_PRIVATE_KEY_KEY).unwrap().as_deref(),
            Some(USER_KEY)
        );
        assert!(storage
            .get(SETTINGS_NAMESPACE, LEGACY_PRIVATE_KEY_KEY)
            .unwrap()
            .is_none());
    }

    #[test]
    fn set_user_key_validates_and_persists() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut settings = Settings::load(storage.clone()).unwrap();

        assert!(settings.set_user_private_key("nope").is_err());
        assert!(settings.user_keys().is_none());

        let pubkey = settings
            .set_user_private_key(USER_KEY)
            .unwrap()
            .public_key_hex()
            .to_string();
        let reloaded = Settings::load(storage).unwrap();
        assert_eq!(reloaded.user_keys().unwrap().public_key_hex(), pubkey);
        assert_ne!(pubkey, reloaded.device_keys().public_key_hex());
    }

    #[test]
    fn relay_url_must_be_websocket() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut settings = Settings::load(storage.clone()).unwrap();

        assert!(matches!(
            settings.set_relay_url("https://relay.example"),
            Err(Error::Format(_))
        ));
        settings.set_relay_url(" wss://relay.example ").unwrap();
        assert_eq!(
            Settings::load(storage).unwrap().relay_url(),
            "wss://relay.example"
        );
    }
}
