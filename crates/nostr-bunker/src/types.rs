use crate::{Error, Result};
use nostr::{Keys, SecretKey};

pub const NOSTR_CONNECT_KIND: u16 = 24133;
pub const SUBSCRIPTION_ID: &str = "signer";
pub const DEFAULT_RELAY_URL: &str = "wss://relay.nostrconnect.com";

pub const KEY_CACHE_SIZE: usize = 6;
pub const ECDH_CACHE_SIZE: usize = 8;
/// Five minutes, shared by both caches.
pub const CACHE_TTL_MS: u64 = 300_000;

pub const MAX_AUTHORIZED_CLIENTS: usize = 30;
pub const AUTHORIZED_CLIENTS_DELIMITER: char = '|';

/// Upper bound on a single relay frame or decrypted payload.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;
/// NIP-44 v2 cannot carry more than this many plaintext bytes.
pub const MAX_NIP44_PLAINTEXT: usize = 65_535;

pub const HEX_KEY_LEN: usize = 64;

/// Secp256k1 key pair held as hex.
///
/// Only constructible from a private key, so `public_key_hex` is always the
/// x-only key derived from `private_key_hex`.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    private_key_hex: String,
    public_key_hex: String,
}

impl KeyPair {
    pub fn from_private_hex(private_key_hex: &str) -> Result<Self> {
        let private_key_hex = private_key_hex.trim().to_lowercase();
        if !is_hex_key(&private_key_hex) {
            return Err(Error::Format(
                "Private key must be 64 hex characters".to_string(),
            ));
        }
        let bytes = hex::decode(&private_key_hex)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|e| Error::Format(e.to_string()))?;
        let public_key_hex = Keys::new(secret_key).public_key().to_hex();
        Ok(Self {
            private_key_hex,
            public_key_hex,
        })
    }

    pub fn generate() -> Self {
        let keys = Keys::generate();
        Self {
            private_key_hex: hex::encode(keys.secret_key().to_secret_bytes()),
            public_key_hex: keys.public_key().to_hex(),
        }
    }

    pub fn private_key_hex(&self) -> &str {
        &self.private_key_hex
    }

    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_hex", &self.public_key_hex)
            .finish_non_exhaustive()
    }
}

/// 64 hex characters, either case.
pub fn is_hex_key(value: &str) -> bool {
    value.len() == HEX_KEY_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lowercases and validates a peer's x-only public key.
pub fn normalize_pubkey_hex(value: &str) -> Result<String> {
    let value = value.trim();
    if !is_hex_key(value) {
        return Err(Error::Format(format!(
            "Public key must be {} hex characters, got {:?}",
            HEX_KEY_LEN, value
        )));
    }
    Ok(value.to_ascii_lowercase())
}

/// 32 random bytes as 64 lowercase hex characters.
pub fn random_secret_hex() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}
