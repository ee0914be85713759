use crate::{Error, Result, MAX_NIP44_PLAINTEXT};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use nostr::nips::nip44;
use sha2::Sha256;

const CONVERSATION_KEY_SALT: &[u8] = b"nip44-v2";

/// `HKDF-extract(salt = "nip44-v2", ikm = ecdh_x)`.
pub fn conversation_key_from_shared_x(shared_x: &[u8; 32]) -> nip44::v2::ConversationKey {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(CONVERSATION_KEY_SALT), shared_x);
    let mut key = [0u8; 32];
    key.copy_from_slice(&prk);
    nip44::v2::ConversationKey::new(key)
}

/// Encrypts into a base64 v2 payload (padded, versioned, MACed).
pub fn encrypt(conversation_key: &nip44::v2::ConversationKey, plaintext: &str) -> Result<String> {
    if plaintext.is_empty() {
        return Err(Error::Format("NIP-44 plaintext must not be empty".to_string()));
    }
    if plaintext.len() > MAX_NIP44_PLAINTEXT {
        return Err(Error::ResourceExhausted(format!(
            "NIP-44 plaintext of {} bytes exceeds {}",
            plaintext.len(),
            MAX_NIP44_PLAINTEXT
        )));
    }
    let bytes = nip44::v2::encrypt_to_bytes(conversation_key, plaintext.as_bytes())?;
    Ok(BASE64.encode(bytes))
}

pub fn decrypt(conversation_key: &nip44::v2::ConversationKey, payload: &str) -> Result<String> {
    let payload = payload.trim();
    if payload.starts_with('#') {
        return Err(Error::Protocol("Unsupported NIP-44 payload version".to_string()));
    }
    let bytes = BASE64.decode(payload)?;
    let plaintext = nip44::v2::decrypt_to_bytes(conversation_key, &bytes)?;
    String::from_utf8(plaintext).map_err(|e| Error::Format(e.to_string()))
}
