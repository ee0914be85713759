//! NIP-04 AES-256-CBC payloads: `base64(ciphertext)?iv=base64(iv)`.

use crate::{Error, Result, MAX_FRAME_SIZE};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const IV_MARKER: &str = "?iv=";
pub const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

/// Payloads carrying the `?iv=` marker are NIP-04; everything else is treated as NIP-44.
pub fn is_nip04_payload(content: &str) -> bool {
    content.contains(IV_MARKER)
}

pub fn random_iv() -> [u8; IV_SIZE] {
    rand::random()
}

/// Encrypts with PKCS#7 padding: always 1..=16 bytes, each equal to the pad length.
pub fn encrypt(shared_x: &[u8; 32], iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.len() > MAX_FRAME_SIZE {
        return Err(Error::ResourceExhausted(format!(
            "NIP-04 plaintext of {} bytes exceeds {}",
            plaintext.len(),
            MAX_FRAME_SIZE
        )));
    }
    let padded_len = (plaintext.len() / BLOCK_SIZE + 1) * BLOCK_SIZE;
    let mut buf = Vec::new();
    buf.try_reserve_exact(padded_len)
        .map_err(|e| Error::ResourceExhausted(e.to_string()))?;
    buf.extend_from_slice(plaintext);
    buf.resize(padded_len, 0);

    let ciphertext_len = Aes256CbcEnc::new(shared_x.into(), iv.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .map_err(|_| Error::Crypto("AES-CBC padding buffer too small".to_string()))?
        .len();
    buf.truncate(ciphertext_len);
    Ok(buf)
}

pub fn decrypt(shared_x: &[u8; 32], iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(Error::Format(format!(
            "NIP-04 ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }
    let mut buf = Vec::new();
    buf.try_reserve_exact(ciphertext.len())
        .map_err(|e| Error::ResourceExhausted(e.to_string()))?;
    buf.extend_from_slice(ciphertext);

    let plaintext_len = Aes256CbcDec::new(shared_x.into(), iv.into())
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| Error::Crypto("NIP-04 decryption failed: bad key or padding".to_string()))?
        .len();
    buf.truncate(plaintext_len);
    Ok(buf)
}

pub fn encode_payload(ciphertext: &[u8], iv: &[u8; IV_SIZE]) -> String {
    format!("{}{}{}", BASE64.encode(ciphertext), IV_MARKER, BASE64.encode(iv))
}

/// Splits a payload into ciphertext and IV bytes.
pub fn decode_payload(payload: &str) -> Result<(Vec<u8>, [u8; IV_SIZE])> {
    let (ciphertext_b64, iv_b64) = payload
        .split_once(IV_MARKER)
        .ok_or_else(|| Error::Protocol("NIP-04 payload is missing the ?iv= marker".to_string()))?;
    if ciphertext_b64.len() > MAX_FRAME_SIZE {
        return Err(Error::ResourceExhausted(format!(
            "NIP-04 payload of {} bytes exceeds {}",
            ciphertext_b64.len(),
            MAX_FRAME_SIZE
        )));
    }
    let ciphertext = BASE64.decode(ciphertext_b64.trim())?;
    let iv: [u8; IV_SIZE] = BASE64
        .decode(iv_b64.trim())?
        .try_into()
        .map_err(|bytes: Vec<u8>| {
            Error::Format(format!("NIP-04 IV must be {} bytes, got {}", IV_SIZE, bytes.len()))
        })?;
    Ok((ciphertext, iv))
}
