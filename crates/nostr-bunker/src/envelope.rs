use crate::ecdh::{EcdhProvider, Secp256k1Ecdh};
use crate::key_cache::{CacheStats, EcdhCache, KeyCache};
use crate::{nip04, nip44, Clock, Error, Result};
use nostr::nips::nip44::v2::ConversationKey;
use nostr::secp256k1::{All, Keypair, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Cryptographic operations for both key pairs, backed by the key and ECDH caches.
///
/// Every cold key decode or scalar multiplication populates a cache; hits are
/// served only within the TTL.
pub struct CryptoEnvelope {
    secp: Secp256k1<All>,
    keys: KeyCache,
    shared_secrets: EcdhCache,
    ecdh: Box<dyn EcdhProvider>,
    clock: Arc<dyn Clock>,
}

impl CryptoEnvelope {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ecdh_provider(clock, Box::new(Secp256k1Ecdh))
    }

    pub fn with_ecdh_provider(clock: Arc<dyn Clock>, ecdh: Box<dyn EcdhProvider>) -> Self {
        Self {
            secp: Secp256k1::new(),
            keys: KeyCache::new(),
            shared_secrets: EcdhCache::new(),
            ecdh,
            clock,
        }
    }

    pub fn secret_key(&mut self, private_key_hex: &str) -> Result<SecretKey> {
        let now = self.clock.now_millis();
        if let Some(secret_key) = self.keys.get_private_key(private_key_hex, now) {
            return Ok(secret_key);
        }
        let bytes = decode_hex_32(private_key_hex, "private key")?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|e| Error::Format(e.to_string()))?;
        self.keys.store_private_key(private_key_hex, secret_key, now);
        Ok(secret_key)
    }

    /// Lifts an x-only key to the even-y point `02 || x`.
    pub fn public_key(&mut self, public_key_hex: &str) -> Result<PublicKey> {
        let now = self.clock.now_millis();
        let compressed_hex = format!("02{}", public_key_hex);
        if let Some(public_key) = self.keys.get_public_key(&compressed_hex, now) {
            return Ok(public_key);
        }
        let x = decode_hex_32(public_key_hex, "public key")?;
        let mut compressed = [0u8; 33];
        compressed[0] = 0x02;
        compressed[1..].copy_from_slice(&x);
        let public_key =
            PublicKey::from_slice(&compressed).map_err(|e| Error::Format(e.to_string()))?;
        self.keys.store_public_key(&compressed_hex, public_key, now);
        Ok(public_key)
    }

    /// x-only public key hex for a private key.
    pub fn derive_public_key_hex(&mut self, private_key_hex: &str) -> Result<String> {
        let secret_key = self.secret_key(private_key_hex)?;
        let (xonly, _) = secret_key.x_only_public_key(&self.secp);
        Ok(hex::encode(xonly.serialize()))
    }

    pub fn ecdh(&mut self, private_key_hex: &str, public_key_hex: &str) -> Result<[u8; 32]> {
        let now = self.clock.now_millis();
        if let Some(shared_x) = self.shared_secrets.get(private_key_hex, public_key_hex, now) {
            return Ok(shared_x);
        }
        let secret_key = self.secret_key(private_key_hex)?;
        let public_key = self.public_key(public_key_hex)?;
        let shared_x = self.ecdh.shared_x(&secret_key, &public_key);
        self.shared_secrets
            .store(private_key_hex, public_key_hex, shared_x, now);
        debug!("Computed ECDH shared secret for peer {}", public_key_hex);
        Ok(shared_x)
    }

    pub fn nip04_encrypt(
        &mut self,
        private_key_hex: &str,
        peer_public_key_hex: &str,
        plaintext: &str,
    ) -> Result<String> {
        let shared_x = self.ecdh(private_key_hex, peer_public_key_hex)?;
        let iv = nip04::random_iv();
        let ciphertext = nip04::encrypt(&shared_x, &iv, plaintext.as_bytes())?;
        Ok(nip04::encode_payload(&ciphertext, &iv))
    }

    pub fn nip04_decrypt(
        &mut self,
        private_key_hex: &str,
        peer_public_key_hex: &str,
        payload: &str,
    ) -> Result<String> {
        let (ciphertext, iv) = nip04::decode_payload(payload)?;
        let shared_x = self.ecdh(private_key_hex, peer_public_key_hex)?;
        let plaintext = nip04::decrypt(&shared_x, &iv, &ciphertext)?;
        String::from_utf8(plaintext).map_err(|e| Error::Format(e.to_string()))
    }

    pub fn nip44_conversation_key(
        &mut self,
        private_key_hex: &str,
        peer_public_key_hex: &str,
    ) -> Result<ConversationKey> {
        let shared_x = self.ecdh(private_key_hex, peer_public_key_hex)?;
        Ok(nip44::conversation_key_from_shared_x(&shared_x))
    }

    pub fn nip44_encrypt(
        &mut self,
        private_key_hex: &str,
        peer_public_key_hex: &str,
        plaintext: &str,
    ) -> Result<String> {
        let conversation_key = self.nip44_conversation_key(private_key_hex, peer_public_key_hex)?;
        nip44::encrypt(&conversation_key, plaintext)
    }

    pub fn nip44_decrypt(
        &mut self,
        private_key_hex: &str,
        peer_public_key_hex: &str,
        payload: &str,
    ) -> Result<String> {
        let conversation_key = self.nip44_conversation_key(private_key_hex, peer_public_key_hex)?;
        nip44::decrypt(&conversation_key, payload)
    }

    /// SHA-256 of the canonical `[0,pubkey,created_at,kind,tags,content]` form.
    pub fn hash_event(serialized: &str) -> [u8; 32] {
        Sha256::digest(serialized.as_bytes()).into()
    }

    /// BIP-340 signature over a 32-byte digest, with fresh auxiliary randomness.
    pub fn schnorr_sign(&mut self, private_key_hex: &str, digest: &[u8; 32]) -> Result<[u8; 64]> {
        let secret_key = self.secret_key(private_key_hex)?;
        let keypair = Keypair::from_secret_key(&self.secp, &secret_key);
        let message = Message::from_digest(*digest);
        let aux_rand: [u8; 32] = rand::random();
        let signature = self
            .secp
            .sign_schnorr_with_aux_rand(&message, &keypair, &aux_rand);
        Ok(signature.serialize())
    }

    pub fn key_cache_stats(&self) -> CacheStats {
        self.keys.stats()
    }

    pub fn ecdh_cache_stats(&self) -> CacheStats {
        self.shared_secrets.stats()
    }

    pub fn clear_caches(&mut self) {
        self.keys.clear();
        self.shared_secrets.clear();
    }
}

fn decode_hex_32(value: &str, what: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value.trim())?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| Error::Format(format!("{} must be 32 bytes, got {}", what, bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyPair, ManualClock, CACHE_TTL_MS};
    use nostr::secp256k1::{schnorr, XOnlyPublicKey};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEcdh {
        calls: Arc<AtomicUsize>,
    }

    impl EcdhProvider for CountingEcdh {
        fn shared_x(&self, secret_key: &SecretKey, public_key: &PublicKey) -> [u8; 32] {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Secp256k1Ecdh.shared_x(secret_key, public_key)
        }
    }

    fn counting_envelope() -> (CryptoEnvelope, Arc<AtomicUsize>, Arc<ManualClock>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let envelope = CryptoEnvelope::with_ecdh_provider(
            clock.clone(),
            Box::new(CountingEcdh {
                calls: calls.clone(),
            }),
        );
        (envelope, calls, clock)
    }

    #[test]
    fn derived_public_key_matches_on_cache_hit() {
        let pair = KeyPair::generate();
        let mut envelope = CryptoEnvelope::new(Arc::new(ManualClock::default()));

        let cold = envelope.derive_public_key_hex(pair.private_key_hex()).unwrap();
        let warm = envelope.derive_public_key_hex(pair.private_key_hex()).unwrap();

        assert_eq!(cold, warm);
        assert_eq!(cold, pair.public_key_hex());
        assert_eq!(envelope.key_cache_stats().hits, 1);
    }

    #[test]
    fn ecdh_is_served_from_cache_within_ttl() {
        let (mut envelope, calls, clock) = counting_envelope();
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        let first = envelope.ecdh(a.private_key_hex(), b.public_key_hex()).unwrap();
        clock.advance_millis(CACHE_TTL_MS - 1);
        let second = envelope.ecdh(a.private_key_hex(), b.public_key_hex()).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance_millis(1);
        let third = envelope.ecdh(a.private_key_hex(), b.public_key_hex()).unwrap();
        assert_eq!(third, first);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ecdh_agrees_between_peers() {
        let mut envelope = CryptoEnvelope::new(Arc::new(ManualClock::default()));
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let ab = envelope.ecdh(a.private_key_hex(), b.public_key_hex()).unwrap();
        let ba = envelope.ecdh(b.private_key_hex(), a.public_key_hex()).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn nip04_round_trip_between_peers() {
        let mut envelope = CryptoEnvelope::new(Arc::new(ManualClock::default()));
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let payload = envelope
            .nip04_encrypt(alice.private_key_hex(), bob.public_key_hex(), "hi \"bob\"\n")
            .unwrap();
        assert!(payload.contains("?iv="));
        let plaintext = envelope
            .nip04_decrypt(bob.private_key_hex(), alice.public_key_hex(), &payload)
            .unwrap();
        assert_eq!(plaintext, "hi \"bob\"\n");
    }

    #[test]
    fn nip44_interoperates_with_nostr_crate() {
        let mut envelope = CryptoEnvelope::new(Arc::new(ManualClock::default()));
        let alice = nostr::Keys::generate();
        let bob = KeyPair::generate();
        let bob_pk = nostr::PublicKey::from_hex(bob.public_key_hex()).unwrap();

        let theirs = nostr::nips::nip44::encrypt(
            alice.secret_key(),
            &bob_pk,
            "from the nostr crate",
            nostr::nips::nip44::Version::V2,
        )
        .unwrap();
        let plaintext = envelope
            .nip44_decrypt(bob.private_key_hex(), &alice.public_key().to_hex(), &theirs)
            .unwrap();
        assert_eq!(plaintext, "from the nostr crate");

        let ours = envelope
            .nip44_encrypt(bob.private_key_hex(), &alice.public_key().to_hex(), "back again")
            .unwrap();
        let decrypted =
            nostr::nips::nip44::decrypt(alice.secret_key(), &bob_pk, &ours).unwrap();
        assert_eq!(decrypted, "back again");
    }

    #[test]
    fn schnorr_signature_verifies() {
        let mut envelope = CryptoEnvelope::new(Arc::new(ManualClock::default()));
        let pair = KeyPair::generate();
        let digest = CryptoEnvelope::hash_event("[0,\"abc\",1,1,[],\"hi\"]");

        let sig = envelope.schnorr_sign(pair.private_key_hex(), &digest).unwrap();

        let secp = Secp256k1::verification_only();
        let xonly =
            XOnlyPublicKey::from_slice(&hex::decode(pair.public_key_hex()).unwrap()).unwrap();
        let signature = schnorr::Signature::from_slice(&sig).unwrap();
        secp.verify_schnorr(&signature, &Message::from_digest(digest), &xonly)
            .unwrap();
    }

    #[test]
    fn malformed_keys_are_format_errors() {
        let mut envelope = CryptoEnvelope::new(Arc::new(ManualClock::default()));
        assert!(envelope.secret_key("abcd").is_err());
        assert!(matches!(envelope.public_key("xyz"), Err(Error::Hex(_))));
        assert!(matches!(envelope.public_key("abcd"), Err(Error::Format(_))));
    }

    #[test]
    fn nip04_decrypt_without_marker_is_protocol_error() {
        let mut envelope = CryptoEnvelope::new(Arc::new(ManualClock::default()));
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let result = envelope.nip04_decrypt(a.private_key_hex(), b.public_key_hex(), "abc");
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
