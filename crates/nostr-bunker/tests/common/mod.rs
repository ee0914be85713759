#![allow(dead_code)]

use nostr::nips::nip44::{self, Version};
use nostr::{Keys, PublicKey};
use nostr_bunker::{
    CryptoEnvelope, InMemoryStorage, ManualClock, Result, SignerContext, SignerObserver,
    SignerOptions, StorageAdapter, Transport, TransportEvent,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub const USER_KEY: &str = "7f7ff03d123792d6ac594bfa67bf6d0c0ab55b6b1fdb6249303fe861f1ccba9a";

#[derive(Default)]
pub struct RecordingTransport {
    pub connects: Vec<String>,
    pub sent: Vec<String>,
    pub pings: usize,
    pub disconnects: usize,
}

impl Transport for RecordingTransport {
    fn connect(&mut self, url: &str) -> Result<()> {
        self.connects.push(url.to_string());
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }

    fn send_text(&mut self, frame: &str) -> Result<()> {
        self.sent.push(frame.to_string());
        Ok(())
    }

    fn send_ping(&mut self) -> Result<()> {
        self.pings += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub statuses: Vec<(bool, String)>,
    pub signing_requests: Vec<(u16, String)>,
    pub signed: Vec<(u16, String)>,
    pub decrypted: Vec<String>,
    pub errors: Vec<String>,
    pub successes: Vec<String>,
}

impl SignerObserver for RecordingObserver {
    fn on_connection_changed(&mut self, connected: bool, status: &str) {
        self.statuses.push((connected, status.to_string()));
    }

    fn on_signing_request(&mut self, kind: u16, preview: &str) {
        self.signing_requests.push((kind, preview.to_string()));
    }

    fn on_event_signed(&mut self, kind: u16, content: &str) {
        self.signed.push((kind, content.to_string()));
    }

    fn on_decrypted(&mut self, content: &str) {
        self.decrypted.push(content.to_string());
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn show_success(&mut self, message: &str) {
        self.successes.push(message.to_string());
    }
}

pub type TestSigner = SignerContext<RecordingTransport, RecordingObserver>;

pub fn signer_with(
    storage: Arc<dyn StorageAdapter>,
    options: SignerOptions,
) -> (TestSigner, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let mut signer = SignerContext::new(
        storage,
        RecordingTransport::default(),
        RecordingObserver::default(),
        clock.clone(),
        options,
    )
    .unwrap();
    signer.set_user_private_key(USER_KEY).unwrap();
    (signer, clock)
}

/// Started, connected and subscribed signer backed by memory.
pub fn connected_signer(options: SignerOptions) -> (TestSigner, Arc<ManualClock>) {
    let (mut signer, clock) = signer_with(Arc::new(InMemoryStorage::new()), options);
    signer.start().unwrap();
    signer.handle_transport_event(TransportEvent::Connected);
    (signer, clock)
}

/// A NIP-46 client application talking to the signer.
pub struct Client {
    pub keys: Keys,
    envelope: CryptoEnvelope,
}

impl Client {
    pub fn new() -> Self {
        Self {
            keys: Keys::generate(),
            envelope: CryptoEnvelope::new(Arc::new(ManualClock::default())),
        }
    }

    pub fn pubkey_hex(&self) -> String {
        self.keys.public_key().to_hex()
    }

    fn private_key_hex(&self) -> String {
        hex::encode(self.keys.secret_key().to_secret_bytes())
    }

    /// `["EVENT","signer",{...}]` carrying `request` encrypted to `device`.
    pub fn request_frame(&mut self, device: &str, request: Value, use_nip04: bool) -> String {
        let plaintext = request.to_string();
        let content = if use_nip04 {
            self.envelope
                .nip04_encrypt(&self.private_key_hex(), device, &plaintext)
                .unwrap()
        } else {
            let device_pk = PublicKey::from_hex(device).unwrap();
            nip44::encrypt(self.keys.secret_key(), &device_pk, plaintext, Version::V2).unwrap()
        };
        json!(["EVENT", "signer", {
            "id": "00".repeat(32),
            "pubkey": self.pubkey_hex(),
            "created_at": 1_700_000_000u64,
            "kind": 24133,
            "tags": [["p", device]],
            "content": content,
            "sig": "00".repeat(64),
        }])
        .to_string()
    }

    /// Decrypts the reply event inside an outbound `["EVENT",{...}]` frame.
    pub fn read_reply(&mut self, device: &str, frame: &str) -> Value {
        let value: Value = serde_json::from_str(frame).unwrap();
        assert_eq!(value[0], "EVENT");
        let content = value[1]["content"].as_str().unwrap();
        let plaintext = if content.contains("?iv=") {
            self.envelope
                .nip04_decrypt(&self.private_key_hex(), device, content)
                .unwrap()
        } else {
            let device_pk = PublicKey::from_hex(device).unwrap();
            nip44::decrypt(self.keys.secret_key(), &device_pk, content).unwrap()
        };
        serde_json::from_str(&plaintext).unwrap()
    }

    /// Sends a request and returns the decrypted reply, if one was sent.
    pub fn call(&mut self, signer: &mut TestSigner, request: Value, use_nip04: bool) -> Option<Value> {
        let device = signer.device_public_key_hex().to_string();
        let before = signer.transport().sent.len();
        let frame = self.request_frame(&device, request, use_nip04);
        signer.handle_transport_event(TransportEvent::Text(frame));
        let sent = &signer.transport().sent;
        assert!(sent.len() <= before + 1);
        sent.get(before)
            .cloned()
            .map(|reply| self.read_reply(&device, &reply))
    }

    /// Pairs with the session secret; panics if the signer refuses.
    pub fn pair(&mut self, signer: &mut TestSigner) {
        let secret = signer.session_secret().to_string();
        let device = signer.device_public_key_hex().to_string();
        let reply = self
            .call(
                signer,
                json!({"id": "pair", "method": "connect", "params": [device, secret]}),
                false,
            )
            .expect("connect reply");
        assert_eq!(reply["result"], secret);
    }
}
