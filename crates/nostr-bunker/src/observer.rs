/// Notifications the signer raises for whatever is showing its state.
///
/// Called synchronously from the signer loop. Every method defaults to a no-op.
pub trait SignerObserver: Send {
    fn on_connection_changed(&mut self, _connected: bool, _status: &str) {}

    /// Raised before an event is signed, with a short preview of its content.
    fn on_signing_request(&mut self, _kind: u16, _preview: &str) {}

    fn on_event_signed(&mut self, _kind: u16, _content: &str) {}

    /// Plaintext produced by a `nip04_decrypt` or `nip44_decrypt` request.
    fn on_decrypted(&mut self, _content: &str) {}

    fn show_error(&mut self, _message: &str) {}

    fn show_success(&mut self, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SignerObserver for NoopObserver {}

/// Asked whether an unknown client presenting no valid secret may connect.
pub trait AuthorizationPrompt: Send {
    fn authorize(&mut self, client_pubkey: &str) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl AuthorizationPrompt for DenyAll {
    fn authorize(&mut self, _client_pubkey: &str) -> bool {
        false
    }
}
