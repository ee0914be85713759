use crate::output::Output;
use nostr_bunker::SignerObserver;
use serde_json::json;
use tracing::{debug, info, warn};

/// Reports signer activity to the log and, as stream events, to stdout.
pub struct DaemonObserver {
    output: Output,
}

impl DaemonObserver {
    pub fn new(output: Output) -> Self {
        Self { output }
    }
}

impl SignerObserver for DaemonObserver {
    fn on_connection_changed(&mut self, connected: bool, status: &str) {
        info!("Relay: {}", status);
        self.output.event(
            "connection",
            json!({"connected": connected, "status": status}),
        );
    }

    fn on_signing_request(&mut self, kind: u16, preview: &str) {
        info!("Signing request for kind {}", kind);
        debug!("Signing preview: {:?}", preview);
    }

    fn on_event_signed(&mut self, kind: u16, content: &str) {
        self.output.event(
            "signed",
            json!({"kind": kind, "content_length": content.len()}),
        );
    }

    // Plaintext stays off the log.
    fn on_decrypted(&mut self, content: &str) {
        self.output
            .event("decrypted", json!({"length": content.len()}));
    }

    fn show_error(&mut self, message: &str) {
        warn!("{}", message);
        self.output.event("error", json!({"message": message}));
    }

    fn show_success(&mut self, message: &str) {
        self.output.event("success", json!({"message": message}));
    }
}
