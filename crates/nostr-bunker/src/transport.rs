use crate::Result;

/// WebSocket-like connection to a relay.
///
/// Calls only start work; outcomes come back as [`TransportEvent`]s fed to
/// the signer loop.
pub trait Transport: Send {
    fn connect(&mut self, url: &str) -> Result<()>;
    fn disconnect(&mut self);
    fn send_text(&mut self, frame: &str) -> Result<()>;
    fn send_ping(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Error(String),
}

impl TransportEvent {
    /// Payload length for frames that carry one.
    pub fn payload_len(&self) -> usize {
        match self {
            TransportEvent::Text(text) => text.len(),
            TransportEvent::Binary(bytes) => bytes.len(),
            _ => 0,
        }
    }
}
