//! tokio-tungstenite relay connection behind the signer's `Transport` trait.

use futures_util::{SinkExt, StreamExt};
use nostr_bunker::{Transport, TransportEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

enum Outbound {
    Text(String),
    Ping,
}

/// Each `connect` spawns one socket task; frames and lifecycle changes come
/// back on the `events` channel for the signer loop.
///
/// Must be used from within a tokio runtime.
pub struct WsTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Bumped on every connect and disconnect; a socket task only reports
    /// while its own generation is current.
    generation: Arc<AtomicU64>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            events,
            generation: Arc::new(AtomicU64::new(0)),
            outbound: None,
            task: None,
        }
    }

    fn queue(&self, frame: Outbound) -> nostr_bunker::Result<()> {
        self.outbound
            .as_ref()
            .ok_or_else(|| nostr_bunker::Error::Transport("Not connected".to_string()))?
            .send(frame)
            .map_err(|_| nostr_bunker::Error::Transport("Connection closed".to_string()))
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, url: &str) -> nostr_bunker::Result<()> {
        self.disconnect();
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        let events = SocketEvents {
            tx: self.events.clone(),
            generation: self.generation.clone(),
            mine: self.generation.load(Ordering::SeqCst),
        };
        self.task = Some(tokio::spawn(run_socket(url.to_string(), events, rx)));
        Ok(())
    }

    /// Aborts the socket task; an aborted task reports nothing further.
    fn disconnect(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn send_text(&mut self, frame: &str) -> nostr_bunker::Result<()> {
        self.queue(Outbound::Text(frame.to_string()))
    }

    fn send_ping(&mut self) -> nostr_bunker::Result<()> {
        self.queue(Outbound::Ping)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct SocketEvents {
    tx: mpsc::UnboundedSender<TransportEvent>,
    generation: Arc<AtomicU64>,
    mine: u64,
}

impl SocketEvents {
    /// Fails once the receiver is gone or this socket has been superseded.
    fn send(&self, event: TransportEvent) -> Result<(), ()> {
        if self.generation.load(Ordering::SeqCst) != self.mine {
            return Err(());
        }
        self.tx.send(event).map_err(|_| ())
    }
}

async fn run_socket(
    url: String,
    events: SocketEvents,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            let _ = events.send(TransportEvent::Error(format!("Connect to {} failed: {}", url, e)));
            return;
        }
    };
    debug!("WebSocket open to {}", url);
    let _ = events.send(TransportEvent::Connected);
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let message = match frame {
                    Some(Outbound::Text(text)) => Message::Text(text),
                    Some(Outbound::Ping) => Message::Ping(Vec::new()),
                    None => {
                        let _ = write.close().await;
                        return;
                    }
                };
                if let Err(e) = write.send(message).await {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    return;
                }
            }
            message = read.next() => {
                let event = match message {
                    Some(Ok(Message::Text(text))) => TransportEvent::Text(text),
                    Some(Ok(Message::Binary(bytes))) => TransportEvent::Binary(bytes),
                    Some(Ok(Message::Ping(_))) => TransportEvent::Ping,
                    Some(Ok(Message::Pong(_))) => TransportEvent::Pong,
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                };
                if events.send(event).is_err() {
                    return;
                }
            }
        }
    }

    debug!("WebSocket to {} closed", url);
    let _ = events.send(TransportEvent::Disconnected);
}
