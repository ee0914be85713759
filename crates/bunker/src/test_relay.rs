//! In-process relay for tests: stores events and fans them out to `kinds`/`#p` subscriptions.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone, Default)]
struct Filter {
    kinds: Option<Vec<u64>>,
    p_tags: Option<Vec<String>>,
}

impl Filter {
    fn parse(value: &Value) -> Self {
        let strings = |key: &str| {
            value.get(key).and_then(Value::as_array).map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
        };
        Self {
            kinds: value
                .get("kinds")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_u64).collect()),
            p_tags: strings("#p"),
        }
    }

    fn matches(&self, event: &Value) -> bool {
        if let Some(kinds) = &self.kinds {
            let kind = event["kind"].as_u64().unwrap_or_default();
            if !kinds.contains(&kind) {
                return false;
            }
        }
        if let Some(p_tags) = &self.p_tags {
            let tagged = event["tags"].as_array().into_iter().flatten().any(|tag| {
                tag[0] == "p" && tag[1].as_str().is_some_and(|p| p_tags.iter().any(|t| t == p))
            });
            if !tagged {
                return false;
            }
        }
        true
    }
}

struct RelayState {
    events: RwLock<Vec<Value>>,
    subscriptions: RwLock<usize>,
    broadcast: broadcast::Sender<Value>,
}

pub struct TestRelay {
    state: Arc<RelayState>,
    addr: SocketAddr,
}

impl TestRelay {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (broadcast, _) = broadcast::channel(1024);
        let state = Arc::new(RelayState {
            events: RwLock::new(Vec::new()),
            subscriptions: RwLock::new(0),
            broadcast,
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, accept_state.clone()));
            }
        });

        Ok(Self { state, addr })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn subscription_count(&self) -> usize {
        *self.state.subscriptions.read().await
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<RelayState>) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut sender, mut receiver) = ws.split();
    let subscriptions: Arc<RwLock<HashMap<String, Filter>>> = Arc::new(RwLock::new(HashMap::new()));
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let mut broadcast_rx = state.broadcast.subscribe();
    let forward_subs = subscriptions.clone();
    let forward_tx = tx.clone();
    let forward = tokio::spawn(async move {
        while let Ok(event) = broadcast_rx.recv().await {
            for (sub_id, filter) in forward_subs.read().await.iter() {
                if filter.matches(&event) {
                    let _ = forward_tx.send(json!(["EVENT", sub_id, event]).to_string());
                }
            }
        }
    });

    let send = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Vec<Value>>(&text) else {
            continue;
        };
        match frame.first().and_then(Value::as_str) {
            Some("EVENT") if frame.len() >= 2 => {
                let event = frame[1].clone();
                let id = event["id"].as_str().unwrap_or_default().to_string();
                state.events.write().await.push(event.clone());
                let _ = state.broadcast.send(event);
                let _ = tx.send(json!(["OK", id, true, ""]).to_string());
            }
            Some("REQ") if frame.len() >= 3 => {
                let sub_id = frame[1].as_str().unwrap_or_default().to_string();
                let filter = Filter::parse(&frame[2]);
                for event in state.events.read().await.iter() {
                    if filter.matches(event) {
                        let _ = tx.send(json!(["EVENT", sub_id, event]).to_string());
                    }
                }
                let _ = tx.send(json!(["EOSE", sub_id]).to_string());
                subscriptions.write().await.insert(sub_id, filter);
                *state.subscriptions.write().await += 1;
            }
            Some("CLOSE") if frame.len() >= 2 => {
                if let Some(sub_id) = frame[1].as_str() {
                    subscriptions.write().await.remove(sub_id);
                }
            }
            _ => {}
        }
    }

    forward.abort();
    send.abort();
}
