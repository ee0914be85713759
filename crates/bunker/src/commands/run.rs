use anyhow::{bail, Result};
use nostr_bunker::{
    PollOutcome, SignerContext, SignerObserver, SignerOptions, SystemClock, TransportEvent,
};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use super::open_storage;
use crate::config::Config;
use crate::observer::DaemonObserver;
use crate::output::Output;
use crate::ws::WsTransport;

#[derive(Serialize)]
struct StartedResult {
    bunker_uri: String,
    device_pubkey: String,
    user_pubkey: Option<String>,
}

/// Runs the signer until interrupted. Fails once the reconnect budget is spent
/// so a supervisor can restart the process.
pub async fn run(config: &Config, data_dir: &Path, output: &Output) -> Result<()> {
    let storage = open_storage(data_dir)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let options = SignerOptions {
        connection: config.connection_config(),
        max_authorized_clients: config.max_authorized_clients,
        ..SignerOptions::default()
    };

    let mut signer = SignerContext::new(
        storage,
        WsTransport::new(events_tx),
        DaemonObserver::new(*output),
        Arc::new(SystemClock::new()),
        options,
    )?;

    if signer.user_public_key_hex().is_none() {
        bail!("No user key configured. Run `bunker set-key <nsec|hex>` first.");
    }

    output.success(
        "run",
        StartedResult {
            bunker_uri: signer.bunker_uri(),
            device_pubkey: signer.device_public_key_hex().to_string(),
            user_pubkey: signer.user_public_key_hex().map(str::to_string),
        },
    );

    signer.start()?;
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    };
    serve(
        &mut signer,
        events_rx,
        Duration::from_millis(config.poll_interval_ms.max(10)),
        shutdown,
    )
    .await
}

/// Drives a started signer: transport events as they arrive, `poll` on every tick.
/// Returns when `shutdown` resolves, or fails when a restart is required.
pub async fn serve<O: SignerObserver>(
    signer: &mut SignerContext<WsTransport, O>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    poll_interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut tick = tokio::time::interval(poll_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = events.recv() => signer.handle_transport_event(event),
            _ = tick.tick() => {
                if signer.poll() == PollOutcome::RestartRequired {
                    bail!(
                        "Relay unreachable after {} attempts, restart required",
                        signer.connection().config().max_reconnect_attempts
                    );
                }
            }
            _ = &mut shutdown => {
                signer.stop();
                return Ok(());
            }
        }
    }
}
