use crate::connection::{ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState};
use crate::dispatcher::Nip46Dispatcher;
use crate::ecdh::EcdhProvider;
use crate::envelope::CryptoEnvelope;
use crate::event::{self, RelayMessage};
use crate::{
    AuthorizationPrompt, AuthorizedClients, Clock, DenyAll, Error, Result, Settings,
    SignerObserver, StorageAdapter, Transport, TransportEvent, MAX_AUTHORIZED_CLIENTS,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct SignerOptions {
    pub connection: ConnectionConfig,
    pub prompt: Box<dyn AuthorizationPrompt>,
    /// Overrides the secp256k1 ECDH implementation.
    pub ecdh: Option<Box<dyn EcdhProvider>>,
    pub max_authorized_clients: usize,
}

impl Default for SignerOptions {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            prompt: Box::new(DenyAll),
            ecdh: None,
            max_authorized_clients: MAX_AUTHORIZED_CLIENTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    /// Reconnect budget exhausted; the process should be restarted.
    RestartRequired,
}

/// Owns every piece of signer state and drives it from one loop.
///
/// Feed transport notifications to [`handle_transport_event`] and call
/// [`poll`] regularly; both run to completion on the caller's thread.
///
/// [`handle_transport_event`]: SignerContext::handle_transport_event
/// [`poll`]: SignerContext::poll
pub struct SignerContext<T: Transport, O: SignerObserver> {
    dispatcher: Nip46Dispatcher,
    connection: ConnectionManager,
    transport: T,
    observer: O,
    clock: Arc<dyn Clock>,
}

impl<T: Transport, O: SignerObserver> SignerContext<T, O> {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        transport: T,
        observer: O,
        clock: Arc<dyn Clock>,
        options: SignerOptions,
    ) -> Result<Self> {
        let settings = Settings::load(storage.clone())?;
        let clients =
            AuthorizedClients::load_with_capacity(storage, options.max_authorized_clients)?;
        let envelope = match options.ecdh {
            Some(ecdh) => CryptoEnvelope::with_ecdh_provider(clock.clone(), ecdh),
            None => CryptoEnvelope::new(clock.clone()),
        };
        info!(
            "Signer ready: device {}, user {}, {} authorized clients",
            settings.device_keys().public_key_hex(),
            settings
                .user_keys()
                .map(|keys| keys.public_key_hex())
                .unwrap_or("<unset>"),
            clients.count()
        );
        let dispatcher = Nip46Dispatcher::new(envelope, settings, clients, options.prompt, clock.clone());

        Ok(Self {
            dispatcher,
            connection: ConnectionManager::new(options.connection),
            transport,
            observer,
            clock,
        })
    }

    /// Issues the first connection attempt.
    pub fn start(&mut self) -> Result<()> {
        let before = self.connection.state();
        let now = self.clock.now_millis();
        self.connection.request_connect(now)?;
        self.open_transport(now);
        self.notify_state(before);
        Ok(())
    }

    /// Disconnects and stops reconnecting.
    pub fn stop(&mut self) {
        let before = self.connection.state();
        self.connection.disconnect();
        self.transport.disconnect();
        self.notify_state(before);
    }

    fn open_transport(&mut self, now: u64) {
        let url = self.dispatcher.settings().relay_url().to_string();
        info!("Connecting to relay {}", url);
        if let Err(e) = self.transport.connect(&url) {
            self.connection
                .on_transport_event(&TransportEvent::Error(e.to_string()), now);
        }
    }

    /// `bunker://<device>?relay=<url>&secret=<secret>`, or empty without a relay.
    pub fn bunker_uri(&self) -> String {
        let settings = self.dispatcher.settings();
        let device = settings.device_keys().public_key_hex();
        let relay = settings.relay_url();
        if device.is_empty() || relay.is_empty() {
            return String::new();
        }
        format!(
            "bunker://{}?relay={}&secret={}",
            device,
            urlencoding::encode(relay),
            self.dispatcher.session_secret()
        )
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if let Err(e) = self.connection.check_frame_size(event.payload_len()) {
            warn!("Dropping inbound frame: {}", e);
            return;
        }

        let before = self.connection.state();
        let now = self.clock.now_millis();
        let action = self.connection.on_transport_event(&event, now);
        if let Some(action) = action {
            self.apply(action, now);
        }
        self.notify_state(before);

        match event {
            TransportEvent::Text(text) => self.handle_text(&text),
            TransportEvent::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => self.handle_text(&text),
                Err(e) => warn!("Ignoring non-UTF-8 binary frame: {}", e),
            },
            _ => {}
        }
    }

    fn handle_text(&mut self, text: &str) {
        let message = match RelayMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring relay frame: {}", e);
                return;
            }
        };

        match &message {
            RelayMessage::Event { .. } => {
                let outcome = message
                    .inbound_event()
                    .unwrap_or_else(|| Err(Error::Parse("Not an event frame".to_string())))
                    .and_then(|inbound| self.dispatcher.handle_event(&inbound, &mut self.observer));
                match outcome {
                    Ok(Some(reply)) => {
                        if let Err(e) = self.transport.send_text(&reply) {
                            self.report(&e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => self.report(&e),
                }
            }
            RelayMessage::Eose { subscription_id } => {
                debug!("End of stored events for {}", subscription_id)
            }
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => {
                if *accepted {
                    debug!("Relay accepted {}", event_id);
                } else {
                    warn!("Relay rejected {}: {}", event_id, message);
                }
            }
            RelayMessage::Notice { message } => info!("Relay notice: {}", message),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => warn!("Relay closed {}: {}", subscription_id, message),
            RelayMessage::Other(label) => debug!("Ignoring {} frame", label),
        }
    }

    fn report(&mut self, e: &Error) {
        match e {
            Error::Unauthorized(_) => warn!("{}", e),
            e if e.is_input_error() => warn!("Dropping request: {}", e),
            e => error!("Request failed: {}", e),
        }
        self.observer.show_error(&e.to_string());
    }

    /// Runs timers. Call on every loop iteration.
    pub fn poll(&mut self) -> PollOutcome {
        let before = self.connection.state();
        let now = self.clock.now_millis();
        let outcome = match self.connection.poll(now) {
            Some(ConnectionAction::RestartRequired) => PollOutcome::RestartRequired,
            Some(action) => {
                self.apply(action, now);
                PollOutcome::Continue
            }
            None => PollOutcome::Continue,
        };
        self.notify_state(before);
        outcome
    }

    fn apply(&mut self, action: ConnectionAction, now: u64) {
        match action {
            ConnectionAction::Connect => self.open_transport(now),
            ConnectionAction::Subscribe => {
                let frame =
                    event::subscription_frame(self.dispatcher.settings().device_keys().public_key_hex());
                debug!("Subscribing: {}", frame);
                if let Err(e) = self.transport.send_text(&frame) {
                    warn!("Failed to send subscription: {}", e);
                }
            }
            ConnectionAction::SendPing => {
                if let Err(e) = self.transport.send_ping() {
                    warn!("Failed to send ping: {}", e);
                }
            }
            ConnectionAction::ForceDisconnect => self.transport.disconnect(),
            ConnectionAction::RestartRequired => {}
        }
    }

    fn notify_state(&mut self, before: ConnectionState) {
        let state = self.connection.state();
        if state == before {
            return;
        }
        let status = match (state, self.connection.next_attempt_at()) {
            (ConnectionState::Disconnected | ConnectionState::Error, Some(_)) => format!(
                "Reconnecting ({}/{})",
                self.connection.consecutive_failures(),
                self.connection.config().max_reconnect_attempts
            ),
            _ => state.to_string(),
        };
        self.observer
            .on_connection_changed(state == ConnectionState::Connected, &status);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn dispatcher(&self) -> &Nip46Dispatcher {
        &self.dispatcher
    }

    pub fn session_secret(&self) -> &str {
        self.dispatcher.session_secret()
    }

    pub fn refresh_session_secret(&mut self) {
        self.dispatcher.regenerate_session_secret();
    }

    pub fn device_public_key_hex(&self) -> &str {
        self.dispatcher.settings().device_keys().public_key_hex()
    }

    pub fn user_public_key_hex(&self) -> Option<&str> {
        self.dispatcher
            .settings()
            .user_keys()
            .map(|keys| keys.public_key_hex())
    }

    /// Returns the derived user pubkey.
    pub fn set_user_private_key(&mut self, private_key_hex: &str) -> Result<String> {
        let keys = self
            .dispatcher
            .settings_mut()
            .set_user_private_key(private_key_hex)?;
        Ok(keys.public_key_hex().to_string())
    }

    /// Takes effect on the next connection attempt.
    pub fn set_relay_url(&mut self, relay_url: &str) -> Result<()> {
        self.dispatcher.settings_mut().set_relay_url(relay_url)
    }

    pub fn authorized_clients(&self) -> &AuthorizedClients {
        self.dispatcher.clients()
    }

    pub fn clear_authorized_clients(&mut self) -> Result<()> {
        self.dispatcher.clients_mut().clear_all()?;
        self.observer.show_success("Authorized clients cleared");
        Ok(())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }
}
