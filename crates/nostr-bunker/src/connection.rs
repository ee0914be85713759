//! Relay connection liveness and exponential-backoff reconnection.

use crate::{Error, Result, TransportEvent, MAX_FRAME_SIZE};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub ping_interval_ms: u64,
    /// Silence on an open connection, or a pending attempt, longer than this is a failure.
    pub connection_timeout_ms: u64,
    pub reconnect_base_ms: u64,
    pub max_backoff_exponent: u32,
    pub max_reconnect_attempts: u32,
    pub max_frame_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 5_000,
            connection_timeout_ms: 30_000,
            reconnect_base_ms: 5_000,
            max_backoff_exponent: 5,
            max_reconnect_attempts: 10,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ConnectionConfig {
    /// `base * 2^min(failures, max_backoff_exponent)`.
    pub fn backoff_delay_ms(&self, consecutive_failures: u32) -> u64 {
        let exponent = consecutive_failures.min(self.max_backoff_exponent);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        self.reconnect_base_ms.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    /// Retry budget exhausted; only a restart recovers.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting to relay...",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error => "Connection error",
            ConnectionState::Failed => "Connection failed permanently",
        };
        f.write_str(label)
    }
}

/// What the owner of the transport should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    Connect,
    Subscribe,
    SendPing,
    ForceDisconnect,
    RestartRequired,
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    state: ConnectionState,
    consecutive_failures: u32,
    auto_reconnect: bool,
    attempt_started_at: u64,
    last_activity_at: u64,
    last_ping_at: u64,
    next_attempt_at: Option<u64>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            consecutive_failures: 0,
            auto_reconnect: false,
            attempt_started_at: 0,
            last_activity_at: 0,
            last_ping_at: 0,
            next_attempt_at: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn next_attempt_at(&self) -> Option<u64> {
        self.next_attempt_at
    }

    /// Starts an attempt and enables automatic reconnection.
    pub fn request_connect(&mut self, now: u64) -> Result<()> {
        match self.state {
            ConnectionState::Connecting => Err(Error::Transport(
                "Connection attempt already in progress".to_string(),
            )),
            ConnectionState::Connected => {
                Err(Error::Transport("Already connected".to_string()))
            }
            ConnectionState::Failed => Err(Error::Transport(
                "Reconnect budget exhausted, restart required".to_string(),
            )),
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.auto_reconnect = true;
                self.begin_attempt(now);
                Ok(())
            }
        }
    }

    fn begin_attempt(&mut self, now: u64) {
        info!(
            "Connection attempt #{} of {}",
            self.consecutive_failures + 1,
            self.config.max_reconnect_attempts
        );
        self.state = ConnectionState::Connecting;
        self.attempt_started_at = now;
        self.next_attempt_at = None;
    }

    /// Explicit disconnect: resets backoff and stops reconnecting.
    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.consecutive_failures = 0;
        self.auto_reconnect = false;
        self.next_attempt_at = None;
    }

    /// Rejects frames larger than the configured maximum.
    pub fn check_frame_size(&self, len: usize) -> Result<()> {
        if len > self.config.max_frame_size {
            return Err(Error::ResourceExhausted(format!(
                "Frame of {} bytes exceeds {}",
                len, self.config.max_frame_size
            )));
        }
        Ok(())
    }

    pub fn on_transport_event(&mut self, event: &TransportEvent, now: u64) -> Option<ConnectionAction> {
        match event {
            TransportEvent::Connected if self.state != ConnectionState::Connecting => {
                debug!("Ignoring Connected while {}", self.state);
                None
            }
            TransportEvent::Connected => {
                self.state = ConnectionState::Connected;
                self.consecutive_failures = 0;
                self.next_attempt_at = None;
                self.last_activity_at = now;
                self.last_ping_at = now;
                Some(ConnectionAction::Subscribe)
            }
            TransportEvent::Disconnected => {
                self.on_failure(ConnectionState::Disconnected, now);
                None
            }
            TransportEvent::Error(message) => {
                warn!("Transport error: {}", message);
                self.on_failure(ConnectionState::Error, now);
                None
            }
            TransportEvent::Text(_)
            | TransportEvent::Binary(_)
            | TransportEvent::Ping
            | TransportEvent::Pong => {
                self.last_activity_at = now;
                None
            }
        }
    }

    fn on_failure(&mut self, next_state: ConnectionState, now: u64) {
        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            return;
        }
        if !self.auto_reconnect {
            self.state = next_state;
            return;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures > self.config.max_reconnect_attempts {
            warn!(
                "Giving up after {} consecutive connection failures",
                self.consecutive_failures
            );
            self.state = ConnectionState::Failed;
            self.next_attempt_at = None;
            return;
        }

        let delay = self.config.backoff_delay_ms(self.consecutive_failures);
        self.state = next_state;
        self.next_attempt_at = Some(now.saturating_add(delay));
        info!(
            "Reconnecting in {} ms (failure {}/{})",
            delay, self.consecutive_failures, self.config.max_reconnect_attempts
        );
    }

    /// Timer-driven work: timeouts, pings and due reconnects.
    pub fn poll(&mut self, now: u64) -> Option<ConnectionAction> {
        let timeout = self.config.connection_timeout_ms;
        match self.state {
            ConnectionState::Failed => Some(ConnectionAction::RestartRequired),
            ConnectionState::Connecting => {
                if now.saturating_sub(self.attempt_started_at) >= timeout {
                    warn!("Connection attempt timed out");
                    self.on_failure(ConnectionState::Disconnected, now);
                    Some(ConnectionAction::ForceDisconnect)
                } else {
                    None
                }
            }
            ConnectionState::Connected => {
                if now.saturating_sub(self.last_activity_at) >= timeout {
                    warn!(
                        "No relay traffic for {} ms, forcing disconnect",
                        now.saturating_sub(self.last_activity_at)
                    );
                    self.on_failure(ConnectionState::Disconnected, now);
                    Some(ConnectionAction::ForceDisconnect)
                } else if now.saturating_sub(self.last_ping_at) >= self.config.ping_interval_ms {
                    self.last_ping_at = now;
                    debug!("Sending keepalive ping");
                    Some(ConnectionAction::SendPing)
                } else {
                    None
                }
            }
            ConnectionState::Disconnected | ConnectionState::Error => match self.next_attempt_at {
                Some(due) if self.auto_reconnect && now >= due => {
                    self.begin_attempt(now);
                    Some(ConnectionAction::Connect)
                }
                _ => None,
            },
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}
