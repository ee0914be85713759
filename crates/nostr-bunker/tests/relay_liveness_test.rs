mod common;

use common::{connected_signer, signer_with};
use nostr_bunker::{
    ConnectionConfig, ConnectionState, InMemoryStorage, PollOutcome, SignerOptions,
    TransportEvent, MAX_FRAME_SIZE,
};
use std::sync::Arc;

#[test]
fn test_keepalive_ping_and_silence_timeout() {
    let (mut signer, clock) = connected_signer(SignerOptions::default());

    clock.advance_millis(5_000);
    assert_eq!(signer.poll(), PollOutcome::Continue);
    assert_eq!(signer.transport().pings, 1);

    clock.advance_millis(25_000);
    assert_eq!(signer.poll(), PollOutcome::Continue);
    assert_eq!(signer.transport().disconnects, 1);
    assert_eq!(signer.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        signer.observer().statuses.last(),
        Some(&(false, "Reconnecting (1/10)".to_string()))
    );
}

#[test]
fn test_inbound_traffic_keeps_connection_alive() {
    let (mut signer, clock) = connected_signer(SignerOptions::default());
    for _ in 0..10 {
        clock.advance_millis(10_000);
        signer.handle_transport_event(TransportEvent::Pong);
        signer.poll();
    }
    assert!(signer.connection().is_connected());
    assert_eq!(signer.transport().disconnects, 0);
}

#[test]
fn test_backoff_until_restart_required() {
    let config = ConnectionConfig::default();
    let (mut signer, clock) = signer_with(
        Arc::new(InMemoryStorage::new()),
        SignerOptions {
            connection: config.clone(),
            ..SignerOptions::default()
        },
    );
    signer.start().unwrap();

    for n in 1..=config.max_reconnect_attempts {
        signer.handle_transport_event(TransportEvent::Disconnected);
        let delay = config.reconnect_base_ms << n.min(5);
        assert_eq!(delay, config.backoff_delay_ms(n));

        clock.advance_millis(delay - 1);
        assert_eq!(signer.poll(), PollOutcome::Continue);
        assert_eq!(signer.transport().connects.len(), n as usize);

        clock.advance_millis(1);
        assert_eq!(signer.poll(), PollOutcome::Continue);
        assert_eq!(signer.transport().connects.len(), n as usize + 1);
    }

    signer.handle_transport_event(TransportEvent::Disconnected);
    assert_eq!(signer.connection_state(), ConnectionState::Failed);
    clock.advance_millis(10_000_000);
    assert_eq!(signer.poll(), PollOutcome::RestartRequired);
    assert_eq!(
        signer.transport().connects.len(),
        config.max_reconnect_attempts as usize + 1
    );
    assert!(signer.start().is_err());
}

#[test]
fn test_successful_connect_resets_backoff() {
    let (mut signer, clock) = connected_signer(SignerOptions::default());

    signer.handle_transport_event(TransportEvent::Error("reset by peer".to_string()));
    assert_eq!(signer.connection().consecutive_failures(), 1);
    clock.advance_millis(10_000);
    signer.poll();
    assert_eq!(signer.connection_state(), ConnectionState::Connecting);

    signer.handle_transport_event(TransportEvent::Connected);
    assert_eq!(signer.connection().consecutive_failures(), 0);
    // Resubscribed on the new connection.
    assert_eq!(
        signer
            .transport()
            .sent
            .iter()
            .filter(|frame| frame.starts_with("[\"REQ\""))
            .count(),
        2
    );
}

#[test]
fn test_stop_disables_reconnect() {
    let (mut signer, clock) = connected_signer(SignerOptions::default());
    signer.stop();
    signer.handle_transport_event(TransportEvent::Disconnected);

    clock.advance_millis(1_000_000);
    assert_eq!(signer.poll(), PollOutcome::Continue);
    assert_eq!(signer.transport().connects.len(), 1);
    assert_eq!(signer.connection().consecutive_failures(), 0);
}

#[test]
fn test_start_is_rejected_while_connecting() {
    let (mut signer, _clock) = signer_with(Arc::new(InMemoryStorage::new()), SignerOptions::default());
    signer.start().unwrap();
    assert!(signer.start().is_err());
    assert_eq!(signer.transport().connects.len(), 1);
}

#[test]
fn test_oversize_frame_is_dropped() {
    let (mut signer, _clock) = connected_signer(SignerOptions::default());
    let sent_before = signer.transport().sent.len();

    let huge = format!("[\"NOTICE\",\"{}\"]", "a".repeat(MAX_FRAME_SIZE));
    signer.handle_transport_event(TransportEvent::Text(huge));

    assert_eq!(signer.transport().sent.len(), sent_before);
    assert!(signer.connection().is_connected());
}
