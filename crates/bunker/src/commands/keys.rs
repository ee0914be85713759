use anyhow::{Context, Result};
use nostr::nips::nip19::FromBech32;
use nostr::ToBech32;
use nostr_bunker::{AuthorizedClients, Settings};
use serde::Serialize;
use std::path::Path;

use super::open_storage;
use crate::output::Output;

#[derive(Serialize)]
struct IdentityResult {
    device_pubkey: String,
    device_npub: String,
    user_pubkey: Option<String>,
    user_npub: Option<String>,
    relay_url: String,
    authorized_clients: usize,
    /// The session secret is only known to a running signer.
    pairing_base: String,
}

#[derive(Serialize)]
struct SetKeyResult {
    pubkey: String,
    npub: String,
}

fn npub(pubkey_hex: &str) -> String {
    nostr::PublicKey::from_hex(pubkey_hex)
        .ok()
        .and_then(|pk| pk.to_bech32().ok())
        .unwrap_or_default()
}

/// `bunker://<device>?relay=<url>`, encoded the same way as the full URI from `run`.
fn pairing_base(device: &str, relay_url: &str) -> String {
    format!(
        "bunker://{}?relay={}",
        device,
        urlencoding::encode(relay_url)
    )
}

/// Shows the keys, relay and pairing URI prefix.
pub fn uri(data_dir: &Path, output: &Output) -> Result<()> {
    let storage = open_storage(data_dir)?;
    let settings = Settings::load(storage.clone())?;
    let clients = AuthorizedClients::load(storage)?;
    let device = settings.device_keys().public_key_hex();

    let result = IdentityResult {
        device_pubkey: device.to_string(),
        device_npub: npub(device),
        user_pubkey: settings.user_keys().map(|k| k.public_key_hex().to_string()),
        user_npub: settings.user_keys().map(|k| npub(k.public_key_hex())),
        relay_url: settings.relay_url().to_string(),
        authorized_clients: clients.count(),
        pairing_base: pairing_base(device, settings.relay_url()),
    };
    output.success("uri", result);
    Ok(())
}

/// Sets the user key (nsec or hex) that signs on behalf of clients.
pub fn set_key(key: &str, data_dir: &Path, output: &Output) -> Result<()> {
    let key = key.trim();
    let hex_key = if key.starts_with("nsec1") {
        let sk = nostr::SecretKey::from_bech32(key).context("Invalid nsec key")?;
        hex::encode(sk.to_secret_bytes())
    } else {
        key.to_string()
    };

    let mut settings = Settings::load(open_storage(data_dir)?)?;
    let pubkey = settings
        .set_user_private_key(&hex_key)
        .context("Invalid private key")?
        .public_key_hex()
        .to_string();

    output.success(
        "set-key",
        SetKeyResult {
            npub: npub(&pubkey),
            pubkey,
        },
    );
    Ok(())
}

pub fn set_relay(url: &str, data_dir: &Path, output: &Output) -> Result<()> {
    let mut settings = Settings::load(open_storage(data_dir)?)?;
    settings.set_relay_url(url)?;
    output.success_message("set-relay", &format!("Relay set to {}", settings.relay_url()));
    Ok(())
}
