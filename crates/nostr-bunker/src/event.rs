//! Nostr event wire format: extracting requests from relay frames and
//! assembling signed events.

use crate::dispatcher::Scheme;
use crate::envelope::CryptoEnvelope;
use crate::{Error, KeyPair, Result, NOSTR_CONNECT_KIND, SUBSCRIPTION_ID};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write as _;

pub type Tags = Vec<Vec<String>>;

/// Sender and ciphertext of an inbound request event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender_pubkey: String,
    pub content: String,
}

/// Accepts a signing array `[0,pubkey,created_at,kind,tags,content]`, a bare
/// event object, or a relay `["EVENT", subId, {...}]` frame.
pub fn extract_sender_and_content(raw: &str) -> Result<InboundEvent> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| Error::Parse(format!("Invalid event JSON: {}", e)))?;
    extract_from_value(&value)
}

fn extract_from_value(value: &Value) -> Result<InboundEvent> {
    match value {
        Value::Array(items) if items.first().and_then(Value::as_str) == Some("EVENT") => {
            let event = items
                .get(2)
                .ok_or_else(|| Error::Parse("EVENT frame has no event object".to_string()))?;
            extract_from_value(event)
        }
        Value::Array(items) if items.first().and_then(Value::as_u64) == Some(0) => {
            let pubkey = items.get(1).and_then(Value::as_str);
            let content = items.get(5).and_then(Value::as_str);
            match (pubkey, content) {
                (Some(pubkey), Some(content)) => Ok(InboundEvent {
                    sender_pubkey: pubkey.to_string(),
                    content: content.to_string(),
                }),
                _ => Err(Error::Parse(
                    "Signing array needs string pubkey and content".to_string(),
                )),
            }
        }
        Value::Object(fields) => {
            let pubkey = fields.get("pubkey").and_then(Value::as_str);
            let content = fields.get("content").and_then(Value::as_str);
            match (pubkey, content) {
                (Some(pubkey), Some(content)) => Ok(InboundEvent {
                    sender_pubkey: pubkey.to_string(),
                    content: content.to_string(),
                }),
                _ => Err(Error::Parse(
                    "Event object needs string pubkey and content".to_string(),
                )),
            }
        }
        _ => Err(Error::Parse("Unrecognized event shape".to_string())),
    }
}

/// Relay-to-client frames.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: Value,
    },
    Eose {
        subscription_id: String,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Notice {
        message: String,
    },
    Closed {
        subscription_id: String,
        message: String,
    },
    Other(String),
}

impl RelayMessage {
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| Error::Parse(format!("Invalid relay frame: {}", e)))?;
        let items = value
            .as_array()
            .ok_or_else(|| Error::Parse("Relay frame is not an array".to_string()))?;
        let label = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("Relay frame has no label".to_string()))?;
        let text_at = |index: usize| {
            items
                .get(index)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(match label {
            "EVENT" => {
                let event = items
                    .get(2)
                    .filter(|event| event.is_object())
                    .cloned()
                    .ok_or_else(|| Error::Parse("EVENT frame has no event object".to_string()))?;
                RelayMessage::Event {
                    subscription_id: text_at(1),
                    event,
                }
            }
            "EOSE" => RelayMessage::Eose {
                subscription_id: text_at(1),
            },
            "OK" => RelayMessage::Ok {
                event_id: text_at(1),
                accepted: items.get(2).and_then(Value::as_bool).unwrap_or(false),
                message: text_at(3),
            },
            "NOTICE" => RelayMessage::Notice {
                message: text_at(1),
            },
            "CLOSED" => RelayMessage::Closed {
                subscription_id: text_at(1),
                message: text_at(2),
            },
            other => RelayMessage::Other(other.to_string()),
        })
    }

    /// Sender and content of an `EVENT` frame.
    pub fn inbound_event(&self) -> Option<Result<InboundEvent>> {
        match self {
            RelayMessage::Event { event, .. } => Some(extract_from_value(event)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawTemplate {
    kind: u64,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tags: Option<Tags>,
    #[serde(default)]
    created_at: Option<u64>,
}

/// The unsigned event a client asks us to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEventTemplate {
    pub kind: u16,
    pub content: String,
    pub tags: Tags,
    pub created_at: u64,
}

impl UnsignedEventTemplate {
    /// Missing `created_at` falls back to `now`, missing `tags` to `[]`.
    pub fn parse(raw: &str, now: u64) -> Result<Self> {
        let template: RawTemplate = serde_json::from_str(raw)
            .map_err(|e| Error::Parse(format!("Invalid event template: {}", e)))?;
        let kind = u16::try_from(template.kind)
            .map_err(|_| Error::Parse(format!("Event kind {} out of range", template.kind)))?;
        Ok(Self {
            kind,
            content: template.content,
            tags: template.tags.unwrap_or_default(),
            created_at: template.created_at.unwrap_or(now),
        })
    }
}

/// Escapes a string for interpolation between JSON quotes.
///
/// Matches serde_json's output, which is the NIP-01 canonical form.
pub fn escape_content(content: &str) -> String {
    let mut escaped = String::with_capacity(content.len() + 8);
    for c in content.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{08}' => escaped.push_str("\\b"),
            '\u{0c}' => escaped.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(escaped, "\\u{:04x}", c as u32);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// `[0,pubkey,created_at,kind,tags,content]`, the preimage of the event id.
pub fn serialize_for_id(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &Tags,
    content: &str,
) -> Result<String> {
    Ok(format!(
        "[0,\"{}\",{},{},{},\"{}\"]",
        pubkey,
        created_at,
        kind,
        serde_json::to_string(tags)?,
        escape_content(content)
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Tags,
    pub content: String,
    pub sig: String,
}

impl SignedEvent {
    pub fn to_json(&self) -> Result<String> {
        build_signed_event_json(
            &self.id,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
            &self.sig,
        )
    }
}

pub fn build_signed_event_json(
    id: &str,
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &Tags,
    content: &str,
    sig: &str,
) -> Result<String> {
    Ok(format!(
        "{{\"id\":\"{}\",\"pubkey\":\"{}\",\"created_at\":{},\"kind\":{},\"tags\":{},\"content\":\"{}\",\"sig\":\"{}\"}}",
        id,
        pubkey,
        created_at,
        kind,
        serde_json::to_string(tags)?,
        escape_content(content),
        sig
    ))
}

/// Hashes and signs `template` as `signer`.
pub fn sign_event(
    envelope: &mut CryptoEnvelope,
    signer: &KeyPair,
    template: &UnsignedEventTemplate,
) -> Result<SignedEvent> {
    let serialized = serialize_for_id(
        signer.public_key_hex(),
        template.created_at,
        template.kind,
        &template.tags,
        &template.content,
    )?;
    let digest = CryptoEnvelope::hash_event(&serialized);
    let sig = envelope.schnorr_sign(signer.private_key_hex(), &digest)?;
    Ok(SignedEvent {
        id: hex::encode(digest),
        pubkey: signer.public_key_hex().to_string(),
        created_at: template.created_at,
        kind: template.kind,
        tags: template.tags.clone(),
        content: template.content.clone(),
        sig: hex::encode(sig),
    })
}

/// Encrypts `plaintext` from `sender` to `recipient` under `scheme` and wraps
/// it as a signed `kind` event with a single `p` tag.
pub fn build_encrypted_dm(
    envelope: &mut CryptoEnvelope,
    sender: &KeyPair,
    recipient: &str,
    kind: u16,
    plaintext: &str,
    scheme: Scheme,
    created_at: u64,
) -> Result<String> {
    let content = match scheme {
        Scheme::Nip04 => envelope.nip04_encrypt(sender.private_key_hex(), recipient, plaintext)?,
        Scheme::Nip44 => envelope.nip44_encrypt(sender.private_key_hex(), recipient, plaintext)?,
    };
    p_tagged_frame(envelope, sender, recipient, kind, &content, created_at)
}

fn p_tagged_frame(
    envelope: &mut CryptoEnvelope,
    signer: &KeyPair,
    recipient: &str,
    kind: u16,
    content: &str,
    created_at: u64,
) -> Result<String> {
    let template = UnsignedEventTemplate {
        kind,
        content: content.to_string(),
        tags: vec![vec!["p".to_string(), recipient.to_string()]],
        created_at,
    };
    let event = sign_event(envelope, signer, &template)?;
    Ok(format!("[\"EVENT\",{}]", event.to_json()?))
}

/// `["REQ","signer",{"kinds":[24133],"#p":[device],"limit":0}]`
pub fn subscription_frame(device_pubkey: &str) -> String {
    json!([
        "REQ",
        SUBSCRIPTION_ID,
        {"kinds": [NOSTR_CONNECT_KIND], "#p": [device_pubkey], "limit": 0}
    ])
    .to_string()
}
