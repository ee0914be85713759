//! NIP-46 request handling: decrypt, authorize, execute, encrypt the reply.

use crate::envelope::CryptoEnvelope;
use crate::event::{self, InboundEvent, UnsignedEventTemplate};
use crate::{
    nip04, normalize_pubkey_hex, random_secret_hex, AuthorizationPrompt, AuthorizedClients, Clock,
    Error, Result, Settings, SignerObserver, NOSTR_CONNECT_KIND,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PREVIEW_CHARS: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct Nip46Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Nip46Request {
    /// String params are taken as-is; anything else (an inline event object) is re-serialized.
    fn param(&self, index: usize) -> Result<String> {
        match self.params.get(index) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(Error::Protocol(format!(
                "{} requires params[{}]",
                self.method, index
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nip46Response {
    pub id: String,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nip46Method {
    Connect,
    SignEvent,
    Ping,
    GetPublicKey,
    Nip04Encrypt,
    Nip04Decrypt,
    Nip44Encrypt,
    Nip44Decrypt,
}

impl Nip46Method {
    pub fn parse(method: &str) -> Option<Self> {
        Some(match method {
            "connect" => Self::Connect,
            "sign_event" => Self::SignEvent,
            "ping" => Self::Ping,
            "get_public_key" => Self::GetPublicKey,
            "nip04_encrypt" => Self::Nip04Encrypt,
            "nip04_decrypt" => Self::Nip04Decrypt,
            "nip44_encrypt" => Self::Nip44Encrypt,
            "nip44_decrypt" => Self::Nip44Decrypt,
            _ => return None,
        })
    }

    pub fn requires_authorization(self) -> bool {
        self != Self::Connect
    }
}

/// Transport encryption a request arrived under; the reply uses the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Nip04,
    Nip44,
}

impl Scheme {
    pub fn detect(content: &str) -> Self {
        if nip04::is_nip04_payload(content) {
            Scheme::Nip04
        } else {
            Scheme::Nip44
        }
    }
}

pub struct Nip46Dispatcher {
    envelope: CryptoEnvelope,
    settings: Settings,
    clients: AuthorizedClients,
    prompt: Box<dyn AuthorizationPrompt>,
    clock: Arc<dyn Clock>,
    session_secret: String,
}

impl Nip46Dispatcher {
    pub fn new(
        envelope: CryptoEnvelope,
        settings: Settings,
        clients: AuthorizedClients,
        prompt: Box<dyn AuthorizationPrompt>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            envelope,
            settings,
            clients,
            prompt,
            clock,
            session_secret: random_secret_hex(),
        }
    }

    pub fn session_secret(&self) -> &str {
        &self.session_secret
    }

    pub fn regenerate_session_secret(&mut self) {
        self.session_secret = random_secret_hex();
        debug!("Session secret regenerated");
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn clients(&self) -> &AuthorizedClients {
        &self.clients
    }

    pub fn clients_mut(&mut self) -> &mut AuthorizedClients {
        &mut self.clients
    }

    pub fn envelope(&self) -> &CryptoEnvelope {
        &self.envelope
    }

    /// Parses a raw event or relay frame and handles it.
    pub fn handle_frame(
        &mut self,
        raw: &str,
        observer: &mut dyn SignerObserver,
    ) -> Result<Option<String>> {
        let inbound = event::extract_sender_and_content(raw)?;
        self.handle_event(&inbound, observer)
    }

    /// Returns the outbound `["EVENT",{...}]` reply, or `None` when the
    /// request gets no reply. Errors abort the request without a reply.
    pub fn handle_event(
        &mut self,
        inbound: &InboundEvent,
        observer: &mut dyn SignerObserver,
    ) -> Result<Option<String>> {
        let sender = normalize_pubkey_hex(&inbound.sender_pubkey)?;
        let scheme = Scheme::detect(&inbound.content);
        let device_private = self.settings.device_keys().private_key_hex();

        let plaintext = match scheme {
            Scheme::Nip04 => self
                .envelope
                .nip04_decrypt(device_private, &sender, &inbound.content)?,
            Scheme::Nip44 => self
                .envelope
                .nip44_decrypt(device_private, &sender, &inbound.content)?,
        };
        let request: Nip46Request = serde_json::from_str(&plaintext)
            .map_err(|e| Error::Parse(format!("Invalid NIP-46 request: {}", e)))?;

        let Some(method) = Nip46Method::parse(&request.method) else {
            warn!("Dropping unknown NIP-46 method {:?} from {}", request.method, sender);
            return Ok(None);
        };
        debug!("NIP-46 {} request {} from {}", request.method, request.id, sender);

        if method.requires_authorization() && !self.clients.is_authorized(&sender) {
            return Err(Error::Unauthorized(format!(
                "{} request from {}",
                request.method, sender
            )));
        }

        let response = match method {
            Nip46Method::Connect => {
                let result = self.connect(&request, &sender, observer)?;
                Nip46Response {
                    id: request.id.clone(),
                    result,
                    error: None,
                }
            }
            _ => match self.execute(method, &request, observer) {
                Ok(result) => Nip46Response {
                    id: request.id.clone(),
                    result,
                    error: None,
                },
                Err(e) => {
                    warn!("NIP-46 {} failed: {}", request.method, e);
                    observer.show_error(&e.to_string());
                    Nip46Response {
                        id: request.id.clone(),
                        result: String::new(),
                        error: Some(e.to_string()),
                    }
                }
            },
        };

        let reply = serde_json::to_string(&response)?;
        self.encrypt_reply(scheme, &sender, &reply).map(Some)
    }

    fn connect(
        &mut self,
        request: &Nip46Request,
        sender: &str,
        observer: &mut dyn SignerObserver,
    ) -> Result<String> {
        let secret = request
            .params
            .get(1)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let authorized = if self.clients.is_authorized(sender) {
            true
        } else if !secret.is_empty() && secret == self.session_secret {
            info!("Client {} presented the session secret", sender);
            true
        } else {
            self.prompt.authorize(sender)
        };
        if !authorized {
            return Err(Error::Unauthorized(format!("connect from {}", sender)));
        }

        if let Err(e) = self.clients.add(sender) {
            warn!("Authorized {} for this session only: {}", sender, e);
        }
        observer.show_success("Client connected");

        Ok(if secret.is_empty() {
            "ack".to_string()
        } else {
            secret
        })
    }

    fn execute(
        &mut self,
        method: Nip46Method,
        request: &Nip46Request,
        observer: &mut dyn SignerObserver,
    ) -> Result<String> {
        let user = self.settings.user_keys();
        let require_user =
            || user.ok_or_else(|| Error::Crypto("No user key configured".to_string()));

        match method {
            Nip46Method::Ping => Ok("pong".to_string()),
            Nip46Method::GetPublicKey => Ok(require_user()?.public_key_hex().to_string()),
            Nip46Method::SignEvent => {
                let user = require_user()?;
                let template =
                    UnsignedEventTemplate::parse(&request.param(0)?, self.clock.unix_timestamp())?;
                let preview: String = template.content.chars().take(PREVIEW_CHARS).collect();
                observer.on_signing_request(template.kind, &preview);

                let signed = event::sign_event(&mut self.envelope, user, &template)?;
                info!("Signed kind {} event {}", signed.kind, signed.id);
                observer.on_event_signed(signed.kind, &signed.content);
                signed.to_json()
            }
            Nip46Method::Nip04Encrypt => {
                let user = require_user()?;
                let (peer, text) = peer_and_text(request)?;
                self.envelope
                    .nip04_encrypt(user.private_key_hex(), &peer, &text)
            }
            Nip46Method::Nip04Decrypt => {
                let user = require_user()?;
                let (peer, payload) = peer_and_text(request)?;
                let plaintext =
                    self.envelope
                        .nip04_decrypt(user.private_key_hex(), &peer, &payload)?;
                observer.on_decrypted(&plaintext);
                Ok(plaintext)
            }
            Nip46Method::Nip44Encrypt => {
                let user = require_user()?;
                let (peer, text) = peer_and_text(request)?;
                self.envelope
                    .nip44_encrypt(user.private_key_hex(), &peer, &text)
            }
            Nip46Method::Nip44Decrypt => {
                let user = require_user()?;
                let (peer, payload) = peer_and_text(request)?;
                let plaintext =
                    self.envelope
                        .nip44_decrypt(user.private_key_hex(), &peer, &payload)?;
                observer.on_decrypted(&plaintext);
                Ok(plaintext)
            }
            Nip46Method::Connect => Err(Error::Protocol(
                "connect is handled before dispatch".to_string(),
            )),
        }
    }

    fn encrypt_reply(&mut self, scheme: Scheme, recipient: &str, reply: &str) -> Result<String> {
        event::build_encrypted_dm(
            &mut self.envelope,
            self.settings.device_keys(),
            recipient,
            NOSTR_CONNECT_KIND,
            reply,
            scheme,
            self.clock.unix_timestamp(),
        )
    }
}

fn peer_and_text(request: &Nip46Request) -> Result<(String, String)> {
    let peer = normalize_pubkey_hex(&request.param(0)?)?;
    Ok((peer, request.param(1)?))
}
