use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad hex/base64 input or a value of the wrong length.
    #[error("Format error: {0}")]
    Format(String),

    /// Well-formed input that breaks the wire protocol (missing `?iv=`, bad JSON-RPC shape).
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unauthorized client: {0}")]
    Unauthorized(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Crypto failure: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Nip44(#[from] nostr::nips::nip44::Error),

    #[error(transparent)]
    Secp256k1(#[from] nostr::secp256k1::Error),
}

impl Error {
    /// True for failures that come from the peer's input rather than local state.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::Format(_)
                | Error::Protocol(_)
                | Error::Parse(_)
                | Error::Json(_)
                | Error::Hex(_)
                | Error::Base64(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
