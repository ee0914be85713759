//! NIP-46 remote signer ("bunker") core.
//!
//! A [`SignerContext`] receives encrypted kind-24133 requests from a relay,
//! signs or encrypts with the user key, and answers over the device key.

pub mod authorization;
pub mod clock;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod ecdh;
pub mod envelope;
pub mod error;
pub mod event;
pub mod file_storage;
pub mod key_cache;
pub mod nip04;
pub mod nip44;
pub mod observer;
pub mod settings;
pub mod storage;
pub mod transport;
pub mod types;

pub use authorization::AuthorizedClients;
pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState};
pub use context::{PollOutcome, SignerContext, SignerOptions};
pub use dispatcher::{Nip46Dispatcher, Nip46Method, Nip46Request, Nip46Response, Scheme};
pub use ecdh::{EcdhProvider, Secp256k1Ecdh};
pub use envelope::CryptoEnvelope;
pub use error::{Error, Result};
pub use event::{InboundEvent, RelayMessage, SignedEvent, UnsignedEventTemplate};
pub use file_storage::FileStorageAdapter;
pub use key_cache::{CacheStats, EcdhCache, KeyCache};
pub use observer::{AuthorizationPrompt, DenyAll, NoopObserver, SignerObserver};
pub use settings::Settings;
pub use storage::{InMemoryStorage, StorageAdapter};
pub use transport::{Transport, TransportEvent};
pub use types::*;
