//! Web Push delivery: RFC 8291 payload encryption, RFC 8292 VAPID and fan-out.

use crate::adapters::{LocalStore, ReqwestTransport, SystemTimeProvider, TransportError};
use crate::codec::CodecError;
use crate::config;

mod derive;
mod dispatch;
mod encrypt;
mod header;
mod keys;
pub(crate) mod vapid;

pub use derive::{ContentKeys, build_context_info, derive_content_keys, derive_shared_secret, hkdf};
pub use dispatch::{
    DEFAULT_BADGE, DEFAULT_CONCURRENCY, DEFAULT_ICON, DEFAULT_TOPIC, DEFAULT_TTL_SECS,
    DispatchError, Dispatcher, PushOptions, SendError, Urgency, parse_topic,
};
pub use encrypt::{EncryptedPayload, MAX_PLAINTEXT_LEN, SubscriberKeys, encrypt, encrypt_with};
pub use header::{HEADER_LEN, RECORD_SIZE, build_header};
pub use keys::EphemeralKeyPair;
pub(crate) use vapid::{VapidConfigStatus, load_vapid_config};
pub use vapid::{
    VapidCredentials, VapidError, VapidKeys, create_vapid_assertion, generate_vapid_credentials,
    normalize_subject, push_audience,
};

pub type AppDispatcher = Dispatcher<LocalStore, ReqwestTransport, SystemTimeProvider>;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("{field}: {source}")]
    Decode {
        field: &'static str,
        #[source]
        source: CodecError,
    },
    #[error("{field} must be {expected} bytes, got {actual}")]
    KeyLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{0} is not an uncompressed P-256 point")]
    InvalidPoint(&'static str),
    #[error("invalid P-256 private key")]
    InvalidPrivateKey,
    #[error("HKDF cannot produce {0} bytes")]
    Hkdf(usize),
    #[error("AES-128-GCM encryption failed")]
    Aead,
    #[error("payload is {size} bytes, a single record holds at most {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Vapid(#[from] VapidError),
    #[error("failed to build push transport: {0}")]
    Transport(#[from] TransportError),
}

/// Builds the process-wide dispatcher. Keys given on the command line win over the
/// store's `vapid_keys` row; without either, dispatches fail with a config error.
pub fn dispatcher_from_config(
    config: &config::AppConfig,
    store: LocalStore,
) -> Result<AppDispatcher, SetupError> {
    let transport = ReqwestTransport::new(config.push_timeout)?;
    let dispatcher = Dispatcher::new(
        store,
        transport,
        SystemTimeProvider,
        config.push.clone(),
        &config.vapid_subject,
    );

    match load_vapid_config(config) {
        VapidConfigStatus::Ready(record) => {
            let keys = VapidKeys::from_record(&record, &config.vapid_subject)?;
            tracing::info!(public_key = %keys.public_key_base64(), "using configured VAPID keys");
            Ok(dispatcher.with_vapid(keys))
        }
        VapidConfigStatus::Incomplete => Err(VapidError::Incomplete.into()),
        VapidConfigStatus::Missing => {
            tracing::info!("no VAPID keys configured, falling back to the store");
            Ok(dispatcher)
        }
    }
}
