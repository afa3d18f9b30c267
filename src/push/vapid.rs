use jwt_simple::prelude::{ECDSAP256PublicKeyLike, ES256KeyPair};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use time::OffsetDateTime;

use super::keys::{PUBLIC_KEY_LEN, uncompressed_point};
use crate::codec::{CodecError, decode_base64_url, encode_base64_url};
use crate::config;
use crate::types::push::VapidKeyRecord;

/// RFC 8292 caps assertions at 24h; 12h leaves room for clock skew.
pub const VAPID_ASSERTION_TTL_SECS: i64 = 12 * 60 * 60;
const PRIVATE_KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum VapidError {
    #[error("VAPID keys are not configured")]
    MissingKeys,
    #[error("incomplete VAPID configuration: both public and private key are required")]
    Incomplete,
    #[error("VAPID {field} is not valid base64url")]
    Decode {
        field: &'static str,
        #[source]
        source: CodecError,
    },
    #[error("VAPID {field} must be {expected} bytes, got {actual}")]
    KeyLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("VAPID private key is not a valid P-256 scalar")]
    InvalidPrivateKey,
    #[error("VAPID public key does not belong to the private key")]
    KeyMismatch,
    #[error("VAPID subject must be a mailto: or https: URI, got '{0}'")]
    InvalidSubject(String),
    #[error("push endpoint '{0}' has no http(s) origin")]
    Audience(String),
    #[error("failed to encode VAPID assertion: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Freshly generated base64url key pair, ready for the environment or the store.
#[derive(Debug, Clone)]
pub struct VapidCredentials {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub(crate) enum VapidConfigStatus {
    Missing,
    Incomplete,
    Ready(VapidKeyRecord),
}

pub(crate) fn load_vapid_config(config: &config::AppConfig) -> VapidConfigStatus {
    let private_key = config.vapid_private_key.as_ref();
    let public_key = config.vapid_public_key.as_ref();

    match (private_key, public_key) {
        (Some(private_key), Some(public_key)) => VapidConfigStatus::Ready(VapidKeyRecord {
            private_key: private_key.clone(),
            public_key: public_key.clone(),
        }),
        (None, None) => VapidConfigStatus::Missing,
        _ => VapidConfigStatus::Incomplete,
    }
}

/// Application server identity, validated once and shared read-only.
#[derive(Clone)]
pub struct VapidKeys {
    signing_key: SigningKey,
    public_key: [u8; PUBLIC_KEY_LEN],
    public_key_b64: String,
    subject: String,
}

impl VapidKeys {
    pub fn from_record(record: &VapidKeyRecord, subject: &str) -> Result<Self, VapidError> {
        Self::from_base64(&record.private_key, &record.public_key, subject)
    }

    /// Fails with [`VapidError::KeyMismatch`] when the public key is not derived from
    /// the private scalar, since push services reject such signatures silently.
    pub fn from_base64(
        private_key: &str,
        public_key: &str,
        subject: &str,
    ) -> Result<Self, VapidError> {
        let private_raw = decode_field("private key", private_key, PRIVATE_KEY_LEN)?;
        let public_raw = decode_field("public key", public_key, PUBLIC_KEY_LEN)?;

        let signing_key =
            SigningKey::from_slice(&private_raw).map_err(|_| VapidError::InvalidPrivateKey)?;
        let derived = uncompressed_point(&p256::PublicKey::from(signing_key.verifying_key()));
        if derived.as_slice() != public_raw.as_slice() {
            return Err(VapidError::KeyMismatch);
        }

        Ok(Self {
            signing_key,
            public_key: derived,
            public_key_b64: encode_base64_url(&derived),
            subject: normalize_subject(subject)?,
        })
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key
    }

    pub fn public_key_base64(&self) -> &str {
        &self.public_key_b64
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn authorization_header(&self, assertion: &str) -> String {
        format!("vapid t={assertion}, k={}", self.public_key_b64)
    }
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key_b64)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

fn decode_field(field: &'static str, raw: &str, expected: usize) -> Result<Vec<u8>, VapidError> {
    let bytes = decode_base64_url(raw).map_err(|source| VapidError::Decode { field, source })?;
    if bytes.len() != expected {
        return Err(VapidError::KeyLength {
            field,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Accepts `mailto:`/`https:` URIs and turns a bare address into `mailto:`.
pub fn normalize_subject(subject: &str) -> Result<String, VapidError> {
    let subject = subject.trim();
    if subject.starts_with("mailto:") || subject.starts_with("https:") {
        return Ok(subject.to_string());
    }
    if subject.contains('@') && !subject.contains(char::is_whitespace) {
        return Ok(format!("mailto:{subject}"));
    }
    Err(VapidError::InvalidSubject(subject.to_string()))
}

/// `aud` claim for an endpoint: its origin, port included only when non-default.
pub fn push_audience(endpoint: &str) -> Result<String, VapidError> {
    let url = url::Url::parse(endpoint).map_err(|_| VapidError::Audience(endpoint.to_string()))?;
    if !matches!(url.scheme(), "https" | "http") || url.host().is_none() {
        return Err(VapidError::Audience(endpoint.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

#[derive(Serialize)]
struct JwtHeader {
    alg: &'static str,
    typ: &'static str,
}

#[derive(Serialize)]
struct VapidClaims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

pub fn create_vapid_assertion(
    audience: &str,
    keys: &VapidKeys,
    now: OffsetDateTime,
) -> Result<String, VapidError> {
    let header = serde_json::to_vec(&JwtHeader {
        alg: "ES256",
        typ: "JWT",
    })?;
    let claims = serde_json::to_vec(&VapidClaims {
        aud: audience,
        exp: now.unix_timestamp() + VAPID_ASSERTION_TTL_SECS,
        sub: &keys.subject,
    })?;

    let signing_input = format!(
        "{}.{}",
        encode_base64_url(&header),
        encode_base64_url(&claims)
    );
    // Fixed-width R || S, which is what JWS ES256 expects (not DER).
    let signature: Signature = keys.signing_key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        encode_base64_url(&signature.to_bytes())
    ))
}

pub fn generate_vapid_credentials() -> VapidCredentials {
    let mut rng = OsRng;
    generate_vapid_credentials_with_rng(&mut rng)
}

pub(crate) fn generate_vapid_credentials_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> VapidCredentials {
    let key_pair = generate_es256_keypair_with_rng(rng);
    let public_key = key_pair.public_key().public_key().to_bytes_uncompressed();

    VapidCredentials {
        private_key: encode_base64_url(&key_pair.to_bytes()),
        public_key: encode_base64_url(&public_key),
    }
}

fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}
