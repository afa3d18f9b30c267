use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes128Gcm;
use rand::RngCore;
use rand::rngs::OsRng;

use super::CryptoError;
use super::derive::{self, AUTH_SECRET_LEN, SALT_LEN};
use super::header::{HEADER_LEN, RECORD_SIZE, build_header};
use super::keys::{EphemeralKeyPair, PUBLIC_KEY_LEN, parse_public_key};
use crate::codec::decode_base64_url;
use crate::types::push::PushSubscription;

pub const TAG_LEN: usize = 16;
/// Largest plaintext that still fits one record next to the delimiter and tag.
pub const MAX_PLAINTEXT_LEN: usize = RECORD_SIZE as usize - TAG_LEN - 1;
const LAST_RECORD_DELIMITER: u8 = 0x02;

#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub salt: [u8; SALT_LEN],
    pub local_public_key: [u8; PUBLIC_KEY_LEN],
}

impl EncryptedPayload {
    /// Request body: header followed by the single record.
    pub fn into_body(self) -> Vec<u8> {
        let mut body = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        body.extend_from_slice(&build_header(&self.salt, &self.local_public_key));
        body.extend_from_slice(&self.ciphertext);
        body
    }
}

/// Decoded and validated `p256dh` / `auth` pair of a subscription.
#[derive(Debug, Clone)]
pub struct SubscriberKeys {
    public_key: [u8; PUBLIC_KEY_LEN],
    auth: [u8; AUTH_SECRET_LEN],
}

impl SubscriberKeys {
    pub fn from_subscription(subscription: &PushSubscription) -> Result<Self, CryptoError> {
        let public_key =
            decode_base64_url(&subscription.p256dh).map_err(|source| CryptoError::Decode {
                field: "p256dh",
                source,
            })?;
        parse_public_key("p256dh", &public_key)?;

        let auth = decode_base64_url(&subscription.auth).map_err(|source| CryptoError::Decode {
            field: "auth",
            source,
        })?;
        let auth: [u8; AUTH_SECRET_LEN] =
            auth.as_slice().try_into().map_err(|_| CryptoError::KeyLength {
                field: "auth",
                expected: AUTH_SECRET_LEN,
                actual: auth.len(),
            })?;

        let mut keys = Self {
            public_key: [0u8; PUBLIC_KEY_LEN],
            auth,
        };
        keys.public_key.copy_from_slice(&public_key);
        Ok(keys)
    }
}

pub fn encrypt(
    payload: &[u8],
    subscription: &PushSubscription,
) -> Result<EncryptedPayload, CryptoError> {
    let keys = SubscriberKeys::from_subscription(subscription)?;
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    encrypt_with(payload, &keys, salt, &EphemeralKeyPair::generate())
}

/// Deterministic core of [`encrypt`]; salt and ephemeral key must never be reused.
pub fn encrypt_with(
    payload: &[u8],
    keys: &SubscriberKeys,
    salt: [u8; SALT_LEN],
    ephemeral: &EphemeralKeyPair,
) -> Result<EncryptedPayload, CryptoError> {
    if payload.len() > MAX_PLAINTEXT_LEN {
        return Err(CryptoError::PayloadTooLarge {
            size: payload.len(),
            limit: MAX_PLAINTEXT_LEN,
        });
    }

    let shared_secret = derive::derive_shared_secret(ephemeral.secret(), &keys.public_key)?;
    let content_keys = derive::derive_content_keys(
        &shared_secret,
        &keys.auth,
        &keys.public_key,
        ephemeral.public_key(),
        &salt,
    )?;

    let mut record = Vec::with_capacity(payload.len() + 1);
    record.extend_from_slice(payload);
    record.push(LAST_RECORD_DELIMITER);

    let cipher = Aes128Gcm::new((&content_keys.cek).into());
    let ciphertext = cipher
        .encrypt((&content_keys.nonce).into(), record.as_slice())
        .map_err(|_| CryptoError::Aead)?;

    Ok(EncryptedPayload {
        ciphertext,
        salt,
        local_public_key: *ephemeral.public_key(),
    })
}
