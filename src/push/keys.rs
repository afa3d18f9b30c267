use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use super::CryptoError;

pub const PUBLIC_KEY_LEN: usize = 65;
const UNCOMPRESSED_TAG: u8 = 0x04;

/// Sender-side key pair that lives for exactly one message.
pub struct EphemeralKeyPair {
    secret: SecretKey,
    public_key: [u8; PUBLIC_KEY_LEN],
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public_key = uncompressed_point(&secret.public_key());
        Self { secret, public_key }
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public_key", &crate::codec::encode_base64_url(&self.public_key))
            .finish_non_exhaustive()
    }
}

pub(crate) fn uncompressed_point(public_key: &PublicKey) -> [u8; PUBLIC_KEY_LEN] {
    let point = public_key.to_encoded_point(false);
    let mut bytes = [0u8; PUBLIC_KEY_LEN];
    bytes.copy_from_slice(point.as_bytes());
    bytes
}

/// Parses a 65-byte uncompressed SEC1 point; compressed or truncated input is rejected.
pub(crate) fn parse_public_key(
    field: &'static str,
    bytes: &[u8],
) -> Result<PublicKey, CryptoError> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(CryptoError::KeyLength {
            field,
            expected: PUBLIC_KEY_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[0] != UNCOMPRESSED_TAG {
        return Err(CryptoError::InvalidPoint(field));
    }
    PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPoint(field))
}
