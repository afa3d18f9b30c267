//! RFC 8291 key schedule: ECDH, then HKDF-SHA256 down to a content key and nonce.

use hkdf::Hkdf;
use p256::SecretKey;
use sha2::Sha256;

use super::CryptoError;
use super::keys::{PUBLIC_KEY_LEN, parse_public_key};

pub const AUTH_SECRET_LEN: usize = 16;
pub const SALT_LEN: usize = 16;
pub const CEK_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
const PRK_LEN: usize = 32;

const KEY_INFO_LABEL: &str = "WebPush: info";
const CEK_INFO_LABEL: &str = "Content-Encoding: aes128gcm";
const NONCE_INFO_LABEL: &str = "Content-Encoding: nonce";

pub struct ContentKeys {
    pub cek: [u8; CEK_LEN],
    pub nonce: [u8; NONCE_LEN],
}

/// X coordinate of `local * remote`.
pub fn derive_shared_secret(
    local: &SecretKey,
    remote_public_key: &[u8],
) -> Result<[u8; 32], CryptoError> {
    let remote = parse_public_key("p256dh", remote_public_key)?;
    let shared = p256::ecdh::diffie_hellman(local.to_nonzero_scalar(), remote.as_affine());
    let mut secret = [0u8; 32];
    secret.copy_from_slice(shared.raw_secret_bytes());
    Ok(secret)
}

pub fn hkdf(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::Hkdf(len))?;
    Ok(okm)
}

/// `label || 0x00 || context`
pub fn build_context_info(label: &str, context: &[u8]) -> Vec<u8> {
    let mut info = Vec::with_capacity(label.len() + 1 + context.len());
    info.extend_from_slice(label.as_bytes());
    info.push(0);
    info.extend_from_slice(context);
    info
}

pub fn derive_content_keys(
    shared_secret: &[u8; 32],
    auth_secret: &[u8; AUTH_SECRET_LEN],
    ua_public_key: &[u8; PUBLIC_KEY_LEN],
    as_public_key: &[u8; PUBLIC_KEY_LEN],
    salt: &[u8; SALT_LEN],
) -> Result<ContentKeys, CryptoError> {
    let mut key_context = Vec::with_capacity(PUBLIC_KEY_LEN * 2);
    key_context.extend_from_slice(ua_public_key);
    key_context.extend_from_slice(as_public_key);
    let key_info = build_context_info(KEY_INFO_LABEL, &key_context);
    let prk = hkdf(auth_secret, shared_secret, &key_info, PRK_LEN)?;

    let cek = hkdf(salt, &prk, &build_context_info(CEK_INFO_LABEL, &[]), CEK_LEN)?;
    let nonce = hkdf(salt, &prk, &build_context_info(NONCE_INFO_LABEL, &[]), NONCE_LEN)?;

    let mut keys = ContentKeys {
        cek: [0u8; CEK_LEN],
        nonce: [0u8; NONCE_LEN],
    };
    keys.cek.copy_from_slice(&cek);
    keys.nonce.copy_from_slice(&nonce);
    Ok(keys)
}
