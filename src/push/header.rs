use super::derive::SALT_LEN;
use super::keys::PUBLIC_KEY_LEN;

/// Advertised record size. Only one record is ever written.
pub const RECORD_SIZE: u32 = 4096;
pub const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;

/// RFC 8188 header: `salt || rs (u32 BE) || idlen || keyid`.
pub fn build_header(
    salt: &[u8; SALT_LEN],
    server_public_key: &[u8; PUBLIC_KEY_LEN],
) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..SALT_LEN].copy_from_slice(salt);
    header[SALT_LEN..SALT_LEN + 4].copy_from_slice(&RECORD_SIZE.to_be_bytes());
    header[SALT_LEN + 4] = PUBLIC_KEY_LEN as u8;
    header[SALT_LEN + 5..].copy_from_slice(server_public_key);
    header
}
