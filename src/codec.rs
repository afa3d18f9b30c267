use base64::{STANDARD, URL_SAFE_NO_PAD, decode_config, encode_config};

#[derive(Debug, thiserror::Error)]
#[error("invalid base64url input: {0}")]
pub struct CodecError(#[from] base64::DecodeError);

/// Decodes base64url text, tolerating padding and the standard alphabet.
pub fn decode_base64_url(input: &str) -> Result<Vec<u8>, CodecError> {
    let mut normalized: String = input
        .trim()
        .chars()
        .map(|ch| match ch {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    Ok(decode_config(&normalized, STANDARD)?)
}

pub fn encode_base64_url(bytes: &[u8]) -> String {
    encode_config(bytes, URL_SAFE_NO_PAD)
}
