//! Opaque page tokens. A token is an encoded decimal offset, never a cache cursor.

use base64::{engine::general_purpose, Engine as _};

use crate::errors::FormError;

pub fn encode_token(offset: usize) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(offset.to_string())
}

/// Decodes a token into a row offset. No token (or an empty one) means offset 0.
pub fn decode_token(token: Option<&str>) -> Result<usize, FormError> {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(0);
    };
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| FormError::InvalidPageToken(format!("{token}: {e}")))?;
    String::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| FormError::InvalidPageToken(token.to_string()))
}
