//! Image reference helpers.
//!
//! The backend returns images either as bare base64 or as a complete
//! `data:` URL. Renderers need the latter, and files on disk need the
//! raw bytes.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CoreError;

/// Scheme that marks a value as a self-describing embeddable reference.
pub const DATA_URL_SCHEME: &str = "data:";

/// Prefix applied to bare base64 payloads.
pub const DEFAULT_IMAGE_PREFIX: &str = "data:image/png;base64,";

/// Turn a preview payload into a displayable image reference.
///
/// Values that already carry the `data:` scheme are returned as-is, so
/// applying this twice is the same as applying it once.
pub fn normalize_image_ref(value: &str) -> Cow<'_, str> {
    if value.starts_with(DATA_URL_SCHEME) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("{DEFAULT_IMAGE_PREFIX}{value}"))
    }
}

/// Base64-encode raw image bytes for a job payload.
pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a bare base64 payload or a `data:` URL into raw bytes.
pub fn decode_image_ref(value: &str) -> Result<Vec<u8>, CoreError> {
    let payload = if value.starts_with(DATA_URL_SCHEME) {
        value
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| CoreError::Decode("data URL has no payload".to_string()))?
    } else {
        value
    };

    if payload.is_empty() {
        return Err(CoreError::Decode("image payload is empty".to_string()));
    }

    STANDARD
        .decode(payload.trim())
        .map_err(|e| CoreError::Decode(format!("invalid base64 image: {e}")))
}
