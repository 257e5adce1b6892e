//! Payload decoding for analyzers.
//!
//! Maps raw response text onto a typed value. The target type is the schema
//! hint; `serde` attributes on the target carry field naming and date format
//! conventions.

use serde::de::DeserializeOwned;

const PREVIEW_CHARS: usize = 64;

/// Errors produced while decoding a payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,
    #[error("payload is not JSON: {preview}")]
    NotJson { preview: String },
    #[error("payload does not match {target}: {source}")]
    Mismatch {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Whether `raw` starts like a JSON object or array.
#[must_use]
pub fn looks_like_json(raw: &str) -> bool {
    let trimmed = raw.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Decodes a JSON payload into `T`.
///
/// # Errors
///
/// - [`DecodeError::Empty`] for blank payloads
/// - [`DecodeError::NotJson`] when the payload is not an object or array
/// - [`DecodeError::Mismatch`] when the JSON does not fit `T`
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::Empty);
    }
    if !looks_like_json(raw) {
        let preview: String = raw.chars().take(PREVIEW_CHARS).collect();
        tracing::warn!(%preview, "refusing to decode non-JSON payload");
        return Err(DecodeError::NotJson { preview });
    }
    serde_json::from_str(raw).map_err(|source| DecodeError::Mismatch {
        target: std::any::type_name::<T>(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Item {
        id: String,
    }

    #[test]
    fn decodes_matching_object() {
        let item: Item = decode(r#"{"id":"1"}"#).unwrap();
        assert_eq!(item, Item { id: "1".to_string() });
    }

    #[test]
    fn decodes_arrays() {
        let items: Vec<Item> = decode(r#" [{"id":"1"},{"id":"2"}]"#).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn blank_payload_is_empty_error() {
        assert!(matches!(decode::<Item>("  "), Err(DecodeError::Empty)));
    }

    #[test]
    fn html_payload_is_not_json() {
        let err = decode::<Item>("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, DecodeError::NotJson { .. }));
    }

    #[test]
    fn missing_field_is_mismatch() {
        let err = decode::<Item>(r#"{"name":"S3"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Mismatch { .. }));
    }
}
