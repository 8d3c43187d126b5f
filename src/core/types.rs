//! # Core Data Types
//!
//! The response envelope is the unit that travels between the origin fetcher,
//! the cache and the response writer. It is built once, either from a fully
//! buffered origin response or from a decoded cache entry, and never mutated
//! afterwards.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Buffered HTTP response as stored in and served from the cache
///
/// The serialized field names (`ContentType`, `Body`, `StatusCode`) and the
/// base64 body encoding match the entries written by the previous proxy
/// deployment, so an existing cache can be reused without a flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEnvelope {
    content_type: String,

    #[serde(serialize_with = "serialize_body", deserialize_with = "deserialize_body")]
    body: Bytes,

    status_code: u16,
}

impl ResponseEnvelope {
    /// Create a new envelope
    pub fn new(status_code: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
            status_code,
        }
    }

    /// HTTP status code of the response
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Origin `Content-Type`; empty when the origin sent none
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the status code lies in the valid HTTP range
    pub fn has_valid_status(&self) -> bool {
        (100..=599).contains(&self.status_code)
    }

    /// Consume the envelope, returning its parts
    pub fn into_parts(self) -> (u16, String, Bytes) {
        (self.status_code, self.content_type, self.body)
    }
}

fn serialize_body<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(body))
}

fn deserialize_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let envelope = ResponseEnvelope::new(200, "text/plain", &b"hi"[..]);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["ContentType"], "text/plain");
        assert_eq!(json["Body"], "aGk=");
        assert_eq!(json["StatusCode"], 200);
    }

    #[test]
    fn test_binary_body_survives_serialization() {
        let body: Vec<u8> = (0..=255u8).chain([0, 0, 255, 10, 13]).collect();
        let envelope = ResponseEnvelope::new(200, "application/octet-stream", body.clone());

        let encoded = serde_json::to_vec(&envelope).unwrap();
        let decoded: ResponseEnvelope = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(decoded.body().as_ref(), body.as_slice());
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_empty_fields_round_trip() {
        let envelope = ResponseEnvelope::new(204, "", Bytes::new());
        let encoded = serde_json::to_vec(&envelope).unwrap();
        let decoded: ResponseEnvelope = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(decoded.content_type(), "");
        assert!(decoded.body().is_empty());
        assert_eq!(decoded.status_code(), 204);
    }

    #[test]
    fn test_status_range() {
        assert!(ResponseEnvelope::new(100, "", Bytes::new()).has_valid_status());
        assert!(ResponseEnvelope::new(599, "", Bytes::new()).has_valid_status());
        assert!(!ResponseEnvelope::new(99, "", Bytes::new()).has_valid_status());
        assert!(!ResponseEnvelope::new(600, "", Bytes::new()).has_valid_status());
    }

    #[test]
    fn test_legacy_entry_decodes() {
        let legacy = br#"{"ContentType":"image/png","Body":"AAEC","StatusCode":200}"#;
        let decoded: ResponseEnvelope = serde_json::from_slice(legacy).unwrap();

        assert_eq!(decoded.content_type(), "image/png");
        assert_eq!(decoded.body().as_ref(), &[0u8, 1, 2]);
    }
}
