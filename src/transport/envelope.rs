//! Wire envelopes and response-body classification.
//!
//! Three JSON shapes cross the wire:
//!
//! ```text
//! RequestEnvelope   { "encrypted_data": "<base64>", "timestamp": <ms> }   outbound
//! ResponseEnvelope  { "encrypted_data": "<base64>", ... }                 inbound
//! BusinessEnvelope  { "code": 0, "message": "...", "data": ... }          inbound, innermost
//! ```
//!
//! [`classify_text`] is the total parse that decides whether an inbound
//! body is plain or encrypted. Upstream framing sometimes wraps the JSON in
//! stray bytes or double-encodes it as a string, so classification runs a
//! balanced-span recovery scan ([`extract_json_span`]) before strict
//! parsing; that leniency is confined to this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Field name marking an encrypted envelope.
const ENCRYPTED_MARKER: &str = "encrypted_data";

/// Outbound replacement body for an encrypted request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// base64(nonce ‖ ciphertext ‖ tag)
    pub encrypted_data: String,
    /// Client timestamp in milliseconds.
    pub timestamp: i64,
}

/// The innermost response wrapper every endpoint returns.
#[derive(Debug, Clone, Deserialize)]
pub struct BusinessEnvelope {
    /// Application result code; zero is the only success value.
    pub code: i64,
    /// Human-readable message, usually only set on failure.
    #[serde(default)]
    pub message: String,
    /// Payload; shape depends on the endpoint.
    #[serde(default)]
    pub data: Value,
}

/// An inbound body after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Ordinary JSON payload (normally a `BusinessEnvelope` object).
    Plain(Value),
    /// Confirmed encrypted envelope; the payload is the base64 ciphertext.
    Encrypted(String),
}

/// Find the first balanced top-level `{…}` or `[…]` span in `raw`.
///
/// Leading and trailing bytes outside the span are ignored. String
/// literals are honored so braces inside quoted values do not confuse the
/// depth count. Returns `None` when no balanced span exists.
pub fn extract_json_span(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let bytes = raw.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&raw[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse `raw` as JSON, falling back to the balanced-span scan when strict
/// parsing fails. Returns `None` when no JSON can be recovered.
fn recover_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let span = extract_json_span(raw)?;
    serde_json::from_str(span).ok()
}

/// Classify a raw response body as plain or encrypted.
///
/// A body is encrypted iff it is (or contains, see string recursion below)
/// an object whose `encrypted_data` field is a string. A present marker
/// with a missing or mistyped field is a hard [`ApiError::MalformedEnvelope`];
/// everything else is passed through as plain.
pub fn classify_text(raw: &str) -> Result<ResponseBody, ApiError> {
    match recover_json(raw) {
        Some(value) => classify_value(value),
        None => {
            if raw.contains(ENCRYPTED_MARKER) {
                Err(ApiError::MalformedEnvelope(
                    "encrypted_data marker present but body is not parseable JSON".to_string(),
                ))
            } else {
                // Not JSON at all; let the shape check downstream reject it.
                Ok(ResponseBody::Plain(Value::String(raw.to_string())))
            }
        }
    }
}

/// Classify an already-parsed JSON value.
///
/// A string value carrying the marker is unwrapped one level: some framing
/// paths deliver the envelope JSON-encoded inside a JSON string.
pub fn classify_value(value: Value) -> Result<ResponseBody, ApiError> {
    match value {
        Value::Object(map) => match map.get(ENCRYPTED_MARKER) {
            Some(Value::String(payload)) => Ok(ResponseBody::Encrypted(payload.clone())),
            Some(_) => Err(ApiError::MalformedEnvelope(
                "encrypted_data field is not a string".to_string(),
            )),
            None => Ok(ResponseBody::Plain(Value::Object(map))),
        },
        Value::String(inner) if inner.contains(ENCRYPTED_MARKER) => classify_text(&inner),
        other => Ok(ResponseBody::Plain(other)),
    }
}

/// Parse decrypted plaintext back into JSON, re-applying span recovery.
pub fn parse_decrypted(text: &str) -> Result<Value, ApiError> {
    if let Some(value) = recover_json(text) {
        return Ok(value);
    }
    let detail = match serde_json::from_str::<Value>(text.trim()) {
        Err(e) => e.to_string(),
        Ok(_) => "unrecoverable payload".to_string(),
    };
    Err(ApiError::MalformedEnvelope(format!(
        "decrypted payload is not JSON: {detail}"
    )))
}

/// Unwrap a `BusinessEnvelope`, resolving to its `data` on success.
///
/// The payload must be an object; anything else (including a non-object
/// that survived decryption) is [`ApiError::InvalidResponseShape`]. A
/// non-zero code becomes [`ApiError::Business`].
pub fn unwrap_business(value: Value) -> Result<Value, ApiError> {
    if !value.is_object() {
        return Err(ApiError::InvalidResponseShape);
    }
    let envelope: BusinessEnvelope =
        serde_json::from_value(value).map_err(|_| ApiError::InvalidResponseShape)?;

    if envelope.code == 0 {
        Ok(envelope.data)
    } else {
        Err(ApiError::Business {
            code: envelope.code,
            message: envelope.message,
        })
    }
}
