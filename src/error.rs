//! Typed errors for the API transport pipeline.
//!
//! Every failure a caller can observe from [`crate::transport::ApiClient`]
//! is one of these variants. Encryption failures never reach callers (the
//! pipeline falls back to plaintext); they exist here so the codec can
//! report them internally with the same type.

/// Errors produced by the request/response pipeline.
#[derive(Debug)]
pub enum ApiError {
    /// Encrypting an outbound body failed. Recovered internally by sending
    /// the plaintext body; callers never see this variant from a request.
    Encryption(String),
    /// AEAD authentication failed while decrypting a response envelope.
    Decryption(String),
    /// No application key could be obtained, even after a forced refresh.
    KeyUnavailable,
    /// A response carried the encrypted-data marker but the envelope was
    /// undecodable (bad base64, truncated payload, non-JSON plaintext).
    MalformedEnvelope(String),
    /// The decrypted (or plain) payload was not a JSON object.
    InvalidResponseShape,
    /// The server answered with a non-zero business code.
    Business {
        /// Application-level failure code (zero is success and never stored here).
        code: i64,
        /// Server-provided failure message.
        message: String,
    },
    /// The server answered with a non-success HTTP status.
    Status {
        /// HTTP status code.
        status: u16,
        /// Message surfaced to the caller.
        message: String,
    },
    /// The request produced no response at all (DNS, connect, timeout).
    Network(String),
}

impl ApiError {
    /// Human-readable message suitable for surfacing to a user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Business { message, .. } | Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encryption(msg) => write!(f, "encryption failed: {msg}"),
            Self::Decryption(msg) => write!(f, "decryption failed: {msg}"),
            Self::KeyUnavailable => write!(f, "application key unavailable"),
            Self::MalformedEnvelope(msg) => write!(f, "malformed response envelope: {msg}"),
            Self::InvalidResponseShape => write!(f, "response payload is not an object"),
            Self::Business { code, message } => write!(f, "server rejected request (code {code}): {message}"),
            Self::Status { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}
