//! AES-256-GCM body encryption primitives.
//!
//! Implements the wire format shared with the server's encryption
//! middleware: a single base64 string containing the 12-byte nonce followed
//! by the ciphertext and its 128-bit authentication tag.
//!
//! ```text
//! base64( nonce[12] ‖ ciphertext ‖ tag[16] )
//! ```
//!
//! Both operations are pure with respect to the key: obtaining the key is
//! the [`crate::transport::KeyStore`]'s job, and may involve a network
//! round trip; nothing here does I/O.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{APP_KEY_LEN, NONCE_LEN};
use crate::error::ApiError;

/// The shared application key: exactly 32 bytes of AES-256 key material.
///
/// Construction validates length, so a held `AppKey` is always usable.
/// Key material is wiped on drop and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AppKey([u8; APP_KEY_LEN]);

impl AppKey {
    /// Build a key from raw bytes, rejecting anything that is not exactly
    /// 32 bytes. The server delivers the key as a 32-character string; its
    /// UTF-8 bytes are the key material.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; APP_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Build a key from the string form the config endpoint returns.
    pub fn from_str_material(s: &str) -> Option<Self> {
        Self::from_bytes(s.as_bytes())
    }

    /// Raw key bytes for the cipher.
    pub fn as_bytes(&self) -> &[u8; APP_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for AppKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material, even in debug logs.
        write!(f, "AppKey(..)")
    }
}

/// Encrypt plaintext under the application key with a fresh random nonce.
///
/// Returns the base64 envelope payload. Each call generates a new nonce, so
/// encrypting identical plaintext twice never yields identical output.
pub fn encrypt(key: &AppKey, plaintext: &[u8]) -> Result<String, ApiError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).expect("valid key length");

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| ApiError::Encryption(e.to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(combined))
}

/// Decrypt a base64 envelope payload produced by [`encrypt`] (or by the
/// server's response middleware, which uses the same format).
///
/// Fails with [`ApiError::MalformedEnvelope`] when the payload cannot even
/// be split into nonce and ciphertext, and [`ApiError::Decryption`] when
/// AEAD authentication rejects it.
pub fn decrypt(key: &AppKey, payload_b64: &str) -> Result<Vec<u8>, ApiError> {
    let combined = BASE64
        .decode(payload_b64)
        .map_err(|e| ApiError::MalformedEnvelope(format!("invalid base64: {e}")))?;

    if combined.len() < NONCE_LEN {
        return Err(ApiError::MalformedEnvelope(format!(
            "payload too short: {} bytes",
            combined.len()
        )));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).expect("valid key length");
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| ApiError::Decryption(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> AppKey {
        AppKey::from_bytes(&[42u8; 32]).expect("32 bytes")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = br#"{"title":"hello","status":"draft"}"#;

        let envelope = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &envelope).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_nonce_is_fresh_per_encryption() {
        let key = test_key();
        let a = encrypt(&key, b"same plaintext").unwrap();
        let b = encrypt(&key, b"same plaintext").unwrap();
        assert_ne!(a, b, "two encryptions must never produce identical envelopes");
    }

    #[test]
    fn test_tampered_payload_fails_authentication() {
        let key = test_key();
        let envelope = encrypt(&key, b"integrity matters").unwrap();

        let mut raw = BASE64.decode(&envelope).unwrap();
        // Flip a single bit inside ciphertext‖tag.
        let mid = NONCE_LEN + (raw.len() - NONCE_LEN) / 2;
        raw[mid] ^= 0x01;
        let tampered = BASE64.encode(raw);

        match decrypt(&key, &tampered) {
            Err(ApiError::Decryption(_)) => {}
            other => panic!("expected Decryption error, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = test_key();
        let wrong = AppKey::from_bytes(&[7u8; 32]).unwrap();
        let envelope = encrypt(&key, b"secret").unwrap();
        assert!(decrypt(&wrong, &envelope).is_err());
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let key = test_key();
        let short = BASE64.encode([0u8; 5]);
        match decrypt(&key, &short) {
            Err(ApiError::MalformedEnvelope(_)) => {}
            other => panic!("expected MalformedEnvelope, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        let key = test_key();
        match decrypt(&key, "%%% not base64 %%%") {
            Err(ApiError::MalformedEnvelope(_)) => {}
            other => panic!("expected MalformedEnvelope, got {other:?}"),
        }
    }

    #[test]
    fn test_app_key_rejects_wrong_length() {
        assert!(AppKey::from_bytes(&[0u8; 31]).is_none());
        assert!(AppKey::from_bytes(&[0u8; 33]).is_none());
        assert!(AppKey::from_str_material("too short").is_none());
        assert!(AppKey::from_str_material("abcdefghijklmnopqrstuvwxyz123456").is_some());
    }

    #[test]
    fn test_debug_never_prints_key_material() {
        let key = AppKey::from_str_material("abcdefghijklmnopqrstuvwxyz123456").unwrap();
        let dbg = format!("{key:?}");
        assert_eq!(dbg, "AppKey(..)");
    }
}
