//! Application key store: fetch-on-demand, cache, invalidate.
//!
//! The key is served by the config endpoint as a regular admin config
//! entry tagged `application_key`, pre-decrypted by the server. This fetch
//! deliberately goes around the encrypting pipeline (the key cannot
//! decrypt its own delivery) as a plain authenticated GET with a direct
//! `BusinessEnvelope` unwrap.
//!
//! `get` never raises: every failure mode (network, missing entry, wrong
//! length) degrades to `None`, and the pipeline falls back to plaintext.
//! Concurrent callers that all observe an empty cache share one underlying
//! fetch: the async gate serializes them and each waiter re-checks the
//! cache before fetching.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::configs::ConfigEntry;
use crate::constants::{API_BASE_PATH, APP_KEY_CONFIG_TYPE};
use crate::credentials::CredentialStore;
use crate::crypto::AppKey;

use super::envelope::BusinessEnvelope;

/// Owns the cached application key and its refresh protocol.
pub struct KeyStore {
    http: reqwest::Client,
    base_url: String,
    store: Arc<CredentialStore>,
    /// Serializes fetches so overlapping requests trigger one network call.
    fetch_gate: Mutex<()>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("base_url", &self.base_url)
            .field("cached", &self.store.app_key().is_some())
            .finish()
    }
}

impl KeyStore {
    /// Build a key store sharing the pipeline's HTTP client and credential
    /// store.
    pub fn new(http: reqwest::Client, base_url: String, store: Arc<CredentialStore>) -> Self {
        Self {
            http,
            base_url,
            store,
            fetch_gate: Mutex::new(()),
        }
    }

    /// Return the application key, fetching it when the cache is empty.
    ///
    /// `force_refresh` evicts the cache first. Returns `None` on any
    /// failure; never raises.
    pub async fn get(&self, force_refresh: bool) -> Option<AppKey> {
        if force_refresh {
            self.store.clear_app_key();
        } else if let Some(key) = self.store.app_key() {
            return Some(key);
        }

        let _gate = self.fetch_gate.lock().await;
        // Another caller may have completed the fetch while we waited.
        if let Some(key) = self.store.app_key() {
            return Some(key);
        }
        self.fetch().await
    }

    /// Drop the cached key without fetching a replacement.
    pub fn invalidate(&self) {
        self.store.clear_app_key();
    }

    async fn fetch(&self) -> Option<AppKey> {
        let url = format!("{}{}/admin/configs", self.base_url, API_BASE_PATH);
        let mut request = self
            .http
            .get(&url)
            .query(&[("config_type", APP_KEY_CONFIG_TYPE)])
            .header("X-Request-ID", super::request_id());
        if let Some(token) = self.store.token() {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Application key fetch failed: {e}");
                return None;
            }
        };
        if !response.status().is_success() {
            log::warn!("Application key fetch returned HTTP {}", response.status());
            return None;
        }

        let envelope: BusinessEnvelope = match response.json().await {
            Ok(env) => env,
            Err(e) => {
                log::warn!("Application key response unparseable: {e}");
                return None;
            }
        };
        if envelope.code != 0 {
            log::warn!("Application key fetch rejected (code {})", envelope.code);
            return None;
        }

        let entries: Vec<ConfigEntry> = match serde_json::from_value(envelope.data) {
            Ok(list) => list,
            Err(e) => {
                log::warn!("Application key config list unparseable: {e}");
                return None;
            }
        };
        if entries.len() != 1 {
            log::warn!(
                "Expected exactly one application_key config entry, got {}",
                entries.len()
            );
            return None;
        }

        let material = &entries[0].config_value;
        match AppKey::from_str_material(material) {
            Some(key) => {
                self.store.set_app_key(material);
                Some(key)
            }
            None => {
                log::warn!(
                    "Application key has invalid length ({} bytes), discarding",
                    material.len()
                );
                None
            }
        }
    }
}
