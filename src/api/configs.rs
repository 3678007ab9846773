//! Admin config entries.
//!
//! The config listing doubles as the delivery channel for the application
//! key (entries tagged `application_key`, value pre-decrypted by the
//! server); [`crate::transport::KeyStore`] consumes the same shape through
//! its own plaintext fetch.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::transport::ApiClient;

/// One system config entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub config_key: String,
    /// Entry value; decrypted server-side when `is_encrypted` is set.
    pub config_value: String,
    #[serde(default)]
    pub config_type: String,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub description: String,
}

/// List config entries, optionally filtered by type tag.
pub async fn list(
    client: &ApiClient,
    config_type: Option<&str>,
) -> Result<Vec<ConfigEntry>, ApiError> {
    match config_type {
        Some(tag) => {
            client
                .get_with_query("/admin/configs", &[("config_type", tag)])
                .await
        }
        None => client.get("/admin/configs").await,
    }
}

/// Fetch one config entry by id.
pub async fn get(client: &ApiClient, id: u64) -> Result<ConfigEntry, ApiError> {
    client.get(&format!("/admin/configs/{id}")).await
}
