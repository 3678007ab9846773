//! Encrypting API client for the admin REST surface.
//!
//! Every request funnels through one pipeline:
//!
//! ```text
//! request:  bearer + request-id → eligibility check → encrypt body (best effort)
//! response: status mapping → span recovery → envelope detection → decrypt
//!           → business unwrap → data
//! ```
//!
//! Encryption is best-effort by design: a request is never blocked on
//! crypto. An absent key or a failed encryption sends the plaintext body
//! and logs. The response path is strict: a confirmed encrypted envelope
//! that cannot be decrypted is an error, after one forced key refresh.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::Config;
use crate::constants::{API_BASE_PATH, ENCRYPTION_BYPASS_PATHS, HTTP_REQUEST_TIMEOUT};
use crate::credentials::CredentialStore;
use crate::crypto;
use crate::error::ApiError;

use super::envelope::{self, RequestEnvelope, ResponseBody};
use super::key_store::KeyStore;
use super::{request_id, LogNotifier, Notifier};

/// Fallback messages surfaced when the server gives nothing better.
const MSG_UNAUTHORIZED: &str = "Unauthorized, please log in again";
const MSG_FORBIDDEN: &str = "Access denied";
const MSG_NOT_FOUND: &str = "Requested resource does not exist";
const MSG_SERVER_ERROR: &str = "Server error";
const MSG_REQUEST_FAILED: &str = "Request failed";
const MSG_NETWORK: &str = "Network error, please check your connection";

/// API client for the blog admin server.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<CredentialStore>,
    keys: KeyStore,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a client with the default (logging) notifier.
    pub fn new(config: &Config, store: Arc<CredentialStore>) -> anyhow::Result<Self> {
        Self::with_notifier(config, store, Arc::new(LogNotifier))
    }

    /// Creates a client with an explicit notification collaborator.
    pub fn with_notifier(
        config: &Config,
        store: Arc<CredentialStore>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()?;
        let base_url = config.server_url.trim_end_matches('/').to_string();
        let keys = KeyStore::new(http.clone(), base_url.clone(), Arc::clone(&store));

        Ok(Self {
            http,
            base_url,
            store,
            keys,
            notifier,
        })
    }

    /// The credential store backing this client.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// The key store backing this client (exposed for explicit
    /// invalidation on logout).
    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    /// GET `path`, resolving the business `data` into `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let value = self.request(Method::GET, path, None, None).await?;
        Self::into_typed(value)
    }

    /// GET `path` with query parameters.
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let value = self.request(Method::GET, path, Some(query), None).await?;
        Self::into_typed(value)
    }

    /// POST `body` to `path`.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).expect("request body serializable");
        let value = self.request(Method::POST, path, None, Some(body)).await?;
        Self::into_typed(value)
    }

    /// PUT `body` to `path`.
    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).expect("request body serializable");
        let value = self.request(Method::PUT, path, None, Some(body)).await?;
        Self::into_typed(value)
    }

    /// PATCH `body` to `path`.
    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).expect("request body serializable");
        let value = self.request(Method::PATCH, path, None, Some(body)).await?;
        Self::into_typed(value)
    }

    /// DELETE `path`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let value = self.request(Method::DELETE, path, None, None).await?;
        Self::into_typed(value)
    }

    fn into_typed<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
        serde_json::from_value(value).map_err(|e| {
            log::warn!("Response data did not match the expected shape: {e}");
            ApiError::InvalidResponseShape
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let result = self.request_inner(method, path, query, body).await;

        if let Err(err) = &result {
            match err {
                ApiError::Business { message, .. } => {
                    let surfaced = if message.is_empty() { MSG_REQUEST_FAILED } else { message };
                    self.notifier.error(surfaced);
                }
                ApiError::Status { message, .. } => self.notifier.error(message),
                ApiError::Network(_) => self.notifier.error(MSG_NETWORK),
                _ => {}
            }
        }

        result
    }

    async fn request_inner(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}{}", self.base_url, API_BASE_PATH, path);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header("X-Request-ID", request_id());

        if let Some(token) = self.store.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(query) = query {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            let outbound = self.prepare_body(&method, path, body).await;
            builder = builder.json(&outbound);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        self.process_response(response).await
    }

    /// Encrypt an eligible outbound body, falling back to plaintext on any
    /// crypto problem.
    async fn prepare_body(&self, method: &Method, path: &str, body: Value) -> Value {
        if !encryption_eligible(method, path) {
            return body;
        }

        let Some(key) = self.keys.get(false).await else {
            log::debug!("No application key available, sending plaintext body to {path}");
            return body;
        };

        let plaintext = body.to_string();
        match crypto::encrypt(&key, plaintext.as_bytes()) {
            Ok(encrypted_data) => {
                let envelope = RequestEnvelope {
                    encrypted_data,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                };
                serde_json::to_value(envelope).expect("envelope serializable")
            }
            Err(e) => {
                log::warn!("Body encryption failed, sending plaintext to {path}: {e}");
                body
            }
        }
    }

    async fn process_response(&self, response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();

        if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
            return Ok(Value::Null);
        }
        if !status.is_success() {
            return Err(self.status_error(status, response).await);
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let payload = match envelope::classify_text(&text)? {
            ResponseBody::Plain(value) => value,
            ResponseBody::Encrypted(ciphertext) => self.decrypt_response(&ciphertext).await?,
        };

        envelope::unwrap_business(payload)
    }

    /// Decrypt a confirmed response envelope, refreshing the key once if
    /// the cache is empty or stale.
    async fn decrypt_response(&self, ciphertext: &str) -> Result<Value, ApiError> {
        let key = match self.keys.get(false).await {
            Some(key) => key,
            None => match self.keys.get(true).await {
                Some(key) => key,
                None => return Err(ApiError::KeyUnavailable),
            },
        };

        let plaintext = crypto::decrypt(&key, ciphertext)?;
        let text = String::from_utf8(plaintext)
            .map_err(|e| ApiError::MalformedEnvelope(format!("decrypted payload is not UTF-8: {e}")))?;
        envelope::parse_decrypted(&text)
    }

    /// Map a non-success HTTP status to the error taxonomy.
    ///
    /// A 401 also clears the stored token and fires the session-expired
    /// hook, regardless of whether the caller handles the rejection.
    async fn status_error(&self, status: StatusCode, response: reqwest::Response) -> ApiError {
        let server_message = response.text().await.ok().and_then(|text| {
            let body = envelope::classify_text(&text).ok()?;
            match body {
                ResponseBody::Plain(value) => value
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                ResponseBody::Encrypted(_) => None,
            }
        });

        let message = match status.as_u16() {
            401 => {
                log::info!("Received 401, clearing stored token");
                self.store.clear_token();
                self.notifier.session_expired();
                MSG_UNAUTHORIZED.to_string()
            }
            403 => MSG_FORBIDDEN.to_string(),
            404 => MSG_NOT_FOUND.to_string(),
            500 => MSG_SERVER_ERROR.to_string(),
            _ => server_message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| MSG_REQUEST_FAILED.to_string()),
        };

        ApiError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

/// A body is encrypted only for mutating methods on non-bypass paths.
///
/// The bypass paths stay plaintext because they are used before a key can
/// exist (login, refresh) or are public submission endpoints the server
/// reads in plaintext (fingerprint, visit).
fn encryption_eligible(method: &Method, path: &str) -> bool {
    let mutating = *method == Method::POST || *method == Method::PUT || *method == Method::PATCH;
    mutating && !ENCRYPTION_BYPASS_PATHS.iter().any(|p| path.contains(p))
}
