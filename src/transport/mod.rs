//! Secure transport pipeline for the admin API.
//!
//! # Architecture
//!
//! ```text
//! ApiClient (client.rs)
//!     ├── envelope.rs    wire shapes, classification, span recovery
//!     ├── key_store.rs   application key: cache / fetch / invalidate
//!     └── Notifier       user-facing failure surface (injected)
//! ```
//!
//! Consumers only ever observe business `data` values or [`crate::error::ApiError`];
//! the request/response envelope shapes never leak upward.

pub mod client;
pub mod envelope;
pub mod key_store;

use rand::Rng;

/// Collaborator that surfaces failures to the user.
///
/// The web original pushed toast messages; the CLI default logs. Embedders
/// inject their own implementation via [`ApiClient::with_notifier`].
pub trait Notifier: Send + Sync {
    /// Show a failure message to the user.
    fn error(&self, message: &str);

    /// The session is no longer valid (HTTP 401): credentials were cleared
    /// and the user must authenticate again.
    fn session_expired(&self) {}
}

/// Default notifier: routes messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error(&self, message: &str) {
        log::error!("{message}");
    }

    fn session_expired(&self) {
        log::warn!("Session expired, please log in again");
    }
}

/// Fresh request correlation id: `<millis>-<7 random alphanumerics>`.
pub(crate) fn request_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(7)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), suffix)
}

// Re-exports
pub use client::ApiClient;
pub use envelope::{BusinessEnvelope, RequestEnvelope, ResponseBody};
pub use key_store::KeyStore;
