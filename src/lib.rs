//! blogctl - admin client for the blog platform.
//!
//! This crate provides the secure transport and realtime-update core the
//! admin surfaces are built on, plus thin wrappers over the REST routes.
//!
//! # Architecture
//!
//! - **Transport** - encrypting request/response pipeline over one HTTP
//!   client; consumers see business data or typed errors, never envelopes
//! - **KeyStore** - fetches and caches the shared application key
//! - **Realtime** - reconnecting WebSocket channel reconciling crawler
//!   task updates into an observer-readable list
//! - **Api** - 1:1 endpoint wrappers (auth, configs, tasks, telemetry)
//!
//! # Modules
//!
//! - [`transport`] - request pipeline, envelope codec glue, key store
//! - [`realtime`] - connection state machine, socket driver, task records
//! - [`api`] - endpoint wrappers
//! - [`crypto`] - AES-256-GCM primitives and the `AppKey` type
//! - [`credentials`] - keyring-backed token/key persistence

// Library modules
pub mod api;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod realtime;
pub mod transport;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use credentials::CredentialStore;
pub use crypto::AppKey;
pub use error::ApiError;
pub use realtime::{ConnectionState, TaskChannel, TaskList, TaskRecord};
pub use transport::{ApiClient, KeyStore, Notifier};
