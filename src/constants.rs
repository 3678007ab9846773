//! Application-wide constants for blogctl.
//!
//! This module centralizes magic numbers and protocol constants so they are
//! discoverable in one place. Constants are grouped by domain.
//!
//! # Categories
//!
//! - **Timeouts**: network timeouts
//! - **Realtime**: heartbeat and reconnection backoff tuning
//! - **Wire format**: envelope and key sizes shared with the server

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for API calls.
///
/// Applies to every individual request, including the key fetch. 30 seconds
/// matches the server's own handler budget.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Realtime channel
// ============================================================================

/// Interval between outbound ping messages while connected.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Initial delay before a reconnection attempt (backoff floor).
pub const RECONNECT_DELAY_FLOOR_MS: u64 = 3_000;

/// Maximum delay between reconnection attempts (backoff ceiling).
///
/// The delay doubles on every scheduled retry and saturates here. There is
/// no attempt cap: retries continue while reconnection is enabled and the
/// client is visible.
pub const RECONNECT_DELAY_CEILING_MS: u64 = 30_000;

/// Path of the realtime task-update endpoint, relative to the server host.
pub const REALTIME_TASKS_PATH: &str = "/ws/crawler/tasks";

// ============================================================================
// Wire format
// ============================================================================

/// Base path prefix for every REST endpoint.
pub const API_BASE_PATH: &str = "/api/v1";

/// AES-256 key length in bytes. The server delivers the application key as
/// exactly this many characters; anything else is treated as absent.
pub const APP_KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes (96 bits, GCM standard).
pub const NONCE_LEN: usize = 12;

/// Paths that must never be encrypted.
///
/// These endpoints are either used before a key can exist (login, token
/// refresh) or are public write paths the server accepts in plaintext
/// (fingerprint submission, visit recording). Matching is by substring, the
/// same rule the server's encryption middleware applies.
pub const ENCRYPTION_BYPASS_PATHS: &[&str] = &[
    "/auth/login",
    "/auth/refresh",
    "/fingerprint",
    "/visit",
];

/// Config entry type tag identifying the application key.
pub const APP_KEY_CONFIG_TYPE: &str = "application_key";
