//! Consolidated credential storage.
//!
//! Holds the bearer token and the cached application key in a single OS
//! keyring entry (`blogctl/credentials`) containing a JSON blob, so a
//! rebuilt binary triggers at most one keychain prompt. In test mode the
//! blob lives in `credentials.json` under the config directory instead.
//!
//! Mutations persist immediately; reads come from an in-memory copy loaded
//! at open time. The store is the "persistent key-value store" behind both
//! the session token and the [`crate::crypto::AppKey`] cache, and is what a
//! logout (or a 401) wipes.

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::crypto::AppKey;

/// Keyring service name.
const KEYRING_SERVICE: &str = "blogctl";
/// Consolidated keyring entry name.
const KEYRING_CREDENTIALS: &str = "credentials";

/// Serialized credential blob.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Credentials {
    /// Bearer token for the admin API.
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,

    /// Cached application key material (32-character string, as delivered
    /// by the config endpoint). Validated on every read; a corrupt value is
    /// treated as absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    app_key: Option<String>,
}

/// Where the blob is persisted.
enum Backend {
    /// OS keyring (production).
    Keyring,
    /// Plain file with 0600 permissions (tests, sandboxed environments).
    File(PathBuf),
}

/// Credential store with an in-memory cache over a persistent backend.
pub struct CredentialStore {
    backend: Backend,
    cached: RwLock<Credentials>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let creds = self.cached.read().expect("credentials lock poisoned");
        f.debug_struct("CredentialStore")
            .field(
                "backend",
                &match self.backend {
                    Backend::Keyring => "keyring",
                    Backend::File(_) => "file",
                },
            )
            .field("has_token", &creds.token.is_some())
            .field("has_app_key", &creds.app_key.is_some())
            .finish()
    }
}

/// True when credentials must not touch the OS keyring.
fn use_file_backend() -> bool {
    if cfg!(test) {
        return true;
    }
    std::env::var("BLOGCTL_ENV").map(|v| v == "test").unwrap_or(false)
}

impl CredentialStore {
    /// Open the store, loading whatever is currently persisted.
    ///
    /// Missing or unreadable data degrades to empty credentials so the
    /// client can continue and re-authenticate.
    pub fn open() -> Result<Self> {
        let backend = if use_file_backend() {
            let path = crate::config::Config::config_dir()?.join("credentials.json");
            Backend::File(path)
        } else {
            Backend::Keyring
        };

        let cached = Self::load(&backend);
        Ok(Self {
            backend,
            cached: RwLock::new(cached),
        })
    }

    /// Open a store backed by an explicit file.
    ///
    /// Used by integration tests and sandboxed runs that need isolation
    /// from both the keyring and the shared config directory.
    pub fn with_file(path: PathBuf) -> Self {
        let backend = Backend::File(path);
        let cached = Self::load(&backend);
        Self {
            backend,
            cached: RwLock::new(cached),
        }
    }

    fn load(backend: &Backend) -> Credentials {
        let raw = match backend {
            Backend::Keyring => match Entry::new(KEYRING_SERVICE, KEYRING_CREDENTIALS) {
                Ok(entry) => match entry.get_password() {
                    Ok(json) => Some(json),
                    Err(keyring::Error::NoEntry) => None,
                    Err(e) => {
                        log::warn!("Keyring read failed, starting with empty credentials: {e:?}");
                        None
                    }
                },
                Err(e) => {
                    log::warn!("Keyring entry unavailable: {e:?}");
                    None
                }
            },
            Backend::File(path) => fs::read_to_string(path).ok(),
        };

        match raw {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Stored credentials corrupted, resetting: {e}");
                Credentials::default()
            }),
            None => Credentials::default(),
        }
    }

    fn persist(&self, creds: &Credentials) -> Result<()> {
        let json = serde_json::to_string(creds)?;
        match &self.backend {
            Backend::Keyring => {
                let entry = Entry::new(KEYRING_SERVICE, KEYRING_CREDENTIALS)
                    .map_err(|e| anyhow::anyhow!("Failed to create keyring entry: {e:?}"))?;
                entry
                    .set_password(&json)
                    .map_err(|e| anyhow::anyhow!("Failed to store credentials: {e:?}"))?;
            }
            Backend::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
                #[cfg(unix)]
                fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
            }
        }
        Ok(())
    }

    /// Apply a mutation and persist the result. Persistence failures are
    /// logged, not raised: the in-memory copy stays authoritative for the
    /// rest of the session.
    fn update(&self, mutate: impl FnOnce(&mut Credentials)) {
        let mut creds = self.cached.write().expect("credentials lock poisoned");
        mutate(&mut creds);
        if let Err(e) = self.persist(&creds) {
            log::warn!("Failed to persist credentials: {e}");
        }
    }

    /// Current bearer token, if any.
    pub fn token(&self) -> Option<String> {
        self.cached
            .read()
            .expect("credentials lock poisoned")
            .token
            .clone()
    }

    /// Store a new bearer token.
    pub fn set_token(&self, token: &str) {
        self.update(|c| c.token = Some(token.to_string()));
    }

    /// Drop the bearer token (logout, 401).
    pub fn clear_token(&self) {
        self.update(|c| c.token = None);
    }

    /// Cached application key, validated to exactly 32 bytes.
    ///
    /// Invalid stored material is treated as absent, never returned.
    pub fn app_key(&self) -> Option<AppKey> {
        let creds = self.cached.read().expect("credentials lock poisoned");
        creds.app_key.as_deref().and_then(AppKey::from_str_material)
    }

    /// Cache freshly fetched key material.
    pub fn set_app_key(&self, material: &str) {
        self.update(|c| c.app_key = Some(material.to_string()));
    }

    /// Evict the cached key (forced refresh, invalidation).
    pub fn clear_app_key(&self) {
        self.update(|c| c.app_key = None);
    }

    /// Wipe everything: token and key. Used on logout and on 401.
    pub fn clear_all(&self) {
        self.update(|c| *c = Credentials::default());
    }
}
