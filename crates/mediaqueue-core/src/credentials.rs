//! Provider credentials
//!
//! Keys are only ever read from the environment. Gemini accepts several keys
//! which form a round-robin pool: each image request takes the next key, and
//! a rate-limited request skips one more.

use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::debug;

use crate::providers::Provider;

/// Round-robin pool of API keys
#[derive(Default)]
pub struct KeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Parse a newline- or comma-separated key list
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(['\n', ',']).map(str::to_string).collect())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key currently in use
    pub fn current(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = self.cursor.load(Ordering::SeqCst) % self.keys.len();
        Some(self.keys[idx].as_str())
    }

    /// Take the key at the cursor and advance past it
    pub fn next(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let len = self.keys.len();
        let taken = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % len))
            .unwrap_or(0);
        Some(self.keys[taken % len].as_str())
    }

    /// Index of the key currently in use
    pub fn position(&self) -> usize {
        if self.keys.is_empty() {
            0
        } else {
            self.cursor.load(Ordering::SeqCst) % self.keys.len()
        }
    }

    /// Move to the next key. Returns false when there is nothing to rotate to.
    pub fn rotate(&self) -> bool {
        if self.keys.len() < 2 {
            return false;
        }
        let len = self.keys.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % len))
            .unwrap_or(0);
        debug!(from = previous % len, to = (previous + 1) % len, keys = len, "Rotated API key");
        true
    }

    /// Redacted form of every key, for display
    pub fn redacted(&self) -> Vec<String> {
        self.keys.iter().map(|k| redact(k)).collect()
    }
}

impl std::fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPool")
            .field("keys", &self.keys.len())
            .field("position", &self.position())
            .finish()
    }
}

/// Credentials for every provider
#[derive(Default)]
pub struct Credentials {
    pub gemini: KeyPool,
    pub photoroom: Option<String>,
    pub seedream: Option<String>,
    /// Overrides `seedream.base_url` from the config file
    pub seedream_base_url: Option<String>,
}

impl Credentials {
    /// Resolve credentials from environment variables
    pub fn from_env() -> Self {
        let gemini = first_env(&["MEDIAQUEUE_GEMINI_API_KEYS", "GEMINI_API_KEY"])
            .map(|raw| KeyPool::parse(&raw))
            .unwrap_or_default();

        Self {
            gemini,
            photoroom: first_env(&["MEDIAQUEUE_PHOTOROOM_API_KEY", "PHOTOROOM_API_KEY"]),
            seedream: first_env(&["MEDIAQUEUE_SEEDREAM_API_KEY", "SEED_DREAM_API_KEY"]),
            seedream_base_url: first_env(&["MEDIAQUEUE_SEEDREAM_BASE_URL"]),
        }
    }

    pub fn with_gemini_keys(mut self, keys: Vec<String>) -> Self {
        self.gemini = KeyPool::new(keys);
        self
    }

    pub fn with_photoroom_key(mut self, key: impl Into<String>) -> Self {
        self.photoroom = Some(key.into()).filter(|k: &String| !k.trim().is_empty());
        self
    }

    pub fn with_seedream_key(mut self, key: impl Into<String>) -> Self {
        self.seedream = Some(key.into()).filter(|k: &String| !k.trim().is_empty());
        self
    }

    pub fn is_set(&self, provider: Provider) -> bool {
        match provider {
            Provider::Gemini => !self.gemini.is_empty(),
            Provider::PhotoRoom => self.photoroom.is_some(),
            Provider::SeedDream => self.seedream.is_some(),
        }
    }

    /// Per-provider status with redacted keys
    pub fn summary(&self) -> Vec<CredentialStatus> {
        let single = |key: &Option<String>| key.iter().map(|k| redact(k)).collect::<Vec<_>>();
        vec![
            CredentialStatus {
                provider: Provider::Gemini,
                env_var: Provider::Gemini.env_var(),
                keys: self.gemini.redacted(),
            },
            CredentialStatus {
                provider: Provider::PhotoRoom,
                env_var: Provider::PhotoRoom.env_var(),
                keys: single(&self.photoroom),
            },
            CredentialStatus {
                provider: Provider::SeedDream,
                env_var: Provider::SeedDream.env_var(),
                keys: single(&self.seedream),
            },
        ]
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini", &self.gemini)
            .field("photoroom", &self.photoroom.is_some())
            .field("seedream", &self.seedream.is_some())
            .field("seedream_base_url", &self.seedream_base_url)
            .finish()
    }
}

/// Display form of one provider's credentials
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub provider: Provider,
    pub env_var: &'static str,
    pub keys: Vec<String>,
}

impl CredentialStatus {
    pub fn is_set(&self) -> bool {
        !self.keys.is_empty()
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Show only the last four characters of a secret
pub fn redact(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        "***".to_string()
    } else {
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("***{}", suffix)
    }
}
