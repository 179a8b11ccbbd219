//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::jobs::RetryPolicy;

/// Mediaqueue configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub gemini: GeminiConfig,
    pub seedream: SeedreamConfig,
    pub photoroom: PhotoRoomConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs allowed in progress at the same time
    pub max_concurrent: usize,
    /// Rate-limit attempts before a job is failed
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_jitter_ms: u64,
    /// Delay between launches within one scheduling pass
    pub start_stagger_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub image_model: String,
    pub high_quality_model: String,
    pub video_model: String,
    pub timeout_secs: u64,
    pub video_poll_interval_secs: u64,
    pub video_max_polls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedreamConfig {
    pub base_url: String,
    pub model: String,
    pub quality: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoRoomConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub archive_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            max_attempts: 10,
            base_backoff_ms: 5_000,
            max_backoff_ms: 60_000,
            max_jitter_ms: 2_000,
            start_stagger_ms: 300,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            high_quality_model: "gemini-3-pro-image-preview".to_string(),
            video_model: "veo-3.1-fast-generate-preview".to_string(),
            timeout_secs: 120,
            video_poll_interval_secs: 5,
            video_max_polls: 120,
        }
    }
}

impl Default for SeedreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kie.ai/api/v1".to_string(),
            model: "seedream/4.5-text-to-image".to_string(),
            quality: "basic".to_string(),
            timeout_secs: 120,
            poll_interval_secs: 5,
            max_polls: 20,
        }
    }
}

impl Default for PhotoRoomConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://sdk.photoroom.com/v1/segment".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            archive_prefix: "NC-Tool-Export".to_string(),
        }
    }
}

impl QueueConfig {
    /// Retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }

    pub fn start_stagger(&self) -> Duration {
        Duration::from_millis(self.start_stagger_ms)
    }
}

/// Keys accepted by `get`/`set`, in listing order
const KEYS: &[&str] = &[
    "queue.max_concurrent",
    "queue.max_attempts",
    "queue.base_backoff_ms",
    "queue.max_backoff_ms",
    "queue.max_jitter_ms",
    "queue.start_stagger_ms",
    "gemini.base_url",
    "gemini.image_model",
    "gemini.high_quality_model",
    "gemini.video_model",
    "gemini.timeout_secs",
    "gemini.video_poll_interval_secs",
    "gemini.video_max_polls",
    "seedream.base_url",
    "seedream.model",
    "seedream.quality",
    "seedream.timeout_secs",
    "seedream.poll_interval_secs",
    "seedream.max_polls",
    "photoroom.endpoint",
    "photoroom.timeout_secs",
    "export.archive_prefix",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("MEDIAQUEUE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("mediaqueue")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue.max_concurrent == 0 {
            return Err(anyhow!("queue.max_concurrent must be at least 1"));
        }
        if self.queue.max_attempts == 0 {
            return Err(anyhow!("queue.max_attempts must be at least 1"));
        }
        if self.queue.base_backoff_ms > self.queue.max_backoff_ms {
            return Err(anyhow!(
                "queue.base_backoff_ms ({}) must not exceed queue.max_backoff_ms ({})",
                self.queue.base_backoff_ms,
                self.queue.max_backoff_ms
            ));
        }
        if self.gemini.video_poll_interval_secs == 0 || self.seedream.poll_interval_secs == 0 {
            return Err(anyhow!("Poll intervals must be at least 1 second"));
        }
        for (key, secs) in [
            ("gemini.timeout_secs", self.gemini.timeout_secs),
            ("seedream.timeout_secs", self.seedream.timeout_secs),
            ("photoroom.timeout_secs", self.photoroom.timeout_secs),
        ] {
            if secs == 0 {
                return Err(anyhow!("{} must be at least 1", key));
            }
        }
        if self.export.archive_prefix.trim().is_empty() {
            return Err(anyhow!("export.archive_prefix must not be empty"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "queue.max_concurrent" => Ok(self.queue.max_concurrent.to_string()),
            "queue.max_attempts" => Ok(self.queue.max_attempts.to_string()),
            "queue.base_backoff_ms" => Ok(self.queue.base_backoff_ms.to_string()),
            "queue.max_backoff_ms" => Ok(self.queue.max_backoff_ms.to_string()),
            "queue.max_jitter_ms" => Ok(self.queue.max_jitter_ms.to_string()),
            "queue.start_stagger_ms" => Ok(self.queue.start_stagger_ms.to_string()),

            "gemini.base_url" => Ok(self.gemini.base_url.clone()),
            "gemini.image_model" => Ok(self.gemini.image_model.clone()),
            "gemini.high_quality_model" => Ok(self.gemini.high_quality_model.clone()),
            "gemini.video_model" => Ok(self.gemini.video_model.clone()),
            "gemini.timeout_secs" => Ok(self.gemini.timeout_secs.to_string()),
            "gemini.video_poll_interval_secs" => {
                Ok(self.gemini.video_poll_interval_secs.to_string())
            }
            "gemini.video_max_polls" => Ok(self.gemini.video_max_polls.to_string()),

            "seedream.base_url" => Ok(self.seedream.base_url.clone()),
            "seedream.model" => Ok(self.seedream.model.clone()),
            "seedream.quality" => Ok(self.seedream.quality.clone()),
            "seedream.timeout_secs" => Ok(self.seedream.timeout_secs.to_string()),
            "seedream.poll_interval_secs" => Ok(self.seedream.poll_interval_secs.to_string()),
            "seedream.max_polls" => Ok(self.seedream.max_polls.to_string()),

            "photoroom.endpoint" => Ok(self.photoroom.endpoint.clone()),
            "photoroom.timeout_secs" => Ok(self.photoroom.timeout_secs.to_string()),

            "export.archive_prefix" => Ok(self.export.archive_prefix.clone()),

            key if is_credential_key(key) => Err(credential_key_error()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `mediaqueue config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "queue.max_concurrent" => {
                let n: usize = parse(key, value)?;
                if n == 0 {
                    return Err(anyhow!("queue.max_concurrent must be at least 1"));
                }
                self.queue.max_concurrent = n;
            }
            "queue.max_attempts" => {
                let n: u32 = parse(key, value)?;
                if n == 0 {
                    return Err(anyhow!("queue.max_attempts must be at least 1"));
                }
                self.queue.max_attempts = n;
            }
            "queue.base_backoff_ms" => self.queue.base_backoff_ms = parse(key, value)?,
            "queue.max_backoff_ms" => self.queue.max_backoff_ms = parse(key, value)?,
            "queue.max_jitter_ms" => self.queue.max_jitter_ms = parse(key, value)?,
            "queue.start_stagger_ms" => self.queue.start_stagger_ms = parse(key, value)?,

            "gemini.base_url" => self.gemini.base_url = parse_url(value)?,
            "gemini.image_model" => self.gemini.image_model = non_empty(key, value)?,
            "gemini.high_quality_model" => {
                self.gemini.high_quality_model = non_empty(key, value)?
            }
            "gemini.video_model" => self.gemini.video_model = non_empty(key, value)?,
            "gemini.timeout_secs" => self.gemini.timeout_secs = parse(key, value)?,
            "gemini.video_poll_interval_secs" => {
                self.gemini.video_poll_interval_secs = parse(key, value)?
            }
            "gemini.video_max_polls" => self.gemini.video_max_polls = parse(key, value)?,

            "seedream.base_url" => self.seedream.base_url = parse_url(value)?,
            "seedream.model" => self.seedream.model = non_empty(key, value)?,
            "seedream.quality" => self.seedream.quality = non_empty(key, value)?,
            "seedream.timeout_secs" => self.seedream.timeout_secs = parse(key, value)?,
            "seedream.poll_interval_secs" => {
                self.seedream.poll_interval_secs = parse(key, value)?
            }
            "seedream.max_polls" => self.seedream.max_polls = parse(key, value)?,

            "photoroom.endpoint" => self.photoroom.endpoint = parse_url(value)?,
            "photoroom.timeout_secs" => self.photoroom.timeout_secs = parse(key, value)?,

            "export.archive_prefix" => self.export.archive_prefix = non_empty(key, value)?,

            key if is_credential_key(key) => return Err(credential_key_error()),

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `mediaqueue config list` to see available keys.",
                    key
                ));
            }
        }
        self.validate()
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))
}

fn non_empty(key: &str, value: &str) -> anyhow::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("{} must not be empty", key));
    }
    Ok(trimmed.to_string())
}

fn parse_url(value: &str) -> anyhow::Result<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(anyhow!("Invalid URL: {}. Expected http:// or https://", value));
    }
    Ok(trimmed.to_string())
}

fn is_credential_key(key: &str) -> bool {
    key.ends_with("api_key") || key.ends_with("api_keys")
}

fn credential_key_error() -> anyhow::Error {
    anyhow!(
        "API keys cannot be stored in configuration. Set MEDIAQUEUE_GEMINI_API_KEYS, \
         MEDIAQUEUE_PHOTOROOM_API_KEY or MEDIAQUEUE_SEEDREAM_API_KEY instead \
         (see `mediaqueue keys`)."
    )
}
