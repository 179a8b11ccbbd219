//! Provider adapters and job dispatch
//!
//! Each job type maps to one provider call:
//! - text-to-image and remix go to Gemini or Seed Dream, chosen per job
//! - remove-background always goes to PhotoRoom
//! - generate-video always goes to Gemini (Veo)

mod gemini;
mod http;
mod photoroom;
mod seedream;
#[cfg(test)]
mod test_server;
mod veo;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::jobs::{ImageModel, JobPayload, JobType};
use crate::media::MediaData;

pub use gemini::{GeminiClient, ImageOptions};
pub use photoroom::PhotoRoomClient;
pub use seedream::{SeedreamClient, SeedreamOutput};
pub use veo::VideoOptions;

/// Third-party services a job can be sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Gemini,
    PhotoRoom,
    SeedDream,
}

impl Provider {
    /// Environment variable holding this provider's credential
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Gemini => "MEDIAQUEUE_GEMINI_API_KEYS",
            Self::PhotoRoom => "MEDIAQUEUE_PHOTOROOM_API_KEY",
            Self::SeedDream => "MEDIAQUEUE_SEEDREAM_API_KEY",
        }
    }

    /// Provider that serves a job
    pub fn for_job(job_type: JobType, payload: &JobPayload) -> Self {
        match job_type {
            JobType::TextToImage | JobType::RemixImage => match payload.model() {
                ImageModel::Gemini => Self::Gemini,
                ImageModel::SeedDream => Self::SeedDream,
            },
            JobType::RemoveBackground => Self::PhotoRoom,
            JobType::GenerateVideo => Self::Gemini,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "Gemini"),
            Self::PhotoRoom => write!(f, "PhotoRoom"),
            Self::SeedDream => write!(f, "Seed Dream"),
        }
    }
}

/// Executes a single attempt of a job
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run one attempt and return the produced media
    async fn run(&self, job_type: JobType, payload: &JobPayload) -> Result<MediaData>;

    /// Called after an attempt was rate limited. Returns true if a different
    /// credential will be used for the next attempt.
    fn on_rate_limited(&self, _job_type: JobType, _payload: &JobPayload) -> bool {
        false
    }
}

/// Routes jobs to the provider clients using the configured credentials
pub struct ProviderRouter {
    credentials: Credentials,
    gemini: GeminiClient,
    seedream: SeedreamClient,
    photoroom: PhotoRoomClient,
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl ProviderRouter {
    pub fn new(config: &Config, credentials: Credentials) -> Result<Self> {
        let mut seedream_config = config.seedream.clone();
        if let Some(base_url) = credentials.seedream_base_url.as_deref() {
            seedream_config.base_url = base_url.trim_end_matches('/').to_string();
        }

        Ok(Self {
            gemini: GeminiClient::new(&config.gemini)?,
            seedream: SeedreamClient::new(&seedream_config)?,
            photoroom: PhotoRoomClient::new(&config.photoroom)?,
            credentials,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Key for an image request; every request moves the pool forward
    fn next_gemini_key(&self) -> Result<&str> {
        self.credentials
            .gemini
            .next()
            .ok_or(Error::MissingCredential(Provider::Gemini))
    }

    fn gemini_key(&self) -> Result<&str> {
        self.credentials
            .gemini
            .current()
            .ok_or(Error::MissingCredential(Provider::Gemini))
    }

    fn seedream_key(&self) -> Result<&str> {
        self.credentials
            .seedream
            .as_deref()
            .ok_or(Error::MissingCredential(Provider::SeedDream))
    }

    fn photoroom_key(&self) -> Result<&str> {
        self.credentials
            .photoroom
            .as_deref()
            .ok_or(Error::MissingCredential(Provider::PhotoRoom))
    }
}

#[async_trait]
impl JobRunner for ProviderRouter {
    async fn run(&self, job_type: JobType, payload: &JobPayload) -> Result<MediaData> {
        payload.validate_for(job_type)?;

        let provider = Provider::for_job(job_type, payload);
        debug!(job_type = %job_type, provider = %provider, "Dispatching job");

        let options = ImageOptions::from_payload(payload);

        match (job_type, provider) {
            (JobType::TextToImage, Provider::SeedDream) => {
                let key = self.seedream_key()?;
                self.seedream
                    .generate(key, required_prompt(payload)?, options.aspect_ratio)
                    .await
            }
            (JobType::TextToImage, _) => {
                let key = self.next_gemini_key()?;
                self.gemini
                    .generate_image(key, required_prompt(payload)?, &options)
                    .await
            }
            (JobType::RemixImage, Provider::SeedDream) => {
                self.seedream_key()?;
                Err(Error::Unsupported(
                    "Seed Dream remix is not supported by the current integration".to_string(),
                ))
            }
            (JobType::RemixImage, _) => {
                let key = self.next_gemini_key()?;
                self.gemini
                    .remix_image(key, required_prompt(payload)?, required_image(payload)?, &options)
                    .await
            }
            (JobType::RemoveBackground, _) => {
                let key = self.photoroom_key()?;
                self.photoroom
                    .remove_background(key, required_image(payload)?)
                    .await
            }
            (JobType::GenerateVideo, _) => {
                let key = self.gemini_key()?;
                let video = VideoOptions::from_payload(payload);
                self.gemini
                    .generate_video(key, payload.prompt_text(), payload.image.as_ref(), &video)
                    .await
            }
        }
    }

    fn on_rate_limited(&self, job_type: JobType, payload: &JobPayload) -> bool {
        if Provider::for_job(job_type, payload) != Provider::Gemini {
            return false;
        }
        let rotated = self.credentials.gemini.rotate();
        if rotated {
            warn!(
                position = self.credentials.gemini.position(),
                keys = self.credentials.gemini.len(),
                "Rate limited; switching to next Gemini API key"
            );
        }
        rotated
    }
}

fn required_prompt(payload: &JobPayload) -> Result<&str> {
    payload
        .prompt_text()
        .ok_or_else(|| Error::InvalidPayload("prompt is required".to_string()))
}

fn required_image(payload: &JobPayload) -> Result<&MediaData> {
    payload
        .image
        .as_ref()
        .ok_or_else(|| Error::InvalidPayload("input image is required".to_string()))
}
