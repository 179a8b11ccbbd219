//! Job records and their payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::media::MediaData;

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    TextToImage,
    RemixImage,
    RemoveBackground,
    GenerateVideo,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToImage => "text-to-image",
            Self::RemixImage => "remix-image",
            Self::RemoveBackground => "remove-background",
            Self::GenerateVideo => "generate-video",
        }
    }

    pub fn produces_video(&self) -> bool {
        matches!(self, Self::GenerateVideo)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed jobs never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image model selected for text-to-image and remix jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageModel {
    #[default]
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "seed-dream-4.5")]
    SeedDream,
}

impl ImageModel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Some(Self::Gemini),
            "seed-dream-4.5" | "seed-dream" | "seedream" => Some(Self::SeedDream),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::SeedDream => write!(f, "seed-dream-4.5"),
        }
    }
}

/// Aspect ratios accepted by the image providers
pub const IMAGE_ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "3:2", "4:3", "3:4", "2:3", "4:5", "9:16"];

/// Aspect ratios accepted by the video provider
pub const VIDEO_ASPECT_RATIOS: &[&str] = &["16:9", "9:16"];

/// Output sizes for high-quality Gemini images
pub const IMAGE_SIZES: &[&str] = &["1K", "2K", "4K"];

/// Video resolutions
pub const VIDEO_RESOLUTIONS: &[&str] = &["720p", "1080p"];

/// Provider-specific job parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobPayload {
    pub prompt: Option<String>,
    #[serde(deserialize_with = "crate::media::input_image::deserialize")]
    pub image: Option<MediaData>,
    pub original_filename: Option<String>,
    pub aspect_ratio: Option<String>,
    pub high_quality: Option<bool>,
    pub image_size: Option<String>,
    pub resolution: Option<String>,
    pub model: Option<ImageModel>,
}

impl JobPayload {
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_image(mut self, image: MediaData, filename: Option<String>) -> Self {
        self.image = Some(image);
        self.original_filename = filename;
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(ratio.into());
        self
    }

    pub fn with_model(mut self, model: ImageModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_high_quality(mut self, image_size: Option<String>) -> Self {
        self.high_quality = Some(true);
        self.image_size = image_size;
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    /// Trimmed prompt, if one is present and not blank
    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn model(&self) -> ImageModel {
        self.model.unwrap_or_default()
    }

    pub fn is_high_quality(&self) -> bool {
        self.high_quality.unwrap_or(false)
    }

    /// Check that the payload carries what the job type needs
    pub fn validate_for(&self, job_type: JobType) -> Result<()> {
        let has_prompt = self.prompt_text().is_some();
        let has_image = self.image.as_ref().is_some_and(|m| !m.is_empty());

        match job_type {
            JobType::TextToImage if !has_prompt => {
                return Err(Error::InvalidPayload("text-to-image requires a prompt".into()));
            }
            JobType::RemixImage if !(has_prompt && has_image) => {
                return Err(Error::InvalidPayload(
                    "remix-image requires a prompt and an input image".into(),
                ));
            }
            JobType::RemoveBackground if !has_image => {
                return Err(Error::InvalidPayload(
                    "remove-background requires an input image".into(),
                ));
            }
            JobType::GenerateVideo if !(has_prompt || has_image) => {
                return Err(Error::InvalidPayload(
                    "generate-video requires a prompt or an input image".into(),
                ));
            }
            _ => {}
        }

        let ratios = if job_type.produces_video() {
            VIDEO_ASPECT_RATIOS
        } else {
            IMAGE_ASPECT_RATIOS
        };
        if let Some(ratio) = self.aspect_ratio.as_deref()
            && !ratios.contains(&ratio)
        {
            return Err(Error::InvalidPayload(format!(
                "unsupported aspect ratio '{}' for {} (expected one of {})",
                ratio,
                job_type,
                ratios.join(", ")
            )));
        }

        if let Some(size) = self.image_size.as_deref()
            && !IMAGE_SIZES.contains(&size)
        {
            return Err(Error::InvalidPayload(format!(
                "unsupported image size '{}' (expected one of {})",
                size,
                IMAGE_SIZES.join(", ")
            )));
        }

        if let Some(resolution) = self.resolution.as_deref()
            && !VIDEO_RESOLUTIONS.contains(&resolution)
        {
            return Err(Error::InvalidPayload(format!(
                "unsupported resolution '{}' (expected one of {})",
                resolution,
                VIDEO_RESOLUTIONS.join(", ")
            )));
        }

        Ok(())
    }
}

/// A job request before it enters the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub payload: JobPayload,
}

impl NewJob {
    pub fn new(job_type: JobType, payload: JobPayload) -> Self {
        Self { job_type, payload }
    }
}

/// A queued unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub payload: JobPayload,
    pub result: Option<MediaData>,
    pub error: Option<String>,
    /// Rate-limit attempts consumed so far
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(job_type: JobType, payload: JobPayload) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Short human-readable title
    pub fn title(&self) -> String {
        let filename = self.payload.original_filename.as_deref().unwrap_or("image");
        match self.job_type {
            JobType::TextToImage => {
                format!("Text-to-Image: \"{}...\"", truncate(self.payload.prompt_text().unwrap_or(""), 30))
            }
            JobType::RemixImage => format!("Remix: {}", filename),
            JobType::RemoveBackground => format!("Remove Background: {}", filename),
            JobType::GenerateVideo => match self.payload.prompt_text() {
                Some(prompt) => format!("Video: \"{}...\"", truncate(prompt, 30)),
                None => "Video: \"Image to Video...\"".to_string(),
            },
        }
    }

    /// Base name for result files: `{type}-{id}`
    pub fn result_stem(&self) -> String {
        format!("{}-{}", self.job_type, self.id)
    }

    /// File name for this job's result, if it has one
    pub fn result_file_name(&self) -> Option<String> {
        let result = self.result.as_ref()?;
        let ext = if self.job_type.produces_video() {
            "mp4"
        } else {
            result.extension()
        };
        Some(format!("{}.{}", self.result_stem(), ext))
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Counts of jobs by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        jobs.into_iter().fold(Self::default(), |mut acc, job| {
            match job.status {
                JobStatus::Pending => acc.pending += 1,
                JobStatus::InProgress => acc.in_progress += 1,
                JobStatus::Completed => acc.completed += 1,
                JobStatus::Failed => acc.failed += 1,
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed
    }

    /// No job waiting or running
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.in_progress == 0
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
