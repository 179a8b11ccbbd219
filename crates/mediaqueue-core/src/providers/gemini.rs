//! Gemini image generation client
//!
//! Talks to the `generateContent` REST endpoint of the Generative Language
//! API. Text-to-image sends a single text part; remix sends the input image as
//! inline data followed by the instruction.

use std::time::{Duration, Instant};

use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::GeminiConfig;
use crate::error::{Error, Result};
use crate::jobs::JobPayload;
use crate::media::MediaData;

use super::Provider;
use super::http::{build_http_client, decode_image, error_from_response};

/// Header carrying the API key on every Gemini request
pub(super) const API_KEY_HEADER: &str = "x-goog-api-key";

const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Image generation options shared by text-to-image and remix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptions<'a> {
    pub aspect_ratio: &'a str,
    pub high_quality: bool,
    /// Only sent for high-quality requests
    pub image_size: Option<&'a str>,
}

impl Default for ImageOptions<'_> {
    fn default() -> Self {
        Self {
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            high_quality: false,
            image_size: None,
        }
    }
}

impl<'a> ImageOptions<'a> {
    pub fn from_payload(payload: &'a JobPayload) -> Self {
        Self {
            aspect_ratio: payload.aspect_ratio.as_deref().unwrap_or(DEFAULT_ASPECT_RATIO),
            high_quality: payload.is_high_quality(),
            image_size: payload.image_size.as_deref(),
        }
    }

    /// `imageConfig` block of the generation config
    fn image_config(&self) -> Value {
        let mut config = json!({ "aspectRatio": self.aspect_ratio });
        if self.high_quality
            && let Some(size) = self.image_size
        {
            config["imageSize"] = json!(size);
        }
        config
    }
}

/// Gemini REST client for images and (see `veo`) videos
#[derive(Clone)]
pub struct GeminiClient {
    pub(super) http_client: HttpClient,
    pub(super) base_url: String,
    image_model: String,
    high_quality_model: String,
    pub(super) video_model: String,
    pub(super) poll_interval: Duration,
    pub(super) max_polls: u32,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("image_model", &self.image_model)
            .field("video_model", &self.video_model)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            image_model: config.image_model.clone(),
            high_quality_model: config.high_quality_model.clone(),
            video_model: config.video_model.clone(),
            poll_interval: Duration::from_secs(config.video_poll_interval_secs),
            max_polls: config.video_max_polls,
        })
    }

    /// Model used for an image request
    pub fn image_model(&self, high_quality: bool) -> &str {
        if high_quality {
            &self.high_quality_model
        } else {
            &self.image_model
        }
    }

    /// Generate an image from a text prompt
    pub async fn generate_image(
        &self,
        api_key: &str,
        prompt: &str,
        options: &ImageOptions<'_>,
    ) -> Result<MediaData> {
        let parts = vec![json!({ "text": prompt })];
        let response = self.generate_content(api_key, parts, options).await?;

        extract_image(&response).ok_or_else(|| {
            Error::GenerationFailed(no_image_message(
                "No image was generated. The response may have been blocked.",
                &response,
            ))
        })?
    }

    /// Transform an input image according to a prompt
    pub async fn remix_image(
        &self,
        api_key: &str,
        prompt: &str,
        image: &MediaData,
        options: &ImageOptions<'_>,
    ) -> Result<MediaData> {
        let parts = vec![
            json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.to_base64(),
                }
            }),
            json!({ "text": prompt }),
        ];
        let response = self.generate_content(api_key, parts, options).await?;

        extract_image(&response).ok_or_else(|| {
            Error::GenerationFailed(no_image_message(
                "No image was generated for remix. The response may have been blocked.",
                &response,
            ))
        })?
    }

    async fn generate_content(
        &self,
        api_key: &str,
        parts: Vec<Value>,
        options: &ImageOptions<'_>,
    ) -> Result<GenerateContentResponse> {
        let model = self.image_model(options.high_quality);
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let body = build_request(parts, options);

        debug!(model = %model, aspect_ratio = %options.aspect_ratio, "Sending Gemini image request");
        let start = Instant::now();

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        if !response.status().is_success() {
            return Err(error_from_response(Provider::Gemini, response).await);
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            Error::GenerationFailed(format!("Failed to parse Gemini response: {}", e))
        })?;

        info!(
            model = %model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Gemini image request finished"
        );

        Ok(parsed)
    }
}

/// Request body for `generateContent`
fn build_request(parts: Vec<Value>, options: &ImageOptions<'_>) -> Value {
    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": options.image_config(),
        }
    })
}

/// First inline image of the first candidate
fn extract_image(response: &GenerateContentResponse) -> Option<Result<MediaData>> {
    let parts = response.candidates.first()?.content.as_ref()?.parts.iter();

    parts
        .filter_map(|part| part.inline_data.as_ref())
        .find(|inline| !inline.data.is_empty())
        .map(|inline| {
            let media = decode_image(&inline.data)?;
            Ok(match inline.mime_type.as_deref() {
                Some(mime) if mime.starts_with("image/") => MediaData::new(mime, media.bytes),
                _ => media,
            })
        })
}

fn no_image_message(base: &str, response: &GenerateContentResponse) -> String {
    let reason = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
        .or_else(|| {
            response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .filter(|r| *r != "STOP")
        });

    match reason {
        Some(reason) => format!("{} ({})", base, reason),
        None => base.to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
