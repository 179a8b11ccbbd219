//! Veo video generation on top of the Gemini client
//!
//! Video generation is a long-running operation: the job submits
//! `predictLongRunning`, polls the returned operation until it is done, then
//! downloads the produced file with the same API key.

use std::time::Instant;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::jobs::JobPayload;
use crate::media::MediaData;

use super::Provider;
use super::gemini::{API_KEY_HEADER, GeminiClient};
use super::http::{download, error_from_response};

/// Options for a video request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOptions {
    pub aspect_ratio: String,
    pub resolution: String,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            resolution: "720p".to_string(),
        }
    }
}

impl VideoOptions {
    pub fn from_payload(payload: &JobPayload) -> Self {
        let defaults = Self::default();
        Self {
            aspect_ratio: payload.aspect_ratio.clone().unwrap_or(defaults.aspect_ratio),
            resolution: payload.resolution.clone().unwrap_or(defaults.resolution),
        }
    }
}

impl GeminiClient {
    /// Generate a video from a prompt, an image, or both
    pub async fn generate_video(
        &self,
        api_key: &str,
        prompt: Option<&str>,
        image: Option<&MediaData>,
        options: &VideoOptions,
    ) -> Result<MediaData> {
        let start = Instant::now();
        let mut operation = self.start_video(api_key, prompt, image, options).await?;

        let mut polls = 0;
        while !operation.done {
            if polls >= self.max_polls {
                return Err(Error::Timeout(format!(
                    "video generation did not finish after {} status checks",
                    polls
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;

            let name = operation
                .name
                .clone()
                .ok_or_else(|| Error::GenerationFailed("Video operation has no name".to_string()))?;
            operation = self.poll_video(api_key, &name).await?;
            debug!(operation = %name, polls, done = operation.done, "Polled video operation");
        }

        let uri = video_uri(&operation)?;
        let request = self.http_client.get(uri).header(API_KEY_HEADER, api_key);
        let video = download(Provider::Gemini, request, "video/mp4").await?;

        info!(
            polls,
            bytes = video.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Video generation finished"
        );

        // Veo only produces MP4
        if video.is_video() {
            Ok(video)
        } else {
            Ok(MediaData::new("video/mp4", video.bytes))
        }
    }

    async fn start_video(
        &self,
        api_key: &str,
        prompt: Option<&str>,
        image: Option<&MediaData>,
        options: &VideoOptions,
    ) -> Result<VideoOperation> {
        let url = format!("{}/models/{}:predictLongRunning", self.base_url, self.video_model);
        let body = build_video_request(prompt, image, options);

        debug!(
            model = %self.video_model,
            aspect_ratio = %options.aspect_ratio,
            resolution = %options.resolution,
            with_image = image.is_some(),
            "Starting video generation"
        );

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        self.read_operation(response).await
    }

    async fn poll_video(&self, api_key: &str, name: &str) -> Result<VideoOperation> {
        let url = format!("{}/{}", self.base_url, name);
        let response = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        self.read_operation(response).await
    }

    async fn read_operation(&self, response: reqwest::Response) -> Result<VideoOperation> {
        if !response.status().is_success() {
            return Err(error_from_response(Provider::Gemini, response).await);
        }
        response.json().await.map_err(|e| {
            Error::GenerationFailed(format!("Failed to parse video operation: {}", e))
        })
    }
}

fn build_video_request(
    prompt: Option<&str>,
    image: Option<&MediaData>,
    options: &VideoOptions,
) -> Value {
    let mut instance = json!({});
    if let Some(prompt) = prompt {
        instance["prompt"] = json!(prompt);
    }
    if let Some(image) = image {
        instance["image"] = json!({
            "bytesBase64Encoded": image.to_base64(),
            "mimeType": image.mime_type,
        });
    }

    json!({
        "instances": [instance],
        "parameters": {
            "aspectRatio": options.aspect_ratio,
            "resolution": options.resolution,
            "sampleCount": 1,
        }
    })
}

/// Download link of the first generated sample
fn video_uri(operation: &VideoOperation) -> Result<&str> {
    if let Some(error) = &operation.error {
        let message = error
            .message
            .clone()
            .unwrap_or_else(|| format!("code {}", error.code.unwrap_or_default()));
        return Err(Error::GenerationFailed(format!(
            "Video generation failed: {}",
            message
        )));
    }

    operation
        .response
        .as_ref()
        .and_then(|r| r.generate_video_response.as_ref())
        .and_then(|r| r.generated_samples.first())
        .and_then(|s| s.video.as_ref())
        .and_then(|v| v.uri.as_deref())
        .ok_or_else(|| {
            Error::GenerationFailed(
                "Video generation completed but no download link was found.".to_string(),
            )
        })
}

#[derive(Debug, Default, Deserialize)]
struct VideoOperation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}
