//! PhotoRoom background removal

use std::time::Instant;

use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use crate::config::PhotoRoomConfig;
use crate::error::{Error, Result};
use crate::media::{DEFAULT_OUTPUT_MIME, MediaData};

use super::Provider;
use super::http::{build_http_client, content_type, error_from_response};

/// PhotoRoom segmentation API client
#[derive(Clone)]
pub struct PhotoRoomClient {
    http_client: HttpClient,
    endpoint: String,
}

impl std::fmt::Debug for PhotoRoomClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoRoomClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl PhotoRoomClient {
    pub fn new(config: &PhotoRoomConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(config.timeout_secs)?,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Upload an image and return the cut-out
    pub async fn remove_background(&self, api_key: &str, image: &MediaData) -> Result<MediaData> {
        let start = Instant::now();
        let part = Part::bytes(image.bytes.clone())
            .file_name(format!("upload.{}", image.extension()))
            .mime_str(&image.mime_type)
            .map_err(Error::NetworkError)?;
        let form = Form::new().part("image_file", part);

        debug!(bytes = image.len(), mime = %image.mime_type, "Sending PhotoRoom request");

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("X-Api-Key", api_key)
            .multipart(form)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        if !response.status().is_success() {
            return Err(error_from_response(Provider::PhotoRoom, response).await);
        }

        let mime = content_type(&response)
            .filter(|m| m.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_OUTPUT_MIME.to_string());
        let bytes = response.bytes().await.map_err(Error::NetworkError)?.to_vec();

        if bytes.is_empty() {
            return Err(Error::GenerationFailed(
                "PhotoRoom returned an empty image".to_string(),
            ));
        }

        info!(
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Background removed"
        );
        Ok(MediaData::new(mime, bytes))
    }
}
