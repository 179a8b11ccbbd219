//! HTTP plumbing shared by the provider clients

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::media::{DEFAULT_OUTPUT_MIME, MediaData};

use super::Provider;

/// Longest raw body excerpt kept in an error message
const MAX_BODY_EXCERPT: usize = 300;

pub(super) fn build_http_client(timeout_secs: u64) -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(Error::NetworkError)
}

/// Turn a non-success response into a provider error carrying the status code
pub(super) async fn error_from_response(provider: Provider, response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!(provider = %provider, status = status.as_u16(), "Provider returned an error");

    let message = extract_error_message(&body).unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            trimmed.chars().take(MAX_BODY_EXCERPT).collect()
        }
    });

    Error::ProviderHttp {
        provider,
        status: status.as_u16(),
        message,
    }
}

/// Pull a readable message out of a JSON error body.
///
/// Understands the Google shape (`{"error": {"message", "status"}}`) as well
/// as flat `error`, `message`, `msg` and `detail` fields.
pub(super) fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    if let Some(error) = value.get("error") {
        if let Some(text) = error.as_str() {
            return Some(text.to_string());
        }
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            return Some(match error.get("status").and_then(Value::as_str) {
                Some(status) => format!("{} ({})", message, status),
                None => message.to_string(),
            });
        }
    }

    ["message", "msg", "detail"]
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

/// Content type of a response without parameters
pub(super) fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Download a media file. Byte sniffing wins over the declared content type.
pub(super) async fn download(
    provider: Provider,
    request: reqwest::RequestBuilder,
    fallback_mime: &str,
) -> Result<MediaData> {
    let response = request.send().await.map_err(Error::NetworkError)?;

    if !response.status().is_success() {
        return Err(error_from_response(provider, response).await);
    }

    let declared = content_type(&response)
        .filter(|m| m.starts_with("image/") || m.starts_with("video/"));
    let bytes = response.bytes().await.map_err(Error::NetworkError)?.to_vec();

    if bytes.is_empty() {
        return Err(Error::GenerationFailed(format!(
            "{} returned an empty download",
            provider
        )));
    }

    let fallback = declared.as_deref().unwrap_or(fallback_mime);
    Ok(MediaData::from_bytes(bytes, fallback))
}

/// Decode base64 image data that may or may not be wrapped in a data URL
pub(super) fn decode_image(data: &str) -> Result<MediaData> {
    MediaData::parse_data_url(data, DEFAULT_OUTPUT_MIME)
}
