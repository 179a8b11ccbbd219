//! Seed Dream 4.5 client for the KIE task API
//!
//! Generation is asynchronous: `createTask` returns a task id which is then
//! polled until the result is available. The API has exposed the result under
//! several paths over time, so polling tries a list of endpoints and sticks
//! with the first one that answers.

use std::time::{Duration, Instant};

use reqwest::Client as HttpClient;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::SeedreamConfig;
use crate::error::{Error, Result};
use crate::media::{DEFAULT_OUTPUT_MIME, MediaData};

use super::Provider;
use super::http::{build_http_client, decode_image, download, error_from_response};

/// Endpoints that may serve task results, in the order they are tried
const POLL_ENDPOINTS: &[PollEndpoint] = &[
    PollEndpoint { path: "/jobs/getResult", allow_post: true },
    PollEndpoint { path: "/jobs/getTaskResult", allow_post: true },
    PollEndpoint { path: "/jobs/taskResult", allow_post: false },
    PollEndpoint { path: "/jobs/getTaskDetail", allow_post: true },
    PollEndpoint { path: "/common/getTaskDetail", allow_post: true },
];

#[derive(Debug, Clone, Copy)]
struct PollEndpoint {
    path: &'static str,
    allow_post: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollMethod {
    Post,
    Get,
}

/// Every (endpoint, method) pair to try
fn poll_candidates() -> Vec<(usize, PollMethod)> {
    POLL_ENDPOINTS
        .iter()
        .enumerate()
        .flat_map(|(idx, ep)| {
            let post = ep.allow_post.then_some((idx, PollMethod::Post));
            post.into_iter().chain(std::iter::once((idx, PollMethod::Get)))
        })
        .collect()
}

/// Image delivered by the task API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedreamOutput {
    Inline(MediaData),
    Url(String),
}

/// Identifiers used to poll a task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TaskIds {
    task_id: Option<String>,
    record_id: Option<String>,
}

impl TaskIds {
    fn from_response(data: &Value) -> Option<Self> {
        let ids = Self {
            task_id: first_string(data, &[&["data", "taskId"], &["taskId"]]),
            record_id: first_string(data, &[&["data", "recordId"], &["recordId"]]),
        };
        (ids.task_id.is_some() || ids.record_id.is_some()).then_some(ids)
    }

    fn body(&self) -> Value {
        let mut body = json!({});
        if let Some(id) = &self.task_id {
            body["taskId"] = json!(id);
        }
        if let Some(id) = &self.record_id {
            body["recordId"] = json!(id);
        }
        body
    }

    fn query(&self) -> Vec<(&'static str, &str)> {
        let mut query = Vec::new();
        if let Some(id) = &self.task_id {
            query.push(("taskId", id.as_str()));
        }
        if let Some(id) = &self.record_id {
            query.push(("recordId", id.as_str()));
        }
        query
    }
}

/// Seed Dream task API client
#[derive(Clone)]
pub struct SeedreamClient {
    http_client: HttpClient,
    base_url: String,
    model: String,
    quality: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl std::fmt::Debug for SeedreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedreamClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl SeedreamClient {
    pub fn new(config: &SeedreamConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            quality: config.quality.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_polls: config.max_polls,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate an image from a prompt, waiting for the task to finish
    pub async fn generate(&self, api_key: &str, prompt: &str, aspect_ratio: &str) -> Result<MediaData> {
        let start = Instant::now();
        let created = self.create_task(api_key, prompt, aspect_ratio).await?;

        let output = match extract_output(&created)? {
            Some(output) => output,
            None => {
                let ids = TaskIds::from_response(&created).ok_or_else(|| {
                    Error::GenerationFailed(
                        "Seed Dream: job created but no taskId or recordId returned".to_string(),
                    )
                })?;
                debug!(task_id = ?ids.task_id, record_id = ?ids.record_id, "Seed Dream task created");
                self.poll_for_result(api_key, &ids).await?
            }
        };

        let media = match output {
            SeedreamOutput::Inline(media) => media,
            SeedreamOutput::Url(url) => {
                debug!(url = %url, "Downloading Seed Dream result");
                download(Provider::SeedDream, self.http_client.get(&url), DEFAULT_OUTPUT_MIME).await?
            }
        };

        info!(
            bytes = media.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Seed Dream generation finished"
        );
        Ok(media)
    }

    async fn create_task(&self, api_key: &str, prompt: &str, aspect_ratio: &str) -> Result<Value> {
        let url = format!("{}/jobs/createTask", self.base_url);
        let body = json!({
            "model": self.model,
            "input": {
                "prompt": prompt,
                "aspect_ratio": aspect_ratio,
                "quality": self.quality,
            }
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::ProviderHttp {
                provider: Provider::SeedDream,
                status: status.as_u16(),
                message: format!(
                    "createTask not found at {}. Unset MEDIAQUEUE_SEEDREAM_BASE_URL or set it to https://api.kie.ai/api/v1.",
                    url
                ),
            });
        }
        if !status.is_success() {
            let err = error_from_response(Provider::SeedDream, response).await;
            return Err(with_operation(err, "createTask"));
        }

        let data: Value = response.json().await.map_err(|e| {
            Error::GenerationFailed(format!("Failed to parse Seed Dream response: {}", e))
        })?;
        check_body_code(&data, "createTask")?;
        Ok(data)
    }

    async fn poll_for_result(&self, api_key: &str, ids: &TaskIds) -> Result<SeedreamOutput> {
        let mut working: Option<(usize, PollMethod)> = None;

        for round in 0..self.max_polls {
            let candidates = match working {
                Some(found) => vec![found],
                None => poll_candidates(),
            };

            let mut answer = None;
            for (idx, method) in candidates {
                if let Some(data) = self.poll_once(api_key, POLL_ENDPOINTS[idx].path, method, ids).await? {
                    working = Some((idx, method));
                    answer = Some(data);
                    break;
                }
            }

            match answer {
                Some(data) => {
                    if let Some(output) = evaluate_poll(&data)? {
                        return Ok(output);
                    }
                    debug!(round, "Seed Dream task still running");
                }
                None => {
                    if working.take().is_some() {
                        warn!("Seed Dream result endpoint stopped answering; searching again");
                    }
                }
            }

            if round + 1 < self.max_polls {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(Error::Timeout(
            "Seed Dream job created but no result after polling".to_string(),
        ))
    }

    /// One poll request. `Ok(None)` means the endpoint does not exist.
    async fn poll_once(
        &self,
        api_key: &str,
        path: &str,
        method: PollMethod,
        ids: &TaskIds,
    ) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);
        let request = match method {
            PollMethod::Post => self.http_client.post(&url).json(&ids.body()),
            PollMethod::Get => self.http_client.get(&url).query(&ids.query()),
        };

        let response = request
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(path, ?method, "Seed Dream poll endpoint not found");
            return Ok(None);
        }
        if !status.is_success() {
            let err = error_from_response(Provider::SeedDream, response).await;
            return Err(with_operation(err, "getResult"));
        }

        let data = response.json().await.map_err(|e| {
            Error::GenerationFailed(format!("Failed to parse Seed Dream poll response: {}", e))
        })?;
        Ok(Some(data))
    }
}

/// Inspect a poll response: a result, a failure, or still running
fn evaluate_poll(data: &Value) -> Result<Option<SeedreamOutput>> {
    check_body_code(data, "getResult")?;

    if let Some(output) = extract_output(data)? {
        return Ok(Some(output));
    }

    let state = first_string(
        data,
        &[&["data", "state"], &["data", "status"], &["state"], &["status"]],
    );
    if matches!(state.as_deref(), Some("fail" | "failed")) {
        let message = first_string(data, &[&["data", "failMsg"], &["data", "error"], &["error"]])
            .unwrap_or_else(|| "Seed Dream job failed".to_string());
        return Err(Error::GenerationFailed(message));
    }

    Ok(None)
}

/// Find an image in a task response.
///
/// Inline base64 wins over URLs. Results may sit in an `output` list, in a
/// `resultJson` document (string or object), or in a bare `resultUrls` list.
fn extract_output(data: &Value) -> Result<Option<SeedreamOutput>> {
    let output = lookup(data, &["data", "output"]).or_else(|| lookup(data, &["output"]));
    let first = match output {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };

    let inline = first
        .and_then(|f| first_string(f, &[&["b64_json"], &["base64"], &["imageBase64"]]))
        .or_else(|| first_string(data, &[&["image"]]));
    let url = first
        .and_then(|f| first_string(f, &[&["url"]]))
        .or_else(|| first_string(data, &[&["url"]]));

    let result_json = lookup(data, &["data", "resultJson"])
        .or_else(|| lookup(data, &["resultJson"]))
        .and_then(|raw| match raw {
            Value::String(s) => serde_json::from_str::<Value>(s).ok(),
            Value::Object(_) => Some(raw.clone()),
            _ => None,
        });
    let inline_from_json = result_json
        .as_ref()
        .and_then(|j| first_string(j, &[&["resultBase64"], &["base64"], &["imageBase64"]]));
    let url_from_json = result_json
        .as_ref()
        .and_then(|j| first_array_string(j, &[&["resultUrls"], &["urls"]]));
    let direct_url = first_array_string(data, &[&["data", "resultUrls"], &["resultUrls"]]);

    if let Some(encoded) = inline.or(inline_from_json) {
        return decode_image(&encoded).map(|m| Some(SeedreamOutput::Inline(m)));
    }

    Ok(url
        .or(url_from_json)
        .or(direct_url)
        .map(SeedreamOutput::Url))
}

/// Reject bodies whose `code` field is present and not 200
fn check_body_code(data: &Value, operation: &str) -> Result<()> {
    let code = match data.get("code") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match code {
        Some(code) if code != 200 => {
            let message = first_string(data, &[&["message"], &["msg"]])
                .unwrap_or_else(|| "Seed Dream error".to_string());
            Err(Error::GenerationFailed(format!(
                "{}: {} (code {})",
                operation, message, code
            )))
        }
        _ => Ok(()),
    }
}

fn with_operation(err: Error, operation: &str) -> Error {
    match err {
        Error::ProviderHttp {
            provider,
            status,
            message,
        } => Error::ProviderHttp {
            provider,
            status,
            message: format!("{}: {}", operation, message),
        },
        other => other,
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

/// First non-empty string (or number, for ids) found at any of the paths
fn first_string(value: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(value, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First element of the first non-empty string array found at any of the paths
fn first_array_string(value: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        lookup(value, path)?
            .as_array()?
            .first()?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}
