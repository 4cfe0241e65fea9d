// src/services/vision.rs

//! Logo OCR through the Anthropic Message Batches API.
//!
//! Images are submitted as one batch per company, the batch is polled until
//! processing ends, and the JSONL results are mapped back to image URLs.
//! Each image succeeds or fails on its own.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{OcrResult, VisionConfig};

const API_VERSION: &str = "2023-06-01";

const OCR_PROMPT: &str =
    "Extract all company names from this image. Return only the company names, one per line.";

/// Recognizes text in remote images.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, image_urls: &[String]) -> Result<Vec<OcrResult>>;
}

#[derive(Debug, Deserialize)]
struct BatchStatus {
    id: String,
    processing_status: String,
    #[serde(default)]
    results_url: Option<String>,
    #[serde(default)]
    request_counts: RequestCounts,
}

#[derive(Debug, Default, Deserialize)]
struct RequestCounts {
    #[serde(default)]
    processing: u64,
    #[serde(default)]
    succeeded: u64,
    #[serde(default)]
    errored: u64,
}

#[derive(Debug, Deserialize)]
struct BatchLine {
    custom_id: String,
    result: LineResult,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LineResult {
    Succeeded { message: MessageBody },
    Errored { error: serde_json::Value },
    Canceled,
    Expired,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// SVG sources cannot be sent as URL images.
fn is_svg(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_lowercase().ends_with(".svg")
}

/// Batch request body plus the custom-id → URL map. Unsupported images come
/// back as ready-made failures.
fn build_batch(
    image_urls: &[String],
    config: &VisionConfig,
) -> (serde_json::Value, HashMap<String, String>, Vec<OcrResult>) {
    let mut ids = HashMap::new();
    let mut skipped = Vec::new();
    let mut requests = Vec::new();

    for (i, url) in image_urls.iter().enumerate() {
        if is_svg(url) {
            skipped.push(OcrResult::failed(url, "svg images are not supported"));
            continue;
        }
        let custom_id = format!("ocr-{i}");
        requests.push(json!({
            "custom_id": custom_id,
            "params": {
                "model": config.model,
                "max_tokens": config.max_tokens,
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "image", "source": {"type": "url", "url": url}},
                        {"type": "text", "text": OCR_PROMPT}
                    ]
                }]
            }
        }));
        ids.insert(custom_id, url.clone());
    }

    (json!({ "requests": requests }), ids, skipped)
}

fn describe_error(error: &serde_json::Value) -> String {
    let inner = error.get("error").unwrap_or(error);
    match (
        inner.get("type").and_then(|t| t.as_str()),
        inner.get("message").and_then(|m| m.as_str()),
    ) {
        (Some(kind), Some(message)) => format!("{kind}: {message}"),
        (Some(kind), None) => kind.to_string(),
        _ => error.to_string(),
    }
}

/// Map JSONL batch results back to image URLs.
fn parse_results(jsonl: &str, ids: &HashMap<String, String>) -> Vec<OcrResult> {
    jsonl
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<BatchLine>(line) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::warn!("Unparseable batch result line: {}", e);
                None
            }
        })
        .filter_map(|line| {
            let url = ids.get(&line.custom_id)?.clone();
            Some(match line.result {
                LineResult::Succeeded { message } => {
                    let text = message
                        .content
                        .into_iter()
                        .find(|b| b.kind == "text")
                        .map(|b| b.text)
                        .unwrap_or_default();
                    OcrResult::ok(url, text.trim())
                }
                LineResult::Errored { error } => OcrResult::failed(url, describe_error(&error)),
                LineResult::Canceled => OcrResult::failed(url, "request canceled"),
                LineResult::Expired => OcrResult::failed(url, "request expired"),
            })
        })
        .collect()
}

/// Anthropic batch OCR client.
pub struct AnthropicVision {
    client: reqwest::Client,
    config: VisionConfig,
}

impl AnthropicVision {
    pub fn new(client: reqwest::Client, config: VisionConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AppError::config(
                "vision api key missing (set vision.api_key or ANTHROPIC_API_KEY)",
            ));
        }
        Ok(Self { client, config })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
    }

    async fn submit(&self, body: &serde_json::Value) -> Result<BatchStatus> {
        let response = self
            .request(reqwest::Method::POST, &self.config.endpoint)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::vision(format!(
                "batch submit returned {status}: {detail}"
            )));
        }
        Ok(response.json().await?)
    }

    async fn poll(&self, batch_id: &str) -> Result<BatchStatus> {
        let url = format!("{}/{}", self.config.endpoint.trim_end_matches('/'), batch_id);
        let started = Instant::now();
        let deadline = Duration::from_secs(self.config.batch_timeout_secs);
        let interval = Duration::from_secs(self.config.poll_interval_secs);

        loop {
            let status: BatchStatus = self
                .request(reqwest::Method::GET, &url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let counts = &status.request_counts;
            log::debug!(
                "Batch {} {}: {} done, {} processing",
                batch_id,
                status.processing_status,
                counts.succeeded + counts.errored,
                counts.processing
            );

            if status.processing_status == "ended" {
                return Ok(status);
            }
            if started.elapsed() >= deadline {
                return Err(AppError::vision(format!(
                    "batch {batch_id} still {} after {}s",
                    status.processing_status,
                    deadline.as_secs()
                )));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[async_trait]
impl TextExtractor for AnthropicVision {
    async fn extract_text(&self, image_urls: &[String]) -> Result<Vec<OcrResult>> {
        let (body, ids, mut results) = build_batch(image_urls, &self.config);
        if ids.is_empty() {
            return Ok(results);
        }

        let batch = self.submit(&body).await?;
        log::info!("Submitted OCR batch {} ({} images)", batch.id, ids.len());

        let ended = self.poll(&batch.id).await?;
        let results_url = ended.results_url.ok_or_else(|| {
            AppError::vision(format!("batch {} ended without results_url", batch.id))
        })?;

        let jsonl = self
            .request(reqwest::Method::GET, &results_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        results.extend(parse_results(&jsonl, &ids));
        Ok(results)
    }
}
