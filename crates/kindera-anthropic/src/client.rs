// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! Handles authentication headers, request dispatch, and retry with
//! backoff for transient upstream failures (429, 500, 503, 529).

use std::time::Duration;

use kindera_config::model::ModelConfig;
use kindera_core::KinderaError;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, MessageRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Resolves the API key: explicit config value first, then the
/// `ANTHROPIC_API_KEY` environment variable.
pub fn resolve_api_key(config: &ModelConfig) -> Result<String, KinderaError> {
    if let Some(key) = &config.api_key {
        if !key.is_empty() {
            return Ok(key.clone());
        }
    }
    match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(KinderaError::Config(
            "no Anthropic API key: set model.api_key or ANTHROPIC_API_KEY".to_string(),
        )),
    }
}

/// Messages API client with authentication and retry policy.
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl AnthropicClient {
    pub fn new(config: &ModelConfig) -> Result<Self, KinderaError> {
        let api_key = resolve_api_key(config)?;

        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(&api_key)
            .map_err(|_| KinderaError::Config("API key contains invalid characters".into()))?;
        headers.insert("x-api-key", key_value);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KinderaError::Internal(format!("http client init failed: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// POSTs a request to `/v1/messages`, retrying transient upstream
    /// failures with linear backoff. Returns the raw response so callers
    /// choose between JSON decoding and SSE streaming.
    pub async fn send(&self, request: &MessageRequest) -> Result<reqwest::Response, KinderaError> {
        let url = format!("{}/v1/messages", self.base_url);
        let mut attempt: u32 = 0;

        loop {
            debug!(model = %request.model, stream = request.stream, attempt, "messages API call");

            let response = self
                .http
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(|e| KinderaError::UpstreamModel {
                    message: format!("request to Anthropic API failed: {e}"),
                    transient: true,
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let transient = is_transient_status(status);
            if transient && attempt < self.max_retries {
                attempt += 1;
                warn!(status = %status, attempt, "transient upstream failure, retrying");
                tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("Anthropic API returned {status}"));
            return Err(KinderaError::UpstreamModel {
                message,
                transient,
                source: None,
            });
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}
