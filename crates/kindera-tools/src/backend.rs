// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP implementation of [`OpsBackend`] against the business-logic API.
//!
//! All four operations map to POST endpoints under `/api/ops/`. 4xx
//! responses become validation errors (not retryable); 5xx and transport
//! failures become transient backend errors the executor may retry.

use async_trait::async_trait;
use kindera_config::model::OpsConfig;
use kindera_core::{KinderaError, OpsBackend};
use serde_json::json;
use tracing::debug;

pub struct HttpOpsBackend {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpOpsBackend {
    pub fn new(config: &OpsConfig) -> Result<Self, KinderaError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| KinderaError::Internal(format!("http client init failed: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    async fn post(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError> {
        let url = format!("{}/api/ops/{endpoint}", self.base_url);
        debug!(url = %url, "ops backend call");

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| KinderaError::Backend {
            source: Box::new(e),
        })?;

        let status = response.status();
        if status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(KinderaError::Validation {
                message: format!("ops API rejected the call ({status}): {message}"),
            });
        }
        if !status.is_success() {
            return Err(KinderaError::Backend {
                source: format!("ops API returned {status}").into(),
            });
        }

        response.json().await.map_err(|e| KinderaError::Backend {
            source: Box::new(e),
        })
    }
}

#[async_trait]
impl OpsBackend for HttpOpsBackend {
    async fn read(
        &self,
        table: &str,
        filters: &serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError> {
        self.post("read", json!({"table": table, "filters": filters}))
            .await
    }

    async fn create(
        &self,
        table: &str,
        values: &serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError> {
        self.post("create", json!({"table": table, "values": values}))
            .await
    }

    async fn update(
        &self,
        table: &str,
        filters: &serde_json::Value,
        values: &serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError> {
        self.post(
            "update",
            json!({"table": table, "filters": filters, "values": values}),
        )
        .await
    }

    async fn query(&self, spec: &serde_json::Value) -> Result<serde_json::Value, KinderaError> {
        self.post("query", json!({"spec": spec})).await
    }
}
