// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording ops backend for deterministic testing.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kindera_core::{KinderaError, OpsBackend};

/// An [`OpsBackend`] that records every call and replays canned responses.
///
/// Responses are keyed by table name (read/create/update) or by the
/// `"query"` key for generic queries; unkeyed calls return an empty array.
pub struct MockBackend {
    calls: Mutex<Vec<String>>,
    responses: Mutex<HashMap<String, serde_json::Value>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
        }
    }

    /// Set the response returned for a table (or `"query"`).
    pub fn set_response(&self, key: &str, value: serde_json::Value) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(key.to_string(), value);
        }
    }

    /// Call log entries, formatted `"<op> <table-or-spec>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, entry: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(entry);
        }
    }

    fn response_for(&self, key: &str) -> serde_json::Value {
        self.responses
            .lock()
            .ok()
            .and_then(|r| r.get(key).cloned())
            .unwrap_or_else(|| serde_json::json!([]))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OpsBackend for MockBackend {
    async fn read(
        &self,
        table: &str,
        filters: &serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError> {
        self.record(format!("read {table} {filters}"));
        Ok(self.response_for(table))
    }

    async fn create(
        &self,
        table: &str,
        values: &serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError> {
        self.record(format!("create {table} {values}"));
        Ok(self.response_for(table))
    }

    async fn update(
        &self,
        table: &str,
        filters: &serde_json::Value,
        values: &serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError> {
        self.record(format!("update {table} {filters} {values}"));
        Ok(self.response_for(table))
    }

    async fn query(&self, spec: &serde_json::Value) -> Result<serde_json::Value, KinderaError> {
        self.record(format!("query {spec}"));
        Ok(self.response_for("query"))
    }
}
