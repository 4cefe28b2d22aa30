// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ops backend trait: the boundary to the excluded business-logic layer.

use async_trait::async_trait;

use crate::error::KinderaError;

/// The fixed set of generic operations the business-logic API exposes.
///
/// Every tool call resolves to one of these. Parameters are validated
/// against the entity catalogue before a call is issued; the backend
/// returns either a result payload or a structured error.
#[async_trait]
pub trait OpsBackend: Send + Sync {
    /// Read records of an entity matching the given filters.
    async fn read(
        &self,
        table: &str,
        filters: &serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError>;

    /// Create a record. Required-field validation happens before this call.
    async fn create(
        &self,
        table: &str,
        values: &serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError>;

    /// Update records matching `filters` with `values`.
    async fn update(
        &self,
        table: &str,
        filters: &serde_json::Value,
        values: &serde_json::Value,
    ) -> Result<serde_json::Value, KinderaError>;

    /// Run a generic query (aggregation, ordering, grouping, joins).
    async fn query(&self, spec: &serde_json::Value) -> Result<serde_json::Value, KinderaError>;
}
