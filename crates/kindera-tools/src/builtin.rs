// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The five built-in ops tools.
//!
//! All tools validate their parameters against the entity catalogue before
//! touching the backend. Mutations check required fields first and return
//! `ToolResult::MissingFields` instead of issuing a partial write; the
//! backend is never called with an incomplete record.

use std::sync::Arc;

use async_trait::async_trait;
use kindera_core::{KinderaError, OpsBackend, ToolResult};
use kindera_entity::EntityDescriptor;
use serde_json::json;
use tracing::debug;

use crate::tool::{Tool, ToolRegistry};

/// UI components `render_component` may emit.
const COMPONENTS: &[&str] = &["data-table", "stat-card", "bar-chart", "line-chart", "pie-chart"];

/// Build a registry holding all five built-in tools over one backend.
pub fn builtin_registry(backend: Arc<dyn OpsBackend>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadRecordsTool {
        backend: backend.clone(),
    }));
    registry.register(Arc::new(CreateRecordTool {
        backend: backend.clone(),
    }));
    registry.register(Arc::new(UpdateRecordTool {
        backend: backend.clone(),
    }));
    registry.register(Arc::new(AnyQueryTool {
        backend: backend.clone(),
    }));
    registry.register(Arc::new(RenderComponentTool { backend }));
    registry
}

/// Resolve the `entity` parameter to a catalogue descriptor, accepting
/// either the logical name or a natural-language synonym.
fn resolve_entity(input: &serde_json::Value) -> Result<&'static EntityDescriptor, ToolResult> {
    let Some(name) = input["entity"].as_str() else {
        return Err(validation_failure("parameter `entity` is required"));
    };
    if let Some(descriptor) = kindera_entity::lookup(name) {
        return Ok(descriptor);
    }
    if let Some(best) = kindera_entity::resolve(name).into_iter().next() {
        return Ok(best.descriptor);
    }
    Err(validation_failure(&format!("unknown entity `{name}`")))
}

fn validation_failure(message: &str) -> ToolResult {
    ToolResult::Failure {
        kind: "validation".to_string(),
        message: message.to_string(),
    }
}

/// Overlay caller filters on the entity's default filters.
fn merged_filters(descriptor: &EntityDescriptor, input: &serde_json::Value) -> serde_json::Value {
    let mut filters = descriptor.default_filters_json();
    if let (Some(base), Some(extra)) = (filters.as_object_mut(), input["filters"].as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    filters
}

/// Required fields the supplied `values` do not cover. Null and empty
/// string count as absent.
fn missing_required(
    descriptor: &EntityDescriptor,
    values: &serde_json::Value,
) -> Vec<kindera_core::FieldSpec> {
    descriptor
        .required_fields
        .iter()
        .filter(|field| {
            let value = &values[field.name];
            value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty())
        })
        .map(|field| field.to_spec())
        .collect()
}

/// Narrow read of one entity with optional filters.
pub struct ReadRecordsTool {
    backend: Arc<dyn OpsBackend>,
}

#[async_trait]
impl Tool for ReadRecordsTool {
    fn name(&self) -> &str {
        "read_records"
    }

    fn description(&self) -> &str {
        "Fetch records of one entity, optionally filtered by field values."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity": { "type": "string", "description": "Entity name, e.g. students" },
                "filters": { "type": "object", "description": "Field/value filters" }
            },
            "required": ["entity"]
        })
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<ToolResult, KinderaError> {
        let descriptor = match resolve_entity(&input) {
            Ok(d) => d,
            Err(result) => return Ok(result),
        };
        let filters = merged_filters(descriptor, &input);
        debug!(entity = descriptor.name, "read_records");
        let payload = self.backend.read(descriptor.table_name, &filters).await?;
        Ok(ToolResult::Success { payload })
    }
}

/// Create one record, with required-field validation.
pub struct CreateRecordTool {
    backend: Arc<dyn OpsBackend>,
}

#[async_trait]
impl Tool for CreateRecordTool {
    fn name(&self) -> &str {
        "create_record"
    }

    fn description(&self) -> &str {
        "Create one record of an entity. All required fields must be supplied."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity": { "type": "string" },
                "values": { "type": "object", "description": "Field values for the new record" }
            },
            "required": ["entity", "values"]
        })
    }

    fn is_mutation(&self) -> bool {
        true
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<ToolResult, KinderaError> {
        let descriptor = match resolve_entity(&input) {
            Ok(d) => d,
            Err(result) => return Ok(result),
        };
        let values = &input["values"];
        if !values.is_object() {
            return Ok(validation_failure("parameter `values` must be an object"));
        }

        let missing = missing_required(descriptor, values);
        if !missing.is_empty() {
            debug!(
                entity = descriptor.name,
                missing = missing.len(),
                "create blocked on missing fields"
            );
            return Ok(ToolResult::MissingFields { fields: missing });
        }

        let payload = self.backend.create(descriptor.table_name, values).await?;
        Ok(ToolResult::Success { payload })
    }
}

/// Update records matching a filter.
pub struct UpdateRecordTool {
    backend: Arc<dyn OpsBackend>,
}

#[async_trait]
impl Tool for UpdateRecordTool {
    fn name(&self) -> &str {
        "update_record"
    }

    fn description(&self) -> &str {
        "Update records of an entity. `filters` selects the rows, `values` holds the changes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity": { "type": "string" },
                "filters": { "type": "object" },
                "values": { "type": "object" }
            },
            "required": ["entity", "filters", "values"]
        })
    }

    fn is_mutation(&self) -> bool {
        true
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<ToolResult, KinderaError> {
        let descriptor = match resolve_entity(&input) {
            Ok(d) => d,
            Err(result) => return Ok(result),
        };
        let filters = &input["filters"];
        let values = &input["values"];

        // An unfiltered update would touch every row.
        if !filters.as_object().is_some_and(|f| !f.is_empty()) {
            return Ok(validation_failure("update requires a non-empty `filters` object"));
        }
        if !values.as_object().is_some_and(|v| !v.is_empty()) {
            return Ok(validation_failure("update requires a non-empty `values` object"));
        }

        let payload = self
            .backend
            .update(descriptor.table_name, filters, values)
            .await?;
        Ok(ToolResult::Success { payload })
    }
}

/// Generic query: aggregation, ordering, grouping, multi-entity.
pub struct AnyQueryTool {
    backend: Arc<dyn OpsBackend>,
}

#[async_trait]
impl Tool for AnyQueryTool {
    fn name(&self) -> &str {
        "any_query"
    }

    fn description(&self) -> &str {
        "Run a structured query: aggregation, ordering, grouping or cross-entity questions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity": { "type": "string" },
                "metrics": { "type": "array", "items": { "type": "string" } },
                "filters": { "type": "object" },
                "group_by": { "type": "array", "items": { "type": "string" } },
                "order_by": { "type": "array", "items": { "type": "string" } },
                "limit": { "type": "integer" }
            }
        })
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<ToolResult, KinderaError> {
        if !input.is_object() {
            return Ok(validation_failure("query spec must be an object"));
        }
        // Normalize a synonym entity name to its catalogue form when present.
        let mut spec = input;
        if spec["entity"].is_string() {
            if let Ok(descriptor) = resolve_entity(&spec) {
                spec["entity"] = json!(descriptor.table_name);
            }
        }
        let payload = self.backend.query(&spec).await?;
        Ok(ToolResult::Success { payload })
    }
}

/// Fetch data and wrap it in a UI-render directive for the front end.
pub struct RenderComponentTool {
    backend: Arc<dyn OpsBackend>,
}

#[async_trait]
impl Tool for RenderComponentTool {
    fn name(&self) -> &str {
        "render_component"
    }

    fn description(&self) -> &str {
        "Fetch data and return it with a UI directive (data-table, stat-card, charts)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "component": {
                    "type": "string",
                    "enum": COMPONENTS,
                    "description": "Which UI component to render"
                },
                "title": { "type": "string" },
                "entity": { "type": "string", "description": "Entity to read when no query is given" },
                "filters": { "type": "object" },
                "query": { "type": "object", "description": "Structured query spec for aggregates" }
            },
            "required": ["component"]
        })
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<ToolResult, KinderaError> {
        let Some(component) = input["component"].as_str() else {
            return Ok(validation_failure("parameter `component` is required"));
        };
        if !COMPONENTS.contains(&component) {
            return Ok(validation_failure(&format!(
                "unknown component `{component}`, expected one of: {}",
                COMPONENTS.join(", ")
            )));
        }

        // Data source: an explicit query spec wins over an entity read.
        let data = if input["query"].is_object() {
            self.backend.query(&input["query"]).await?
        } else if input["entity"].is_string() {
            let descriptor = match resolve_entity(&input) {
                Ok(d) => d,
                Err(result) => return Ok(result),
            };
            let filters = merged_filters(descriptor, &input);
            self.backend.read(descriptor.table_name, &filters).await?
        } else {
            return Ok(validation_failure(
                "render_component needs either `entity` or `query`",
            ));
        };

        let payload = json!({
            "ui_instruction": {
                "component": component,
                "title": input["title"].as_str().unwrap_or_default(),
            },
            "data": data,
        });
        Ok(ToolResult::Success { payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Backend spy recording calls and returning scripted values.
    struct SpyBackend {
        calls: Mutex<Vec<String>>,
        rows: serde_json::Value,
    }

    impl SpyBackend {
        fn new(rows: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                rows,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn push(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    #[async_trait]
    impl OpsBackend for SpyBackend {
        async fn read(
            &self,
            table: &str,
            filters: &serde_json::Value,
        ) -> Result<serde_json::Value, KinderaError> {
            self.push(format!("read {table} {filters}"));
            Ok(self.rows.clone())
        }

        async fn create(
            &self,
            table: &str,
            values: &serde_json::Value,
        ) -> Result<serde_json::Value, KinderaError> {
            self.push(format!("create {table} {values}"));
            Ok(json!({"id": "new-1"}))
        }

        async fn update(
            &self,
            table: &str,
            filters: &serde_json::Value,
            values: &serde_json::Value,
        ) -> Result<serde_json::Value, KinderaError> {
            self.push(format!("update {table} {filters} {values}"));
            Ok(json!({"updated": 1}))
        }

        async fn query(&self, spec: &serde_json::Value) -> Result<serde_json::Value, KinderaError> {
            self.push(format!("query {spec}"));
            Ok(self.rows.clone())
        }
    }

    #[tokio::test]
    async fn read_applies_default_filters() {
        let backend = SpyBackend::new(json!([{"name": "张三"}]));
        let tool = ReadRecordsTool {
            backend: backend.clone(),
        };
        let result = tool
            .invoke(json!({"entity": "students"}))
            .await
            .unwrap();
        assert!(matches!(result, ToolResult::Success { .. }));
        // students carries a status=active default filter.
        assert!(backend.calls()[0].contains("\"status\":\"active\""));
    }

    #[tokio::test]
    async fn read_caller_filters_override_defaults() {
        let backend = SpyBackend::new(json!([]));
        let tool = ReadRecordsTool {
            backend: backend.clone(),
        };
        tool.invoke(json!({"entity": "students", "filters": {"status": "left"}}))
            .await
            .unwrap();
        assert!(backend.calls()[0].contains("\"status\":\"left\""));
    }

    #[tokio::test]
    async fn read_accepts_synonym_entity() {
        let backend = SpyBackend::new(json!([]));
        let tool = ReadRecordsTool {
            backend: backend.clone(),
        };
        let result = tool.invoke(json!({"entity": "学生"})).await.unwrap();
        assert!(matches!(result, ToolResult::Success { .. }));
        assert!(backend.calls()[0].starts_with("read students"));
    }

    #[tokio::test]
    async fn unknown_entity_is_validation_failure() {
        let backend = SpyBackend::new(json!([]));
        let tool = ReadRecordsTool {
            backend: backend.clone(),
        };
        let result = tool
            .invoke(json!({"entity": "spaceships"}))
            .await
            .unwrap();
        match result {
            ToolResult::Failure { kind, .. } => assert_eq!(kind, "validation"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn create_with_missing_fields_does_not_touch_backend() {
        let backend = SpyBackend::new(json!([]));
        let tool = CreateRecordTool {
            backend: backend.clone(),
        };
        // classes requires name and kindergarten_id.
        let result = tool
            .invoke(json!({"entity": "classes", "values": {"name": "小一班"}}))
            .await
            .unwrap();
        match result {
            ToolResult::MissingFields { fields } => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].name, "kindergarten_id");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn create_with_all_fields_succeeds() {
        let backend = SpyBackend::new(json!([]));
        let tool = CreateRecordTool {
            backend: backend.clone(),
        };
        let result = tool
            .invoke(json!({
                "entity": "classes",
                "values": {"name": "小一班", "kindergarten_id": "kg-1"}
            }))
            .await
            .unwrap();
        assert!(matches!(result, ToolResult::Success { .. }));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn empty_string_counts_as_missing() {
        let backend = SpyBackend::new(json!([]));
        let tool = CreateRecordTool {
            backend: backend.clone(),
        };
        let result = tool
            .invoke(json!({
                "entity": "classes",
                "values": {"name": "  ", "kindergarten_id": "kg-1"}
            }))
            .await
            .unwrap();
        match result {
            ToolResult::MissingFields { fields } => assert_eq!(fields[0].name, "name"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_requires_filters() {
        let backend = SpyBackend::new(json!([]));
        let tool = UpdateRecordTool {
            backend: backend.clone(),
        };
        let result = tool
            .invoke(json!({"entity": "students", "filters": {}, "values": {"phone": "123"}}))
            .await
            .unwrap();
        assert!(matches!(result, ToolResult::Failure { .. }));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn update_with_filters_succeeds() {
        let backend = SpyBackend::new(json!([]));
        let tool = UpdateRecordTool {
            backend: backend.clone(),
        };
        let result = tool
            .invoke(json!({
                "entity": "students",
                "filters": {"id": "s-1"},
                "values": {"phone": "123"}
            }))
            .await
            .unwrap();
        assert!(matches!(result, ToolResult::Success { .. }));
    }

    #[tokio::test]
    async fn any_query_normalizes_entity() {
        let backend = SpyBackend::new(json!({"rows": []}));
        let tool = AnyQueryTool {
            backend: backend.clone(),
        };
        tool.invoke(json!({"entity": "学生", "metrics": ["count"], "group_by": ["class_id"]}))
            .await
            .unwrap();
        assert!(backend.calls()[0].contains("\"entity\":\"students\""));
    }

    #[tokio::test]
    async fn render_component_wraps_ui_instruction() {
        let backend = SpyBackend::new(json!([{"name": "张三"}]));
        let tool = RenderComponentTool {
            backend: backend.clone(),
        };
        let result = tool
            .invoke(json!({"component": "data-table", "entity": "students", "title": "学生列表"}))
            .await
            .unwrap();
        match result {
            ToolResult::Success { payload } => {
                assert_eq!(payload["ui_instruction"]["component"], "data-table");
                assert_eq!(payload["ui_instruction"]["title"], "学生列表");
                assert!(payload["data"].is_array());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn render_component_rejects_unknown_component() {
        let backend = SpyBackend::new(json!([]));
        let tool = RenderComponentTool {
            backend: backend.clone(),
        };
        let result = tool
            .invoke(json!({"component": "hologram", "entity": "students"}))
            .await
            .unwrap();
        assert!(matches!(result, ToolResult::Failure { .. }));
    }

    #[tokio::test]
    async fn render_component_prefers_query_over_entity() {
        let backend = SpyBackend::new(json!({"rows": [{"count": 12}]}));
        let tool = RenderComponentTool {
            backend: backend.clone(),
        };
        tool.invoke(json!({
            "component": "stat-card",
            "entity": "students",
            "query": {"entity": "students", "metrics": ["count"]}
        }))
        .await
        .unwrap();
        assert!(backend.calls()[0].starts_with("query"));
    }

    #[test]
    fn builtin_registry_holds_five_tools() {
        let registry = builtin_registry(SpyBackend::new(json!([])));
        assert_eq!(registry.len(), 5);
        for name in [
            "read_records",
            "create_record",
            "update_record",
            "any_query",
            "render_component",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
        assert!(registry.get("create_record").unwrap().is_mutation());
        assert!(!registry.get("read_records").unwrap().is_mutation());
    }
}
