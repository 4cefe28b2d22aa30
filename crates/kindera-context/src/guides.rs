// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tool usage guides injected ahead of the user turn.
//!
//! Each offered tool contributes one short guide paragraph. Guides are
//! deduplicated and ordered by the decision's tool ranking, so a request
//! offering `render_component` + `any_query` gets exactly two paragraphs.

/// Guide text for a registry tool name. Unknown names get no guide.
pub fn guide_for(tool_name: &str) -> Option<&'static str> {
    match tool_name {
        "read_records" => Some(
            "read_records: fetch rows of one entity. Pass the entity name and \
an optional filter object; the default filters for the entity are applied \
unless you override them.",
        ),
        "create_record" => Some(
            "create_record: insert one record. Every required field of the \
entity must be present in `values`; if the user has not supplied one, do \
not guess it.",
        ),
        "update_record" => Some(
            "update_record: modify existing records. `filters` selects the \
rows, `values` holds the changed fields. Never update without a filter.",
        ),
        "any_query" => Some(
            "any_query: aggregation, ordering, grouping and cross-entity \
questions. Describe the question as a structured spec (entity, metrics, \
group_by, order_by, limit) rather than raw SQL.",
        ),
        "render_component" => Some(
            "render_component: wrap query results in a UI directive. Use \
component `data-table` for row listings and `stat-card` for single \
aggregates; always pair it with the data tool that produced the rows.",
        ),
        _ => None,
    }
}

/// Assemble the guide section for a ranked tool list, deduplicated and in
/// ranking order. Empty when no offered tool has a guide.
pub fn assemble_guides(tool_names: &[&str]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    let mut out = String::new();
    for name in tool_names {
        if seen.contains(name) {
            continue;
        }
        seen.push(name);
        if let Some(guide) = guide_for(name) {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(guide);
        }
    }
    out
}
