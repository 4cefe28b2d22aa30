// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative selection rule table.
//!
//! The validator's heuristics are data: a fixed table of tagged rules, each
//! a substring pattern with a weight. Rules are loaded once and unit-tested
//! individually without touching the validator's control flow.

use serde::{Deserialize, Serialize};

/// The fixed set of tools the orchestrator can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Narrow read of a single entity with optional filters.
    ReadRecords,
    /// Create one record of an entity (required-field validated).
    CreateRecord,
    /// Update records of an entity (required-field validated).
    UpdateRecord,
    /// Generic query: aggregation, ordering, grouping, multi-entity.
    AnyQuery,
    /// Fetch data and wrap it in a UI-render directive.
    RenderComponent,
}

impl ToolName {
    /// Registry name, matching the `Tool::name()` of the built-in tools.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ReadRecords => "read_records",
            ToolName::CreateRecord => "create_record",
            ToolName::UpdateRecord => "update_record",
            ToolName::AnyQuery => "any_query",
            ToolName::RenderComponent => "render_component",
        }
    }

    /// All dispatchable tools.
    pub fn all() -> &'static [ToolName] {
        &[
            ToolName::ReadRecords,
            ToolName::CreateRecord,
            ToolName::UpdateRecord,
            ToolName::AnyQuery,
            ToolName::RenderComponent,
        ]
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One heuristic rule. All patterns match case-insensitive substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    /// An explicit ask for a rendered display (table, chart, report).
    Visualization {
        pattern: &'static str,
        weight: i32,
    },
    /// Aggregation / ordering / comparison / multi-step language that
    /// routes toward the generic query tool.
    DataQuery {
        pattern: &'static str,
        weight: i32,
    },
    /// A mutation verb that, combined with a resolved entity, selects a
    /// narrow CRUD tool.
    Entity {
        pattern: &'static str,
        tool: ToolName,
        weight: i32,
    },
}

/// The rule table. Weights are additive per category; thresholds live in
/// the validator.
pub const RULES: &[SelectionRule] = &[
    // Visualization asks.
    SelectionRule::Visualization { pattern: "表格", weight: 3 },
    SelectionRule::Visualization { pattern: "图表", weight: 3 },
    SelectionRule::Visualization { pattern: "柱状图", weight: 3 },
    SelectionRule::Visualization { pattern: "折线图", weight: 3 },
    SelectionRule::Visualization { pattern: "饼图", weight: 3 },
    SelectionRule::Visualization { pattern: "报表", weight: 2 },
    SelectionRule::Visualization { pattern: "可视化", weight: 3 },
    SelectionRule::Visualization { pattern: "展示", weight: 2 },
    SelectionRule::Visualization { pattern: "列表显示", weight: 2 },
    SelectionRule::Visualization { pattern: "table", weight: 3 },
    SelectionRule::Visualization { pattern: "chart", weight: 3 },
    SelectionRule::Visualization { pattern: "graph", weight: 3 },
    SelectionRule::Visualization { pattern: "visuali", weight: 3 },
    SelectionRule::Visualization { pattern: "report", weight: 2 },
    SelectionRule::Visualization { pattern: "dashboard", weight: 2 },
    // Generic-query language.
    SelectionRule::DataQuery { pattern: "统计", weight: 3 },
    SelectionRule::DataQuery { pattern: "排序", weight: 3 },
    SelectionRule::DataQuery { pattern: "分组", weight: 3 },
    SelectionRule::DataQuery { pattern: "汇总", weight: 3 },
    SelectionRule::DataQuery { pattern: "按", weight: 2 },
    SelectionRule::DataQuery { pattern: "比较", weight: 2 },
    SelectionRule::DataQuery { pattern: "平均", weight: 2 },
    SelectionRule::DataQuery { pattern: "最多", weight: 2 },
    SelectionRule::DataQuery { pattern: "最少", weight: 2 },
    SelectionRule::DataQuery { pattern: "人数", weight: 2 },
    SelectionRule::DataQuery { pattern: "数量", weight: 2 },
    SelectionRule::DataQuery { pattern: "然后", weight: 2 },
    SelectionRule::DataQuery { pattern: "count", weight: 3 },
    SelectionRule::DataQuery { pattern: "how many", weight: 3 },
    SelectionRule::DataQuery { pattern: "sort", weight: 3 },
    SelectionRule::DataQuery { pattern: "order by", weight: 3 },
    SelectionRule::DataQuery { pattern: "group", weight: 3 },
    SelectionRule::DataQuery { pattern: "average", weight: 2 },
    SelectionRule::DataQuery { pattern: "compare", weight: 2 },
    SelectionRule::DataQuery { pattern: "total", weight: 2 },
    SelectionRule::DataQuery { pattern: "sum ", weight: 2 },
    SelectionRule::DataQuery { pattern: "top ", weight: 2 },
    // Mutation verbs.
    SelectionRule::Entity { pattern: "创建", tool: ToolName::CreateRecord, weight: 3 },
    SelectionRule::Entity { pattern: "新增", tool: ToolName::CreateRecord, weight: 3 },
    SelectionRule::Entity { pattern: "添加", tool: ToolName::CreateRecord, weight: 3 },
    SelectionRule::Entity { pattern: "录入", tool: ToolName::CreateRecord, weight: 2 },
    SelectionRule::Entity { pattern: "修改", tool: ToolName::UpdateRecord, weight: 3 },
    SelectionRule::Entity { pattern: "更新", tool: ToolName::UpdateRecord, weight: 3 },
    SelectionRule::Entity { pattern: "编辑", tool: ToolName::UpdateRecord, weight: 2 },
    SelectionRule::Entity { pattern: "create", tool: ToolName::CreateRecord, weight: 3 },
    SelectionRule::Entity { pattern: "add ", tool: ToolName::CreateRecord, weight: 3 },
    SelectionRule::Entity { pattern: "register", tool: ToolName::CreateRecord, weight: 2 },
    SelectionRule::Entity { pattern: "update", tool: ToolName::UpdateRecord, weight: 3 },
    SelectionRule::Entity { pattern: "modify", tool: ToolName::UpdateRecord, weight: 2 },
    SelectionRule::Entity { pattern: "edit ", tool: ToolName::UpdateRecord, weight: 2 },
];

/// Total visualization weight matched in `lower`.
pub fn visualization_score(lower: &str) -> i32 {
    RULES
        .iter()
        .filter_map(|rule| match rule {
            SelectionRule::Visualization { pattern, weight } if lower.contains(pattern) => {
                Some(*weight)
            }
            _ => None,
        })
        .sum()
}

/// Total generic-query weight matched in `lower`.
pub fn data_query_score(lower: &str) -> i32 {
    RULES
        .iter()
        .filter_map(|rule| match rule {
            SelectionRule::DataQuery { pattern, weight } if lower.contains(pattern) => Some(*weight),
            _ => None,
        })
        .sum()
}

/// Best mutation rule matched in `lower`: the CRUD tool and its weight.
pub fn mutation_match(lower: &str) -> Option<(ToolName, i32)> {
    let mut best: Option<(ToolName, i32)> = None;
    for rule in RULES {
        if let SelectionRule::Entity { pattern, tool, weight } = rule
            && lower.contains(pattern)
            && best.map(|(_, w)| *weight > w).unwrap_or(true)
        {
            best = Some((*tool, *weight));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_name_round_trip() {
        for tool in ToolName::all() {
            assert!(!tool.as_str().is_empty());
        }
        assert_eq!(ToolName::AnyQuery.as_str(), "any_query");
        assert_eq!(ToolName::RenderComponent.to_string(), "render_component");
    }

    #[test]
    fn visualization_rules_fire_individually() {
        assert!(visualization_score("用表格展示") >= 5); // 表格 + 展示
        assert!(visualization_score("画一个柱状图") >= 3);
        assert!(visualization_score("show a chart") >= 3);
        assert_eq!(visualization_score("查询所有学生"), 0);
    }

    #[test]
    fn data_query_rules_fire_individually() {
        assert!(data_query_score("统计人数") >= 5);
        assert!(data_query_score("按班级排序") >= 5);
        assert!(data_query_score("how many boys are there") >= 3);
        assert_eq!(data_query_score("查询学生信息"), 0);
    }

    #[test]
    fn mutation_rules_pick_the_right_tool() {
        assert_eq!(mutation_match("新增一个班级"), Some((ToolName::CreateRecord, 3)));
        assert_eq!(mutation_match("修改学生电话"), Some((ToolName::UpdateRecord, 3)));
        assert_eq!(
            mutation_match("update the teacher record"),
            Some((ToolName::UpdateRecord, 3))
        );
        assert_eq!(mutation_match("查询所有学生"), None);
    }

    #[test]
    fn serde_tool_name_snake_case() {
        let json = serde_json::to_string(&ToolName::ReadRecords).unwrap();
        assert_eq!(json, "\"read_records\"");
    }
}
