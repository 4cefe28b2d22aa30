// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered heuristic tool selection.
//!
//! Decides which tool(s) a free-text request maps to without a model call:
//! rule-table scoring, entity cross-reference, and a prefer-generic
//! tie-break. Deterministic and infallible: total ambiguity yields the
//! generic query tool with low confidence, never an error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rules::{data_query_score, mutation_match, visualization_score, ToolName};

/// The validator's verdict for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDecision {
    /// Ranked tool list, most appropriate first. Never empty.
    pub appropriate_tools: Vec<ToolName>,
    /// Best-matching catalogue entity, when one was recognized.
    pub entity: Option<String>,
    /// Human-readable justification, used for auditing and tests.
    pub reason: String,
    /// 0.0-1.0.
    pub confidence: f32,
}

/// Conversation-side inputs to a selection decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionContext<'a> {
    /// Caller role, used for cache fingerprinting upstream.
    pub role: Option<&'a str>,
    /// Recent user messages, newest last. Sustained complex queries bias
    /// the current one toward the generic tool.
    pub recent: &'a [&'a str],
}

/// Deterministic tool selection validator.
pub struct ToolSelector {
    /// Maximum tools a single decision may carry.
    max_tools: usize,
}

impl ToolSelector {
    pub fn new(max_tools: usize) -> Self {
        Self {
            max_tools: max_tools.max(1),
        }
    }

    /// Analyze a query and return a ranked tool decision.
    ///
    /// Layering, in order of precedence:
    /// 1. mutation verb + resolved entity -> narrow CRUD tool
    /// 2. visualization ask -> render tool (backed by a data tool)
    /// 3. aggregation/ordering/comparison language -> generic query tool
    /// 4. single plain entity lookup -> narrow read tool
    /// 5. anything else -> generic query tool, low confidence
    ///
    /// Tie-break policy: when the narrow read tool and the generic tool
    /// score within one weight point, the generic tool wins. A slightly
    /// less specific but always-correct generic call beats under-fitting
    /// to a narrow tool.
    pub fn analyze(&self, query: &str, ctx: &SelectionContext<'_>) -> ToolDecision {
        let lower = query.to_lowercase();

        let viz = visualization_score(&lower);
        let mut dq = data_query_score(&lower);
        let mutation = mutation_match(&lower);
        let entities = kindera_entity::resolve(query);
        let entity = entities.first();

        // Conversation momentum: two or more recent generic-shaped queries
        // nudge an ambiguous follow-up toward the generic tool.
        let momentum = ctx
            .recent
            .iter()
            .rev()
            .take(3)
            .filter(|m| data_query_score(&m.to_lowercase()) >= 3)
            .count();
        if momentum >= 2 {
            dq += 1;
        }

        // Requests touching several entities are multi-step by nature.
        if entities.len() > 1 {
            dq += 2;
        }

        debug!(
            viz = viz,
            dq = dq,
            entities = entities.len(),
            mutation = mutation.map(|(t, _)| t.as_str()),
            "selection scores"
        );

        let decision = if let (Some((tool, weight)), Some(m)) = (mutation, entity) {
            ToolDecision {
                appropriate_tools: vec![tool],
                entity: Some(m.descriptor.name.to_string()),
                reason: format!(
                    "mutation verb (weight {weight}) targeting entity `{}` via \"{}\"",
                    m.descriptor.name, m.matched
                ),
                confidence: confidence_from(weight + m.confidence as i32 + 2),
            }
        } else if viz >= 3 {
            // Visualization first, backed by whichever data tool fits.
            let mut tools = vec![ToolName::RenderComponent];
            if dq >= 3 || entity.is_none() {
                tools.push(ToolName::AnyQuery);
            } else {
                tools.push(ToolName::ReadRecords);
            }
            ToolDecision {
                appropriate_tools: tools,
                entity: entity.map(|m| m.descriptor.name.to_string()),
                reason: format!(
                    "visualization request (weight {viz}): rendering directive with data backing"
                ),
                confidence: confidence_from(viz),
            }
        } else if dq >= 3 {
            ToolDecision {
                appropriate_tools: vec![ToolName::AnyQuery],
                entity: entity.map(|m| m.descriptor.name.to_string()),
                reason: format!(
                    "aggregation/ordering language (weight {dq}) routes to the generic query tool"
                ),
                confidence: confidence_from(dq),
            }
        } else if let Some(m) = entity {
            if dq > 0 {
                // Narrow read and generic scored close together: prefer generic.
                ToolDecision {
                    appropriate_tools: vec![ToolName::AnyQuery],
                    entity: Some(m.descriptor.name.to_string()),
                    reason: format!(
                        "entity `{}` with residual query complexity (weight {dq}): preferring generic over narrow",
                        m.descriptor.name
                    ),
                    confidence: 0.5,
                }
            } else {
                ToolDecision {
                    appropriate_tools: vec![ToolName::ReadRecords],
                    entity: Some(m.descriptor.name.to_string()),
                    reason: format!(
                        "plain lookup of entity `{}` via \"{}\": narrow read tool",
                        m.descriptor.name, m.matched
                    ),
                    confidence: (0.5 + m.confidence / 2.0).min(0.9),
                }
            }
        } else {
            ToolDecision {
                appropriate_tools: vec![ToolName::AnyQuery],
                entity: None,
                reason: "no entity recognized and no strong signals, generic fallback".to_string(),
                confidence: 0.3,
            }
        };

        let mut decision = decision;
        decision.appropriate_tools.truncate(self.max_tools);
        decision
    }
}

impl Default for ToolSelector {
    fn default() -> Self {
        Self::new(3)
    }
}

fn confidence_from(score: i32) -> f32 {
    (0.4 + score as f32 * 0.08).clamp(0.3, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(query: &str) -> ToolDecision {
        ToolSelector::default().analyze(query, &SelectionContext::default())
    }

    #[test]
    fn plain_entity_lookup_selects_narrow_read() {
        let decision = analyze("查询所有学生信息");
        assert_eq!(decision.appropriate_tools[0], ToolName::ReadRecords);
        assert_eq!(decision.entity.as_deref(), Some("students"));
        assert!(decision.confidence > 0.5, "got {}", decision.confidence);
    }

    #[test]
    fn table_display_selects_render_tool() {
        let decision = analyze("查询所有学生，用表格展示");
        assert_eq!(decision.appropriate_tools[0], ToolName::RenderComponent);
        assert_eq!(decision.entity.as_deref(), Some("students"));
    }

    #[test]
    fn aggregation_and_sort_selects_generic() {
        let decision = analyze("统计男生人数并按班级排序");
        assert_eq!(decision.appropriate_tools[0], ToolName::AnyQuery);
        assert!(decision.reason.contains("generic"));
    }

    #[test]
    fn mutation_with_entity_selects_create() {
        let decision = analyze("新增一个班级");
        assert_eq!(decision.appropriate_tools, vec![ToolName::CreateRecord]);
        assert_eq!(decision.entity.as_deref(), Some("classes"));
    }

    #[test]
    fn mutation_with_entity_selects_update() {
        let decision = analyze("修改张三的学生信息");
        assert_eq!(decision.appropriate_tools, vec![ToolName::UpdateRecord]);
        assert_eq!(decision.entity.as_deref(), Some("students"));
    }

    #[test]
    fn ambiguity_prefers_generic_over_narrow() {
        // Entity present but residual complexity language: generic wins.
        let decision = analyze("查询学生数量");
        assert_eq!(decision.appropriate_tools[0], ToolName::AnyQuery);
    }

    #[test]
    fn total_ambiguity_falls_back_to_generic_low_confidence() {
        let decision = analyze("帮我看看情况");
        assert_eq!(decision.appropriate_tools, vec![ToolName::AnyQuery]);
        assert!(decision.confidence <= 0.35);
        assert!(decision.entity.is_none());
    }

    #[test]
    fn never_returns_empty_tool_list() {
        for query in ["", "???", "hello", "学生", "统计"] {
            let decision = analyze(query);
            assert!(!decision.appropriate_tools.is_empty(), "query: {query}");
        }
    }

    #[test]
    fn max_tools_cap_applies() {
        let selector = ToolSelector::new(1);
        let decision = selector.analyze("查询所有学生，用表格展示", &SelectionContext::default());
        assert_eq!(decision.appropriate_tools.len(), 1);
    }

    #[test]
    fn momentum_biases_toward_generic() {
        let recent = ["统计每个班的人数", "按月份汇总缴费总额"];
        let ctx = SelectionContext {
            role: None,
            recent: &recent,
        };
        let with_momentum = ToolSelector::default().analyze("再看看教师的", &ctx);
        // Entity `teachers` present; momentum adds residual complexity, so
        // the generic tool wins over the narrow read.
        assert_eq!(with_momentum.appropriate_tools[0], ToolName::AnyQuery);
    }

    #[test]
    fn multi_entity_request_is_generic() {
        let decision = analyze("对比学生和教师的数量");
        assert_eq!(decision.appropriate_tools[0], ToolName::AnyQuery);
    }

    #[test]
    fn english_queries_supported() {
        let decision = analyze("show all teachers");
        assert_eq!(decision.appropriate_tools[0], ToolName::ReadRecords);
        assert_eq!(decision.entity.as_deref(), Some("teachers"));

        let decision = analyze("how many students per class, sorted");
        assert_eq!(decision.appropriate_tools[0], ToolName::AnyQuery);
    }

    #[test]
    fn reasons_are_human_readable() {
        let decision = analyze("查询所有学生信息");
        assert!(decision.reason.contains("students"));
        assert!(!decision.reason.is_empty());
    }
}
