// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-Turn pipeline.
//!
//! Drives one request/response cycle end to end: tool selection, the
//! two-path execution design (direct read + narration, or the
//! model-driven tool loop), and strictly ordered push events. The
//! runner never returns an error; every failure becomes a terminal
//! `error` event.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use kindera_config::model::ModelConfig;
use kindera_context::{ContextCompressor, ModelPayload};
use kindera_core::{
    ContentBlock, FieldSpec, HistoryEntry, KinderaError, ModelMessage, ModelProvider, ModelRequest,
    ModelStreamChunk, TokenUsage, ToolCallRecord, ToolCallRequest, ToolCallStatus, ToolResult,
    TurnEvent, TurnStatus, UsageSummary,
};
use kindera_selector::{SelectionCache, SelectionContext, ToolDecision, ToolName, ToolSelector};
use kindera_tools::{ToolExecutor, ToolRegistry};
use kindera_usage::{
    CallKind, UsageLedger, UsageMonitor, UsagePressure, UsageRecord, calculate_cost, get_pricing,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Confidence floor for the direct read path.
const DIRECT_PATH_CONFIDENCE: f32 = 0.8;

/// A mutation parked on the conversation awaiting required field values.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub tool_name: String,
    pub entity: Option<String>,
    pub parameters: serde_json::Value,
    pub fields: Vec<FieldSpec>,
    pub parked_at: Instant,
}

/// Everything the runner needs to drive one turn.
pub struct TurnInput {
    pub conversation_id: String,
    pub message: String,
    pub role: Option<String>,
    pub tools_enabled: bool,
    pub history: Vec<HistoryEntry>,
    /// A parked mutation from a previous turn, if any.
    pub pending: Option<PendingMutation>,
}

/// The result the session manager folds back into conversation state.
#[derive(Debug)]
pub struct TurnOutcome {
    pub turn_id: String,
    pub status: TurnStatus,
    pub answer: String,
    /// Set when the turn parked (again) on missing fields.
    pub pending: Option<PendingMutation>,
    /// Tool calls executed during the turn, in order.
    pub records: Vec<ToolCallRecord>,
    pub usage: TokenUsage,
    /// RFC 3339 timestamp taken when the turn started.
    pub started_at: String,
}

/// Shared components the runner is wired with at startup.
pub struct TurnRunner {
    pub provider: Arc<dyn ModelProvider>,
    pub registry: Arc<ToolRegistry>,
    pub executor: Arc<ToolExecutor>,
    pub selector: Arc<ToolSelector>,
    pub cache: Arc<SelectionCache>,
    pub compressor: Arc<ContextCompressor>,
    pub ledger: Arc<UsageLedger>,
    pub monitor: Arc<UsageMonitor>,
    pub model: ModelConfig,
}

/// What `drive` hands back before the terminal event is chosen.
struct DriveResult {
    answer: String,
    pending: Option<PendingMutation>,
    records: Vec<ToolCallRecord>,
    awaiting: bool,
}

/// Token usage split by ledger row. The narration call writes its own
/// row, so the Turn row carries only the tool-loop share and daily
/// totals count each token once.
#[derive(Default)]
struct TurnUsage {
    model: TokenUsage,
    narration: TokenUsage,
}

impl TurnUsage {
    fn total(&self) -> TokenUsage {
        let mut total = self.model;
        total.add(&self.narration);
        total
    }
}

/// One consumed model stream.
#[derive(Default)]
struct StreamedRound {
    deltas: Vec<String>,
    tool_uses: Vec<kindera_core::ToolUseBlock>,
    usage: TokenUsage,
    stop_reason: Option<String>,
}

fn send(events: &mpsc::UnboundedSender<TurnEvent>, event: TurnEvent) {
    // A dropped receiver means the client went away; the cancel token
    // handles teardown, so send failures are ignored here.
    let _ = events.send(event);
}

/// Paired protocol events for one tool record. `Running` snapshots are
/// skipped; the `tool_call` goes out adjacent to its outcome so pairs
/// never interleave across concurrent calls.
fn send_tool_events(events: &mpsc::UnboundedSender<TurnEvent>, record: &ToolCallRecord) {
    if matches!(
        record.status,
        ToolCallStatus::Pending | ToolCallStatus::Running
    ) {
        return;
    }
    send(
        events,
        TurnEvent::ToolCall {
            tool_name: record.tool_name.clone(),
            parameters: record.parameters.clone(),
        },
    );
    if record.status == ToolCallStatus::MissingFields {
        let fields = match &record.result {
            Some(ToolResult::MissingFields { fields }) => fields.clone(),
            _ => Vec::new(),
        };
        send(events, TurnEvent::MissingFields { fields });
        return;
    }
    let summary = record
        .result
        .as_ref()
        .map(ToolResult::summary)
        .unwrap_or_else(|| "no result".to_string());
    send(
        events,
        TurnEvent::ToolResult {
            tool_name: record.tool_name.clone(),
            summary,
        },
    );
}

fn is_mutation_tool(tool: ToolName) -> bool {
    matches!(tool, ToolName::CreateRecord | ToolName::UpdateRecord)
}

impl TurnRunner {
    /// Run one turn to a terminal event.
    pub async fn run(
        &self,
        input: TurnInput,
        events: &mpsc::UnboundedSender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now().to_rfc3339();
        send(
            events,
            TurnEvent::Start {
                turn_id: turn_id.clone(),
            },
        );

        let mut usage = TurnUsage::default();
        let result = self
            .drive(&input, &turn_id, events, cancel, &mut usage)
            .await;

        let total = usage.total();
        let cost_usd = calculate_cost(&total, &get_pricing(&self.model.model));
        if total.total() > 0 {
            self.record_usage(&turn_id, &input.conversation_id, &usage, cost_usd)
                .await;
        }
        let usage = total;

        match result {
            Ok(drive) if drive.awaiting => {
                info!(turn_id = %turn_id, "turn parked awaiting user input");
                TurnOutcome {
                    turn_id,
                    status: TurnStatus::AwaitingUserInput,
                    answer: drive.answer,
                    pending: drive.pending,
                    records: drive.records,
                    usage,
                    started_at,
                }
            }
            Ok(drive) => {
                send(
                    events,
                    TurnEvent::Complete {
                        turn_id: turn_id.clone(),
                        usage: UsageSummary {
                            prompt_tokens: usage.prompt_tokens,
                            completion_tokens: usage.completion_tokens,
                            cost_usd,
                        },
                    },
                );
                TurnOutcome {
                    turn_id,
                    status: TurnStatus::Complete,
                    answer: drive.answer,
                    pending: None,
                    records: drive.records,
                    usage,
                    started_at,
                }
            }
            Err(KinderaError::Cancelled) => {
                send(
                    events,
                    TurnEvent::Cancelled {
                        turn_id: turn_id.clone(),
                    },
                );
                TurnOutcome {
                    turn_id,
                    status: TurnStatus::Cancelled,
                    answer: String::new(),
                    pending: None,
                    records: Vec::new(),
                    usage,
                    started_at,
                }
            }
            Err(e) => {
                warn!(turn_id = %turn_id, error = %e, "turn failed");
                send(
                    events,
                    TurnEvent::Error {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    },
                );
                TurnOutcome {
                    turn_id,
                    status: TurnStatus::Error,
                    answer: String::new(),
                    pending: None,
                    records: Vec::new(),
                    usage,
                    started_at,
                }
            }
        }
    }

    async fn drive(
        &self,
        input: &TurnInput,
        turn_id: &str,
        events: &mpsc::UnboundedSender<TurnEvent>,
        cancel: &CancellationToken,
        usage: &mut TurnUsage,
    ) -> Result<DriveResult, KinderaError> {
        if cancel.is_cancelled() {
            return Err(KinderaError::Cancelled);
        }
        // Quota exhaustion is advisory: the turn still runs, with the
        // prompt compressed to the floor via `prompt_scale`.
        if self.monitor.over_quota() {
            warn!(
                conversation_id = %input.conversation_id,
                "daily token quota reached, continuing with maximum compression"
            );
        }

        if let Some(pending) = &input.pending {
            return self
                .resume_pending(input, turn_id, pending, events, cancel, usage)
                .await;
        }

        let role = input.role.as_deref().unwrap_or("anonymous");
        let decision = self.select(&input.message, role, &input.history);
        send(
            events,
            TurnEvent::Thinking {
                text: decision.reason.clone(),
            },
        );

        let allowed: Vec<ToolName> = decision
            .appropriate_tools
            .iter()
            .copied()
            .filter(|t| role == "admin" || !is_mutation_tool(*t))
            .collect();
        if allowed.is_empty() {
            return Err(KinderaError::Validation {
                message: format!("role `{role}` is not permitted to modify records"),
            });
        }

        if input.tools_enabled
            && allowed == [ToolName::ReadRecords]
            && decision.entity.is_some()
            && decision.confidence >= DIRECT_PATH_CONFIDENCE
        {
            return self
                .direct_read(input, turn_id, &decision, events, cancel, usage)
                .await;
        }

        self.model_loop(input, &decision, &allowed, events, cancel, usage)
            .await
    }

    fn select(&self, query: &str, role: &str, history: &[HistoryEntry]) -> ToolDecision {
        if let Some(cached) = self.cache.get(query, role) {
            debug!("selection cache hit");
            return cached;
        }
        let recent: Vec<&str> = history
            .iter()
            .filter(|e| e.role == "user")
            .map(|e| e.text.as_str())
            .collect();
        let recent = &recent[recent.len().saturating_sub(3)..];
        let ctx = SelectionContext {
            role: Some(role),
            recent,
        };
        let decision = self.selector.analyze(query, &ctx);
        self.cache.put(query, role, decision.clone());
        decision
    }

    /// Direct path: the selection is confident enough to skip the model's
    /// tool round-trip. The read runs immediately and the model only
    /// narrates the result.
    async fn direct_read(
        &self,
        input: &TurnInput,
        turn_id: &str,
        decision: &ToolDecision,
        events: &mpsc::UnboundedSender<TurnEvent>,
        cancel: &CancellationToken,
        usage: &mut TurnUsage,
    ) -> Result<DriveResult, KinderaError> {
        let entity = decision.entity.clone().unwrap_or_default();
        let parameters = serde_json::json!({ "entity": entity });
        let request = ToolCallRequest {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: "read_records".to_string(),
            entity: Some(entity.clone()),
            parameters: parameters.clone(),
            depends_on: None,
        };

        send(
            events,
            TurnEvent::ToolCall {
                tool_name: "read_records".to_string(),
                parameters,
            },
        );
        let records = self.executor.execute(vec![request], cancel, None).await?;
        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| KinderaError::Internal("executor returned no record".to_string()))?;
        let result = record
            .result
            .clone()
            .ok_or_else(|| KinderaError::Internal("terminal record without result".to_string()))?;
        send(
            events,
            TurnEvent::ToolResult {
                tool_name: record.tool_name.clone(),
                summary: result.summary(),
            },
        );

        let data = match &result {
            ToolResult::Success { payload } => payload.clone(),
            other => serde_json::json!({ "error": other.summary() }),
        };
        let answer = self
            .narrate(input, turn_id, &entity, &data, events, cancel, usage)
            .await?;
        Ok(DriveResult {
            answer,
            pending: None,
            records: vec![record],
            awaiting: false,
        })
    }

    /// Narration call: no tools offered, data embedded in the final user
    /// message, deltas forwarded as `answer` events as they arrive.
    async fn narrate(
        &self,
        input: &TurnInput,
        turn_id: &str,
        entity: &str,
        data: &serde_json::Value,
        events: &mpsc::UnboundedSender<TurnEvent>,
        cancel: &CancellationToken,
        usage: &mut TurnUsage,
    ) -> Result<String, KinderaError> {
        let mut payload = self.compressor.build_scaled(
            &input.message,
            &input.history,
            &[entity],
            &["read_records"],
            self.prompt_scale(),
        );
        self.check_payload_budget(&payload)?;
        // The query message is rebuilt with the data attached so roles
        // keep alternating.
        payload.messages.pop();
        let combined = format!(
            "{}\n\nThe `read_records` tool already ran for this request. Result:\n{}\n\
             Answer the question using only this data, in the user's language.",
            input.message, data
        );
        payload.messages.push(ModelMessage::text("user", &combined));

        let request = ModelRequest {
            model: self.model.model.clone(),
            system_blocks: payload.system_blocks,
            messages: payload.messages,
            max_tokens: self.model.max_tokens,
            stream: true,
            tools: None,
        };
        let stream = self.provider.stream(request).await?;
        let round = consume_stream(stream, cancel, Some(events)).await?;
        usage.narration.add(&round.usage);
        self.record_narration(turn_id, &input.conversation_id, &round.usage)
            .await;
        Ok(round.deltas.concat())
    }

    /// Model path: the decision gates which tool definitions are offered;
    /// the model's `tool_use` requests are executed and fed back, bounded
    /// by `max_tool_rounds`.
    async fn model_loop(
        &self,
        input: &TurnInput,
        decision: &ToolDecision,
        allowed: &[ToolName],
        events: &mpsc::UnboundedSender<TurnEvent>,
        cancel: &CancellationToken,
        usage: &mut TurnUsage,
    ) -> Result<DriveResult, KinderaError> {
        let tool_names: Vec<&str> = allowed.iter().map(|t| t.as_str()).collect();
        let entities: Vec<&str> = decision.entity.as_deref().into_iter().collect();
        let payload = self.compressor.build_scaled(
            &input.message,
            &input.history,
            &entities,
            &tool_names,
            self.prompt_scale(),
        );
        self.check_payload_budget(&payload)?;

        let definitions = if input.tools_enabled {
            let defs = self.registry.definitions_for(&tool_names);
            if defs.is_empty() {
                None
            } else {
                Some(serde_json::Value::Array(defs))
            }
        } else {
            None
        };

        let system_blocks = payload.system_blocks;
        let mut messages = payload.messages;
        let mut executed: Vec<ToolCallRecord> = Vec::new();

        for round_idx in 0..=self.model.max_tool_rounds {
            // The last permitted round withdraws the tools so the model
            // must answer with what it has.
            let offer_tools = round_idx < self.model.max_tool_rounds;
            let request = ModelRequest {
                model: self.model.model.clone(),
                system_blocks: system_blocks.clone(),
                messages: messages.clone(),
                max_tokens: self.model.max_tokens,
                stream: true,
                tools: if offer_tools { definitions.clone() } else { None },
            };

            let stream = self.provider.stream(request).await?;
            let round = consume_stream(stream, cancel, None).await?;
            usage.model.add(&round.usage);

            if round.tool_uses.is_empty() {
                for delta in &round.deltas {
                    send(events, TurnEvent::Answer { text: delta.clone() });
                }
                return Ok(DriveResult {
                    answer: round.deltas.concat(),
                    pending: None,
                    records: executed,
                    awaiting: false,
                });
            }

            let reasoning = round.deltas.concat();
            if !reasoning.is_empty() {
                send(events, TurnEvent::Thinking { text: reasoning.clone() });
            }

            let requests = round
                .tool_uses
                .iter()
                .map(|tu| ToolCallRequest {
                    id: tu.id.clone(),
                    tool_name: tu.name.clone(),
                    entity: tu.input["entity"].as_str().map(str::to_string),
                    parameters: tu.input.clone(),
                    depends_on: None,
                })
                .collect();

            let records = self.execute_with_events(requests, events, cancel).await?;
            executed.extend(records.iter().cloned());

            // Every call has reported through its paired events by now;
            // the first missing-fields record parks the turn.
            if let Some(record) = records
                .iter()
                .find(|r| r.status == ToolCallStatus::MissingFields)
            {
                let fields = match &record.result {
                    Some(ToolResult::MissingFields { fields }) => fields.clone(),
                    _ => Vec::new(),
                };
                return Ok(DriveResult {
                    answer: String::new(),
                    pending: Some(PendingMutation {
                        tool_name: record.tool_name.clone(),
                        entity: record.entity.clone(),
                        parameters: record.parameters.clone(),
                        fields,
                        parked_at: Instant::now(),
                    }),
                    records: executed,
                    awaiting: true,
                });
            }

            messages.push(assistant_round_message(&reasoning, &round.tool_uses));
            messages.push(tool_results_message(&records));
        }

        // Unreachable: the final round runs without tools and returns above.
        Err(KinderaError::Internal(
            "tool round limit produced no answer".to_string(),
        ))
    }

    /// Run one tool batch, emitting each call's events as it reaches a
    /// terminal status via the executor's progress channel.
    async fn execute_with_events(
        &self,
        requests: Vec<ToolCallRequest>,
        events: &mpsc::UnboundedSender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolCallRecord>, KinderaError> {
        let (progress, mut updates) = mpsc::unbounded_channel();
        let batch = self.executor.execute(requests, cancel, Some(progress));
        tokio::pin!(batch);
        loop {
            tokio::select! {
                outcome = &mut batch => {
                    while let Ok(update) = updates.try_recv() {
                        send_tool_events(events, &update);
                    }
                    return outcome;
                }
                Some(update) = updates.recv() => send_tool_events(events, &update),
            }
        }
    }

    /// Resume path: the follow-up message supplies values for the parked
    /// mutation's missing fields. Single missing field takes the whole
    /// message as its value; several fields are parsed as `name: value`
    /// pairs. Fields still absent re-park the mutation.
    async fn resume_pending(
        &self,
        input: &TurnInput,
        turn_id: &str,
        pending: &PendingMutation,
        events: &mpsc::UnboundedSender<TurnEvent>,
        cancel: &CancellationToken,
        usage: &mut TurnUsage,
    ) -> Result<DriveResult, KinderaError> {
        let mut parameters = pending.parameters.clone();
        let filled = fill_fields(&mut parameters, &pending.fields, &input.message);
        let still_missing: Vec<FieldSpec> = pending
            .fields
            .iter()
            .filter(|f| !filled.contains(&f.name))
            .cloned()
            .collect();

        if !still_missing.is_empty() {
            send(events, TurnEvent::MissingFields {
                fields: still_missing.clone(),
            });
            return Ok(DriveResult {
                answer: String::new(),
                pending: Some(PendingMutation {
                    tool_name: pending.tool_name.clone(),
                    entity: pending.entity.clone(),
                    parameters,
                    fields: still_missing,
                    parked_at: Instant::now(),
                }),
                records: Vec::new(),
                awaiting: true,
            });
        }

        let request = ToolCallRequest {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: pending.tool_name.clone(),
            entity: pending.entity.clone(),
            parameters: parameters.clone(),
            depends_on: None,
        };
        send(
            events,
            TurnEvent::ToolCall {
                tool_name: pending.tool_name.clone(),
                parameters,
            },
        );
        let records = self.executor.execute(vec![request], cancel, None).await?;
        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| KinderaError::Internal("executor returned no record".to_string()))?;
        let result = record
            .result
            .clone()
            .ok_or_else(|| KinderaError::Internal("terminal record without result".to_string()))?;
        send(
            events,
            TurnEvent::ToolResult {
                tool_name: record.tool_name.clone(),
                summary: result.summary(),
            },
        );

        let entity = pending.entity.clone().unwrap_or_default();
        let data = match &result {
            ToolResult::Success { payload } => payload.clone(),
            other => serde_json::json!({ "error": other.summary() }),
        };
        let answer = self
            .narrate(input, turn_id, &entity, &data, events, cancel, usage)
            .await?;
        Ok(DriveResult {
            answer,
            pending: None,
            records: vec![record],
            awaiting: false,
        })
    }

    /// Terminal `BudgetExceeded` when even the compressor's minimum
    /// content overflowed the prompt budget. The overflow is counted on
    /// the monitor either way.
    fn check_payload_budget(&self, payload: &ModelPayload) -> Result<(), KinderaError> {
        if payload.over_budget {
            self.monitor.record_over_budget();
            return Err(KinderaError::BudgetExceeded {
                message: "prompt cannot fit the minimum required content".to_string(),
            });
        }
        Ok(())
    }

    /// Prompt budget multiplier from the monitor's pressure advisory.
    fn prompt_scale(&self) -> f64 {
        if self.monitor.over_quota() {
            return 0.5;
        }
        match self.monitor.pressure() {
            UsagePressure::Normal => 1.0,
            UsagePressure::Elevated => 0.85,
            UsagePressure::High => 0.7,
        }
    }

    async fn record_usage(
        &self,
        turn_id: &str,
        conversation_id: &str,
        usage: &TurnUsage,
        cost_usd: f64,
    ) {
        self.monitor.record(&usage.total(), cost_usd);

        // The narration call already wrote its own ledger row; the Turn
        // row carries only the tool-loop share.
        if usage.model.total() == 0 {
            return;
        }
        let loop_cost = calculate_cost(&usage.model, &get_pricing(&self.model.model));
        let record = UsageRecord::new(
            turn_id.to_string(),
            conversation_id.to_string(),
            self.model.model.clone(),
            CallKind::Turn,
            &usage.model,
            loop_cost,
        );
        if let Err(e) = self.ledger.record(&record).await {
            warn!(error = %e, "usage ledger write failed");
        }
    }

    async fn record_narration(&self, turn_id: &str, conversation_id: &str, usage: &TokenUsage) {
        let cost_usd = calculate_cost(usage, &get_pricing(&self.model.model));
        let record = UsageRecord::new(
            turn_id.to_string(),
            conversation_id.to_string(),
            self.model.model.clone(),
            CallKind::Narration,
            usage,
            cost_usd,
        );
        if let Err(e) = self.ledger.record(&record).await {
            warn!(error = %e, "usage ledger write failed");
        }
    }
}

/// Consumes one model stream. When `forward` is set, text deltas go out
/// immediately as `answer` events; otherwise they are buffered so the
/// caller can reclassify them once the round's shape is known.
async fn consume_stream(
    mut stream: Pin<Box<dyn Stream<Item = Result<ModelStreamChunk, KinderaError>> + Send>>,
    cancel: &CancellationToken,
    forward: Option<&mpsc::UnboundedSender<TurnEvent>>,
) -> Result<StreamedRound, KinderaError> {
    let mut round = StreamedRound::default();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(KinderaError::Cancelled),
            next = stream.next() => match next {
                Some(Ok(chunk)) => {
                    if let Some(message) = chunk.error {
                        return Err(KinderaError::UpstreamModel {
                            message,
                            transient: false,
                            source: None,
                        });
                    }
                    if let Some(text) = chunk.text {
                        if let Some(events) = forward {
                            send(events, TurnEvent::Answer { text: text.clone() });
                        }
                        round.deltas.push(text);
                    }
                    if let Some(tool_use) = chunk.tool_use {
                        round.tool_uses.push(tool_use);
                    }
                    if let Some(u) = chunk.usage {
                        round.usage = u;
                    }
                    if let Some(stop) = chunk.stop_reason {
                        round.stop_reason = Some(stop);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
    }
    Ok(round)
}

fn assistant_round_message(
    reasoning: &str,
    tool_uses: &[kindera_core::ToolUseBlock],
) -> ModelMessage {
    let mut content = Vec::new();
    if !reasoning.is_empty() {
        content.push(ContentBlock::Text {
            text: reasoning.to_string(),
        });
    }
    for tu in tool_uses {
        content.push(ContentBlock::ToolUse {
            id: tu.id.clone(),
            name: tu.name.clone(),
            input: tu.input.clone(),
        });
    }
    ModelMessage {
        role: "assistant".to_string(),
        content,
    }
}

fn tool_results_message(records: &[ToolCallRecord]) -> ModelMessage {
    let content = records
        .iter()
        .map(|record| {
            let (text, is_error) = match &record.result {
                Some(ToolResult::Success { payload }) => (payload.to_string(), false),
                Some(other) => (other.summary(), true),
                None => ("no result".to_string(), true),
            };
            ContentBlock::ToolResult {
                tool_use_id: record.id.clone(),
                content: text,
                is_error,
            }
        })
        .collect();
    ModelMessage {
        role: "user".to_string(),
        content,
    }
}

/// Merges user-supplied values into the parked parameters. Returns the
/// names of the fields that were filled.
fn fill_fields(
    parameters: &mut serde_json::Value,
    fields: &[FieldSpec],
    message: &str,
) -> Vec<String> {
    let mut filled = Vec::new();
    let message = message.trim();
    if message.is_empty() {
        return filled;
    }

    // Mutation tools carry field values nested under `values`.
    let nested = parameters
        .get("values")
        .is_some_and(serde_json::Value::is_object);
    let target = if nested {
        &mut parameters["values"]
    } else {
        &mut *parameters
    };

    if fields.len() == 1 {
        let name = fields[0].name.clone();
        target[&name] = serde_json::Value::String(message.to_string());
        filled.push(name);
        return filled;
    }

    for segment in message.split(['\n', ',', '，', ';', '；']) {
        let Some((key, value)) = segment
            .split_once([':', '：', '='])
            .map(|(k, v)| (k.trim(), v.trim()))
        else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        if let Some(field) = fields.iter().find(|f| f.name == key) {
            target[&field.name] = serde_json::Value::String(value.to_string());
            filled.push(field.name.clone());
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindera_config::model::{ContextConfig, SelectorConfig, ToolsConfig, UsageConfig};
    use kindera_test_utils::{text_response, tool_use_response, MockBackend, MockProvider};
    use std::time::Duration;

    async fn runner_with(provider: Arc<MockProvider>, backend: Arc<MockBackend>) -> TurnRunner {
        let registry = Arc::new(kindera_tools::builtin_registry(backend));
        let selector_cfg = SelectorConfig::default();
        let ledger = UsageLedger::open(":memory:").await.unwrap();
        TurnRunner {
            provider,
            registry: Arc::clone(&registry),
            executor: Arc::new(ToolExecutor::new(registry, ToolsConfig::default())),
            selector: Arc::new(ToolSelector::new(selector_cfg.max_tools)),
            cache: Arc::new(SelectionCache::new(
                selector_cfg.cache_capacity,
                Duration::from_secs(selector_cfg.cache_ttl_secs),
            )),
            compressor: Arc::new(ContextCompressor::new("kindera", &ContextConfig::default())),
            ledger: Arc::new(ledger),
            monitor: Arc::new(UsageMonitor::new(&UsageConfig::default())),
            model: ModelConfig {
                api_key: Some("test".into()),
                ..ModelConfig::default()
            },
        }
    }

    fn input(message: &str, role: Option<&str>) -> TurnInput {
        TurnInput {
            conversation_id: "conv-1".to_string(),
            message: message.to_string(),
            role: role.map(str::to_string),
            tools_enabled: true,
            history: Vec::new(),
            pending: None,
        }
    }

    async fn collect(
        runner: &TurnRunner,
        input: TurnInput,
    ) -> (TurnOutcome, Vec<TurnEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let outcome = runner.run(input, &tx, &cancel).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (outcome, events)
    }

    fn event_names(events: &[TurnEvent]) -> Vec<&'static str> {
        events.iter().map(TurnEvent::event_name).collect()
    }

    #[tokio::test]
    async fn plain_question_streams_answer() {
        let provider = Arc::new(MockProvider::with_responses(vec![text_response("今天没有安排。")]));
        let runner = runner_with(provider, Arc::new(MockBackend::new())).await;

        let (outcome, events) = collect(&runner, input("今天有什么安排吗", None)).await;

        assert_eq!(outcome.status, TurnStatus::Complete);
        assert_eq!(outcome.answer, "今天没有安排。");
        let names = event_names(&events);
        assert_eq!(names.first(), Some(&"start"));
        assert!(names.contains(&"thinking"));
        assert!(names.contains(&"answer"));
        assert_eq!(names.last(), Some(&"complete"));
    }

    #[tokio::test]
    async fn direct_path_skips_model_tool_loop() {
        let provider = Arc::new(MockProvider::with_responses(vec![text_response("共有 1 名学生。")]));
        let backend = Arc::new(MockBackend::new());
        backend.set_response("students", serde_json::json!([{"name": "张三"}]));
        let runner = runner_with(provider, Arc::clone(&backend)).await;

        let (outcome, events) = collect(&runner, input("查询所有学生信息", None)).await;

        assert_eq!(outcome.status, TurnStatus::Complete);
        let names = event_names(&events);
        assert!(names.contains(&"tool_call"));
        assert!(names.contains(&"tool_result"));
        assert!(backend.calls().iter().any(|c| c.starts_with("read students")));
    }

    #[tokio::test]
    async fn narration_tokens_are_ledgered_once() {
        let provider = Arc::new(MockProvider::with_responses(vec![text_response("共有 1 名学生。")]));
        let backend = Arc::new(MockBackend::new());
        backend.set_response("students", serde_json::json!([{"name": "张三"}]));
        let runner = runner_with(provider, Arc::clone(&backend)).await;

        let (outcome, _) = collect(&runner, input("查询所有学生信息", None)).await;
        assert_eq!(outcome.status, TurnStatus::Complete);
        assert!(outcome.usage.total() > 0);

        // The ledger holds the narration row only; daily totals match
        // the turn's own accounting instead of doubling it.
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let ledgered = runner.ledger.daily_tokens(&today).await.unwrap();
        let turn_total = (outcome.usage.prompt_tokens + outcome.usage.completion_tokens) as u64;
        assert_eq!(ledgered, turn_total);
    }

    #[tokio::test]
    async fn model_loop_executes_tool_and_feeds_results_back() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            tool_use_response(
                Some("需要统计数据"),
                "toolu_1",
                "any_query",
                serde_json::json!({"entity": "students", "aggregate": "count"}),
            ),
            text_response("共有 0 名男生。"),
        ]));
        let backend = Arc::new(MockBackend::new());
        let runner = runner_with(provider, Arc::clone(&backend)).await;

        let (outcome, events) =
            collect(&runner, input("统计男生人数并按班级排序", None)).await;

        assert_eq!(outcome.status, TurnStatus::Complete);
        assert_eq!(outcome.answer, "共有 0 名男生。");
        let names = event_names(&events);
        let tool_call_idx = names.iter().position(|n| *n == "tool_call").unwrap();
        let tool_result_idx = names.iter().position(|n| *n == "tool_result").unwrap();
        let answer_idx = names.iter().position(|n| *n == "answer").unwrap();
        assert!(tool_call_idx < tool_result_idx);
        assert!(tool_result_idx < answer_idx);
        assert!(backend.calls().iter().any(|c| c.starts_with("query")));
    }

    #[tokio::test]
    async fn multi_tool_round_pairs_each_call_with_its_result() {
        let mut first = tool_use_response(
            Some("需要两组数据"),
            "toolu_1",
            "any_query",
            serde_json::json!({"entity": "students", "aggregate": "count"}),
        );
        first.content.push(ContentBlock::ToolUse {
            id: "toolu_2".to_string(),
            name: "any_query".to_string(),
            input: serde_json::json!({"entity": "classes", "aggregate": "count"}),
        });
        let provider = Arc::new(MockProvider::with_responses(vec![
            first,
            text_response("两项统计都完成了。"),
        ]));
        let backend = Arc::new(MockBackend::new());
        let runner = runner_with(provider, Arc::clone(&backend)).await;

        let (outcome, events) =
            collect(&runner, input("统计学生和班级的人数排序对比", None)).await;

        assert_eq!(outcome.status, TurnStatus::Complete);
        assert_eq!(outcome.records.len(), 2);
        let names = event_names(&events);
        assert_eq!(names.iter().filter(|n| **n == "tool_call").count(), 2);
        assert_eq!(names.iter().filter(|n| **n == "tool_result").count(), 2);
        // Each tool_call is immediately followed by its own outcome.
        for (i, name) in names.iter().enumerate() {
            if *name == "tool_call" {
                assert!(
                    matches!(names.get(i + 1), Some(&"tool_result") | Some(&"missing_fields")),
                    "unpaired tool_call at index {i}: {names:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn mixed_batch_reports_every_outcome_before_parking() {
        let mut first = tool_use_response(
            None,
            "toolu_1",
            "create_record",
            serde_json::json!({"entity": "classes", "values": {"name": "向日葵班"}}),
        );
        first.content.push(ContentBlock::ToolUse {
            id: "toolu_2".to_string(),
            name: "any_query".to_string(),
            input: serde_json::json!({"entity": "classes"}),
        });
        let provider = Arc::new(MockProvider::with_responses(vec![first]));
        let backend = Arc::new(MockBackend::new());
        let runner = runner_with(provider, Arc::clone(&backend)).await;

        let (outcome, events) =
            collect(&runner, input("新增一个班级，再查一下现有班级", Some("admin"))).await;

        assert_eq!(outcome.status, TurnStatus::AwaitingUserInput);
        assert_eq!(outcome.records.len(), 2);
        let names = event_names(&events);
        assert!(names.contains(&"missing_fields"));
        // The query that ran alongside the parked mutation still reported.
        assert!(names.contains(&"tool_result"));
    }

    #[tokio::test]
    async fn tool_result_round_trip_reaches_second_request() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            tool_use_response(
                None,
                "toolu_1",
                "any_query",
                serde_json::json!({"entity": "students"}),
            ),
            text_response("done"),
        ]));
        let backend = Arc::new(MockBackend::new());
        backend.set_response("query", serde_json::json!([{"count": 7}]));
        let mock = Arc::clone(&provider);
        let runner = runner_with(provider, Arc::clone(&backend)).await;

        let (outcome, _) = collect(&runner, input("统计每个班级的人数排序对比", None)).await;
        assert_eq!(outcome.status, TurnStatus::Complete);

        let requests = mock.requests().await;
        assert_eq!(requests.len(), 2);
        // First call offered tool definitions, the follow-up fed the
        // tool result back as a user message.
        assert!(requests[0].tools.is_some());
        let followup = requests[1].messages.iter().rev().take(2).any(|m| {
            m.role == "user"
                && m.content
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolResult { content, .. } if content.contains("7")))
        });
        assert!(followup);
    }

    #[tokio::test]
    async fn missing_fields_parks_the_mutation() {
        let provider = Arc::new(MockProvider::with_responses(vec![tool_use_response(
            None,
            "toolu_1",
            "create_record",
            serde_json::json!({"entity": "classes", "values": {"name": "向日葵班"}}),
        )]));
        let backend = Arc::new(MockBackend::new());
        let runner = runner_with(provider, Arc::clone(&backend)).await;

        let (outcome, events) = collect(&runner, input("新增一个班级", Some("admin"))).await;

        assert_eq!(outcome.status, TurnStatus::AwaitingUserInput);
        let pending = outcome.pending.unwrap();
        assert_eq!(pending.tool_name, "create_record");
        assert!(!pending.fields.is_empty());
        assert!(event_names(&events).contains(&"missing_fields"));
        // No create reached the backend.
        assert!(backend.calls().iter().all(|c| !c.starts_with("create")));
    }

    #[tokio::test]
    async fn non_admin_mutation_is_rejected() {
        let provider = Arc::new(MockProvider::new());
        let runner = runner_with(provider, Arc::new(MockBackend::new())).await;

        let (outcome, events) = collect(&runner, input("新增一个班级", Some("teacher"))).await;

        assert_eq!(outcome.status, TurnStatus::Error);
        let last = events.last().unwrap();
        match last {
            TurnEvent::Error { kind, .. } => assert_eq!(kind, "validation"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resume_fills_single_field_and_executes() {
        let provider = Arc::new(MockProvider::with_responses(vec![text_response("班级已创建。")]));
        let backend = Arc::new(MockBackend::new());
        backend.set_response("classes", serde_json::json!({"id": 9}));
        let runner = runner_with(provider, Arc::clone(&backend)).await;

        let mut turn = input("kg-1", Some("admin"));
        turn.pending = Some(PendingMutation {
            tool_name: "create_record".to_string(),
            entity: Some("classes".to_string()),
            parameters: serde_json::json!({"entity": "classes", "values": {"name": "向日葵班"}}),
            fields: vec![FieldSpec {
                name: "kindergarten_id".to_string(),
                field_type: "id".to_string(),
                description: "Kindergarten the class belongs to".to_string(),
            }],
            parked_at: Instant::now(),
        });

        let (outcome, events) = collect(&runner, turn).await;

        assert_eq!(outcome.status, TurnStatus::Complete);
        assert!(outcome.pending.is_none());
        assert!(backend.calls().iter().any(|c| c.starts_with("create classes")));
        let names = event_names(&events);
        assert!(names.contains(&"tool_call"));
        assert!(names.contains(&"tool_result"));
    }

    #[tokio::test]
    async fn resume_with_unfilled_fields_reparks() {
        let provider = Arc::new(MockProvider::new());
        let backend = Arc::new(MockBackend::new());
        let runner = runner_with(provider, Arc::clone(&backend)).await;

        let mut turn = input("名称: 向日葵班", Some("admin"));
        turn.pending = Some(PendingMutation {
            tool_name: "create_record".to_string(),
            entity: Some("classes".to_string()),
            parameters: serde_json::json!({"entity": "classes", "values": {}}),
            fields: vec![
                FieldSpec {
                    name: "name".to_string(),
                    field_type: "string".to_string(),
                    description: String::new(),
                },
                FieldSpec {
                    name: "kindergarten_id".to_string(),
                    field_type: "id".to_string(),
                    description: String::new(),
                },
            ],
        parked_at: Instant::now(),
        });

        let (outcome, _) = collect(&runner, turn).await;

        assert_eq!(outcome.status, TurnStatus::AwaitingUserInput);
        let pending = outcome.pending.unwrap();
        assert_eq!(pending.fields.len(), 2);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn exhausted_quota_compresses_but_does_not_block() {
        let provider = Arc::new(MockProvider::with_responses(vec![text_response("好的。")]));
        let backend = Arc::new(MockBackend::new());
        let mut runner = runner_with(provider, backend).await;
        runner.monitor = Arc::new(UsageMonitor::new(&UsageConfig {
            daily_token_quota: Some(0),
            ..UsageConfig::default()
        }));

        let (outcome, events) = collect(&runner, input("今天有什么安排吗", None)).await;

        assert_eq!(outcome.status, TurnStatus::Complete);
        assert_eq!(event_names(&events).last(), Some(&"complete"));
    }

    #[tokio::test]
    async fn prompt_floor_overflow_is_a_budget_error() {
        let provider = Arc::new(MockProvider::new());
        let mut runner = runner_with(provider, Arc::new(MockBackend::new())).await;
        runner.compressor = Arc::new(ContextCompressor::new(
            "kindera",
            &ContextConfig {
                prompt_budget: 64,
                min_history_tokens: 16,
                max_history_entries: 4,
            },
        ));

        let (outcome, events) =
            collect(&runner, input("统计每个班级的人数排序对比", None)).await;

        assert_eq!(outcome.status, TurnStatus::Error);
        match events.last().unwrap() {
            TurnEvent::Error { kind, .. } => assert_eq!(kind, "budget_exceeded"),
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(runner.monitor.stats().over_budget_prompts, 1);
    }

    #[tokio::test]
    async fn pre_cancelled_turn_emits_cancelled() {
        let provider = Arc::new(MockProvider::new());
        let runner = runner_with(provider, Arc::new(MockBackend::new())).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = runner.run(input("查询所有学生", None), &tx, &cancel).await;
        drop(tx);

        assert_eq!(outcome.status, TurnStatus::Cancelled);
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(event_names(&events), vec!["start", "cancelled"]);
    }

    #[test]
    fn fill_fields_parses_pairs() {
        let mut params = serde_json::json!({"entity": "classes"});
        let fields = vec![
            FieldSpec {
                name: "name".to_string(),
                field_type: "string".to_string(),
                description: String::new(),
            },
            FieldSpec {
                name: "kindergarten_id".to_string(),
                field_type: "id".to_string(),
                description: String::new(),
            },
        ];
        let filled = fill_fields(&mut params, &fields, "name: 向日葵班，kindergarten_id：kg-1");
        assert_eq!(filled.len(), 2);
        assert_eq!(params["name"], "向日葵班");
        assert_eq!(params["kindergarten_id"], "kg-1");
    }

    #[test]
    fn fill_fields_single_field_takes_whole_message() {
        let mut params = serde_json::json!({});
        let fields = vec![FieldSpec {
            name: "kindergarten_id".to_string(),
            field_type: "id".to_string(),
            description: String::new(),
        }];
        let filled = fill_fields(&mut params, &fields, "  kg-7  ");
        assert_eq!(filled, vec!["kindergarten_id"]);
        assert_eq!(params["kindergarten_id"], "kg-7");
    }

    #[test]
    fn fill_fields_targets_the_nested_values_object() {
        let mut params = serde_json::json!({"entity": "classes", "values": {"name": "小一班"}});
        let fields = vec![FieldSpec {
            name: "kindergarten_id".to_string(),
            field_type: "id".to_string(),
            description: String::new(),
        }];
        let filled = fill_fields(&mut params, &fields, "kg-1");
        assert_eq!(filled, vec!["kindergarten_id"]);
        assert_eq!(params["values"]["kindergarten_id"], "kg-1");
        assert_eq!(params["values"]["name"], "小一班");
    }
}
