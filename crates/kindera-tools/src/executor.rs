// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded tool execution.
//!
//! Independent calls run concurrently on a semaphore-bounded pool;
//! dependent calls (`depends_on`) run strictly after their dependency and
//! receive its payload under the `upstream` parameter key. Transient
//! failures are retried with exponential backoff, every call has a hard
//! wall-clock timeout, and the whole batch aborts promptly on cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kindera_config::model::ToolsConfig;
use kindera_core::{KinderaError, ToolCallRecord, ToolCallRequest, ToolCallStatus, ToolResult};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::tool::ToolRegistry;

/// Status snapshots sent while a batch runs, one per state change.
pub type ProgressSender = mpsc::UnboundedSender<ToolCallRecord>;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    config: ToolsConfig,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, config: ToolsConfig) -> Self {
        Self { registry, config }
    }

    /// Execute a batch of tool calls.
    ///
    /// Returns the records in request order. Every record reaches a
    /// terminal status; the only error is `Cancelled`, raised when the
    /// token fires before the batch completes.
    pub async fn execute(
        &self,
        requests: Vec<ToolCallRequest>,
        cancel: &CancellationToken,
        progress: Option<ProgressSender>,
    ) -> Result<Vec<ToolCallRecord>, KinderaError> {
        let order: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
        let known_ids: Vec<String> = order.clone();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        let mut completed: HashMap<String, ToolCallRecord> = HashMap::new();
        let mut remaining = requests;

        while !remaining.is_empty() {
            if cancel.is_cancelled() {
                return Err(KinderaError::Cancelled);
            }

            // Partition: runnable now, blocked on a pending dependency, or
            // dead because the dependency terminated without a payload.
            let mut ready = Vec::new();
            let mut blocked = Vec::new();
            let mut mark_dead = |request: &ToolCallRequest,
                                 kind: &str,
                                 message: &str,
                                 completed: &mut HashMap<String, ToolCallRecord>| {
                let record = failed_record(request, kind, message);
                if let Some(sender) = &progress {
                    let _ = sender.send(record.clone());
                }
                completed.insert(request.id.clone(), record);
            };
            for request in remaining {
                match &request.depends_on {
                    None => ready.push(request),
                    Some(dep) if !known_ids.contains(dep) => {
                        mark_dead(
                            &request,
                            "validation",
                            &format!("unknown dependency `{dep}`"),
                            &mut completed,
                        );
                    }
                    Some(dep) => match completed.get(dep) {
                        Some(dep_record) if dep_record.status == ToolCallStatus::Succeeded => {
                            ready.push(request)
                        }
                        Some(_) => {
                            mark_dead(
                                &request,
                                "tool_execution",
                                &format!("dependency `{dep}` did not succeed"),
                                &mut completed,
                            );
                        }
                        None => blocked.push(request),
                    },
                }
            }

            if ready.is_empty() {
                // A dependency cycle, or everything left waits on a call
                // that was itself marked dead this pass.
                for request in blocked {
                    if completed.contains_key(&request.id) {
                        continue;
                    }
                    mark_dead(&request, "validation", "unresolvable dependency", &mut completed);
                }
                break;
            }

            let mut join_set = JoinSet::new();
            for mut request in ready {
                // Feed the dependency's payload into the dependent call.
                if let Some(dep) = &request.depends_on
                    && let Some(ToolResult::Success { payload }) =
                        completed.get(dep).and_then(|r| r.result.as_ref())
                    && request.parameters.is_object()
                {
                    request.parameters["upstream"] = payload.clone();
                }

                let registry = self.registry.clone();
                let config = self.config.clone();
                let semaphore = semaphore.clone();
                let cancel = cancel.clone();
                let progress = progress.clone();
                join_set.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return failed_record(&request, "internal", "worker pool closed");
                        }
                    };
                    run_one(&registry, &config, request, &cancel, progress.as_ref()).await
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(record) => {
                        if let Some(sender) = &progress {
                            let _ = sender.send(record.clone());
                        }
                        completed.insert(record.id.clone(), record);
                    }
                    Err(e) => warn!(error = %e, "tool task panicked"),
                }
            }

            if cancel.is_cancelled() {
                return Err(KinderaError::Cancelled);
            }

            remaining = blocked;
        }

        Ok(order
            .iter()
            .filter_map(|id| completed.remove(id))
            .collect())
    }
}

/// Run one call to a terminal status: retry transient faults with
/// exponential backoff, enforce the per-call timeout, stop on cancellation.
async fn run_one(
    registry: &ToolRegistry,
    config: &ToolsConfig,
    request: ToolCallRequest,
    cancel: &CancellationToken,
    progress: Option<&ProgressSender>,
) -> ToolCallRecord {
    let mut record = ToolCallRecord::pending(&request);

    let Some(tool) = registry.get(&request.tool_name) else {
        record.status = ToolCallStatus::Failed;
        record.result = Some(ToolResult::Failure {
            kind: "validation".to_string(),
            message: format!("unknown tool `{}`", request.tool_name),
        });
        return record;
    };

    record.status = ToolCallStatus::Running;
    if let Some(sender) = progress {
        let _ = sender.send(record.clone());
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    loop {
        record.attempts += 1;

        let invocation = tool.invoke(request.parameters.clone());
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                record.status = ToolCallStatus::Failed;
                record.result = Some(ToolResult::Failure {
                    kind: "cancelled".to_string(),
                    message: "turn cancelled".to_string(),
                });
                return record;
            }
            outcome = tokio::time::timeout(timeout, invocation) => outcome,
        };

        let error = match outcome {
            Ok(Ok(result)) => {
                record.status = match &result {
                    ToolResult::Success { .. } => ToolCallStatus::Succeeded,
                    ToolResult::MissingFields { .. } => ToolCallStatus::MissingFields,
                    ToolResult::Failure { .. } => ToolCallStatus::Failed,
                };
                record.result = Some(result);
                return record;
            }
            Ok(Err(e)) => e,
            Err(_) => KinderaError::Timeout { duration: timeout },
        };

        if error.is_transient() && record.attempts <= config.max_retries {
            let backoff = Duration::from_millis(
                config.retry_base_ms << (record.attempts - 1).min(8),
            );
            debug!(
                tool = %request.tool_name,
                attempt = record.attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "transient tool failure, retrying"
            );
            tokio::time::sleep(backoff).await;
            continue;
        }

        record.status = ToolCallStatus::Failed;
        record.result = Some(ToolResult::Failure {
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
        return record;
    }
}

fn failed_record(request: &ToolCallRequest, kind: &str, message: &str) -> ToolCallRecord {
    let mut record = ToolCallRecord::pending(request);
    record.status = ToolCallStatus::Failed;
    record.result = Some(ToolResult::Failure {
        kind: kind.to_string(),
        message: message.to_string(),
    });
    record
}
