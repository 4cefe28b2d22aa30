// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation registry and single-flight turn dispatch.
//!
//! One [`SessionManager`] owns all conversation state: bounded history
//! windows, parked mutations, and the set of turns currently in flight.
//! A second message for a conversation whose turn is non-terminal is
//! rejected with `Busy`; state checks never hold a lock across I/O.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kindera_config::model::AgentConfig;
use kindera_core::{AssistantRequest, HistoryEntry, KinderaError, Turn, TurnEvent, TurnStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::turn::{PendingMutation, TurnInput, TurnRunner};

/// Upper bound on stored history entries per conversation. The
/// compressor windows further at prompt-build time.
const MAX_STORED_HISTORY: usize = 200;

/// Upper bound on archived turn records per conversation.
const MAX_ARCHIVED_TURNS: usize = 50;

/// Per-conversation state owned by the manager (sole writer).
struct ConversationState {
    history: Vec<HistoryEntry>,
    /// Finished turns with their tool-call records, newest last.
    turns: Vec<Turn>,
    pending: Option<PendingMutation>,
    last_active: Instant,
}

impl ConversationState {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            turns: Vec::new(),
            pending: None,
            last_active: Instant::now(),
        }
    }
}

/// Handle returned to the gateway for one accepted turn.
#[derive(Debug)]
pub struct TurnHandle {
    /// Ordered push events; closes after the terminal event.
    pub events: mpsc::UnboundedReceiver<TurnEvent>,
    /// Cancels the turn (client disconnect or explicit abort).
    pub cancel: CancellationToken,
}

/// Conversation registry and turn dispatcher.
pub struct SessionManager {
    runner: Arc<TurnRunner>,
    conversations: DashMap<String, ConversationState>,
    active: DashMap<String, CancellationToken>,
    tracker: TaskTracker,
    accepting: AtomicBool,
    max_conversations: usize,
    pending_timeout: Duration,
}

impl SessionManager {
    pub fn new(runner: Arc<TurnRunner>, config: &AgentConfig) -> Self {
        Self {
            runner,
            conversations: DashMap::new(),
            active: DashMap::new(),
            tracker: TaskTracker::new(),
            accepting: AtomicBool::new(true),
            max_conversations: config.max_conversations,
            pending_timeout: Duration::from_secs(config.pending_input_timeout_secs),
        }
    }

    /// Accept one inbound message and spawn its turn.
    ///
    /// Errors: `Busy` when the conversation already has a turn in
    /// flight; `Internal` during shutdown.
    pub fn handle(self: &Arc<Self>, request: AssistantRequest) -> Result<TurnHandle, KinderaError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(KinderaError::Internal(
                "session manager is shutting down".to_string(),
            ));
        }

        let conversation_id = request.conversation_id.clone();
        let cancel = CancellationToken::new();
        match self.active.entry(conversation_id.clone()) {
            Entry::Occupied(_) => {
                return Err(KinderaError::Busy { conversation_id });
            }
            Entry::Vacant(slot) => {
                slot.insert(cancel.clone());
            }
        }

        let (history, pending) = self.checkout_state(&conversation_id);

        let (role, tools_enabled) = request
            .context
            .as_ref()
            .map(|c| (c.role.clone(), c.tools_enabled))
            .unwrap_or((None, true));

        let input = TurnInput {
            conversation_id: conversation_id.clone(),
            message: request.message.clone(),
            role,
            tools_enabled,
            history,
            pending,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Arc::clone(self);
        let runner = Arc::clone(&self.runner);
        let token = cancel.clone();
        let message = request.message;
        self.tracker.spawn(async move {
            let outcome = runner.run(input, &tx, &token).await;
            debug!(
                conversation_id = %conversation_id,
                turn_id = %outcome.turn_id,
                status = %outcome.status,
                "turn finished"
            );
            manager.finish_turn(&conversation_id, &message, outcome);
        });

        Ok(TurnHandle { events: rx, cancel })
    }

    /// Cancel the active turn for a conversation, if any.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        match self.active.get(conversation_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of conversations currently tracked.
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Number of turns currently in flight.
    pub fn active_turns(&self) -> usize {
        self.active.len()
    }

    /// Stop accepting new turns and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.tracker.close();
        info!(active = self.active.len(), "draining in-flight turns");
        self.tracker.wait().await;
    }

    /// Snapshot history and take the parked mutation (resumed at most
    /// once). An expired parked mutation is dropped.
    fn checkout_state(&self, conversation_id: &str) -> (Vec<HistoryEntry>, Option<PendingMutation>) {
        if let Some(mut state) = self.conversations.get_mut(conversation_id) {
            state.last_active = Instant::now();
            let mut pending = state.pending.take();
            if let Some(p) = &pending {
                if p.parked_at.elapsed() >= self.pending_timeout {
                    warn!(
                        conversation_id = %conversation_id,
                        tool = %p.tool_name,
                        "parked mutation expired, discarding"
                    );
                    pending = None;
                }
            }
            return (state.history.clone(), pending);
        }

        self.evict_for_capacity();
        self.conversations
            .insert(conversation_id.to_string(), ConversationState::new());
        (Vec::new(), None)
    }

    /// Drop the least-recently-active idle conversation when at capacity.
    fn evict_for_capacity(&self) {
        if self.conversations.len() < self.max_conversations {
            return;
        }
        let oldest = self
            .conversations
            .iter()
            .filter(|entry| !self.active.contains_key(entry.key()))
            .min_by_key(|entry| entry.value().last_active)
            .map(|entry| entry.key().clone());
        match oldest {
            Some(key) => {
                debug!(conversation_id = %key, "evicting idle conversation at capacity");
                self.conversations.remove(&key);
            }
            None => {
                warn!(
                    limit = self.max_conversations,
                    "conversation capacity reached with no idle conversation to evict"
                );
            }
        }
    }

    /// Fold the turn outcome back into conversation state. Partial
    /// results from failed or cancelled turns are discarded.
    fn finish_turn(&self, conversation_id: &str, message: &str, outcome: crate::turn::TurnOutcome) {
        if let Some(mut state) = self.conversations.get_mut(conversation_id) {
            state.last_active = Instant::now();
            match outcome.status {
                TurnStatus::Complete => {
                    state.history.push(HistoryEntry {
                        role: "user".to_string(),
                        text: message.to_string(),
                        summarized: false,
                    });
                    state.history.push(HistoryEntry {
                        role: "assistant".to_string(),
                        text: outcome.answer.clone(),
                        summarized: false,
                    });
                    state.pending = None;
                }
                TurnStatus::AwaitingUserInput => {
                    state.history.push(HistoryEntry {
                        role: "user".to_string(),
                        text: message.to_string(),
                        summarized: false,
                    });
                    state.pending = outcome.pending;
                }
                _ => {}
            }
            let len = state.history.len();
            if len > MAX_STORED_HISTORY {
                state.history.drain(..len - MAX_STORED_HISTORY);
            }

            if outcome.status != TurnStatus::AwaitingUserInput {
                state.turns.push(Turn {
                    id: outcome.turn_id,
                    conversation_id: conversation_id.to_string(),
                    status: outcome.status,
                    tool_calls: outcome.records,
                    answer: outcome.answer,
                    created_at: outcome.started_at,
                    completed_at: Some(chrono::Utc::now().to_rfc3339()),
                });
                let len = state.turns.len();
                if len > MAX_ARCHIVED_TURNS {
                    state.turns.drain(..len - MAX_ARCHIVED_TURNS);
                }
            }
        }
        self.active.remove(conversation_id);
    }
}
