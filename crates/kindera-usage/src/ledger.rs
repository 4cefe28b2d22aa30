// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent usage ledger backed by SQLite.
//!
//! Every model call is recorded with its token breakdown and calculated
//! cost in USD. The ledger supports daily, monthly, and per-conversation
//! totals for quota enforcement and the usage endpoint.

use kindera_core::{KinderaError, TokenUsage};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::info;

/// What kind of model call produced a usage record.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum CallKind {
    /// The main tool-use turn loop.
    Turn,
    /// A narration call over pre-fetched tool results (direct path).
    Narration,
}

/// A single usage record representing one model API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique record identifier (UUID v4).
    pub id: String,
    /// Turn that triggered this call.
    pub turn_id: String,
    /// Conversation the turn belongs to.
    pub conversation_id: String,
    /// Model identifier used.
    pub model: String,
    pub call_kind: CallKind,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cache_read_tokens: u32,
    /// Calculated cost in USD.
    pub cost_usd: f64,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

impl UsageRecord {
    pub fn new(
        turn_id: String,
        conversation_id: String,
        model: String,
        call_kind: CallKind,
        usage: &TokenUsage,
        cost_usd: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            turn_id,
            conversation_id,
            model,
            call_kind,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cache_read_tokens: usage.cache_read_tokens,
            cost_usd,
            created_at: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
        }
    }
}

/// Convert a tokio-rusqlite error into KinderaError::Storage.
fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> KinderaError {
    KinderaError::Storage {
        source: Box::new(e),
    }
}

/// Persistent usage ledger.
///
/// All operations go through the single tokio-rusqlite background thread.
pub struct UsageLedger {
    conn: tokio_rusqlite::Connection,
}

impl UsageLedger {
    /// Wrap an existing connection. The schema must already be applied.
    pub fn new(conn: tokio_rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Open (or create) a ledger at the given database path.
    pub async fn open(path: &str) -> Result<Self, KinderaError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| KinderaError::Storage {
                source: Box::new(e),
            })?;
        let ledger = Self::new(conn);
        ledger.ensure_schema().await?;
        Ok(ledger)
    }

    /// Apply the ledger schema if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), KinderaError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS usage_ledger (
                        id TEXT PRIMARY KEY NOT NULL,
                        turn_id TEXT NOT NULL DEFAULT '',
                        conversation_id TEXT NOT NULL,
                        model TEXT NOT NULL,
                        call_kind TEXT NOT NULL,
                        prompt_tokens INTEGER NOT NULL DEFAULT 0,
                        completion_tokens INTEGER NOT NULL DEFAULT 0,
                        cache_read_tokens INTEGER NOT NULL DEFAULT 0,
                        cost_usd REAL NOT NULL DEFAULT 0.0,
                        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                    );
                    CREATE INDEX IF NOT EXISTS idx_usage_ledger_conversation
                        ON usage_ledger(conversation_id);
                    CREATE INDEX IF NOT EXISTS idx_usage_ledger_created
                        ON usage_ledger(created_at);",
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Record one model call in the ledger.
    pub async fn record(&self, record: &UsageRecord) -> Result<(), KinderaError> {
        let id = record.id.clone();
        let turn_id = record.turn_id.clone();
        let conversation_id = record.conversation_id.clone();
        let model = record.model.clone();
        let call_kind = record.call_kind.to_string();
        let prompt_tokens = record.prompt_tokens;
        let completion_tokens = record.completion_tokens;
        let cache_read_tokens = record.cache_read_tokens;
        let cost_usd = record.cost_usd;
        let created_at = record.created_at.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO usage_ledger (id, turn_id, conversation_id, model, \
                     call_kind, prompt_tokens, completion_tokens, cache_read_tokens, \
                     cost_usd, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        id,
                        turn_id,
                        conversation_id,
                        model,
                        call_kind,
                        prompt_tokens,
                        completion_tokens,
                        cache_read_tokens,
                        cost_usd,
                        created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        info!(
            conversation_id = %record.conversation_id,
            model = %record.model,
            prompt_tokens = record.prompt_tokens,
            completion_tokens = record.completion_tokens,
            cost_usd = record.cost_usd,
            "usage recorded"
        );

        Ok(())
    }

    /// Total tokens (prompt + completion) for a given date (e.g. "2026-08-25").
    pub async fn daily_tokens(&self, date: &str) -> Result<u64, KinderaError> {
        let date = date.to_string();
        self.conn
            .call(move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(prompt_tokens + completion_tokens), 0) \
                     FROM usage_ledger \
                     WHERE created_at >= ?1 AND created_at < date(?1, '+1 day')",
                    rusqlite::params![date],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map(|t| t.max(0) as u64)
            .map_err(map_tr_err)
    }

    /// Sum of costs for a given date.
    pub async fn daily_cost(&self, date: &str) -> Result<f64, KinderaError> {
        let date = date.to_string();
        self.conn
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM usage_ledger \
                     WHERE created_at >= ?1 AND created_at < date(?1, '+1 day')",
                    rusqlite::params![date],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Sum of costs for a given year-month prefix (e.g. "2026-08").
    pub async fn monthly_cost(&self, year_month: &str) -> Result<f64, KinderaError> {
        let prefix = format!("{year_month}%");
        self.conn
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM usage_ledger \
                     WHERE created_at LIKE ?1",
                    rusqlite::params![prefix],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Sum of costs for a given conversation.
    pub async fn conversation_cost(&self, conversation_id: &str) -> Result<f64, KinderaError> {
        let conversation_id = conversation_id.to_string();
        self.conn
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM usage_ledger \
                     WHERE conversation_id = ?1",
                    rusqlite::params![conversation_id],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }
}
