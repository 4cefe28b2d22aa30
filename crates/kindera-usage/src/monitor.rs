// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory usage monitoring with a daily token quota.
//!
//! The monitor keeps running totals and a rolling window of per-turn token
//! counts. It emits a `tracing::warn` when daily usage crosses the alert
//! threshold. Its coupling to the turn pipeline is advisory only: over
//! quota, callers compress prompts harder, they do not reject turns. On
//! restart, `from_ledger()` re-hydrates today's total from the persistent
//! ledger so the advisory survives process restarts.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{Datelike, Utc};
use kindera_config::model::UsageConfig;
use kindera_core::{KinderaError, TokenUsage};
use serde::Serialize;
use tracing::warn;

use crate::ledger::UsageLedger;

/// Coarse load signal exposed to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePressure {
    Normal,
    Elevated,
    High,
}

#[derive(Debug)]
struct Inner {
    daily_tokens: u64,
    /// Day-of-year for daily reset detection.
    current_day: u32,
    totals: TokenUsage,
    total_cost_usd: f64,
    turns: u64,
    /// Prompts whose minimum content overflowed the budget.
    over_budget_prompts: u64,
    /// Per-turn token counts, newest last.
    window: VecDeque<u64>,
}

/// Shared usage monitor. All methods take `&self`; callers wrap it in `Arc`.
pub struct UsageMonitor {
    quota: Option<u64>,
    alert_threshold: f64,
    window_size: usize,
    inner: Mutex<Inner>,
}

/// Snapshot served by the usage endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub daily_tokens: u64,
    pub daily_quota: Option<u64>,
    pub total_prompt_tokens: u32,
    pub total_completion_tokens: u32,
    pub total_cache_read_tokens: u32,
    pub total_cost_usd: f64,
    pub turns: u64,
    /// Prompts that could not fit their minimum content in the budget.
    pub over_budget_prompts: u64,
    /// Mean tokens per turn over the rolling window.
    pub average_turn_tokens: u64,
    pub pressure: UsagePressure,
}

impl UsageMonitor {
    pub fn new(config: &UsageConfig) -> Self {
        Self {
            quota: config.daily_token_quota,
            alert_threshold: config.alert_threshold,
            window_size: config.rolling_window.max(1),
            inner: Mutex::new(Inner {
                daily_tokens: 0,
                current_day: Utc::now().ordinal(),
                totals: TokenUsage::default(),
                total_cost_usd: 0.0,
                turns: 0,
                over_budget_prompts: 0,
                window: VecDeque::new(),
            }),
        }
    }

    /// Create a monitor with today's token total hydrated from the ledger.
    pub async fn from_ledger(
        config: &UsageConfig,
        ledger: &UsageLedger,
    ) -> Result<Self, KinderaError> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let daily_tokens = ledger.daily_tokens(&today).await?;

        let monitor = Self::new(config);
        if let Ok(mut inner) = monitor.inner.lock() {
            inner.daily_tokens = daily_tokens;
        }
        Ok(monitor)
    }

    /// True once today's total has reached the daily quota.
    ///
    /// Advisory: the caller keeps running the turn and compresses prompts
    /// to the floor instead of rejecting the request.
    pub fn over_quota(&self) -> bool {
        let Some(quota) = self.quota else {
            return false;
        };
        let daily = {
            let mut inner = self.lock();
            maybe_reset_daily(&mut inner);
            inner.daily_tokens
        };
        daily >= quota
    }

    /// Record one completed model call.
    pub fn record(&self, usage: &TokenUsage, cost_usd: f64) {
        let mut inner = self.lock();
        maybe_reset_daily(&mut inner);

        let turn_tokens = usage.total() as u64;
        inner.daily_tokens += turn_tokens;
        inner.totals.add(usage);
        inner.total_cost_usd += cost_usd;
        inner.turns += 1;

        inner.window.push_back(turn_tokens);
        while inner.window.len() > self.window_size {
            inner.window.pop_front();
        }

        if let Some(quota) = self.quota
            && inner.daily_tokens as f64 >= quota as f64 * self.alert_threshold
        {
            warn!(
                daily_tokens = inner.daily_tokens,
                quota,
                threshold = self.alert_threshold,
                "approaching daily token quota"
            );
        }
    }

    /// Count a prompt whose minimum required content overflowed its
    /// budget, as flagged by the compressor.
    pub fn record_over_budget(&self) {
        self.lock().over_budget_prompts += 1;
    }

    /// Coarse pressure from daily usage relative to the quota. Without a
    /// quota, pressure is always `Normal`.
    pub fn pressure(&self) -> UsagePressure {
        let Some(quota) = self.quota else {
            return UsagePressure::Normal;
        };
        let daily = {
            let mut inner = self.lock();
            maybe_reset_daily(&mut inner);
            inner.daily_tokens
        };
        let fraction = daily as f64 / quota as f64;
        if fraction >= self.alert_threshold {
            UsagePressure::High
        } else if fraction >= 0.5 {
            UsagePressure::Elevated
        } else {
            UsagePressure::Normal
        }
    }

    pub fn stats(&self) -> MonitorStats {
        let pressure = self.pressure();
        let inner = self.lock();
        let average_turn_tokens = if inner.window.is_empty() {
            0
        } else {
            inner.window.iter().sum::<u64>() / inner.window.len() as u64
        };
        MonitorStats {
            daily_tokens: inner.daily_tokens,
            daily_quota: self.quota,
            total_prompt_tokens: inner.totals.prompt_tokens,
            total_completion_tokens: inner.totals.completion_tokens,
            total_cache_read_tokens: inner.totals.cache_read_tokens,
            total_cost_usd: inner.total_cost_usd,
            turns: inner.turns,
            over_budget_prompts: inner.over_budget_prompts,
            average_turn_tokens,
            pressure,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Reset the daily total if the day has changed.
fn maybe_reset_daily(inner: &mut Inner) {
    let today = Utc::now().ordinal();
    if today != inner.current_day {
        inner.daily_tokens = 0;
        inner.current_day = today;
    }
}
