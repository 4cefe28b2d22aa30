// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token usage tracking for the Kindera assistant core: per-call pricing,
//! a persistent SQLite ledger, and an in-memory quota monitor.

pub mod ledger;
pub mod monitor;
pub mod pricing;

pub use ledger::{CallKind, UsageLedger, UsageRecord};
pub use monitor::{MonitorStats, UsageMonitor, UsagePressure};
pub use pricing::{calculate_cost, get_pricing, ModelPricing};
