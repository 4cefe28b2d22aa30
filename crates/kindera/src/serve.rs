// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `kindera serve` command implementation.
//!
//! Wires the full assistant core: Anthropic provider, tool registry over
//! the ops backend, tool selector with its cache, context compressor,
//! usage ledger and monitor, session manager, and the SSE gateway.
//! Supports graceful shutdown via signal handlers.

use std::sync::Arc;
use std::time::Duration;

use kindera_anthropic::AnthropicProvider;
use kindera_config::KinderaConfig;
use kindera_core::KinderaError;
use kindera_context::ContextCompressor;
use kindera_gateway::GatewayState;
use kindera_selector::{SelectionCache, ToolSelector};
use kindera_session::shutdown;
use kindera_session::{SessionManager, TurnRunner};
use kindera_tools::{HttpOpsBackend, ToolExecutor, builtin_registry};
use kindera_usage::{UsageLedger, UsageMonitor};
use tracing::info;

/// Runs the `kindera serve` command.
pub async fn run_serve(config: KinderaConfig) -> Result<(), KinderaError> {
    init_tracing(&config.agent.log_level);

    info!("starting kindera serve");

    let ledger = Arc::new(UsageLedger::open(&config.usage.ledger_path).await?);
    let monitor = Arc::new(UsageMonitor::from_ledger(&config.usage, &ledger).await?);

    let backend = Arc::new(HttpOpsBackend::new(&config.ops)?);
    let registry = Arc::new(builtin_registry(backend));
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), config.tools.clone()));

    let selector = Arc::new(ToolSelector::new(config.selector.max_tools));
    let cache = Arc::new(SelectionCache::new(
        config.selector.cache_capacity,
        Duration::from_secs(config.selector.cache_ttl_secs),
    ));
    let compressor = Arc::new(ContextCompressor::new(&config.agent.name, &config.context));

    let provider = Arc::new(AnthropicProvider::new(&config.model)?);

    let runner = Arc::new(TurnRunner {
        provider,
        registry,
        executor,
        selector,
        cache: Arc::clone(&cache),
        compressor,
        ledger,
        monitor: Arc::clone(&monitor),
        model: config.model.clone(),
    });
    let manager = Arc::new(SessionManager::new(runner, &config.agent));

    let state = GatewayState::new(Arc::clone(&manager), monitor, cache);

    let cancel = shutdown::install_signal_handler();
    let result = kindera_gateway::start_server(&config.gateway, state, cancel).await;

    info!("gateway stopped, draining in-flight turns");
    manager.shutdown().await;
    info!("kindera serve shutdown complete");

    result
}

/// Initialize the tracing subscriber from the configured log level.
/// `RUST_LOG` overrides when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kindera={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
