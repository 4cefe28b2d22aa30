// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./kindera.toml` > `~/.config/kindera/kindera.toml`
//! > `/etc/kindera/kindera.toml` with environment variable overrides via the
//! `KINDERA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KinderaConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/kindera/kindera.toml` (system-wide)
/// 3. `~/.config/kindera/kindera.toml` (user XDG config)
/// 4. `./kindera.toml` (local directory)
/// 5. `KINDERA_*` environment variables
pub fn load_config() -> Result<KinderaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KinderaConfig::default()))
        .merge(Toml::file("/etc/kindera/kindera.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("kindera/kindera.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("kindera.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<KinderaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KinderaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KinderaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KinderaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `KINDERA_MODEL_API_KEY` must map to
/// `model.api_key`, not `model.api.key`.
fn env_provider() -> Env {
    Env::prefixed("KINDERA_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: KINDERA_SELECTOR_CACHE_TTL_SECS -> "selector_cache_ttl_secs"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("model_", "model.", 1)
            .replacen("ops_", "ops.", 1)
            .replacen("selector_", "selector.", 1)
            .replacen("context_", "context.", 1)
            .replacen("tools_", "tools.", 1)
            .replacen("usage_", "usage.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}
