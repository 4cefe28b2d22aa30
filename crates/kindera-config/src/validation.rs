// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as valid bind addresses, positive pool sizes, and
//! threshold ranges. All errors are collected, not fail-fast.

use crate::diagnostic::ConfigError;
use crate::model::KinderaConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with every collected validation error.
pub fn validate_config(config: &KinderaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("gateway.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    if config.ops.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "ops.base_url must not be empty".to_string(),
        });
    }

    if config.usage.ledger_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "usage.ledger_path must not be empty".to_string(),
        });
    }

    if config.tools.max_concurrent == 0 {
        errors.push(ConfigError::Validation {
            message: "tools.max_concurrent must be at least 1".to_string(),
        });
    }

    if config.tools.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "tools.timeout_secs must be at least 1".to_string(),
        });
    }

    if config.selector.cache_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "selector.cache_capacity must be at least 1".to_string(),
        });
    }

    if config.selector.max_tools == 0 {
        errors.push(ConfigError::Validation {
            message: "selector.max_tools must be at least 1".to_string(),
        });
    }

    if config.model.max_tool_rounds == 0 {
        errors.push(ConfigError::Validation {
            message: "model.max_tool_rounds must be at least 1".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.usage.alert_threshold) {
        errors.push(ConfigError::Validation {
            message: format!(
                "usage.alert_threshold must be between 0.0 and 1.0, got {}",
                config.usage.alert_threshold
            ),
        });
    }

    if config.context.prompt_budget < config.context.min_history_tokens {
        errors.push(ConfigError::Validation {
            message: format!(
                "context.prompt_budget ({}) must be at least context.min_history_tokens ({})",
                config.context.prompt_budget, config.context.min_history_tokens
            ),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = KinderaConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_pool_size_rejected() {
        let mut config = KinderaConfig::default();
        config.tools.max_concurrent = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("max_concurrent")));
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = KinderaConfig::default();
        config.usage.alert_threshold = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn errors_are_collected_not_fail_fast() {
        let mut config = KinderaConfig::default();
        config.tools.max_concurrent = 0;
        config.selector.cache_capacity = 0;
        config.gateway.host = String::new();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3, "expected all errors, got {}", errors.len());
    }

    #[test]
    fn budget_must_cover_history_minimum() {
        let mut config = KinderaConfig::default();
        config.context.prompt_budget = 100;
        config.context.min_history_tokens = 512;
        assert!(validate_config(&config).is_err());
    }
}
