// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Checks ranges and cross-field consistency. All problems are collected and
//! reported together rather than stopping at the first one.

use crate::{ConfigError, ConfigResult, VismemConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every failed check
pub fn validate_config(config: &VismemConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_learning(config, &mut errors);
    validate_latency(config, &mut errors);
    validate_sampler(config, &mut errors);
    validate_diagnostics(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn invalid(errors: &mut Vec<ConfigValidationError>, field: &str, reason: &str) {
    errors.push(ConfigValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    });
}

fn validate_required_fields(config: &VismemConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.memory.path.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "memory.path".to_string(),
        });
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        invalid(
            errors,
            "logging.level",
            "must be one of trace, debug, info, warn, error",
        );
    }
}

fn validate_learning(config: &VismemConfig, errors: &mut Vec<ConfigValidationError>) {
    let learning = &config.learning;

    if !(learning.motion_threshold.is_finite() && learning.motion_threshold > 0.0) {
        invalid(errors, "learning.motion_threshold", "must be finite and positive");
    }

    let in_unit_interval = |p: f64| p > 0.0 && p <= 1.0;
    if !in_unit_interval(learning.short_term_permeability) {
        invalid(
            errors,
            "learning.short_term_permeability",
            "must be in (0.0, 1.0]",
        );
    }
    if !in_unit_interval(learning.long_term_permeability) {
        invalid(
            errors,
            "learning.long_term_permeability",
            "must be in (0.0, 1.0]",
        );
    }
}

fn validate_latency(config: &VismemConfig, errors: &mut Vec<ConfigValidationError>) {
    let latency = &config.latency;

    if latency.frame_wait_ms == 0 {
        invalid(errors, "latency.frame_wait_ms", "must be positive");
    }

    // The delayed frame must fit in the history ring
    if latency.history_capacity <= latency.expected_delay_ticks as usize {
        invalid(
            errors,
            "latency.history_capacity",
            "must be greater than latency.expected_delay_ticks",
        );
    }
}

fn validate_sampler(config: &VismemConfig, errors: &mut Vec<ConfigValidationError>) {
    let sampler = &config.sampler;
    for (field, value) in [
        ("sampler.blocks_wide", sampler.blocks_wide),
        ("sampler.blocks_high", sampler.blocks_high),
        ("sampler.block_width", sampler.block_width),
        ("sampler.block_height", sampler.block_height),
    ] {
        if value == 0 {
            invalid(errors, field, "must be positive");
        }
    }
}

fn validate_diagnostics(config: &VismemConfig, errors: &mut Vec<ConfigValidationError>) {
    let interval = config.diagnostics.rate_report_interval_secs;
    if !(interval.is_finite() && interval > 0.0) {
        invalid(
            errors,
            "diagnostics.rate_report_interval_secs",
            "must be finite and positive",
        );
    }
}
