// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to a section in `vismem_configuration.toml`. Every field has a
//! default, so a partial file (or an empty one) yields a complete configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VismemConfig {
    pub memory: MemoryConfig,
    pub learning: LearningConfig,
    pub latency: LatencyConfig,
    pub sampler: SamplerConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
}

/// Backing file for the cell grid
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub path: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vismem.bin"),
        }
    }
}

/// Gating and update-rule constants
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Motion at or above this value always triggers learning
    pub motion_threshold: f64,
    /// Fraction of short-term memory forgotten per update
    pub short_term_permeability: f64,
    /// Gain applied to the cubed short/long difference
    pub long_term_permeability: f64,
    /// Seed for the gating RNG
    pub seed: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            motion_threshold: 1e2,
            short_term_permeability: 1e-1,
            long_term_permeability: 1e-4,
            seed: 84,
        }
    }
}

/// Sense-to-actuate latency compensation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// How many rendered frames ago the camera is currently seeing
    pub expected_delay_ticks: u32,
    /// Upper bound on the wait for a delayed frame before the slot is skipped
    pub frame_wait_ms: u64,
    /// Number of rendered frames retained by the frame history
    pub history_capacity: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            expected_delay_ticks: 3,
            frame_wait_ms: 10,
            history_capacity: 64,
        }
    }
}

/// Camera sample grid
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub blocks_wide: u32,
    pub blocks_high: u32,
    pub block_width: u32,
    pub block_height: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            blocks_wide: 40,
            blocks_high: 30,
            block_width: 8,
            block_height: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Minimum seconds between cycle-rate reports
    pub rate_report_interval_secs: f64,
    /// Default output for the debug snapshot PNG
    pub snapshot_path: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rate_report_interval_secs: 2.0,
            snapshot_path: PathBuf::from("vismem.png"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: PathBuf,
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("./logs"),
            file_logging: false,
        }
    }
}
