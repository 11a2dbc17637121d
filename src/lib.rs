// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # vismem - visual memory for interactive light installations
//!
//! A camera watches an LED installation. While the installation runs, the engine
//! learns which camera regions light up when which LEDs are lit (compensating for
//! the camera's latency), stores those correlations in a memory-mapped file so they
//! survive restarts, and publishes a per-LED recall signal that effects can use.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vismem::prelude::*;
//!
//! let config = vismem::load_validated_config(None, None)?;
//! let _logging = vismem::init_logging_from_config(&config, &parse_debug_flags())?;
//!
//! // One flag per output pixel: is it wired to a physical LED?
//! let index = DenseIndex::from_mapped_flags((0..512).map(|i| i % 64 < 60));
//! let tap = Arc::new(EffectTap::new(config.latency.history_capacity));
//!
//! let mut memory = vismem::engine_from_config(&config, index);
//! memory.start(tap.clone())?;
//!
//! // Render path: tap.push(colors); memory.recall()
//! // Capture path: memory.process(&chunk)
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: vismem-config, vismem-observability        │
//! │  (TOML + overrides, tracing setup)                      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Engine: vismem-engine                                  │
//! │  (memory store, learn worker, recall, snapshot)         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

pub use vismem_config as config;
pub use vismem_engine as engine;
pub use vismem_observability as observability;

use vismem_config::VismemConfig;
use vismem_engine::{DenseIndex, VisualMemory, VisualMemoryConfig};
use vismem_observability::CrateDebugFlags;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use vismem_config::{load_config, validate_config, VismemConfig};
    pub use vismem_engine::{
        recall_intensity, DenseIndex, EffectTap, Frame, FrameHistory, Rgb, SamplerGeometry,
        SnapshotStats, VideoChunk, VisualMemory, VisualMemoryConfig, VisualMemoryError,
        DEFAULT_RECALL_SENSITIVITY,
    };
    pub use vismem_observability::{parse_debug_flags, CrateDebugFlags};
}

/// Load `vismem_configuration.toml` (with env and CLI overrides) and validate it
pub fn load_validated_config(
    path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> anyhow::Result<VismemConfig> {
    let config = vismem_config::load_config(path, cli_args).context("Failed to load configuration")?;
    vismem_config::validate_config(&config)?;
    Ok(config)
}

/// Build a stopped engine from a loaded configuration
pub fn engine_from_config(config: &VismemConfig, index: DenseIndex) -> VisualMemory {
    VisualMemory::new(VisualMemoryConfig::from(config), index)
}

/// Keeps whatever the logging backend needs alive
pub enum LoggingHandle {
    Console,
    #[cfg(feature = "file-logging")]
    File(vismem_observability::LoggingGuard),
}

/// Run folders kept when file logging is enabled
pub const LOG_RETENTION_RUNS: usize = 10;

/// Install the global subscriber described by `[logging]`
///
/// Debug flags raise individual crates to `debug` on top of `logging.level`.
pub fn init_logging_from_config(
    config: &VismemConfig,
    debug_flags: &CrateDebugFlags,
) -> anyhow::Result<LoggingHandle> {
    let level = config.logging.level.as_str();

    if let Some(handle) = init_file_logging(config, debug_flags)? {
        return Ok(handle);
    }

    vismem_observability::init_console_logging(debug_flags, level)?;
    if config.logging.file_logging && !cfg!(feature = "file-logging") {
        warn!("[VISMEM] logging.file_logging is set but the file-logging feature is not compiled in");
    }
    Ok(LoggingHandle::Console)
}

#[cfg(feature = "file-logging")]
fn init_file_logging(
    config: &VismemConfig,
    debug_flags: &CrateDebugFlags,
) -> anyhow::Result<Option<LoggingHandle>> {
    if !config.logging.file_logging {
        return Ok(None);
    }
    let guard = vismem_observability::init_logging(
        debug_flags,
        &config.logging.level,
        &config.logging.log_dir,
        LOG_RETENTION_RUNS,
    )?;
    Ok(Some(LoggingHandle::File(guard)))
}

#[cfg(not(feature = "file-logging"))]
fn init_file_logging(
    _config: &VismemConfig,
    _debug_flags: &CrateDebugFlags,
) -> anyhow::Result<Option<LoggingHandle>> {
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_config_uses_sampler_and_paths() {
        let mut config = VismemConfig::default();
        config.sampler.blocks_wide = 4;
        config.sampler.blocks_high = 2;
        config.memory.path = "custom.bin".into();

        let index = DenseIndex::from_mapped_flags([true, true, false]);
        let memory = engine_from_config(&config, index);

        assert_eq!(memory.config().memory_path, Path::new("custom.bin"));
        assert_eq!(memory.learn_flags().len(), 8);
        assert_eq!(memory.grid_shape().cell_count(), 16);
        assert!(!memory.is_enabled());
    }

    #[test]
    fn test_load_validated_config_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vismem_configuration.toml");
        std::fs::write(&path, "[learning]\nshort_term_permeability = 2.0\n").unwrap();

        let err = load_validated_config(Some(&path), None).unwrap_err();
        assert!(format!("{:#}", err).contains("short_term_permeability"));
    }
}
