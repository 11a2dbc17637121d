// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console logging is always available. With the `file-logging` feature, logs are
//! also written to a timestamped run folder:
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       └── vismem.log
//! ```

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::CrateDebugFlags;

fn build_filter(debug_flags: &CrateDebugFlags, default_level: &str) -> Result<EnvFilter> {
    let directives = debug_flags.to_filter_string_with_default(default_level);
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter directives: {}", directives))
}

/// Initialize console logging
///
/// # Errors
/// Fails if the filter directives are invalid or a global subscriber is already set.
pub fn init_console_logging(debug_flags: &CrateDebugFlags, default_level: &str) -> Result<()> {
    let filter = build_filter(debug_flags, default_level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install console subscriber: {}", e))
}

#[cfg(feature = "file-logging")]
pub use file::{init_logging, LoggingGuard};

#[cfg(feature = "file-logging")]
mod file {
    use super::build_filter;
    use crate::cli::CrateDebugFlags;
    use anyhow::{Context, Result};
    use chrono::Utc;
    use std::path::{Path, PathBuf};
    use tracing_appender::rolling;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Registry;

    /// Keeps the non-blocking file writer alive; logs are flushed on drop
    pub struct LoggingGuard {
        _file_guard: tracing_appender::non_blocking::WorkerGuard,
        log_dir: PathBuf,
    }

    impl LoggingGuard {
        /// Run folder this process is logging into
        pub fn log_dir(&self) -> &Path {
            &self.log_dir
        }
    }

    /// Initialize console + rotated file logging
    ///
    /// # Arguments
    /// * `debug_flags` - Per-crate debug flags for filtering
    /// * `default_level` - Level for everything not raised by a flag
    /// * `log_dir` - Base directory for run folders
    /// * `retention_runs` - Keep this many most recent run folders
    pub fn init_logging(
        debug_flags: &CrateDebugFlags,
        default_level: &str,
        log_dir: &Path,
        retention_runs: usize,
    ) -> Result<LoggingGuard> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let run_folder = log_dir.join(format!("run_{}", timestamp));
        std::fs::create_dir_all(&run_folder)
            .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

        cleanup_old_runs(log_dir, retention_runs)?;

        let file_appender = rolling::daily(&run_folder, "vismem.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let console_layer = tracing_subscriber::fmt::layer().with_target(false);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default()
            .with(build_filter(debug_flags, default_level)?)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to install logging subscriber")?;

        Ok(LoggingGuard {
            _file_guard: guard,
            log_dir: run_folder,
        })
    }

    /// Remove all but the newest `retention_runs` run folders
    ///
    /// Folder names embed a sortable timestamp, so name order is age order.
    fn cleanup_old_runs(base_log_dir: &Path, retention_runs: usize) -> Result<()> {
        let mut runs: Vec<PathBuf> = std::fs::read_dir(base_log_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_dir()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("run_"))
            })
            .collect();
        runs.sort();

        if runs.len() > retention_runs {
            let to_remove = runs.len() - retention_runs;
            for path in runs.iter().take(to_remove) {
                if let Err(e) = std::fs::remove_dir_all(path) {
                    eprintln!(
                        "Warning: Failed to remove old log directory {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_cleanup_keeps_newest_runs() {
            let dir = tempfile::tempdir().unwrap();
            for name in ["run_20240101_000000", "run_20240102_000000", "run_20240103_000000"] {
                std::fs::create_dir(dir.path().join(name)).unwrap();
            }
            std::fs::create_dir(dir.path().join("unrelated")).unwrap();

            cleanup_old_runs(dir.path(), 2).unwrap();

            assert!(!dir.path().join("run_20240101_000000").exists());
            assert!(dir.path().join("run_20240102_000000").exists());
            assert!(dir.path().join("run_20240103_000000").exists());
            assert!(dir.path().join("unrelated").exists());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builds_from_flags() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-vismem-engine".to_string()]);
        assert!(build_filter(&flags, "warn").is_ok());
    }

    #[test]
    fn test_second_init_reports_error() {
        let flags = CrateDebugFlags::default();
        // Whichever call runs first may succeed; a repeat must not panic.
        let _ = init_console_logging(&flags, "info");
        assert!(init_console_logging(&flags, "info").is_err());
    }
}
