// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later tiers win:
//! 1. TOML file (base values, missing keys fall back to defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, VismemConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const CONFIG_FILE_NAME: &str = "vismem_configuration.toml";

/// Find the configuration file
///
/// Search order:
/// 1. `VISMEM_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("VISMEM_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by VISMEM_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet VISMEM_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file and apply overrides
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable, or not valid TOML.
/// Validation is a separate step (`validate_config`).
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<VismemConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: VismemConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_cli<T: FromStr>(cli_args: &HashMap<String, String>, key: &str) -> Option<T> {
    cli_args.get(key).and_then(|v| v.trim().parse().ok())
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `VISMEM_MEMORY_PATH` -> `memory.path`
/// - `VISMEM_MOTION_THRESHOLD` -> `learning.motion_threshold`
/// - `VISMEM_SHORT_TERM_PERMEABILITY` -> `learning.short_term_permeability`
/// - `VISMEM_LONG_TERM_PERMEABILITY` -> `learning.long_term_permeability`
/// - `VISMEM_SEED` -> `learning.seed`
/// - `VISMEM_EXPECTED_DELAY_TICKS` -> `latency.expected_delay_ticks`
/// - `VISMEM_FRAME_WAIT_MS` -> `latency.frame_wait_ms`
/// - `VISMEM_SNAPSHOT_PATH` -> `diagnostics.snapshot_path`
/// - `VISMEM_LOG_LEVEL` -> `logging.level`
///
/// Values that fail to parse are ignored.
pub fn apply_environment_overrides(config: &mut VismemConfig) {
    if let Ok(value) = env::var("VISMEM_MEMORY_PATH") {
        config.memory.path = PathBuf::from(value);
    }
    if let Some(v) = parse_env("VISMEM_MOTION_THRESHOLD") {
        config.learning.motion_threshold = v;
    }
    if let Some(v) = parse_env("VISMEM_SHORT_TERM_PERMEABILITY") {
        config.learning.short_term_permeability = v;
    }
    if let Some(v) = parse_env("VISMEM_LONG_TERM_PERMEABILITY") {
        config.learning.long_term_permeability = v;
    }
    if let Some(v) = parse_env("VISMEM_SEED") {
        config.learning.seed = v;
    }
    if let Some(v) = parse_env("VISMEM_EXPECTED_DELAY_TICKS") {
        config.latency.expected_delay_ticks = v;
    }
    if let Some(v) = parse_env("VISMEM_FRAME_WAIT_MS") {
        config.latency.frame_wait_ms = v;
    }
    if let Ok(value) = env::var("VISMEM_SNAPSHOT_PATH") {
        config.diagnostics.snapshot_path = PathBuf::from(value);
    }
    if let Ok(value) = env::var("VISMEM_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"memory_path": "/var/lib/vismem.bin"}`)
pub fn apply_cli_overrides(config: &mut VismemConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("memory_path") {
        config.memory.path = PathBuf::from(value);
    }
    if let Some(v) = parse_cli(cli_args, "motion_threshold") {
        config.learning.motion_threshold = v;
    }
    if let Some(v) = parse_cli(cli_args, "short_term_permeability") {
        config.learning.short_term_permeability = v;
    }
    if let Some(v) = parse_cli(cli_args, "long_term_permeability") {
        config.learning.long_term_permeability = v;
    }
    if let Some(v) = parse_cli(cli_args, "seed") {
        config.learning.seed = v;
    }
    if let Some(v) = parse_cli(cli_args, "expected_delay_ticks") {
        config.latency.expected_delay_ticks = v;
    }
    if let Some(v) = parse_cli(cli_args, "frame_wait_ms") {
        config.latency.frame_wait_ms = v;
    }
    if let Some(value) = cli_args.get("snapshot_path") {
        config.diagnostics.snapshot_path = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("VISMEM_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("VISMEM_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("VISMEM_CONFIG_PATH", "/nonexistent/vismem_configuration.toml");
        let result = find_config_file();
        env::remove_var("VISMEM_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved = env::var("VISMEM_MOTION_THRESHOLD").ok();
        env::remove_var("VISMEM_MOTION_THRESHOLD");

        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[learning]").unwrap();
        writeln!(file, "motion_threshold = 42.0").unwrap();
        writeln!(file, "[latency]").unwrap();
        writeln!(file, "expected_delay_ticks = 5").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();
        assert_eq!(config.learning.motion_threshold, 42.0);
        assert_eq!(config.latency.expected_delay_ticks, 5);
        assert_eq!(config.latency.frame_wait_ms, 10);

        if let Some(value) = saved {
            env::set_var("VISMEM_MOTION_THRESHOLD", value);
        }
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[learning\nseed = ").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = VismemConfig::default();

        env::set_var("VISMEM_MEMORY_PATH", "/tmp/override.bin");
        env::set_var("VISMEM_SEED", "7");
        env::set_var("VISMEM_FRAME_WAIT_MS", "not-a-number");

        apply_environment_overrides(&mut config);

        env::remove_var("VISMEM_MEMORY_PATH");
        env::remove_var("VISMEM_SEED");
        env::remove_var("VISMEM_FRAME_WAIT_MS");

        assert_eq!(config.memory.path, PathBuf::from("/tmp/override.bin"));
        assert_eq!(config.learning.seed, 7);
        assert_eq!(config.latency.frame_wait_ms, 10);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = VismemConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("motion_threshold".to_string(), "250".to_string());
        cli_args.insert("log_level".to_string(), "debug".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert_eq!(config.learning.motion_threshold, 250.0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[memory]").unwrap();
        writeln!(file, "path = \"file.bin\"").unwrap();
        writeln!(file, "[learning]").unwrap();
        writeln!(file, "seed = 1").unwrap();

        env::set_var("VISMEM_MEMORY_PATH", "env.bin");
        env::set_var("VISMEM_SEED", "2");

        let mut cli_args = HashMap::new();
        cli_args.insert("memory_path".to_string(), "cli.bin".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("VISMEM_MEMORY_PATH");
        env::remove_var("VISMEM_SEED");

        // CLI wins for the path, env wins for the seed (no CLI override)
        assert_eq!(config.memory.path, PathBuf::from("cli.bin"));
        assert_eq!(config.learning.seed, 2);
    }
}
