// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # vismem-observability
//!
//! Logging setup shared by the visual memory crates and tools, with
//! per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: rotated log files in a per-run folder (desktop only)

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "vismem",
    "vismem-engine",
    "vismem-config",
    "vismem-observability",
];
