// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the visual memory engine

use std::path::PathBuf;

/// Failures while opening or validating the persistent cell grid
#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("cannot open memory file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot set length of memory file {path:?} to {len} bytes: {source}")]
    Resize {
        path: PathBuf,
        len: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot map memory file {path:?}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("memory file {path:?} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("memory file {path:?} has an incompatible header: {reason}")]
    IncompatibleHeader { path: PathBuf, reason: String },

    #[error("cannot migrate headerless memory file {path:?}: {source}")]
    Migrate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot flush memory file {path:?}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Malformed or out-of-order camera chunks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("chunk length {len} is not a whole number of {width}-pixel rows")]
    RaggedChunk { len: usize, width: usize },

    #[error("chunk rows {first_row}..{end_row} exceed frame height {height}")]
    RowsOutOfBounds {
        first_row: usize,
        end_row: usize,
        height: usize,
    },

    #[error("frame {frame}: expected row {expected}, got row {got}")]
    OutOfOrder { frame: u64, expected: usize, got: usize },
}

/// Debug snapshot failures (always non-fatal to the engine)
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("memory engine is disabled, no cells to snapshot")]
    Disabled,

    #[error("cell grid is empty")]
    EmptyGrid,

    #[error("failed to write snapshot {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Top-level engine errors
#[derive(Debug, thiserror::Error)]
pub enum VisualMemoryError {
    #[error(transparent)]
    Store(#[from] MemoryStoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("learn worker already running")]
    AlreadyRunning,

    #[error("failed to spawn learn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VisualMemoryError>;
