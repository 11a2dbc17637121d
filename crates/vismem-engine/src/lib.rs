// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Visual memory engine
//!
//! Continuously correlates what the camera sees with what the LEDs rendered a few
//! ticks earlier, and turns the learned correlations into a per-pixel recall signal.
//!
//! ## Architecture
//! ```text
//! camera chunk -> FeatureIngest (luma, motion per sample slot)
//!                       |
//!                       v
//! EffectTap ------> LearnWorker --(cells)--> MemoryStore (mmap file)
//! (delayed frame)       |
//!                       v
//!                 RecallPublisher -> RecallBuffer -> render path
//! ```

pub mod error;
pub mod feature_ingest;
pub mod frame_history;
pub mod geometry;
pub mod learn_worker;
pub mod learning;
pub mod memory_store;
pub mod pixel_index;
pub mod recall;
pub mod snapshot;
pub mod visual_memory;

pub use error::{
    IngestError, MemoryStoreError, Result, SnapshotError, VisualMemoryError,
};
pub use feature_ingest::{FeatureIngest, VideoChunk};
pub use frame_history::{EffectTap, Frame, FrameHistory, Rgb};
pub use geometry::{GridShape, SamplerGeometry};
pub use learn_worker::{CycleRateCounter, LearnWorker, SweepStats};
pub use learning::{reinforcement, LearnParams};
pub use memory_store::{Cell, MemoryStore};
pub use pixel_index::DenseIndex;
pub use recall::{
    recall_intensity, LearnFlags, RecallBuffer, RecallPublisher, DEFAULT_RECALL_SENSITIVITY,
};
pub use snapshot::SnapshotStats;
pub use visual_memory::{VisualMemory, VisualMemoryConfig};
