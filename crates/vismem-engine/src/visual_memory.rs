// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Visual memory engine
//!
//! Owns the cell grid mapping, the feature ingest, the published recall and the
//! learning thread. Typical use:
//!
//! ```ignore
//! let mut memory = VisualMemory::new(VisualMemoryConfig::default(), index);
//! if let Err(e) = memory.start(tap.clone()) {
//!     // Logged already; the engine stays disabled and recall stays zero
//! }
//! memory.process(&chunk)?;          // capture path
//! let recall = memory.recall();     // render path
//! memory.stop();
//! ```

use crate::error::{IngestError, Result, SnapshotError, VisualMemoryError};
use crate::feature_ingest::{FeatureIngest, VideoChunk};
use crate::frame_history::FrameHistory;
use crate::geometry::{GridShape, SamplerGeometry};
use crate::learn_worker::LearnWorker;
use crate::learning::LearnParams;
use crate::memory_store::MemoryStore;
use crate::pixel_index::DenseIndex;
use crate::recall::{LearnFlags, RecallBuffer, RecallPublisher};
use crate::snapshot::{self, SnapshotStats};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use vismem_config::VismemConfig;

/// Engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct VisualMemoryConfig {
    pub memory_path: PathBuf,
    pub learn: LearnParams,
    pub seed: u64,
    /// Render ticks between an LED frame and the camera seeing it
    pub expected_delay_ticks: u32,
    /// Bounded wait when the delayed frame is not available yet
    pub frame_wait: Duration,
    pub sampler: SamplerGeometry,
    pub rate_report_interval: Duration,
    pub snapshot_path: PathBuf,
}

impl Default for VisualMemoryConfig {
    fn default() -> Self {
        Self::from(&VismemConfig::default())
    }
}

impl From<&VismemConfig> for VisualMemoryConfig {
    fn from(config: &VismemConfig) -> Self {
        Self {
            memory_path: config.memory.path.clone(),
            learn: LearnParams::from(&config.learning),
            seed: config.learning.seed,
            expected_delay_ticks: config.latency.expected_delay_ticks,
            frame_wait: Duration::from_millis(config.latency.frame_wait_ms),
            sampler: SamplerGeometry::from(&config.sampler),
            rate_report_interval: Duration::try_from_secs_f64(
                config.diagnostics.rate_report_interval_secs,
            )
            .unwrap_or(Duration::from_secs(2)),
            snapshot_path: config.diagnostics.snapshot_path.clone(),
        }
    }
}

/// The visual memory engine
pub struct VisualMemory {
    config: VisualMemoryConfig,
    index: Arc<DenseIndex>,
    ingest: Arc<FeatureIngest>,
    recall: Arc<RecallBuffer>,
    flags: Arc<LearnFlags>,
    sweeps: Arc<AtomicU64>,
    store: Option<Arc<Mutex<MemoryStore>>>,
    /// Stop token of the current learning thread
    running: Option<Arc<AtomicBool>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl VisualMemory {
    /// Create a stopped, disabled engine. No file is touched until [`start`](Self::start).
    pub fn new(config: VisualMemoryConfig, index: DenseIndex) -> Self {
        let slots = config.sampler.sample_slots();
        let recall = Arc::new(RecallBuffer::new(index.sparse_len()));
        Self {
            ingest: Arc::new(FeatureIngest::new(config.sampler)),
            flags: Arc::new(LearnFlags::new(slots)),
            index: Arc::new(index),
            recall,
            sweeps: Arc::new(AtomicU64::new(0)),
            store: None,
            running: None,
            thread_handle: None,
            config,
        }
    }

    pub fn config(&self) -> &VisualMemoryConfig {
        &self.config
    }

    /// Shape of the cell grid for the current pixel mapping
    pub fn grid_shape(&self) -> GridShape {
        self.config.sampler.grid_shape(self.index.dense_len())
    }

    fn open_store(&mut self) -> Result<Arc<Mutex<MemoryStore>>> {
        if let Some(store) = &self.store {
            return Ok(Arc::clone(store));
        }

        let shape = self.grid_shape();
        info!(
            "[VISMEM] {} camera samples * {} LED pixels = {} cells",
            shape.sample_slots(),
            shape.dense_len(),
            shape.cell_count()
        );

        match MemoryStore::open(&self.config.memory_path, shape) {
            Ok(store) => {
                let store = Arc::new(Mutex::new(store));
                self.store = Some(Arc::clone(&store));
                Ok(store)
            }
            Err(e) => {
                error!("[VISMEM] Visual memory disabled: {}", e);
                Err(e.into())
            }
        }
    }

    /// Build a worker sharing this engine's grid and buffers, for driving sweeps
    /// synchronously instead of through [`start`](Self::start)
    ///
    /// Opens the memory file on first use. Do not drive a worker while the learning
    /// thread is running; recall published by both would interleave.
    pub fn learn_worker(&mut self, history: Arc<dyn FrameHistory>) -> Result<LearnWorker> {
        let store = self.open_store()?;
        Ok(LearnWorker {
            store,
            index: Arc::clone(&self.index),
            ingest: Arc::clone(&self.ingest),
            history,
            recall: Arc::clone(&self.recall),
            flags: Arc::clone(&self.flags),
            sweeps: Arc::clone(&self.sweeps),
            publisher: RecallPublisher::new(Arc::clone(&self.index)),
            params: self.config.learn,
            rng: LearnWorker::seeded_rng(self.config.seed),
            expected_delay: self.config.expected_delay_ticks,
            frame_wait: self.config.frame_wait,
        })
    }

    /// Open the memory file and start the learning thread
    ///
    /// On failure the error is logged and returned; the engine stays disabled and
    /// recall keeps its default (all zero). Refused while a previous learning
    /// thread has not exited yet.
    pub fn start(&mut self, history: Arc<dyn FrameHistory>) -> Result<()> {
        if let Some(handle) = self.thread_handle.take() {
            if !handle.is_finished() {
                self.thread_handle = Some(handle);
                return Err(VisualMemoryError::AlreadyRunning);
            }
            if handle.join().is_err() {
                warn!("[VISMEM] Previous learning thread panicked");
            }
        }

        let worker = self.learn_worker(history)?;
        let report_interval = self.config.rate_report_interval;

        // Each thread gets its own token so a late exit can never be re-armed
        let running = Arc::new(AtomicBool::new(true));
        let token = Arc::clone(&running);
        let spawned = thread::Builder::new()
            .name("vismem-learn".to_string())
            .spawn(move || worker.run(token, report_interval));

        match spawned {
            Ok(handle) => {
                self.running = Some(running);
                self.thread_handle = Some(handle);
                info!("[VISMEM] Learning thread started");
                Ok(())
            }
            Err(e) => {
                error!("[VISMEM] Failed to spawn learning thread: {}", e);
                Err(VisualMemoryError::Spawn(e))
            }
        }
    }

    /// Stop the learning thread and flush the grid to disk
    ///
    /// A thread that does not exit within the stop timeout keeps its handle, and
    /// [`start`](Self::start) refuses until it has exited.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            info!("[VISMEM] Stopping learning thread...");
            running.store(false, Ordering::Release);
        }

        if let Some(handle) = self.thread_handle.take() {
            // The token is checked before every slot, so exit takes at most one frame wait
            let stop_timeout = Duration::from_secs(2).max(self.config.frame_wait * 2);
            let deadline = Instant::now() + stop_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }

            if handle.is_finished() {
                match handle.join() {
                    Ok(()) => info!("[VISMEM] Learning thread stopped cleanly"),
                    Err(_) => warn!("[VISMEM] Learning thread panicked"),
                }
            } else {
                warn!(
                    "[VISMEM] Learning thread did not stop within {:?}, proceeding",
                    stop_timeout
                );
                self.thread_handle = Some(handle);
            }
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.lock().flush() {
                warn!("[VISMEM] {}", e);
            }
        }
    }

    /// Whether the memory file is mapped
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Whether learning is requested and the thread has not exited
    pub fn is_running(&self) -> bool {
        let requested = self
            .running
            .as_ref()
            .is_some_and(|running| running.load(Ordering::Acquire));
        let alive = self
            .thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        requested && alive
    }

    /// Feed one camera chunk
    pub fn process(&self, chunk: &VideoChunk<'_>) -> std::result::Result<(), IngestError> {
        self.ingest.process(chunk)
    }

    pub fn ingest(&self) -> &Arc<FeatureIngest> {
        &self.ingest
    }

    /// Latest recall, one value per sparse pixel (0 for unmapped pixels)
    pub fn recall(&self) -> Arc<Vec<f64>> {
        self.recall.snapshot()
    }

    pub fn recall_buffer(&self) -> &Arc<RecallBuffer> {
        &self.recall
    }

    pub fn learn_flags(&self) -> &LearnFlags {
        &self.flags
    }

    /// Completed sweeps since the engine was created
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Acquire)
    }

    pub fn dense_index(&self) -> &DenseIndex {
        &self.index
    }

    /// Write a debug snapshot PNG of the grid
    ///
    /// Failures are logged and returned; they never affect learning.
    pub fn debug(&self, path: impl AsRef<Path>) -> std::result::Result<SnapshotStats, SnapshotError> {
        let result = match &self.store {
            Some(store) => {
                let store = store.lock();
                snapshot::write_png(store.cells(), store.shape(), path.as_ref())
            }
            None => Err(SnapshotError::Disabled),
        };
        if let Err(e) = &result {
            error!("[VISMEM-SNAPSHOT] {}", e);
        }
        result
    }

    /// [`debug`](Self::debug) to the configured snapshot path
    pub fn debug_to_default_path(&self) -> std::result::Result<SnapshotStats, SnapshotError> {
        self.debug(self.config.snapshot_path.clone())
    }
}

impl Drop for VisualMemory {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_history::EffectTap;
    use tempfile::tempdir;

    fn small_config(path: PathBuf) -> VisualMemoryConfig {
        VisualMemoryConfig {
            memory_path: path,
            sampler: SamplerGeometry {
                blocks_wide: 2,
                blocks_high: 2,
                block_width: 4,
                block_height: 4,
            },
            frame_wait: Duration::from_millis(1),
            ..VisualMemoryConfig::default()
        }
    }

    #[test]
    fn test_config_from_defaults() {
        let config = VisualMemoryConfig::default();
        assert_eq!(config.learn.motion_threshold, 100.0);
        assert_eq!(config.seed, 84);
        assert_eq!(config.frame_wait, Duration::from_millis(10));
        assert_eq!(config.rate_report_interval, Duration::from_secs(2));
        assert_eq!(config.sampler.sample_slots(), 1200);
    }

    #[test]
    fn test_new_engine_is_disabled_with_zero_recall() {
        let dir = tempdir().unwrap();
        let index = DenseIndex::from_mapped_flags([true, false, true]);
        let memory = VisualMemory::new(small_config(dir.path().join("m.bin")), index);

        assert!(!memory.is_enabled());
        assert!(!memory.is_running());
        assert_eq!(*memory.recall(), vec![0.0; 3]);
        assert!(!dir.path().join("m.bin").exists());
        assert!(matches!(memory.debug(dir.path().join("x.png")), Err(SnapshotError::Disabled)));
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let index = DenseIndex::from_mapped_flags([true; 4]);
        let mut memory = VisualMemory::new(small_config(dir.path().join("m.bin")), index);
        let tap: Arc<dyn FrameHistory> = Arc::new(EffectTap::new(8));

        memory.start(Arc::clone(&tap)).unwrap();
        assert!(memory.is_running());
        assert!(matches!(
            memory.start(tap),
            Err(VisualMemoryError::AlreadyRunning)
        ));

        memory.stop();
        assert!(!memory.is_running());
        assert!(memory.is_enabled());
    }
}
