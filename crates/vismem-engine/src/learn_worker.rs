// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Learn worker
//!
//! One sweep visits every camera sample slot in index order. Slots that pass the
//! motion gate are correlated with the frame rendered `expected_delay` ticks ago:
//! every cell of the slot is updated and its long-term value, weighted by the
//! slot's motion, is added to the sweep's recall evidence. The evidence is
//! normalized and published when the sweep ends.

use crate::feature_ingest::FeatureIngest;
use crate::frame_history::FrameHistory;
use crate::learning::{reinforcement, LearnParams};
use crate::memory_store::MemoryStore;
use crate::pixel_index::DenseIndex;
use crate::recall::{LearnFlags, RecallBuffer, RecallPublisher};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepStats {
    /// Slots whose cells were updated
    pub learned_slots: usize,
    /// Slots that passed the gate but had no delayed frame yet
    pub skipped_slots: usize,
    /// Sum of all evidence accumulated this sweep
    pub recall_total: f64,
    /// Normalization applied when publishing (0 when the total was 0)
    pub recall_scale: f64,
}

/// Sweeps-per-second counter, reporting at most once per interval
#[derive(Debug)]
pub struct CycleRateCounter {
    interval: Duration,
    window_start: Instant,
    cycles: u64,
}

impl CycleRateCounter {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            window_start: start,
            cycles: 0,
        }
    }

    /// Count one cycle; returns the rate once the interval has elapsed
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.cycles += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed <= self.interval {
            return None;
        }
        let rate = self.cycles as f64 / elapsed.as_secs_f64();
        self.cycles = 0;
        self.window_start = now;
        Some(rate)
    }
}

/// Everything one learning loop needs; owned by the learning thread
pub struct LearnWorker {
    pub(crate) store: Arc<Mutex<MemoryStore>>,
    pub(crate) index: Arc<DenseIndex>,
    pub(crate) ingest: Arc<FeatureIngest>,
    pub(crate) history: Arc<dyn FrameHistory>,
    pub(crate) recall: Arc<RecallBuffer>,
    pub(crate) flags: Arc<LearnFlags>,
    pub(crate) sweeps: Arc<AtomicU64>,
    pub(crate) publisher: RecallPublisher,
    pub(crate) params: LearnParams,
    pub(crate) rng: StdRng,
    pub(crate) expected_delay: u32,
    pub(crate) frame_wait: Duration,
}

impl LearnWorker {
    pub(crate) fn seeded_rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    /// Run one complete sweep and publish its recall
    pub fn sweep(&mut self) -> SweepStats {
        let always = AtomicBool::new(true);
        self.sweep_while(&always).unwrap_or_default()
    }

    /// Like [`sweep`](Self::sweep), but checks `running` before every slot
    ///
    /// Returns `None` when `running` is cleared mid-sweep; the partial evidence is
    /// discarded and nothing is published.
    pub fn sweep_while(&mut self, running: &AtomicBool) -> Option<SweepStats> {
        let mut stats = SweepStats::default();
        self.publisher.begin_sweep();

        for slot in 0..self.flags.len() {
            if !running.load(Ordering::Acquire) {
                debug!("[VISMEM-LEARN] Sweep abandoned at slot {}", slot);
                return None;
            }

            let motion = self.ingest.motion(slot);
            let luma = self.ingest.luminance(slot);

            let u: f64 = self.rng.gen();
            let learning = self.params.should_learn(motion, u);
            self.flags.set(slot, learning);
            if !learning {
                continue;
            }

            let frame = match self.history.get_delayed(self.expected_delay) {
                Some(frame) => frame,
                None => {
                    // Not warmed up yet: give the render path a moment, try again next sweep
                    let _ = self
                        .history
                        .wait_delayed(self.expected_delay, self.frame_wait);
                    stats.skipped_slots += 1;
                    continue;
                }
            };

            let motion = motion as f64;
            let mut store = self.store.lock();
            for (dense, cell) in store.slot_cells_mut(slot).iter_mut().enumerate() {
                let color = frame.color(self.index.sparse(dense));
                let long_term = cell.learn(reinforcement(luma, color), &self.params);
                self.publisher.accumulate(dense, motion * long_term);
            }
            stats.learned_slots += 1;
        }

        stats.recall_total = self.publisher.total();
        stats.recall_scale = self.publisher.publish(&self.recall);
        self.sweeps.fetch_add(1, Ordering::Release);

        trace!(
            "[VISMEM-LEARN] sweep: learned={} skipped={} total={}",
            stats.learned_slots,
            stats.skipped_slots,
            stats.recall_total
        );
        Some(stats)
    }

    /// Sweep until `running` is cleared; `running` belongs to this thread alone
    pub(crate) fn run(mut self, running: Arc<AtomicBool>, report_interval: Duration) {
        info!(
            "[VISMEM-LEARN] Learn loop started ({} slots, {} LED pixels)",
            self.flags.len(),
            self.index.dense_len()
        );

        let mut rate = CycleRateCounter::new(report_interval);
        while running.load(Ordering::Acquire) {
            if self.sweep_while(&running).is_none() {
                break;
            }
            if let Some(cycles_per_sec) = rate.tick() {
                info!("[VISMEM-LEARN] {:.02} cycles / second", cycles_per_sec);
            }
        }

        debug!(
            "[VISMEM-LEARN] Learn loop exiting after {} sweeps",
            self.sweeps.load(Ordering::Acquire)
        );
    }
}
