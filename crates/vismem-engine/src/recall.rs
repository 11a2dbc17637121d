// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Recall signal and learn flags
//!
//! The learn worker accumulates per-pixel evidence over a sweep and publishes a
//! normalized recall buffer once the sweep completes. Readers get an immutable
//! snapshot (`Arc<Vec<f64>>`), so they always see one whole sweep's output and
//! never a buffer in the middle of being rewritten. Two buffers alternate between
//! "published" and "being filled" to avoid allocating per sweep.

use crate::pixel_index::DenseIndex;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Default gain for [`recall_intensity`]
pub const DEFAULT_RECALL_SENSITIVITY: f64 = -8.0;

/// Grey level used to visualise a recall value: `clamp(0.5 + value * sensitivity, 0, 1)`
#[inline]
pub fn recall_intensity(value: f64, sensitivity: f64) -> f64 {
    (0.5 + value * sensitivity).clamp(0.0, 1.0)
}

/// Published recall, one value per sparse pixel
pub struct RecallBuffer {
    current: RwLock<Arc<Vec<f64>>>,
    generation: AtomicU64,
}

impl RecallBuffer {
    /// All-zero buffer covering `sparse_len` pixels
    pub fn new(sparse_len: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(vec![0.0; sparse_len])),
            generation: AtomicU64::new(0),
        }
    }

    /// Latest complete recall; cheap to call from any thread
    pub fn snapshot(&self) -> Arc<Vec<f64>> {
        Arc::clone(&self.current.read())
    }

    /// Number of sweeps published so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn swap(&self, next: Arc<Vec<f64>>) -> Arc<Vec<f64>> {
        let previous = std::mem::replace(&mut *self.current.write(), next);
        self.generation.fetch_add(1, Ordering::AcqRel);
        previous
    }
}

impl std::fmt::Debug for RecallBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallBuffer")
            .field("len", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Per-sweep evidence accumulator, owned by the learn worker
pub struct RecallPublisher {
    index: Arc<DenseIndex>,
    accumulator: Vec<f64>,
    total: f64,
    spare: Option<Arc<Vec<f64>>>,
}

impl RecallPublisher {
    pub fn new(index: Arc<DenseIndex>) -> Self {
        let dense = index.dense_len();
        Self {
            index,
            accumulator: vec![0.0; dense],
            total: 0.0,
            spare: None,
        }
    }

    /// Reset the accumulator and total
    pub fn begin_sweep(&mut self) {
        self.accumulator.fill(0.0);
        self.total = 0.0;
    }

    #[inline]
    pub fn accumulate(&mut self, dense: usize, evidence: f64) {
        self.accumulator[dense] += evidence;
        self.total += evidence;
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Normalize this sweep's evidence and publish it into `buffer`
    ///
    /// Every mapped pixel is rewritten with `evidence * dense_len / total - 1`, so
    /// the mean over mapped pixels is zero. A zero total publishes `-1` everywhere.
    /// Unmapped pixels stay at zero. Returns the scale that was applied.
    pub fn publish(&mut self, buffer: &RecallBuffer) -> f64 {
        let dense = self.index.dense_len();
        let scale = if self.total != 0.0 {
            dense as f64 / self.total
        } else {
            0.0
        };

        // Reuse the previously published buffer unless a reader still holds it
        let sparse_len = self.index.sparse_len();
        let mut values = self
            .spare
            .take()
            .and_then(|spare| Arc::try_unwrap(spare).ok())
            .filter(|spare| spare.len() == sparse_len)
            .unwrap_or_else(|| vec![0.0; sparse_len]);
        self.fill(&mut values, scale);

        self.spare = Some(buffer.swap(Arc::new(values)));
        scale
    }

    fn fill(&self, values: &mut [f64], scale: f64) {
        for (dense, evidence) in self.accumulator.iter().enumerate() {
            values[self.index.sparse(dense)] = evidence * scale - 1.0;
        }
    }
}

/// Per-slot "did this slot learn in the latest sweep" flags (diagnostic)
pub struct LearnFlags {
    flags: Vec<AtomicBool>,
}

impl LearnFlags {
    pub fn new(slots: usize) -> Self {
        Self {
            flags: (0..slots).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    #[inline]
    pub fn set(&self, slot: usize, learned: bool) {
        self.flags[slot].store(learned, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, slot: usize) -> bool {
        self.flags[slot].load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn count_set(&self) -> usize {
        self.flags
            .iter()
            .filter(|f| f.load(Ordering::Relaxed))
            .count()
    }

    pub fn to_vec(&self) -> Vec<bool> {
        self.flags.iter().map(|f| f.load(Ordering::Relaxed)).collect()
    }
}

impl std::fmt::Debug for LearnFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearnFlags")
            .field("slots", &self.len())
            .field("set", &self.count_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> Arc<DenseIndex> {
        // Sparse pixels 1 and 4 are unmapped
        Arc::new(DenseIndex::from_mapped_flags([
            true, false, true, true, false, true,
        ]))
    }

    #[test]
    fn test_publish_has_zero_mean() {
        let buffer = RecallBuffer::new(6);
        let mut publisher = RecallPublisher::new(index());

        publisher.begin_sweep();
        for (dense, evidence) in [0.5, 2.0, 0.25, 1.25].into_iter().enumerate() {
            publisher.accumulate(dense, evidence);
        }
        publisher.publish(&buffer);

        let recall = buffer.snapshot();
        let mapped = [0usize, 2, 3, 5];
        let mean: f64 = mapped.iter().map(|&s| recall[s]).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert_eq!(recall[1], 0.0);
        assert_eq!(recall[4], 0.0);
        assert_eq!(buffer.generation(), 1);
    }

    #[test]
    fn test_zero_total_publishes_minus_one() {
        let buffer = RecallBuffer::new(6);
        let mut publisher = RecallPublisher::new(index());

        publisher.begin_sweep();
        let scale = publisher.publish(&buffer);

        assert_eq!(scale, 0.0);
        assert_eq!(*buffer.snapshot(), vec![-1.0, 0.0, -1.0, -1.0, 0.0, -1.0]);
    }

    #[test]
    fn test_reader_snapshot_is_stable_across_publishes() {
        let buffer = RecallBuffer::new(6);
        let mut publisher = RecallPublisher::new(index());

        publisher.begin_sweep();
        publisher.accumulate(0, 1.0);
        publisher.publish(&buffer);
        let held = buffer.snapshot();
        let before = (*held).clone();

        for _ in 0..3 {
            publisher.begin_sweep();
            publisher.accumulate(3, 2.0);
            publisher.publish(&buffer);
        }

        assert_eq!(*held, before);
        assert_eq!(buffer.generation(), 4);
        assert_eq!(buffer.snapshot()[5], 3.0);
    }

    #[test]
    fn test_begin_sweep_resets_accumulator() {
        let mut publisher = RecallPublisher::new(index());
        publisher.accumulate(1, 4.0);
        publisher.begin_sweep();
        assert_eq!(publisher.total(), 0.0);
    }

    #[test]
    fn test_learn_flags() {
        let flags = LearnFlags::new(4);
        flags.set(1, true);
        flags.set(3, true);
        flags.set(3, false);
        assert_eq!(flags.to_vec(), vec![false, true, false, false]);
        assert_eq!(flags.count_set(), 1);
    }

    #[test]
    fn test_recall_intensity() {
        assert_eq!(recall_intensity(0.0, DEFAULT_RECALL_SENSITIVITY), 0.5);
        assert_eq!(recall_intensity(1.0, DEFAULT_RECALL_SENSITIVITY), 0.0);
        assert_eq!(recall_intensity(-1.0, DEFAULT_RECALL_SENSITIVITY), 1.0);
        assert_eq!(recall_intensity(-0.03125, DEFAULT_RECALL_SENSITIVITY), 0.75);
    }
}
