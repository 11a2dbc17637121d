// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Camera feature ingest
//!
//! Turns row bands of an 8-bit luminance frame into two per-slot scalars that the
//! learn worker reads once per sweep:
//! - mean luminance of the slot's pixel block (0-255)
//! - motion: mean absolute change of gradient magnitude versus the previous frame
//!
//! Values are published through atomics when the last row band of a frame arrives,
//! so readers never block the capture path.

use crate::error::IngestError;
use crate::geometry::SamplerGeometry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use tracing::debug;

/// One band of consecutive rows of a captured luminance frame
#[derive(Debug, Clone, Copy)]
pub struct VideoChunk<'a> {
    /// Capture frame counter; all bands of one frame share it
    pub frame: u64,
    /// Frame row of the first pixel in `luma`
    pub first_row: usize,
    /// Row-major luminance, a whole number of frame-width rows
    pub luma: &'a [u8],
}

struct IngestScratch {
    frame: Option<u64>,
    next_row: usize,
    prev_row: Vec<u8>,
    has_prev_row: bool,
    /// Gradient magnitude of every pixel in the last completed frame
    gradients: Vec<f32>,
    has_gradients: bool,
    luma_sums: Vec<u64>,
    motion_sums: Vec<f64>,
}

impl IngestScratch {
    fn new(geometry: &SamplerGeometry) -> Self {
        let slots = geometry.sample_slots();
        Self {
            frame: None,
            next_row: 0,
            prev_row: vec![0; geometry.frame_width()],
            has_prev_row: false,
            gradients: vec![0.0; geometry.frame_width() * geometry.frame_height()],
            has_gradients: false,
            luma_sums: vec![0; slots],
            motion_sums: vec![0.0; slots],
        }
    }

    fn begin_frame(&mut self, frame: u64) {
        self.frame = Some(frame);
        self.next_row = 0;
        self.has_prev_row = false;
        self.luma_sums.fill(0);
        self.motion_sums.fill(0.0);
    }

    fn discard_frame(&mut self) {
        self.frame = None;
        self.next_row = 0;
        self.has_prev_row = false;
    }
}

/// Per-slot luminance and motion, fed by the capture path
pub struct FeatureIngest {
    geometry: SamplerGeometry,
    luminance: Vec<AtomicU8>,
    /// f32 bit patterns
    motion: Vec<AtomicU32>,
    frames_completed: AtomicU64,
    scratch: Mutex<IngestScratch>,
}

impl FeatureIngest {
    pub fn new(geometry: SamplerGeometry) -> Self {
        let slots = geometry.sample_slots();
        Self {
            geometry,
            luminance: (0..slots).map(|_| AtomicU8::new(0)).collect(),
            motion: (0..slots).map(|_| AtomicU32::new(0f32.to_bits())).collect(),
            frames_completed: AtomicU64::new(0),
            scratch: Mutex::new(IngestScratch::new(&geometry)),
        }
    }

    pub fn geometry(&self) -> &SamplerGeometry {
        &self.geometry
    }

    pub fn sample_slots(&self) -> usize {
        self.luminance.len()
    }

    /// Mean luminance of `slot` in the last completed frame
    #[inline]
    pub fn luminance(&self, slot: usize) -> u8 {
        self.luminance[slot].load(Ordering::Relaxed)
    }

    /// Motion of `slot` in the last completed frame
    #[inline]
    pub fn motion(&self, slot: usize) -> f32 {
        f32::from_bits(self.motion[slot].load(Ordering::Relaxed))
    }

    /// Feed features extracted elsewhere straight into a slot
    pub fn set_sample(&self, slot: usize, luminance: u8, motion: f32) {
        self.luminance[slot].store(luminance, Ordering::Relaxed);
        self.motion[slot].store(motion.to_bits(), Ordering::Relaxed);
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed.load(Ordering::Acquire)
    }

    /// Consume one row band
    ///
    /// Bands must arrive in row order, starting at row 0 for each frame. A malformed
    /// or out-of-order band discards the partially accumulated frame; the values of
    /// the last completed frame stay published.
    pub fn process(&self, chunk: &VideoChunk<'_>) -> Result<(), IngestError> {
        let width = self.geometry.frame_width();
        let height = self.geometry.frame_height();
        let mut scratch = self.scratch.lock();

        if width == 0 || chunk.luma.is_empty() || chunk.luma.len() % width != 0 {
            scratch.discard_frame();
            return Err(IngestError::RaggedChunk {
                len: chunk.luma.len(),
                width,
            });
        }

        let rows = chunk.luma.len() / width;
        let end_row = chunk.first_row + rows;
        if end_row > height {
            scratch.discard_frame();
            return Err(IngestError::RowsOutOfBounds {
                first_row: chunk.first_row,
                end_row,
                height,
            });
        }

        if chunk.first_row == 0 {
            scratch.begin_frame(chunk.frame);
        } else if scratch.frame != Some(chunk.frame) || scratch.next_row != chunk.first_row {
            let expected = if scratch.frame == Some(chunk.frame) {
                scratch.next_row
            } else {
                0
            };
            scratch.discard_frame();
            return Err(IngestError::OutOfOrder {
                frame: chunk.frame,
                expected,
                got: chunk.first_row,
            });
        }

        for (band_row, row) in chunk.luma.chunks_exact(width).enumerate() {
            self.accumulate_row(&mut scratch, chunk.first_row + band_row, row);
        }
        scratch.next_row = end_row;

        if end_row == height {
            self.publish_frame(&mut scratch);
        }
        Ok(())
    }

    fn accumulate_row(&self, scratch: &mut IngestScratch, y: usize, row: &[u8]) {
        let width = row.len();
        let compare = scratch.has_gradients;
        let block_width = self.geometry.block_width as usize;
        let slot_row = (y / self.geometry.block_height as usize) * self.geometry.blocks_wide as usize;

        for x in 0..width {
            let left = row[x.saturating_sub(1)] as i16;
            let right = row[(x + 1).min(width - 1)] as i16;
            let gx = (right - left).abs();
            let gy = if scratch.has_prev_row {
                (row[x] as i16 - scratch.prev_row[x] as i16).abs()
            } else {
                0
            };
            let gradient = (gx + gy) as f32;

            let slot = slot_row + x / block_width;
            let pixel = y * width + x;
            if compare {
                scratch.motion_sums[slot] += (gradient - scratch.gradients[pixel]).abs() as f64;
            }
            scratch.gradients[pixel] = gradient;
            scratch.luma_sums[slot] += row[x] as u64;
        }

        scratch.prev_row.copy_from_slice(row);
        scratch.has_prev_row = true;
    }

    fn publish_frame(&self, scratch: &mut IngestScratch) {
        let pixels = (self.geometry.block_width * self.geometry.block_height) as f64;
        for slot in 0..self.luminance.len() {
            let luma = (scratch.luma_sums[slot] as f64 / pixels).round().min(255.0) as u8;
            let motion = (scratch.motion_sums[slot] / pixels) as f32;
            self.set_sample(slot, luma, motion);
        }

        if !scratch.has_gradients {
            debug!("[VISMEM] First camera frame seen; motion starts with the next frame");
        }
        scratch.has_gradients = true;
        scratch.discard_frame();

        let completed = self.frames_completed.fetch_add(1, Ordering::AcqRel) + 1;
        if completed == 1 {
            debug!(
                "[VISMEM] Feature ingest live: {} slots over a {}x{} frame",
                self.luminance.len(),
                self.geometry.frame_width(),
                self.geometry.frame_height()
            );
        }
    }
}

impl std::fmt::Debug for FeatureIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureIngest")
            .field("geometry", &self.geometry)
            .field("frames_completed", &self.frames_completed())
            .finish()
    }
}
