// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Debug snapshot of the cell grid
//!
//! LEDs are laid out on an artificial near-square grid (`ceil(sqrt(dense))` wide).
//! Each LED gets a tile the size of the camera sample grid, and every cell lands at
//! its sample slot's position inside its LED's tile. Red shows short-term memory,
//! green and blue show long-term memory, both normalized by the largest long-term
//! value and raised to the fourth power.

use crate::error::SnapshotError;
use crate::geometry::GridShape;
use crate::memory_store::Cell;
use image::{ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Summary of a rendered snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Largest long-term value in the grid (the normalization range)
    pub cell_max: f64,
    pub width: u32,
    pub height: u32,
    pub cells: usize,
}

/// Map a normalized memory value to an 8-bit channel
#[inline]
fn quantize(v: f64) -> u8 {
    (v.powi(4) * 255.0 + 0.5).min(255.0) as u8
}

/// Render the grid to an RGB image
pub fn render(cells: &[Cell], shape: GridShape) -> Result<(RgbImage, SnapshotStats), SnapshotError> {
    let dense = shape.dense_len();
    let slots = shape.sample_slots();
    if dense == 0 || slots == 0 || cells.len() < slots * dense {
        return Err(SnapshotError::EmptyGrid);
    }

    let leds_wide = (dense as f64).sqrt().ceil() as usize;
    let leds_high = dense.div_ceil(leds_wide);
    let blocks_wide = shape.blocks_wide as usize;
    let blocks_high = shape.blocks_high as usize;
    let width = (leds_wide * blocks_wide) as u32;
    let height = (leds_high * blocks_high) as u32;

    let cell_max = cells[..slots * dense]
        .iter()
        .map(|c| c.long_term)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut image = RgbImage::new(width, height);
    let stats = SnapshotStats {
        cell_max,
        width,
        height,
        cells: slots * dense,
    };

    // Nothing learned yet (or a corrupt grid): leave the image black
    if !(cell_max.is_finite() && cell_max > 0.0) {
        return Ok((image, stats));
    }
    let cell_scale = 1.0 / cell_max;

    for slot in 0..slots {
        let sx = slot % blocks_wide;
        let sy = slot / blocks_wide;
        for (led, cell) in cells[slot * dense..(slot + 1) * dense].iter().enumerate() {
            let x = sx + (led % leds_wide) * blocks_wide;
            let y = sy + (led / leds_wide) * blocks_high;

            let short = quantize(cell.short_term * cell_scale);
            let long = quantize(cell.long_term * cell_scale);
            image.put_pixel(x as u32, y as u32, Rgb([short, long, long]));
        }
    }

    Ok((image, stats))
}

/// Render the grid and write it as a PNG
pub fn write_png(
    cells: &[Cell],
    shape: GridShape,
    path: impl AsRef<Path>,
) -> Result<SnapshotStats, SnapshotError> {
    let path = path.as_ref();
    let (image, stats) = render(cells, shape)?;

    info!("[VISMEM-SNAPSHOT] range {}", stats.cell_max);

    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| SnapshotError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        "[VISMEM-SNAPSHOT] Wrote {}x{} snapshot to {:?}",
        stats.width, stats.height, path
    );
    Ok(stats)
}
