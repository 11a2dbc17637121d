// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Camera sample grid and cell grid dimensions

use serde::{Deserialize, Serialize};
use vismem_config::SamplerConfig;

/// Layout of camera sample slots over the camera frame
///
/// Slots form a `blocks_wide x blocks_high` grid of `block_width x block_height`
/// pixel blocks, numbered row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerGeometry {
    pub blocks_wide: u32,
    pub blocks_high: u32,
    pub block_width: u32,
    pub block_height: u32,
}

impl Default for SamplerGeometry {
    fn default() -> Self {
        Self::from(&SamplerConfig::default())
    }
}

impl From<&SamplerConfig> for SamplerGeometry {
    fn from(config: &SamplerConfig) -> Self {
        Self {
            blocks_wide: config.blocks_wide,
            blocks_high: config.blocks_high,
            block_width: config.block_width,
            block_height: config.block_height,
        }
    }
}

impl SamplerGeometry {
    pub fn sample_slots(&self) -> usize {
        self.blocks_wide as usize * self.blocks_high as usize
    }

    pub fn frame_width(&self) -> usize {
        self.blocks_wide as usize * self.block_width as usize
    }

    pub fn frame_height(&self) -> usize {
        self.blocks_high as usize * self.block_height as usize
    }

    /// Block column of a slot
    pub fn block_x(&self, slot: usize) -> usize {
        slot % self.blocks_wide as usize
    }

    /// Block row of a slot
    pub fn block_y(&self, slot: usize) -> usize {
        slot / self.blocks_wide as usize
    }

    /// Slot covering frame pixel `(x, y)`
    pub fn slot_at(&self, x: usize, y: usize) -> usize {
        (y / self.block_height as usize) * self.blocks_wide as usize + x / self.block_width as usize
    }

    pub fn grid_shape(&self, dense_len: usize) -> GridShape {
        GridShape {
            blocks_wide: self.blocks_wide,
            blocks_high: self.blocks_high,
            dense_len: dense_len as u32,
        }
    }
}

/// Dimensions of the persisted cell grid: one cell per (sample slot, dense pixel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub blocks_wide: u32,
    pub blocks_high: u32,
    pub dense_len: u32,
}

impl GridShape {
    pub fn sample_slots(&self) -> usize {
        self.blocks_wide as usize * self.blocks_high as usize
    }

    pub fn dense_len(&self) -> usize {
        self.dense_len as usize
    }

    pub fn cell_count(&self) -> usize {
        self.sample_slots() * self.dense_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> SamplerGeometry {
        SamplerGeometry {
            blocks_wide: 4,
            blocks_high: 3,
            block_width: 2,
            block_height: 5,
        }
    }

    #[test]
    fn test_slot_coordinates() {
        let g = geometry();
        assert_eq!(g.sample_slots(), 12);
        assert_eq!(g.frame_width(), 8);
        assert_eq!(g.frame_height(), 15);
        assert_eq!((g.block_x(6), g.block_y(6)), (2, 1));
        assert_eq!(g.slot_at(5, 7), 6);
        assert_eq!(g.slot_at(7, 14), 11);
    }

    #[test]
    fn test_grid_shape_cell_count() {
        let shape = geometry().grid_shape(10);
        assert_eq!(shape.sample_slots(), 12);
        assert_eq!(shape.cell_count(), 120);
    }
}
