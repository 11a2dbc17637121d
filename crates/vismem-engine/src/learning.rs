// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Learning rule: motion gate, reinforcement and the two-speed cell update

use crate::frame_history::Rgb;
use crate::memory_store::Cell;
use vismem_config::LearningConfig;

/// Constants of the learning rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnParams {
    /// Motion at or above this value always passes the gate
    pub motion_threshold: f64,
    /// Fraction of short-term memory forgotten per update
    pub short_term_permeability: f64,
    /// Gain on the cubed short/long difference
    pub long_term_permeability: f64,
}

impl Default for LearnParams {
    fn default() -> Self {
        Self::from(&LearningConfig::default())
    }
}

impl From<&LearningConfig> for LearnParams {
    fn from(config: &LearningConfig) -> Self {
        Self {
            motion_threshold: config.motion_threshold,
            short_term_permeability: config.short_term_permeability,
            long_term_permeability: config.long_term_permeability,
        }
    }
}

impl LearnParams {
    /// Motion gate for one slot given a uniform draw `u` in [0, 1)
    ///
    /// Passes when `motion / threshold >= u^2`, i.e. with probability
    /// `sqrt(min(1, motion / threshold))`. Zero (or negative) motion never passes.
    #[inline]
    pub fn should_learn(&self, motion: f32, u: f64) -> bool {
        let motion = motion as f64;
        motion > 0.0 && motion / self.motion_threshold >= u * u
    }

    /// Fixed point of short-term memory under constant reinforcement `x`
    pub fn short_term_fixed_point(&self, reinforcement: f64) -> f64 {
        reinforcement / self.short_term_permeability
    }
}

/// Reinforcement for one cell: `(luma/255)^2 * mean(min(1, c)^2)` over the RGB channels
#[inline]
pub fn reinforcement(luma: u8, color: Rgb) -> f64 {
    let luma_sq = (luma as f64 * luma as f64) / 65025.0;
    let channel_sq = |c: f32| {
        let c = (c as f64).min(1.0);
        c * c
    };
    let color_sq = (channel_sq(color[0]) + channel_sq(color[1]) + channel_sq(color[2])) / 3.0;
    luma_sq * color_sq
}

impl Cell {
    /// Apply one learning update and return the new long-term value
    ///
    /// Short-term memory decays by the permeability and adds the reinforcement.
    /// Long-term memory moves toward short-term by the cube of their difference,
    /// so small gaps barely move it and large gaps close quickly.
    #[inline]
    pub fn learn(&mut self, reinforcement: f64, params: &LearnParams) -> f64 {
        self.short_term =
            self.short_term - self.short_term * params.short_term_permeability + reinforcement;
        let diff = self.short_term - self.long_term;
        self.long_term += diff * diff * diff * params.long_term_permeability;
        self.long_term
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_gate_always_passes_at_threshold() {
        let params = LearnParams::default();
        let mut rng = StdRng::seed_from_u64(84);
        for _ in 0..10_000 {
            let u: f64 = rng.gen();
            assert!(params.should_learn(100.0, u));
            assert!(params.should_learn(200.0, u));
        }
        // Worst case draw just below 1
        assert!(params.should_learn(100.0, 1.0 - f64::EPSILON));
    }

    #[test]
    fn test_gate_never_passes_without_motion() {
        let params = LearnParams::default();
        assert!(!params.should_learn(0.0, 0.0));
        assert!(!params.should_learn(0.0, 0.5));
    }

    #[test]
    fn test_gate_frequency_is_sqrt_of_ratio() {
        let params = LearnParams::default();
        let mut rng = StdRng::seed_from_u64(7);

        for motion in [1.0f32, 25.0, 64.0] {
            let trials = 200_000;
            let passed = (0..trials)
                .filter(|_| params.should_learn(motion, rng.gen()))
                .count();
            let observed = passed as f64 / trials as f64;
            let expected = (motion as f64 / 100.0).sqrt();
            assert!(
                (observed - expected).abs() < 0.01,
                "motion {}: observed {}, expected {}",
                motion,
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_reinforcement_formula() {
        assert_eq!(reinforcement(0, [1.0, 1.0, 1.0]), 0.0);
        assert_eq!(reinforcement(255, [1.0, 1.0, 1.0]), 1.0);
        assert_eq!(reinforcement(255, [0.0, 0.0, 0.0]), 0.0);

        // Channels above 1 are clamped before squaring
        assert_eq!(reinforcement(255, [4.0, 0.0, 0.0]), 1.0 / 3.0);

        let r = reinforcement(51, [0.5, 1.0, 0.0]);
        let expected = 0.04 * (0.25 + 1.0) / 3.0;
        assert!((r - expected).abs() < 1e-12);
    }

    #[test]
    fn test_short_term_converges_to_fixed_point() {
        let params = LearnParams::default();
        let mut cell = Cell::default();
        for _ in 0..1000 {
            cell.learn(0.5, &params);
        }
        let target = params.short_term_fixed_point(0.5);
        assert_eq!(target, 5.0);
        assert!((cell.short_term - target).abs() / target < 0.01);
    }

    #[test]
    fn test_long_term_approaches_short_term_monotonically() {
        let params = LearnParams {
            long_term_permeability: 1e-2,
            ..LearnParams::default()
        };
        let mut cell = Cell::default();

        // Let short-term settle first so the gap is driven by long-term alone
        for _ in 0..500 {
            cell.learn(0.5, &params);
        }
        let mut gap = (cell.short_term - cell.long_term).abs();
        for _ in 0..20_000 {
            cell.learn(0.5, &params);
            let next = (cell.short_term - cell.long_term).abs();
            assert!(next <= gap);
            gap = next;
        }
        assert!(gap < 0.5);
    }

    #[test]
    fn test_long_term_keeps_sign_of_difference() {
        let params = LearnParams::default();
        let mut cell = Cell {
            short_term: 0.0,
            long_term: 10.0,
        };
        let long = cell.learn(0.0, &params);
        assert!(long < 10.0);
    }
}
