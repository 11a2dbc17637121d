// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Rendered frame history for latency compensation
//!
//! The camera sees the LEDs some fixed number of render ticks late. The learn
//! worker correlates each camera sample with the frame rendered that many ticks
//! earlier, looked up through [`FrameHistory`].

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Linear RGB, nominally 0.0-1.0 per channel (values above 1.0 are allowed)
pub type Rgb = [f32; 3];

/// One rendered output frame, indexed by sparse pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub tick: u64,
    pub colors: Vec<Rgb>,
}

impl Frame {
    /// Color of a sparse pixel, black if the frame does not cover it
    #[inline]
    pub fn color(&self, sparse: usize) -> Rgb {
        self.colors.get(sparse).copied().unwrap_or([0.0; 3])
    }
}

/// Source of previously rendered frames
pub trait FrameHistory: Send + Sync {
    /// Frame rendered `lag` ticks before the newest one (`lag = 0` is the newest),
    /// or `None` if the history does not reach that far yet
    fn get_delayed(&self, lag: u32) -> Option<Arc<Frame>>;

    /// Like [`get_delayed`](Self::get_delayed), but waits up to `timeout` for the
    /// frame to become available
    fn wait_delayed(&self, lag: u32, timeout: Duration) -> Option<Arc<Frame>>;
}

struct TapState {
    frames: VecDeque<Arc<Frame>>,
    next_tick: u64,
}

/// Bounded ring of the most recent rendered frames
///
/// The render path calls [`push`](Self::push) once per tick; waiters in
/// [`wait_delayed`](FrameHistory::wait_delayed) are woken on every push.
pub struct EffectTap {
    capacity: usize,
    state: Mutex<TapState>,
    pushed: Condvar,
}

impl EffectTap {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(TapState {
                frames: VecDeque::with_capacity(capacity),
                next_tick: 0,
            }),
            pushed: Condvar::new(),
        }
    }

    /// Record a rendered frame, returning its tick
    pub fn push(&self, colors: Vec<Rgb>) -> u64 {
        let tick = {
            let mut state = self.state.lock();
            let tick = state.next_tick;
            state.next_tick += 1;
            if state.frames.len() == self.capacity {
                state.frames.pop_front();
            }
            state.frames.push_back(Arc::new(Frame { tick, colors }));
            tick
        };
        self.pushed.notify_all();
        tick
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lookup(frames: &VecDeque<Arc<Frame>>, lag: u32) -> Option<Arc<Frame>> {
        let lag = lag as usize;
        if lag >= frames.len() {
            return None;
        }
        frames.get(frames.len() - 1 - lag).cloned()
    }
}

impl FrameHistory for EffectTap {
    fn get_delayed(&self, lag: u32) -> Option<Arc<Frame>> {
        Self::lookup(&self.state.lock().frames, lag)
    }

    fn wait_delayed(&self, lag: u32, timeout: Duration) -> Option<Arc<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = Self::lookup(&state.frames, lag) {
                return Some(frame);
            }
            // A lag beyond capacity can never be satisfied
            if lag as usize >= self.capacity {
                return None;
            }
            if self.pushed.wait_until(&mut state, deadline).timed_out() {
                return Self::lookup(&state.frames, lag);
            }
        }
    }
}

impl std::fmt::Debug for EffectTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectTap")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
