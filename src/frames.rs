//! Frame aggregation
//!
//! Buckets timing samples into frames. A frame stays open until the next
//! boundary event, so continuations still in flight when a frame's boundary
//! call returns land in it if they resolve before the next boundary. Closing
//! a frame derives per-class totals from method totals, injects the
//! unattributed remainder as the `_remaining` pseudo-class and appends the
//! frame to history.

use crate::config::FrameTotalMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// Pseudo-class holding frame time not attributed to any tracked class
pub const REMAINING_CLASS: &str = "_remaining";

/// Time and calls of one method within one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodStats {
    pub spent_total_ms: f64,
    pub call_count: u64,
}

/// Per-class totals within one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub methods: BTreeMap<String, MethodStats>,
    /// Sum of the methods' `spent_total_ms`, recomputed on close
    pub spent_total_ms: f64,
    pub instance_count: u64,
}

impl ClassStats {
    fn recompute_total(&mut self) {
        self.spent_total_ms = self.methods.values().map(|m| m.spent_total_ms).sum();
    }
}

/// One frame of measurements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub classes: BTreeMap<String, ClassStats>,
    pub spent_total_ms: f64,
}

impl FrameStats {
    /// Time spent in `class`; zero when the class did no work this frame
    pub fn class_spent_ms(&self, class: &str) -> f64 {
        self.classes
            .get(class)
            .map(|c| c.spent_total_ms)
            .unwrap_or(0.0)
    }

    pub fn method(&self, class: &str, method: &str) -> Option<&MethodStats> {
        self.classes.get(class)?.methods.get(method)
    }

    /// Sum of every tracked class, excluding the remainder
    pub fn tracked_total_ms(&self) -> f64 {
        self.classes
            .iter()
            .filter(|(name, _)| name.as_str() != REMAINING_CLASS)
            .map(|(_, c)| c.spent_total_ms)
            .sum()
    }

    pub fn remaining_ms(&self) -> f64 {
        self.class_spent_ms(REMAINING_CLASS)
    }
}

/// Aggregator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Open,
    Closing,
}

/// Frame history plus the frame currently accumulating
#[derive(Debug)]
pub struct FrameAggregator {
    history: VecDeque<FrameStats>,
    current: FrameStats,
    phase: FramePhase,
    opened_at_ms: f64,
    closed_count: u64,
    max_history: Option<usize>,
}

impl FrameAggregator {
    pub fn new(now_ms: f64, max_history: Option<usize>) -> Self {
        Self {
            history: VecDeque::new(),
            current: FrameStats::default(),
            phase: FramePhase::Open,
            opened_at_ms: now_ms,
            closed_count: 0,
            max_history,
        }
    }

    /// Count one call of `class.method` in the open frame
    pub fn record_call(&mut self, class: &str, method: &str) {
        self.method_entry(class, method).call_count += 1;
    }

    /// Add exclusive time of `class.method` to the open frame
    pub fn record_time(&mut self, class: &str, method: &str, spent_ms: f64) {
        let entry = self.method_entry(class, method);
        entry.spent_total_ms += spent_ms;
        if let Some(stats) = self.current.classes.get_mut(class) {
            stats.spent_total_ms += spent_ms;
        }
    }

    /// Add boundary invocation time to the open frame's own total
    pub fn add_frame_time(&mut self, spent_ms: f64) {
        self.current.spent_total_ms += spent_ms;
    }

    /// Close the open frame and open a new one
    ///
    /// `instance_counts` maps class names to live instance counts at the
    /// moment of closing. Returns the closed frame.
    pub fn close(
        &mut self,
        now_ms: f64,
        mode: FrameTotalMode,
        instance_counts: &HashMap<String, u64>,
    ) -> &FrameStats {
        self.phase = FramePhase::Closing;

        let mut frame = std::mem::take(&mut self.current);
        if mode == FrameTotalMode::WallClock {
            frame.spent_total_ms = (now_ms - self.opened_at_ms).max(0.0);
        }

        for (name, class) in frame.classes.iter_mut() {
            class.recompute_total();
            class.instance_count = instance_counts.get(name).copied().unwrap_or(0);
        }

        let tracked_total = frame.tracked_total_ms();
        let remainder = (frame.spent_total_ms - tracked_total).max(0.0);
        frame.classes.insert(
            REMAINING_CLASS.to_string(),
            ClassStats {
                methods: BTreeMap::new(),
                spent_total_ms: remainder,
                instance_count: 0,
            },
        );

        debug!(
            frame = self.closed_count,
            spent_total_ms = frame.spent_total_ms,
            tracked_total,
            remainder,
            "frame closed"
        );

        self.history.push_back(frame);
        if let Some(max) = self.max_history {
            while self.history.len() > max {
                self.history.pop_front();
            }
        }
        self.closed_count += 1;
        self.opened_at_ms = now_ms;
        self.phase = FramePhase::Open;

        &self.history[self.history.len() - 1]
    }

    /// Closed frames still retained, oldest first
    pub fn history(&self) -> impl Iterator<Item = &FrameStats> {
        self.history.iter()
    }

    pub fn current(&self) -> &FrameStats {
        &self.current
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Frames closed since creation, including evicted ones
    pub fn closed_count(&self) -> u64 {
        self.closed_count
    }

    fn method_entry(&mut self, class: &str, method: &str) -> &mut MethodStats {
        self.current
            .classes
            .entry(class.to_string())
            .or_default()
            .methods
            .entry(method.to_string())
            .or_default()
    }
}
