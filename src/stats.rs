//! Rolling statistics across closed frames
//!
//! Every closed frame is folded into all-time totals: per-method time and
//! call counts, per-frame maxima and the number of frames that blew the
//! frame budget. Totals only ever grow.

use crate::frames::{FrameStats, REMAINING_CLASS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// All-time statistics for one method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodTotals {
    pub spent_total_ms: f64,
    pub max_call_count_per_frame: u64,
    pub max_spent_per_frame_ms: f64,
    pub total_call_count: u64,
}

impl MethodTotals {
    /// Average exclusive time per call, zero before the first call
    pub fn avg_per_call_ms(&self) -> f64 {
        if self.total_call_count == 0 {
            0.0
        } else {
            self.spent_total_ms / self.total_call_count as f64
        }
    }
}

/// All-time statistics for one class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassTotals {
    pub methods: BTreeMap<String, MethodTotals>,
    /// Live instances when the class last appeared in a closed frame
    pub instance_count: u64,
}

impl ClassTotals {
    pub fn spent_total_ms(&self) -> f64 {
        self.methods.values().map(|m| m.spent_total_ms).sum()
    }
}

/// Snapshot of the rolling statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingTotals {
    pub classes: BTreeMap<String, ClassTotals>,
    pub exceeded_frame_budget_count: u64,
    pub frames_observed: u64,
}

impl RollingTotals {
    pub fn method(&self, class: &str, method: &str) -> Option<&MethodTotals> {
        self.classes.get(class)?.methods.get(method)
    }
}

/// Folds closed frames into [`RollingTotals`]
#[derive(Debug)]
pub struct StatsTracker {
    totals: RollingTotals,
    budget_ms: f64,
}

impl StatsTracker {
    pub fn new(budget_ms: f64) -> Self {
        Self {
            totals: RollingTotals::default(),
            budget_ms,
        }
    }

    /// Fold one closed frame into the totals
    ///
    /// Returns `true` when the frame exceeded the budget.
    pub fn absorb(&mut self, frame: &FrameStats) -> bool {
        for (class_name, class) in &frame.classes {
            if class_name == REMAINING_CLASS {
                continue;
            }
            let totals = self.totals.classes.entry(class_name.clone()).or_default();
            totals.instance_count = class.instance_count;

            for (method_name, method) in &class.methods {
                let entry = totals.methods.entry(method_name.clone()).or_default();
                entry.spent_total_ms += method.spent_total_ms;
                if method.call_count > 0 {
                    entry.total_call_count += method.call_count;
                }
                entry.max_call_count_per_frame =
                    entry.max_call_count_per_frame.max(method.call_count);
                entry.max_spent_per_frame_ms =
                    entry.max_spent_per_frame_ms.max(method.spent_total_ms);
            }
        }

        self.totals.frames_observed += 1;

        // Tracked work can outgrow the frame total when continuations of an
        // earlier frame resolve in this one.
        let frame_time = frame.spent_total_ms.max(frame.tracked_total_ms());
        let exceeded = frame_time > self.budget_ms;
        if exceeded {
            self.totals.exceeded_frame_budget_count += 1;
            debug!(
                frame_time,
                budget_ms = self.budget_ms,
                count = self.totals.exceeded_frame_budget_count,
                "frame budget exceeded"
            );
        }
        exceeded
    }

    pub fn totals(&self) -> &RollingTotals {
        &self.totals
    }

    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }
}
