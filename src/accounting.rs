//! Time accounting engine
//!
//! Computes self time and total time per invocation on top of the
//! [`CallStack`](crate::context::CallStack):
//!
//! - **Self time** is the elapsed time of an invocation's synchronous body
//!   minus the elapsed time of every tracked frame (nested call or
//!   continuation) that ran on top of it.
//! - **Total time** is the elapsed time of the synchronous body plus the
//!   elapsed time of every continuation causally descended from it.
//!
//! Every finished frame produces a [`TimingSample`] carrying the *exclusive*
//! time of that frame, which is what frame statistics accumulate so nested
//! work is counted once, against the innermost invocation.
//!
//! Records stay alive while their synchronous body runs or while any
//! continuation descended from them is pending, then retire into a bounded
//! log of [`InvocationSummary`] values.

use crate::context::{CallStack, ContinuationKind, ForkedContext, InvocationId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{trace, warn};

/// Static description of a call entering the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub class: String,
    pub method: String,
    pub arg_count: usize,
    /// The invocation is a designated frame boundary
    pub terminal: bool,
    /// The class/method pair is registered for frame statistics
    pub tracked: bool,
}

/// Live state of one invocation
#[derive(Debug, Clone)]
pub struct InvocationRecord {
    pub id: InvocationId,
    pub operation: String,
    pub owner_class: String,
    pub arg_count: usize,
    pub started_ms: f64,
    pub self_ms: f64,
    pub total_ms: f64,
    pub terminal: bool,
    pub tracked: bool,
    /// Continuations scheduled directly by this invocation
    pub continuations: u32,
    active: bool,
    pending: u32,
}

impl InvocationRecord {
    fn summary(&self, retired: bool) -> InvocationSummary {
        InvocationSummary {
            id: self.id,
            class: self.owner_class.clone(),
            method: self.operation.clone(),
            arg_count: self.arg_count,
            self_ms: self.self_ms,
            total_ms: self.total_ms,
            continuations: self.continuations,
            terminal: self.terminal,
            retired,
        }
    }

    fn is_settled(&self) -> bool {
        !self.active && self.pending == 0
    }
}

/// Point-in-time view of an invocation, live or retired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationSummary {
    pub id: InvocationId,
    pub class: String,
    pub method: String,
    pub arg_count: usize,
    pub self_ms: f64,
    pub total_ms: f64,
    pub continuations: u32,
    pub terminal: bool,
    pub retired: bool,
}

/// Measurement produced when a frame leaves the stack
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSample {
    pub identity: InvocationId,
    pub class: String,
    pub method: String,
    /// Wall-clock time of the frame, nested work included
    pub elapsed_ms: f64,
    /// Wall-clock time of the frame minus tracked work nested inside it
    pub exclusive_ms: f64,
    /// `true` for a synchronous body, `false` for a continuation
    pub invoked: bool,
    pub tracked: bool,
    /// Time to add to the open frame's own total (zero when a boundary
    /// further out already covers it)
    pub frame_ms: f64,
}

/// Owner of every invocation record
#[derive(Debug)]
pub struct TimeAccounting {
    stack: CallStack,
    records: HashMap<InvocationId, InvocationRecord>,
    retired: VecDeque<InvocationSummary>,
    log_capacity: usize,
    next_id: u64,
}

impl TimeAccounting {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            stack: CallStack::new(),
            records: HashMap::new(),
            retired: VecDeque::with_capacity(log_capacity.min(1024)),
            log_capacity,
            next_id: 1,
        }
    }

    /// Open a new invocation and push its synchronous frame
    pub fn begin(&mut self, site: CallSite, now_ms: f64) -> InvocationId {
        let id = InvocationId::new(self.next_id);
        self.next_id += 1;

        trace!(%id, class = %site.class, method = %site.method, args = site.arg_count, "enter");

        if site.terminal {
            self.stack.enter_root(id, now_ms);
        } else {
            self.stack.enter(id, now_ms);
        }
        self.records.insert(
            id,
            InvocationRecord {
                id,
                operation: site.method,
                owner_class: site.class,
                arg_count: site.arg_count,
                started_ms: now_ms,
                self_ms: 0.0,
                total_ms: 0.0,
                terminal: site.terminal,
                tracked: site.tracked,
                continuations: 0,
                active: true,
                pending: 0,
            },
        );
        id
    }

    /// Close the synchronous frame of `identity`
    ///
    /// Returns `None` (after logging a warning) when `identity` is not the
    /// innermost active frame; the stack is left as it was.
    pub fn end(&mut self, identity: InvocationId, now_ms: f64) -> Option<TimingSample> {
        let frame = match self.stack.leave(identity) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "ignoring unexpected end of invocation");
                return None;
            }
        };

        let elapsed_ms = (now_ms - frame.started_ms).max(0.0);
        let self_ms = (elapsed_ms - frame.nested_ms).max(0.0);
        self.stack.charge_nested(elapsed_ms);

        let frame_ms = self.frame_share(frame.lineage().chain(), elapsed_ms);

        let record = self.records.get_mut(&identity)?;
        record.self_ms += self_ms;
        record.total_ms += elapsed_ms;
        record.active = false;

        trace!(%identity, elapsed_ms, self_ms, "exit");

        let sample = TimingSample {
            identity,
            class: record.owner_class.clone(),
            method: record.operation.clone(),
            elapsed_ms,
            exclusive_ms: self_ms,
            invoked: true,
            tracked: record.tracked,
            frame_ms,
        };
        self.retire_if_settled(identity);
        Some(sample)
    }

    /// Capture the context of `identity` for a continuation it schedules
    ///
    /// Every invocation in the captured chain stays alive until the
    /// continuation is released.
    pub fn fork(&mut self, identity: InvocationId) -> Option<ForkedContext> {
        let context = self.stack.fork(identity)?;
        for id in context.chain() {
            if let Some(record) = self.records.get_mut(id) {
                record.pending += 1;
            }
        }
        if let Some(origin) = self.records.get_mut(&identity) {
            origin.continuations += 1;
        }
        trace!(%identity, depth = context.chain().len(), "fork");
        Some(context)
    }

    /// Fork the innermost active invocation, if any
    pub fn fork_current(&mut self) -> Option<ForkedContext> {
        let identity = self.stack.current_identity()?;
        self.fork(identity)
    }

    /// Re-establish a forked context as a continuation starts
    pub fn resume(&mut self, context: &ForkedContext, kind: ContinuationKind, now_ms: f64) {
        trace!(origin = %context.origin(), ?kind, "resume");
        self.stack.resume(context.clone(), kind, now_ms);
    }

    /// Close the continuation frame opened by [`Self::resume`]
    ///
    /// Listener continuations are transparent: they produce no sample and
    /// only pass the tracked work nested inside them down to the enclosing
    /// frame.
    pub fn settle(
        &mut self,
        context: &ForkedContext,
        kind: ContinuationKind,
        now_ms: f64,
    ) -> Option<TimingSample> {
        let origin = context.origin();
        let frame = match self.stack.leave(origin) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "ignoring unexpected end of continuation");
                return None;
            }
        };

        let elapsed_ms = (now_ms - frame.started_ms).max(0.0);
        if kind == ContinuationKind::Listener {
            self.stack.charge_nested(frame.nested_ms);
            return None;
        }
        self.stack.charge_nested(elapsed_ms);
        let exclusive_ms = (elapsed_ms - frame.nested_ms).max(0.0);

        // Invocations still on the stack already see this time through their
        // own elapsed time, and so does everything outside them.
        let chain = context.chain();
        let detached = chain
            .iter()
            .position(|id| self.stack.contains(*id))
            .unwrap_or(chain.len());
        for id in &chain[..detached] {
            if let Some(record) = self.records.get_mut(id) {
                record.total_ms += elapsed_ms;
            }
        }
        let frame_ms = self.frame_share(chain, elapsed_ms);

        trace!(%origin, elapsed_ms, exclusive_ms, "settle");

        let record = self.records.get(&origin)?;
        Some(TimingSample {
            identity: origin,
            class: record.owner_class.clone(),
            method: record.operation.clone(),
            elapsed_ms,
            exclusive_ms,
            invoked: false,
            tracked: record.tracked,
            frame_ms,
        })
    }

    /// Drop a continuation's hold on its chain
    pub fn release(&mut self, context: &ForkedContext) {
        for id in context.chain() {
            if let Some(record) = self.records.get_mut(id) {
                record.pending = record.pending.saturating_sub(1);
            }
        }
        for id in context.chain() {
            self.retire_if_settled(*id);
        }
    }

    pub fn current_identity(&self) -> Option<InvocationId> {
        self.stack.current_identity()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    /// Number of invocations that have not retired yet
    pub fn live_count(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, identity: InvocationId) -> Option<&InvocationRecord> {
        self.records.get(&identity)
    }

    /// Summary of a live or recently retired invocation
    pub fn summary(&self, identity: InvocationId) -> Option<InvocationSummary> {
        if let Some(record) = self.records.get(&identity) {
            return Some(record.summary(false));
        }
        self.retired.iter().rev().find(|s| s.id == identity).cloned()
    }

    /// Retired invocations, oldest first
    pub fn retired(&self) -> impl Iterator<Item = &InvocationSummary> {
        self.retired.iter()
    }

    /// Forget every record and unwind the stack
    pub fn reset(&mut self) {
        self.stack.clear();
        self.records.clear();
        self.retired.clear();
    }

    fn has_terminal(&self, chain: &[InvocationId]) -> bool {
        chain
            .iter()
            .any(|id| self.records.get(id).is_some_and(|r| r.terminal))
    }

    /// Frame time contributed by a frame that just left the stack
    ///
    /// Only work descended from a boundary counts, and only when no frame
    /// still on the stack descends from one: that frame's own elapsed time
    /// already covers it.
    fn frame_share(&self, chain: &[InvocationId], elapsed_ms: f64) -> f64 {
        let covered = self
            .stack
            .frames()
            .any(|frame| self.has_terminal(frame.lineage().chain()));
        if !covered && self.has_terminal(chain) {
            elapsed_ms
        } else {
            0.0
        }
    }

    fn retire_if_settled(&mut self, identity: InvocationId) {
        let settled = self
            .records
            .get(&identity)
            .is_some_and(InvocationRecord::is_settled);
        if !settled {
            return;
        }
        if let Some(record) = self.records.remove(&identity) {
            if self.log_capacity == 0 {
                return;
            }
            if self.retired.len() == self.log_capacity {
                self.retired.pop_front();
            }
            self.retired.push_back(record.summary(true));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(class: &str, method: &str) -> CallSite {
        CallSite {
            class: class.to_string(),
            method: method.to_string(),
            arg_count: 0,
            terminal: false,
            tracked: true,
        }
    }

    fn boundary(class: &str, method: &str) -> CallSite {
        CallSite {
            terminal: true,
            ..site(class, method)
        }
    }

    #[test]
    fn test_single_call_self_equals_total() {
        let mut acc = TimeAccounting::new(16);
        let a = acc.begin(site("A", "f"), 0.0);
        let sample = acc.end(a, 10.0).unwrap();

        assert_eq!(sample.elapsed_ms, 10.0);
        assert_eq!(sample.exclusive_ms, 10.0);
        assert!(sample.invoked);

        let summary = acc.summary(a).unwrap();
        assert_eq!(summary.self_ms, 10.0);
        assert_eq!(summary.total_ms, 10.0);
        assert!(summary.retired);
        assert_eq!(acc.live_count(), 0);
    }

    #[test]
    fn test_nested_call_subtracted_from_parent_self() {
        let mut acc = TimeAccounting::new(16);
        let b = acc.begin(site("B", "g"), 0.0);
        let a = acc.begin(site("A", "f"), 20.0);
        acc.end(a, 30.0).unwrap();
        let outer = acc.end(b, 30.0).unwrap();

        assert_eq!(outer.elapsed_ms, 30.0);
        assert_eq!(outer.exclusive_ms, 20.0);
        assert_eq!(acc.summary(a).unwrap().total_ms, 10.0);
        assert_eq!(acc.summary(b).unwrap().self_ms, 20.0);
        assert_eq!(acc.summary(b).unwrap().total_ms, 30.0);
    }

    #[test]
    fn test_recursive_calls_get_distinct_identities() {
        let mut acc = TimeAccounting::new(16);
        let outer = acc.begin(site("A", "f"), 0.0);
        let inner = acc.begin(site("A", "f"), 1.0);
        assert_ne!(outer, inner);
        acc.end(inner, 3.0).unwrap();
        acc.end(outer, 4.0).unwrap();
        assert_eq!(acc.summary(inner).unwrap().total_ms, 2.0);
        assert_eq!(acc.summary(outer).unwrap().total_ms, 4.0);
        assert_eq!(acc.summary(outer).unwrap().self_ms, 2.0);
    }

    #[test]
    fn test_end_out_of_order_is_ignored() {
        let mut acc = TimeAccounting::new(16);
        let a = acc.begin(site("A", "f"), 0.0);
        let b = acc.begin(site("B", "g"), 1.0);
        assert!(acc.end(a, 2.0).is_none());
        assert_eq!(acc.current_identity(), Some(b));
        assert!(acc.end(b, 3.0).is_some());
        assert!(acc.end(a, 4.0).is_some());
    }

    #[test]
    fn test_continuation_adds_total_not_self() {
        let mut acc = TimeAccounting::new(16);
        let a = acc.begin(site("A", "f"), 0.0);
        let ctx = acc.fork(a).unwrap();
        acc.end(a, 1.0).unwrap();
        assert_eq!(acc.live_count(), 1, "pending continuation keeps record alive");

        acc.resume(&ctx, ContinuationKind::Timer, 5.0);
        let sample = acc.settle(&ctx, ContinuationKind::Timer, 16.0).unwrap();
        acc.release(&ctx);

        assert!(!sample.invoked);
        assert_eq!(sample.elapsed_ms, 11.0);
        assert_eq!(sample.exclusive_ms, 11.0);
        let summary = acc.summary(a).unwrap();
        assert_eq!(summary.self_ms, 1.0);
        assert_eq!(summary.total_ms, 12.0);
        assert_eq!(summary.continuations, 1);
        assert!(summary.retired);
    }

    #[test]
    fn test_continuation_time_reaches_detached_ancestors() {
        let mut acc = TimeAccounting::new(16);
        let b = acc.begin(site("B", "g"), 0.0);
        let a = acc.begin(site("A", "f"), 2.0);
        let ctx = acc.fork(a).unwrap();
        acc.end(a, 3.0).unwrap();
        acc.end(b, 4.0).unwrap();
        assert_eq!(acc.live_count(), 2);

        acc.resume(&ctx, ContinuationKind::Task, 10.0);
        acc.settle(&ctx, ContinuationKind::Task, 15.0).unwrap();
        acc.release(&ctx);

        assert_eq!(acc.summary(a).unwrap().total_ms, 6.0);
        assert_eq!(acc.summary(b).unwrap().total_ms, 9.0);
        assert_eq!(acc.summary(b).unwrap().self_ms, 3.0);
        assert_eq!(acc.live_count(), 0);
    }

    #[test]
    fn test_listener_is_not_attributed() {
        let mut acc = TimeAccounting::new(16);
        let a = acc.begin(site("A", "listen"), 0.0);
        let ctx = acc.fork(a).unwrap();
        acc.end(a, 1.0).unwrap();

        acc.resume(&ctx, ContinuationKind::Listener, 100.0);
        assert!(acc.settle(&ctx, ContinuationKind::Listener, 500.0).is_none());
        acc.release(&ctx);

        assert_eq!(acc.summary(a).unwrap().total_ms, 1.0);
    }

    #[test]
    fn test_boundary_frame_time_counted_once() {
        let mut acc = TimeAccounting::new(16);
        let render = acc.begin(boundary("App", "render"), 0.0);
        let nested = acc.begin(boundary("App", "render"), 1.0);
        let inner = acc.end(nested, 2.0).unwrap();
        let outer = acc.end(render, 5.0).unwrap();
        assert_eq!(inner.frame_ms, 0.0);
        assert_eq!(outer.frame_ms, 5.0);
    }

    #[test]
    fn test_boundary_continuation_feeds_frame() {
        let mut acc = TimeAccounting::new(16);
        let render = acc.begin(boundary("App", "render"), 0.0);
        let child = acc.begin(site("A", "f"), 0.0);
        let ctx = acc.fork(child).unwrap();
        acc.end(child, 1.0).unwrap();
        acc.end(render, 2.0).unwrap();

        acc.resume(&ctx, ContinuationKind::Timer, 3.0);
        let sample = acc.settle(&ctx, ContinuationKind::Timer, 7.0).unwrap();
        assert_eq!(sample.frame_ms, 4.0);
    }

    #[test]
    fn test_boundary_inside_continuation_starts_new_lineage() {
        let mut acc = TimeAccounting::new(16);
        let first = acc.begin(boundary("App", "render"), 0.0);
        let ctx = acc.fork(first).unwrap();
        acc.end(first, 1.0).unwrap();

        acc.resume(&ctx, ContinuationKind::Timer, 2.0);
        let second = acc.begin(boundary("App", "render"), 2.0);
        let next = acc.fork(second).unwrap();
        assert_eq!(next.chain(), &[second]);
        let inner = acc.end(second, 3.0).unwrap();
        assert_eq!(inner.frame_ms, 0.0);
        let sample = acc.settle(&ctx, ContinuationKind::Timer, 3.0).unwrap();
        assert_eq!(sample.frame_ms, 1.0);
        acc.release(&ctx);

        let first = acc.summary(first).unwrap();
        assert!(first.retired);
        assert_eq!(first.total_ms, 2.0);
        assert_eq!(acc.live_count(), 1);
    }

    #[test]
    fn test_continuation_inside_next_boundary_adds_no_frame_time() {
        let mut acc = TimeAccounting::new(16);
        let render = acc.begin(boundary("App", "render"), 0.0);
        let child = acc.begin(site("A", "f"), 0.0);
        let ctx = acc.fork(child).unwrap();
        acc.end(child, 1.0).unwrap();
        acc.end(render, 1.0).unwrap();

        let next = acc.begin(boundary("App", "render"), 2.0);
        acc.resume(&ctx, ContinuationKind::Task, 3.0);
        let sample = acc.settle(&ctx, ContinuationKind::Task, 8.0).unwrap();
        assert_eq!(sample.frame_ms, 0.0);
        assert_eq!(sample.exclusive_ms, 5.0);
        let outer = acc.end(next, 8.0).unwrap();
        assert_eq!(outer.frame_ms, 6.0);
    }

    #[test]
    fn test_dropped_continuation_releases_chain() {
        let mut acc = TimeAccounting::new(16);
        let a = acc.begin(site("A", "f"), 0.0);
        let ctx = acc.fork(a).unwrap();
        acc.end(a, 1.0).unwrap();
        assert_eq!(acc.live_count(), 1);
        acc.release(&ctx);
        assert_eq!(acc.live_count(), 0);
        assert_eq!(acc.summary(a).unwrap().total_ms, 1.0);
    }

    #[test]
    fn test_retired_log_is_bounded() {
        let mut acc = TimeAccounting::new(2);
        for i in 0..5 {
            let id = acc.begin(site("A", "f"), i as f64);
            acc.end(id, i as f64 + 1.0);
        }
        let retired: Vec<_> = acc.retired().collect();
        assert_eq!(retired.len(), 2);
        assert_eq!(retired[1].id, InvocationId::new(5));
    }

    #[test]
    fn test_zero_capacity_log_keeps_nothing() {
        let mut acc = TimeAccounting::new(0);
        let id = acc.begin(site("A", "f"), 0.0);
        acc.end(id, 1.0);
        assert!(acc.summary(id).is_none());
    }
}
