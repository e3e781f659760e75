//! Profiler engine
//!
//! [`Profiler`] is a cheap, cloneable handle to one profiling session. It owns
//! the tracking registry, the time accounting engine, the frame aggregator
//! and the rolling statistics, and is what [`Tracked`] wrappers and
//! [`Continuation`](crate::tracked::Continuation)s report to.
//!
//! The handle is single-threaded (`!Send`): profiling state is shared
//! between wrappers on one cooperative thread of control, and every borrow of
//! it is released before user code runs.
//!
//! # Example
//! ```
//! use frametrack::clock::ManualClock;
//! use frametrack::config::ProfilerConfig;
//! use frametrack::profiler::Profiler;
//! use frametrack::tracked::{Trackable, Tracked};
//!
//! struct Physics;
//! impl Trackable for Physics {
//!     const CLASS_NAME: &'static str = "Physics";
//!     const METHODS: &'static [&'static str] = &["step"];
//! }
//!
//! let clock = ManualClock::new();
//! let profiler = Profiler::new(ProfilerConfig::default(), clock.clone()).unwrap();
//! profiler.track::<Physics>(None).unwrap();
//!
//! let mut physics = Tracked::new(&profiler, Physics);
//! physics.invoke("step", |_, _| clock.advance(4.0));
//!
//! let frame = profiler.close_frame().unwrap();
//! assert_eq!(frame.class_spent_ms("Physics"), 4.0);
//! ```

use crate::accounting::{CallSite, InvocationSummary, TimeAccounting, TimingSample};
use crate::clock::Clock;
use crate::config::{FrameTotalMode, ProfilerConfig};
use crate::context::{ContinuationKind, ForkedContext, InvocationId};
use crate::error::{ProfilerError, Result};
use crate::frames::{FrameAggregator, FrameStats};
use crate::registry::{InstanceId, MethodFilter, TrackingRegistry};
use crate::stats::{ClassTotals, RollingTotals, StatsTracker};
use crate::tracked::{Trackable, Tracked};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Closed frames plus the frame still accumulating
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHistory {
    pub closed: Vec<FrameStats>,
    pub open: FrameStats,
}

/// Everything a presentation layer needs, detached from the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub tracked_classes: Vec<String>,
    pub frames: Vec<FrameStats>,
    pub current_frame: FrameStats,
    pub totals: RollingTotals,
    pub frame_budget_ms: f64,
}

struct ProfilerState {
    config: ProfilerConfig,
    clock: Box<dyn Clock>,
    registry: TrackingRegistry,
    accounting: TimeAccounting,
    frames: FrameAggregator,
    stats: StatsTracker,
    next_instance: InstanceId,
    disposed: bool,
}

impl ProfilerState {
    fn close_frame(&mut self, now_ms: f64) -> FrameStats {
        let counts = self.registry.instance_counts();
        let closed = self
            .frames
            .close(now_ms, self.config.frame_total, &counts)
            .clone();
        self.stats.absorb(&closed);
        closed
    }

    fn apply_sample(&mut self, sample: TimingSample) {
        if sample.tracked {
            self.frames
                .record_time(&sample.class, &sample.method, sample.exclusive_ms);
        }
        if self.config.frame_total == FrameTotalMode::BoundaryInvocation && sample.frame_ms > 0.0 {
            self.frames.add_frame_time(sample.frame_ms);
        }
    }
}

/// Handle to a profiling session
#[derive(Clone)]
pub struct Profiler {
    inner: Rc<RefCell<ProfilerState>>,
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(state) => f
                .debug_struct("Profiler")
                .field("config", &state.config)
                .field("frames_closed", &state.frames.closed_count())
                .field("disposed", &state.disposed)
                .finish(),
            Err(_) => f.debug_struct("Profiler").finish_non_exhaustive(),
        }
    }
}

impl Profiler {
    /// Create a profiler; the first frame opens immediately
    pub fn new(config: ProfilerConfig, clock: impl Clock + 'static) -> Result<Self> {
        config.validate()?;
        let now_ms = clock.now_ms();
        let state = ProfilerState {
            registry: TrackingRegistry::new(),
            accounting: TimeAccounting::new(config.invocation_log_capacity),
            frames: FrameAggregator::new(now_ms, config.max_frame_history),
            stats: StatsTracker::new(config.frame_budget_ms),
            clock: Box::new(clock),
            config,
            next_instance: 1,
            disposed: false,
        };
        Ok(Self {
            inner: Rc::new(RefCell::new(state)),
        })
    }

    /// Track every method of `T`, under `name` or `T::CLASS_NAME`
    pub fn track<T: Trackable + 'static>(&self, name: Option<&str>) -> Result<()> {
        let mut state = self.live_state()?;
        let display = name.unwrap_or(T::CLASS_NAME);
        state
            .registry
            .track_type(TypeId::of::<T>(), display, MethodFilter::All);
        Ok(())
    }

    /// Track a single method of `T`
    pub fn track_method<T: Trackable + 'static>(&self, method: &str, name: Option<&str>) -> Result<()> {
        let method = published_method::<T>(method)?;
        let mut state = self.live_state()?;
        let display = name.unwrap_or(T::CLASS_NAME);
        state.registry.track_type(
            TypeId::of::<T>(),
            display,
            MethodFilter::Only(BTreeSet::from([method])),
        );
        Ok(())
    }

    /// Track every method of one instance, overriding its type's registration
    pub fn track_instance<T: Trackable + 'static>(
        &self,
        target: &Tracked<T>,
        name: Option<&str>,
    ) -> Result<()> {
        self.ensure_owned(target)?;
        let mut state = self.live_state()?;
        let display = name.unwrap_or(T::CLASS_NAME);
        state.registry.track_instance(
            TypeId::of::<T>(),
            target.instance_id(),
            display,
            MethodFilter::All,
        );
        Ok(())
    }

    /// Make every call of `T::method` close the open frame and start a new one
    pub fn define_frame_boundary<T: Trackable + 'static>(&self, method: &str) -> Result<()> {
        let method = published_method::<T>(method)?;
        let mut state = self.live_state()?;
        debug!(class = T::CLASS_NAME, method, "frame boundary defined");
        state.registry.define_boundary(TypeId::of::<T>(), method);
        Ok(())
    }

    /// Restore pass-through behaviour for `T` and every instance of it
    pub fn clear_tracking<T: Trackable + 'static>(&self) {
        self.inner
            .borrow_mut()
            .registry
            .clear_type(TypeId::of::<T>());
    }

    pub fn clear_instance_tracking<T: Trackable + 'static>(&self, target: &Tracked<T>) {
        if self.ensure_owned(target).is_ok() {
            self.inner
                .borrow_mut()
                .registry
                .clear_instance(target.instance_id());
        }
    }

    /// Close the open frame now, as if a boundary had fired
    pub fn close_frame(&self) -> Result<FrameStats> {
        let mut state = self.live_state()?;
        let now_ms = state.clock.now_ms();
        Ok(state.close_frame(now_ms))
    }

    pub fn frame_history(&self) -> FrameHistory {
        let state = self.inner.borrow();
        FrameHistory {
            closed: state.frames.history().cloned().collect(),
            open: state.frames.current().clone(),
        }
    }

    pub fn rolling_totals(&self) -> RollingTotals {
        self.inner.borrow().stats.totals().clone()
    }

    /// Rolling totals of one registered class
    pub fn class_totals(&self, class: &str) -> Result<ClassTotals> {
        let state = self.inner.borrow();
        if !state.registry.names().iter().any(|n| n == class) {
            return Err(ProfilerError::UnknownClass(class.to_string()));
        }
        Ok(state
            .stats
            .totals()
            .classes
            .get(class)
            .cloned()
            .unwrap_or_default())
    }

    /// Registered class names in registration order, `_remaining` first
    pub fn tracked_classes(&self) -> Vec<String> {
        self.inner.borrow().registry.names().to_vec()
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        let state = self.inner.borrow();
        ProfileSnapshot {
            tracked_classes: state.registry.names().to_vec(),
            frames: state.frames.history().cloned().collect(),
            current_frame: state.frames.current().clone(),
            totals: state.stats.totals().clone(),
            frame_budget_ms: state.stats.budget_ms(),
        }
    }

    /// Stop profiling
    ///
    /// Tracked wrappers keep working as plain pass-throughs. Collected frames
    /// and totals stay queryable; registration fails with
    /// [`ProfilerError::Disposed`].
    pub fn dispose(&self) {
        let mut state = self.inner.borrow_mut();
        if state.disposed {
            return;
        }
        debug!(frames = state.frames.closed_count(), "profiler disposed");
        state.disposed = true;
        state.accounting.reset();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Most recently retired invocations, oldest first
    pub fn completed_invocations(&self) -> Vec<InvocationSummary> {
        self.inner.borrow().accounting.retired().cloned().collect()
    }

    /// Summary of a live or recently retired invocation
    pub fn invocation(&self, id: InvocationId) -> Option<InvocationSummary> {
        self.inner.borrow().accounting.summary(id)
    }

    /// Innermost tracked invocation currently executing
    pub fn current_invocation(&self) -> Option<InvocationId> {
        self.inner.borrow().accounting.current_identity()
    }

    pub fn config(&self) -> ProfilerConfig {
        self.inner.borrow().config.clone()
    }

    pub(crate) fn same_session(&self, other: &Profiler) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn register_instance(&self, type_id: TypeId) -> InstanceId {
        let mut state = self.inner.borrow_mut();
        let id = state.next_instance;
        state.next_instance += 1;
        state.registry.register_instance(type_id, id);
        id
    }

    pub(crate) fn unregister_instance(&self, type_id: TypeId, instance: InstanceId) {
        match self.inner.try_borrow_mut() {
            Ok(mut state) => state.registry.unregister_instance(type_id, instance),
            Err(_) => warn!(instance, "profiler busy, instance not unregistered"),
        }
    }

    /// Record the entry of a call; `None` when the call is not observed
    ///
    /// A boundary call closes the open frame before anything about the call
    /// itself is recorded.
    pub(crate) fn enter_call(
        &self,
        type_id: TypeId,
        instance: InstanceId,
        class_name: &str,
        method: &str,
        arg_count: usize,
    ) -> Option<InvocationId> {
        let mut state = self.inner.borrow_mut();
        if state.disposed {
            return None;
        }
        let resolution = state.registry.resolve(type_id, instance, method);
        if resolution.tracked_as.is_none() && !resolution.boundary {
            return None;
        }

        let now_ms = state.clock.now_ms();
        if resolution.boundary {
            state.close_frame(now_ms);
        }

        let tracked = resolution.tracked_as.is_some();
        let class = resolution
            .tracked_as
            .unwrap_or_else(|| class_name.to_string());
        if tracked {
            state.frames.record_call(&class, method);
        }
        let site = CallSite {
            class,
            method: method.to_string(),
            arg_count,
            terminal: resolution.boundary,
            tracked,
        };
        Some(state.accounting.begin(site, now_ms))
    }

    pub(crate) fn exit_call(&self, identity: InvocationId) {
        let Ok(mut state) = self.inner.try_borrow_mut() else {
            warn!(%identity, "profiler busy, exit not recorded");
            return;
        };
        if state.disposed {
            return;
        }
        let now_ms = state.clock.now_ms();
        if let Some(sample) = state.accounting.end(identity, now_ms) {
            state.apply_sample(sample);
        }
    }

    /// Fork `identity`, or the innermost active invocation when `None`
    pub(crate) fn fork(&self, identity: Option<InvocationId>) -> Option<ForkedContext> {
        let mut state = self.inner.borrow_mut();
        if state.disposed {
            return None;
        }
        match identity {
            Some(id) => state.accounting.fork(id),
            None => state.accounting.fork_current(),
        }
    }

    pub(crate) fn resume(&self, context: &ForkedContext, kind: ContinuationKind) {
        let mut state = self.inner.borrow_mut();
        if state.disposed {
            return;
        }
        let now_ms = state.clock.now_ms();
        state.accounting.resume(context, kind, now_ms);
    }

    pub(crate) fn settle(&self, context: &ForkedContext, kind: ContinuationKind) {
        let Ok(mut state) = self.inner.try_borrow_mut() else {
            warn!(origin = %context.origin(), "profiler busy, continuation not recorded");
            return;
        };
        if state.disposed {
            return;
        }
        let now_ms = state.clock.now_ms();
        if let Some(sample) = state.accounting.settle(context, kind, now_ms) {
            state.apply_sample(sample);
        }
    }

    pub(crate) fn release(&self, context: &ForkedContext) {
        if let Ok(mut state) = self.inner.try_borrow_mut() {
            if !state.disposed {
                state.accounting.release(context);
            }
        }
    }

    fn live_state(&self) -> Result<std::cell::RefMut<'_, ProfilerState>> {
        let state = self.inner.borrow_mut();
        if state.disposed {
            return Err(ProfilerError::Disposed);
        }
        Ok(state)
    }

    fn ensure_owned<T: Trackable + 'static>(&self, target: &Tracked<T>) -> Result<()> {
        if target.profiler().same_session(self) {
            Ok(())
        } else {
            Err(ProfilerError::ForeignTarget {
                class: T::CLASS_NAME.to_string(),
            })
        }
    }
}

fn published_method<T: Trackable>(method: &str) -> Result<&'static str> {
    T::METHODS
        .iter()
        .copied()
        .find(|m| *m == method)
        .ok_or_else(|| ProfilerError::TargetNotFound {
            class: T::CLASS_NAME.to_string(),
            method: method.to_string(),
        })
}
