//! Cooperative deferred-work queue
//!
//! A single-threaded stand-in for host timers, resolved-later tasks and
//! event dispatch. Every job is paired with the [`Continuation`] it runs
//! under, so the identity of the scheduling invocation travels with it.
//!
//! Ordering: queued tasks run first, in FIFO order. When no task is queued
//! the loop jumps its virtual tick to the earliest timer and runs timers due
//! at that tick in scheduling order. The loop never touches the profiler's
//! clock; jobs advance time themselves.

use crate::tracked::{Continuation, InvocationScope};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use tracing::trace;

type Job = Box<dyn FnOnce()>;

struct Listener {
    continuation: Continuation,
    handler: Box<dyn FnMut(&InvocationScope)>,
}

#[derive(Default)]
struct LoopState {
    tasks: VecDeque<Job>,
    timers: BTreeMap<(u64, u64), Job>,
    listeners: HashMap<String, Vec<Rc<RefCell<Listener>>>>,
    tick: u64,
    seq: u64,
}

/// Handle to a shared run queue; clones schedule onto the same queue
#[derive(Clone, Default)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("tick", &self.tick())
            .field("pending", &self.pending())
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task to run before any timer
    pub fn queue_task(
        &self,
        continuation: Continuation,
        job: impl FnOnce(&InvocationScope) + 'static,
    ) {
        self.state
            .borrow_mut()
            .tasks
            .push_back(Box::new(move || continuation.run(job)));
    }

    /// Schedule a timer `delay` ticks from now
    pub fn set_timeout(
        &self,
        delay: u64,
        continuation: Continuation,
        job: impl FnOnce(&InvocationScope) + 'static,
    ) {
        let mut state = self.state.borrow_mut();
        let due = state.tick + delay;
        let seq = state.seq;
        state.seq += 1;
        state
            .timers
            .insert((due, seq), Box::new(move || continuation.run(job)));
    }

    /// Register a handler fired on every dispatch of `event`
    ///
    /// The continuation is held until [`EventLoop::remove_listeners`], so its
    /// invocation stays pending for as long as the listener is installed.
    pub fn add_listener(
        &self,
        event: &str,
        continuation: Continuation,
        handler: impl FnMut(&InvocationScope) + 'static,
    ) {
        self.state
            .borrow_mut()
            .listeners
            .entry(event.to_string())
            .or_default()
            .push(Rc::new(RefCell::new(Listener {
                continuation,
                handler: Box::new(handler),
            })));
    }

    /// Fire every current listener of `event` synchronously, in
    /// registration order
    ///
    /// A listener already running further up the call stack is skipped
    /// when its event is dispatched again from inside its handler.
    pub fn dispatch(&self, event: &str) {
        let listeners = self
            .state
            .borrow()
            .listeners
            .get(event)
            .cloned()
            .unwrap_or_default();
        trace!(%event, listeners = listeners.len(), "dispatch");
        for listener in listeners {
            let Ok(mut listener) = listener.try_borrow_mut() else {
                trace!(%event, "listener already running, skipped");
                continue;
            };
            let Listener {
                continuation,
                handler,
            } = &mut *listener;
            continuation.fire(|scope| handler(scope));
        }
    }

    /// Queue a task that dispatches `event`
    pub fn emit(&self, event: &str) {
        let this = self.clone();
        let event = event.to_string();
        self.state
            .borrow_mut()
            .tasks
            .push_back(Box::new(move || this.dispatch(&event)));
    }

    /// Drop every listener of `event`, releasing their continuations
    pub fn remove_listeners(&self, event: &str) {
        let removed = self.state.borrow_mut().listeners.remove(event);
        drop(removed);
    }

    /// Run one job; `false` when nothing is left
    pub fn run_next(&self) -> bool {
        let job = {
            let mut state = self.state.borrow_mut();
            match state.tasks.pop_front() {
                Some(job) => Some(job),
                None => match state.timers.pop_first() {
                    Some(((due, _), job)) => {
                        state.tick = state.tick.max(due);
                        Some(job)
                    }
                    None => None,
                },
            }
        };
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs until both queues are empty; returns the number run
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Queued tasks plus scheduled timers
    pub fn pending(&self) -> usize {
        let state = self.state.borrow();
        state.tasks.len() + state.timers.len()
    }

    pub fn tick(&self) -> u64 {
        self.state.borrow().tick
    }
}
