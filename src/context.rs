//! Call-context stack
//!
//! Tracks which tracked invocation is executing at any instant on the single
//! cooperative thread of control. Each active frame carries its lineage: the
//! identity chain from itself out to the outermost invocation it descends
//! from. A continuation scheduled by an invocation receives a copy of that
//! lineage ([`ForkedContext`]) by value, so when it runs later, detached from
//! the synchronous stack, the engine can re-establish whose time it is.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identity of one logical invocation
///
/// Every call through a tracked wrapper gets a fresh identity, including
/// recursive calls to the same method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvocationId(u64);

impl InvocationId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of deferred work scheduled by an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationKind {
    /// Timer callback
    Timer,
    /// Resolved-later task (promise job, queued closure)
    Task,
    /// Ambient event handling: a listener that waits for an unbounded time.
    /// Its duration measures idle wait, so it is never attributed.
    Listener,
}

/// What pushed an [`ActiveFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Synchronous body of a tracked call
    Call,
    /// A continuation re-entering its originating invocation
    Continuation(ContinuationKind),
}

/// Identity chain captured when work is deferred
///
/// The chain is ordered innermost first and is never empty: element zero is
/// the originating invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkedContext {
    chain: Vec<InvocationId>,
}

impl ForkedContext {
    /// Context for an invocation with no tracked ancestors
    pub fn root(identity: InvocationId) -> Self {
        Self {
            chain: vec![identity],
        }
    }

    /// Context for `identity` nested inside `parent`
    pub fn child_of(parent: &ForkedContext, identity: InvocationId) -> Self {
        let mut chain = Vec::with_capacity(parent.chain.len() + 1);
        chain.push(identity);
        chain.extend_from_slice(&parent.chain);
        Self { chain }
    }

    /// The invocation that scheduled the work
    pub fn origin(&self) -> InvocationId {
        self.chain[0]
    }

    /// Every identity the work is causally descended from, innermost first
    pub fn chain(&self) -> &[InvocationId] {
        &self.chain
    }

    /// Identities strictly outside the origin
    pub fn ancestors(&self) -> &[InvocationId] {
        &self.chain[1..]
    }

    pub fn contains(&self, identity: InvocationId) -> bool {
        self.chain.contains(&identity)
    }
}

/// One entry on the call-context stack
#[derive(Debug, Clone)]
pub struct ActiveFrame {
    pub identity: InvocationId,
    pub kind: FrameKind,
    pub started_ms: f64,
    /// Elapsed time of tracked frames that ran on top of this one
    pub nested_ms: f64,
    lineage: ForkedContext,
}

impl ActiveFrame {
    pub fn lineage(&self) -> &ForkedContext {
        &self.lineage
    }
}

/// Misuse of the call-context stack
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("cannot leave {0}: no invocation is active")]
    EmptyStack(InvocationId),

    #[error("cannot leave {expected}: {found} is the innermost active invocation")]
    NotOnTop {
        expected: InvocationId,
        found: InvocationId,
    },
}

/// LIFO stack of active invocation frames
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<ActiveFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the synchronous body of a new invocation
    ///
    /// Its lineage extends the lineage of whatever frame is on top, so a call
    /// made from inside a continuation descends from the continuation's
    /// origin.
    pub fn enter(&mut self, identity: InvocationId, started_ms: f64) {
        let lineage = match self.frames.last() {
            Some(top) => ForkedContext::child_of(&top.lineage, identity),
            None => ForkedContext::root(identity),
        };
        self.frames.push(ActiveFrame {
            identity,
            kind: FrameKind::Call,
            started_ms,
            nested_ms: 0.0,
            lineage,
        });
    }

    /// Push a new invocation that starts a lineage of its own
    ///
    /// Continuations it schedules hold no frame below it.
    pub fn enter_root(&mut self, identity: InvocationId, started_ms: f64) {
        self.frames.push(ActiveFrame {
            identity,
            kind: FrameKind::Call,
            started_ms,
            nested_ms: 0.0,
            lineage: ForkedContext::root(identity),
        });
    }

    /// Push a continuation frame that restores a previously forked context
    pub fn resume(&mut self, context: ForkedContext, kind: ContinuationKind, started_ms: f64) {
        self.frames.push(ActiveFrame {
            identity: context.origin(),
            kind: FrameKind::Continuation(kind),
            started_ms,
            nested_ms: 0.0,
            lineage: context,
        });
    }

    /// Pop the innermost frame, which must belong to `identity`
    ///
    /// On mismatch the stack is left untouched.
    pub fn leave(&mut self, identity: InvocationId) -> Result<ActiveFrame, ContextError> {
        if let Some(top) = self.frames.last() {
            if top.identity != identity {
                return Err(ContextError::NotOnTop {
                    expected: identity,
                    found: top.identity,
                });
            }
        }
        self.frames.pop().ok_or(ContextError::EmptyStack(identity))
    }

    pub fn current_identity(&self) -> Option<InvocationId> {
        self.frames.last().map(|frame| frame.identity)
    }

    /// Capture the lineage of the innermost active frame of `identity`
    pub fn fork(&self, identity: InvocationId) -> Option<ForkedContext> {
        self.frames
            .iter()
            .rev()
            .find(|frame| frame.identity == identity)
            .map(|frame| frame.lineage.clone())
    }

    /// Charge `elapsed_ms` of nested work to the innermost frame, if any
    pub fn charge_nested(&mut self, elapsed_ms: f64) {
        if let Some(top) = self.frames.last_mut() {
            top.nested_ms += elapsed_ms;
        }
    }

    /// Whether `identity` has any frame on the stack
    pub fn contains(&self, identity: InvocationId) -> bool {
        self.frames.iter().any(|frame| frame.identity == identity)
    }

    /// Active frames, outermost first
    pub fn frames(&self) -> impl Iterator<Item = &ActiveFrame> {
        self.frames.iter()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
