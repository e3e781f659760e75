//! Interception adapter
//!
//! [`Tracked<T>`] wraps a value and forwards named operations to it while
//! reporting entry and exit to its [`Profiler`]. Work the operation defers
//! is handed a [`Continuation`], which carries the invocation's identity
//! chain by value and re-establishes it when the work finally runs.
//!
//! Entry/exit and resume/settle pairs are held by guards, so the profiler
//! sees a balanced stack even when the wrapped code panics.

use crate::context::{ContinuationKind, ForkedContext, InvocationId};
use crate::profiler::Profiler;
use crate::registry::InstanceId;
use std::any::TypeId;
use tracing::warn;

/// A type whose operations can be profiled
pub trait Trackable {
    /// Class name used when tracking without an explicit name
    const CLASS_NAME: &'static str;
    /// Every operation the type publishes
    const METHODS: &'static [&'static str];
}

/// Decorator reporting calls on `T` to a profiler
pub struct Tracked<T: Trackable + 'static> {
    inner: T,
    profiler: Profiler,
    instance: InstanceId,
}

impl<T: Trackable + 'static> Tracked<T> {
    /// Wrap `inner`, announcing a live instance to the profiler
    pub fn new(profiler: &Profiler, inner: T) -> Self {
        let instance = profiler.register_instance(TypeId::of::<T>());
        Self {
            inner,
            profiler: profiler.clone(),
            instance,
        }
    }

    pub fn get(&self) -> &T {
        &self.inner
    }

    /// Mutable access that bypasses tracking
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Call `method` with mutable access to the wrapped value
    pub fn invoke<R>(&mut self, method: &str, f: impl FnOnce(&mut T, &InvocationScope) -> R) -> R {
        self.invoke_with_args(method, 0, f)
    }

    pub fn invoke_with_args<R>(
        &mut self,
        method: &str,
        arg_count: usize,
        f: impl FnOnce(&mut T, &InvocationScope) -> R,
    ) -> R {
        let guard = self.enter(method, arg_count);
        let scope = guard.scope();
        f(&mut self.inner, &scope)
    }

    /// Call `method` with shared access, which allows re-entrant calls
    /// through the same wrapper
    pub fn call<R>(&self, method: &str, f: impl FnOnce(&T, &InvocationScope) -> R) -> R {
        self.call_with_args(method, 0, f)
    }

    pub fn call_with_args<R>(
        &self,
        method: &str,
        arg_count: usize,
        f: impl FnOnce(&T, &InvocationScope) -> R,
    ) -> R {
        let guard = self.enter(method, arg_count);
        let scope = guard.scope();
        f(&self.inner, &scope)
    }

    fn enter(&self, method: &str, arg_count: usize) -> CallGuard {
        let identity = if T::METHODS.iter().any(|m| *m == method) {
            self.profiler.enter_call(
                TypeId::of::<T>(),
                self.instance,
                T::CLASS_NAME,
                method,
                arg_count,
            )
        } else {
            warn!(class = T::CLASS_NAME, method, "method not published, forwarding untracked");
            None
        };
        CallGuard {
            profiler: self.profiler.clone(),
            identity,
        }
    }
}

impl<T: Trackable + 'static> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.profiler
            .unregister_instance(TypeId::of::<T>(), self.instance);
    }
}

impl<T: Trackable + std::fmt::Debug + 'static> std::fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracked")
            .field("class", &T::CLASS_NAME)
            .field("instance", &self.instance)
            .field("inner", &self.inner)
            .finish()
    }
}

/// Closes the synchronous part of an invocation when dropped
struct CallGuard {
    profiler: Profiler,
    identity: Option<InvocationId>,
}

impl CallGuard {
    fn scope(&self) -> InvocationScope {
        InvocationScope {
            profiler: self.profiler.clone(),
            identity: self.identity,
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if let Some(identity) = self.identity {
            self.profiler.exit_call(identity);
        }
    }
}

/// Handle given to the body of a tracked call or continuation
#[derive(Debug, Clone)]
pub struct InvocationScope {
    profiler: Profiler,
    identity: Option<InvocationId>,
}

impl InvocationScope {
    /// Invocation this scope belongs to; `None` when the call is not observed
    pub fn identity(&self) -> Option<InvocationId> {
        self.identity
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Schedule deferred work on behalf of this invocation
    ///
    /// Work deferred from an unobserved call belongs to the innermost
    /// observed invocation around it, if any.
    pub fn defer(&self, kind: ContinuationKind) -> Continuation {
        let context = self.profiler.fork(self.identity);
        Continuation {
            profiler: self.profiler.clone(),
            context,
            kind,
        }
    }
}

/// Deferred work carrying the identity chain of the invocation that
/// scheduled it
///
/// The continuation keeps that invocation's record alive until it is run
/// with [`Continuation::run`] or dropped.
#[derive(Debug)]
pub struct Continuation {
    profiler: Profiler,
    context: Option<ForkedContext>,
    kind: ContinuationKind,
}

impl Continuation {
    /// A continuation with no originating invocation
    pub fn detached(profiler: &Profiler, kind: ContinuationKind) -> Self {
        Self {
            profiler: profiler.clone(),
            context: None,
            kind,
        }
    }

    pub fn kind(&self) -> ContinuationKind {
        self.kind
    }

    pub fn origin(&self) -> Option<InvocationId> {
        self.context.as_ref().map(ForkedContext::origin)
    }

    /// Run work under the restored identity, keeping the continuation
    /// alive for further runs (listeners fire many times)
    pub fn fire<R>(&self, f: impl FnOnce(&InvocationScope) -> R) -> R {
        let _guard = self.context.as_ref().map(|context| {
            self.profiler.resume(context, self.kind);
            ResumeGuard {
                profiler: &self.profiler,
                context,
                kind: self.kind,
            }
        });
        let scope = InvocationScope {
            profiler: self.profiler.clone(),
            identity: self.origin(),
        };
        f(&scope)
    }

    /// Run work once and release the continuation
    pub fn run<R>(self, f: impl FnOnce(&InvocationScope) -> R) -> R {
        self.fire(f)
    }
}

impl Drop for Continuation {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.profiler.release(&context);
        }
    }
}

struct ResumeGuard<'a> {
    profiler: &'a Profiler,
    context: &'a ForkedContext,
    kind: ContinuationKind,
}

impl Drop for ResumeGuard<'_> {
    fn drop(&mut self) {
        self.profiler.settle(self.context, self.kind);
    }
}
