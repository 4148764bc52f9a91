use core::fmt::Display;

use analysis::domains::JoinSemiLattice;
use serde::Serialize;

use crate::hierarchy::ClassHierarchy;
use crate::ir::MethodRecord;

/// Where a method may run. The variants form a chain, later ones are more
/// conservative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreadContext {
    MainThreadOnly,
    UnknownThread,
    BackgroundReachable,
}

impl JoinSemiLattice for ThreadContext {
    type LatticeContext = ();

    fn bottom(_ctx: &()) -> Self {
        ThreadContext::MainThreadOnly
    }

    fn join(&self, other: &Self, _ctx: &()) -> Self {
        *self.max(other)
    }
}

impl ThreadContext {
    /// Whether code in this context may run at the same time as other code.
    pub fn is_concurrent(self, strict: bool) -> bool {
        match self {
            ThreadContext::MainThreadOnly => false,
            ThreadContext::UnknownThread => !strict,
            ThreadContext::BackgroundReachable => true,
        }
    }

    /// Two pieces of code may overlap when either runs in the background,
    /// or when neither context is known and strict mode is off. Code on the
    /// main thread is ordered with everything but the background.
    pub fn may_run_in_parallel(self, other: Self, strict: bool) -> bool {
        use ThreadContext::*;
        match (self, other) {
            (BackgroundReachable, _) | (_, BackgroundReachable) => true,
            (UnknownThread, UnknownThread) => !strict,
            _ => false,
        }
    }
}

impl Display for ThreadContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ThreadContext::MainThreadOnly => write!(f, "main thread"),
            ThreadContext::UnknownThread => write!(f, "unknown thread"),
            ThreadContext::BackgroundReachable => write!(f, "background thread"),
        }
    }
}

/// Direct thread context of methods, before anything is learned from
/// the call graph.
pub struct ThreadClassifier<'h, 'p> {
    hierarchy: &'h ClassHierarchy<'p>,
}

impl<'h, 'p> ThreadClassifier<'h, 'p> {
    pub fn new(hierarchy: &'h ClassHierarchy<'p>) -> Self {
        Self { hierarchy }
    }

    pub fn classify(&self, method: &MethodRecord) -> ThreadContext {
        let annotations = &method.annotations;
        let class = self.hierarchy.capabilities(&method.declaring_class);
        if annotations.thread_safe {
            ThreadContext::BackgroundReachable
        } else if annotations.thread_confined {
            ThreadContext::MainThreadOnly
        } else if self.hierarchy.overrides_shared_method(method) {
            ThreadContext::BackgroundReachable
        } else if class.thread_confined {
            ThreadContext::MainThreadOnly
        } else if class.thread_shared {
            ThreadContext::BackgroundReachable
        } else {
            ThreadContext::UnknownThread
        }
    }
}
