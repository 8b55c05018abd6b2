//! Call contexts and scope switching
//!
//! The active resolution scope is an explicit value threaded through every
//! cross-module call. Entering another module's scope yields a guard that
//! restores the previous scope when dropped, including on early return and
//! panic unwinding, so nested calls never leak scope into their caller.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::trace;

use crate::module::sandbox::scope::{ResolutionScope, ScopeId};

/// Per-call state carrying the active resolution scope
#[derive(Debug, Clone)]
pub struct CallContext {
    current: Arc<ResolutionScope>,
    depth: usize,
}

impl CallContext {
    /// Start a call chain in `scope`
    pub fn new(scope: Arc<ResolutionScope>) -> Self {
        Self {
            current: scope,
            depth: 0,
        }
    }

    /// Currently active scope
    pub fn current_scope(&self) -> &Arc<ResolutionScope> {
        &self.current
    }

    /// Id of the currently active scope
    pub fn scope_id(&self) -> &ScopeId {
        self.current.id()
    }

    /// Number of scope switches currently in effect
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Switch to `scope` until the returned guard is dropped
    pub fn enter(&mut self, scope: Arc<ResolutionScope>) -> ScopeGuard<'_> {
        trace!("Entering scope {} from {}", scope.id(), self.current.id());
        let saved = std::mem::replace(&mut self.current, scope);
        self.depth += 1;
        ScopeGuard {
            call: self,
            saved: Some(saved),
        }
    }
}

/// Restores the previous scope on drop
pub struct ScopeGuard<'a> {
    call: &'a mut CallContext,
    saved: Option<Arc<ResolutionScope>>,
}

impl Deref for ScopeGuard<'_> {
    type Target = CallContext;

    fn deref(&self) -> &CallContext {
        self.call
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut CallContext {
        self.call
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            trace!("Restoring scope {} from {}", saved.id(), self.call.current.id());
            self.call.current = saved;
            self.call.depth -= 1;
        }
    }
}

/// Invocation wrapper derived from a module's scope
///
/// Runs a call with the module's scope active and the caller's scope restored
/// afterwards.
#[derive(Debug, Clone)]
pub struct ScopeInterceptor {
    scope: Arc<ResolutionScope>,
}

impl ScopeInterceptor {
    /// Create an interceptor for `scope`
    pub fn new(scope: Arc<ResolutionScope>) -> Self {
        Self { scope }
    }

    /// Scope this interceptor switches to
    pub fn scope(&self) -> &Arc<ResolutionScope> {
        &self.scope
    }

    /// Run `f` inside the intercepted scope
    pub fn around<R, F>(&self, call: &mut CallContext, f: F) -> R
    where
        F: FnOnce(&mut CallContext) -> R,
    {
        let mut guard = call.enter(Arc::clone(&self.scope));
        f(&mut guard)
    }
}
