//! Module isolation
//!
//! Provides the per-module resolution scopes, the libraries they are built
//! from, and the explicit call context used to switch scopes on every
//! cross-module call.

pub mod call;
pub mod library;
pub mod scope;

pub use call::{CallContext, ScopeGuard, ScopeInterceptor};
pub use library::{Library, LibraryCatalog, RecipeFn};
pub use scope::{ResolutionScope, ScopeId, PLATFORM_SCOPE};
