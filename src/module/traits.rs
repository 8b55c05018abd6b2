//! Component system traits and interfaces
//!
//! Defines the contract every service built by a module implements, the
//! dispatch-table call shape used across module boundaries, and the errors the
//! container reports.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::module::sandbox::CallContext;

/// Identifier of a capability (an interface a service can expose)
pub type CapabilityId = String;

/// Shared handle to a built service (concrete, proxied or stray)
pub type ServiceRef = Arc<dyn Service>;

/// A single call routed through a service's dispatch table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Capability the method belongs to
    pub capability: CapabilityId,
    /// Method name within the capability
    pub method: String,
    /// Call arguments
    #[serde(default)]
    pub args: Value,
}

impl Invocation {
    /// Create a new invocation
    pub fn new(capability: impl Into<String>, method: impl Into<String>, args: Value) -> Self {
        Self {
            capability: capability.into(),
            method: method.into(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.capability, self.method)
    }
}

/// Service trait that every component instance implements
///
/// Cross-module calls never see concrete types: they go through `invoke`
/// with an explicit [`CallContext`] that carries the active resolution scope.
pub trait Service: Send + Sync + 'static {
    /// Capabilities this instance implements
    fn capabilities(&self) -> Vec<CapabilityId>;

    /// Dispatch a call
    fn invoke(&self, call: &mut CallContext, invocation: &Invocation)
        -> Result<Value, ComponentError>;

    /// Called once the owning module has completed its refresh
    fn context_refreshed(&self, _module: &str) {}

    /// Release resources; called when the owning context is torn down
    fn destroy(&self) {}

    /// Access the concrete value (proxies return themselves)
    fn as_any(&self) -> &dyn Any;
}

/// Check whether two handles point at the same instance
///
/// Compares data pointers only, so two handles to one instance match even if
/// their vtable pointers differ.
pub fn same_service(a: &ServiceRef, b: &ServiceRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Module context lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    /// Context created, declarations not parsed yet
    Unstarted,
    /// Declarations parsed, nothing built
    Defined,
    /// Context activated (fully, or bare for an urgent lookup)
    Active,
    /// Activation or construction failed; terminal
    Failed(String),
}

impl ModuleState {
    /// True for the terminal failure state
    pub fn is_failed(&self) -> bool {
        matches!(self, ModuleState::Failed(_))
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Unstarted => write!(f, "unstarted"),
            ModuleState::Defined => write!(f, "defined"),
            ModuleState::Active => write!(f, "active"),
            ModuleState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Component system errors
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("Module discovery failed: {0}")]
    Discovery(String),

    #[error("Invalid module declarations: {0}")]
    Definition(String),

    #[error("Failed to instantiate {name}: {reason}")]
    Instantiation { name: String, reason: String },

    #[error("No component registered under name: {0}")]
    UnknownName(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Component manager has been closed")]
    Closed,

    #[error("Template {0} cannot be instantiated")]
    TemplateNotInstantiable(String),

    #[error("Component {name} does not provide capability {capability}")]
    CapabilityMismatch { name: String, capability: String },

    #[error("Capability {capability} is not exposed by {name}")]
    CapabilityNotExposed { name: String, capability: String },

    #[error("Unknown method {method} on capability {capability}")]
    UnknownMethod { capability: String, method: String },

    #[error("Invocation failed: {0}")]
    Invocation(String),

    #[error("Component manager not available: {0}")]
    NotAvailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ComponentError {
    /// Build an instantiation error for a named service
    pub fn instantiation(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        ComponentError::Instantiation {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the name has no owner at all, as opposed to an owner that is broken
    pub fn is_absent(&self) -> bool {
        matches!(self, ComponentError::UnknownName(_))
    }
}

impl From<serde_json::Error> for ComponentError {
    fn from(e: serde_json::Error) -> Self {
        ComponentError::Invocation(e.to_string())
    }
}

impl From<anyhow::Error> for ComponentError {
    fn from(e: anyhow::Error) -> Self {
        ComponentError::Invocation(e.to_string())
    }
}
