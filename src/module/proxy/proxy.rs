//! Location-transparent service proxies
//!
//! A proxy is a dispatch table over a service owned by some module: it exposes
//! a fixed capability surface and runs every call inside the owner's scope.

use serde_json::Value;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tracing::debug;
use uuid::Uuid;

use crate::module::context::{ResolutionPath, Resolver};
use crate::module::registry::ModuleRecord;
use crate::module::sandbox::{CallContext, ScopeInterceptor};
use crate::module::traits::{
    CapabilityId, ComponentError, Invocation, ModuleState, Service, ServiceRef,
};

enum Target {
    /// Built while locating
    Eager(ServiceRef),
    /// Built on first call, then memoized
    Deferred {
        cell: OnceLock<ServiceRef>,
        source: Weak<dyn Resolver>,
    },
}

/// Stand-in for a service owned by another module
pub struct ServiceProxy {
    name: String,
    owner_id: Uuid,
    owner: String,
    capabilities: BTreeSet<CapabilityId>,
    interceptor: ScopeInterceptor,
    record: Arc<ModuleRecord>,
    target: Target,
}

impl ServiceProxy {
    /// Proxy over an already-built instance
    pub fn eager(
        name: impl Into<String>,
        record: Arc<ModuleRecord>,
        capabilities: BTreeSet<CapabilityId>,
        service: ServiceRef,
    ) -> Self {
        Self {
            name: name.into(),
            owner_id: record.id(),
            owner: record.name().to_string(),
            capabilities,
            interceptor: record.interceptor().clone(),
            record,
            target: Target::Eager(service),
        }
    }

    /// Proxy that asks the owner for the instance on first call
    pub fn deferred(
        name: impl Into<String>,
        record: Arc<ModuleRecord>,
        capabilities: BTreeSet<CapabilityId>,
        source: Weak<dyn Resolver>,
    ) -> Self {
        Self {
            name: name.into(),
            owner_id: record.id(),
            owner: record.name().to_string(),
            capabilities,
            interceptor: record.interceptor().clone(),
            record,
            target: Target::Deferred {
                cell: OnceLock::new(),
                source,
            },
        }
    }

    /// Exported name this proxy stands for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the owning module record
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// Name of the owning module
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether a capability is part of this proxy's surface
    pub fn exposes(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Whether the underlying instance has been obtained
    pub fn is_resolved(&self) -> bool {
        match &self.target {
            Target::Eager(_) => true,
            Target::Deferred { cell, .. } => cell.get().is_some(),
        }
    }

    /// The concrete instance behind the proxy
    ///
    /// Fails once the owning module has failed, even if the instance was
    /// obtained earlier.
    pub fn target(&self) -> Result<ServiceRef, ComponentError> {
        if let ModuleState::Failed(reason) = self.record.context().state() {
            return Err(ComponentError::instantiation(
                &self.name,
                format!("owning module {} failed: {}", self.owner, reason),
            ));
        }

        match &self.target {
            Target::Eager(service) => Ok(Arc::clone(service)),
            Target::Deferred { cell, source } => {
                if let Some(service) = cell.get() {
                    return Ok(Arc::clone(service));
                }

                let resolver = source.upgrade().ok_or(ComponentError::Closed)?;
                if resolver.is_closed() {
                    return Err(ComponentError::Closed);
                }
                debug!("Resolving deferred {} in module {}", self.name, self.owner);
                let built = self.record.context().get_local(
                    &self.name,
                    resolver.as_ref(),
                    &mut ResolutionPath::new(),
                )?;
                Ok(Arc::clone(cell.get_or_init(|| built)))
            }
        }
    }
}

impl Service for ServiceProxy {
    fn capabilities(&self) -> Vec<CapabilityId> {
        self.capabilities.iter().cloned().collect()
    }

    fn invoke(
        &self,
        call: &mut CallContext,
        invocation: &Invocation,
    ) -> Result<Value, ComponentError> {
        if !self.exposes(&invocation.capability) {
            return Err(ComponentError::CapabilityNotExposed {
                name: self.name.clone(),
                capability: invocation.capability.clone(),
            });
        }

        let target = self.target()?;
        self.interceptor
            .around(call, |call| target.invoke(call, invocation))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("owner_id", &self.owner_id)
            .field("capabilities", &self.capabilities)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
