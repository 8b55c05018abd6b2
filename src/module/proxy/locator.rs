//! Lazy locator
//!
//! Turns an exported name into a handle: finds the owning module, then either
//! hands out a deferred proxy (when the declaration advertises capabilities
//! the caller can see) or builds the instance once to shape an eager proxy.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::module::context::{ResolutionPath, Resolver};
use crate::module::proxy::ServiceProxy;
use crate::module::registry::{ModuleRecord, ModuleRegistry, Owner};
use crate::module::sandbox::ResolutionScope;
use crate::module::traits::{CapabilityId, ComponentError, ModuleState, ServiceRef};

/// Result of one locate call
#[derive(Clone)]
pub struct ServiceHandle {
    /// Proxy, or the raw instance when no proxy could be shaped
    pub service: ServiceRef,
    /// Owning module; `None` for stray services
    pub owner: Option<Arc<ModuleRecord>>,
}

impl ServiceHandle {
    /// Whether the handle carries a proxy
    pub fn is_proxied(&self) -> bool {
        self.service.as_any().downcast_ref::<ServiceProxy>().is_some()
    }
}

/// Resolves names to proxies on root cache misses
pub struct Locator {
    registry: Arc<ModuleRegistry>,
    caller_scope: Arc<ResolutionScope>,
}

impl Locator {
    /// Create a locator shaping proxies for `caller_scope`
    pub fn new(registry: Arc<ModuleRegistry>, caller_scope: Arc<ResolutionScope>) -> Self {
        Self {
            registry,
            caller_scope,
        }
    }

    /// Scope whose visible capabilities bound every proxy surface
    pub fn caller_scope(&self) -> &Arc<ResolutionScope> {
        &self.caller_scope
    }

    /// Locate `name`
    ///
    /// `source` is kept by deferred proxies to reach the owner later.
    pub fn locate(
        &self,
        name: &str,
        resolver: &dyn Resolver,
        source: Weak<dyn Resolver>,
        path: &mut ResolutionPath,
    ) -> Result<ServiceHandle, ComponentError> {
        let owner = self
            .registry
            .owner_of(name)
            .ok_or_else(|| ComponentError::UnknownName(name.to_string()))?;

        let module = match owner {
            Owner::Stray => {
                let service = self
                    .registry
                    .stray(name)
                    .ok_or_else(|| ComponentError::UnknownName(name.to_string()))?;
                return Ok(ServiceHandle {
                    service,
                    owner: None,
                });
            }
            Owner::Module(module) => module,
        };

        let record = self
            .registry
            .record(&module)
            .ok_or_else(|| ComponentError::UnknownName(name.to_string()))?;
        if let state @ ModuleState::Failed(_) = record.context().state() {
            return Err(ComponentError::instantiation(
                name,
                format!("owning module {} is {}", module, state),
            ));
        }

        let hinted = self.hinted_surface(&record, name);
        if !hinted.is_empty() {
            debug!("Deferred proxy for {} owned by {}", name, module);
            let proxy: ServiceRef =
                Arc::new(ServiceProxy::deferred(name, Arc::clone(&record), hinted, source));
            return Ok(ServiceHandle {
                service: proxy,
                owner: Some(record),
            });
        }

        let concrete = record.context().get_local(name, resolver, path)?;
        let surface = self.visible(concrete.capabilities());
        if surface.is_empty() {
            info!(
                "No capability of {} is visible to scope {}, handing out the concrete instance",
                name,
                self.caller_scope.id()
            );
            return Ok(ServiceHandle {
                service: concrete,
                owner: Some(record),
            });
        }

        debug!("Proxy for {} owned by {} exposing {:?}", name, module, surface);
        let proxy: ServiceRef = Arc::new(ServiceProxy::eager(name, Arc::clone(&record), surface, concrete));
        Ok(ServiceHandle {
            service: proxy,
            owner: Some(record),
        })
    }

    fn hinted_surface(&self, record: &ModuleRecord, name: &str) -> BTreeSet<CapabilityId> {
        record
            .context()
            .declarations()
            .into_iter()
            .find(|d| d.name == name)
            .map(|d| self.visible(d.provides))
            .unwrap_or_default()
    }

    fn visible(&self, capabilities: Vec<CapabilityId>) -> BTreeSet<CapabilityId> {
        capabilities
            .into_iter()
            .filter(|c| self.caller_scope.can_see(c))
            .collect()
    }
}
