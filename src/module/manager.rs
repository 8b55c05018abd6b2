//! Component manager
//!
//! The root registry every platform lookup goes through. It caches one
//! binding per exported name, resolves platform-defined names locally, and
//! delegates everything else to the locator on a cache miss.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{ContainerConfig, ShutdownPolicy};
use crate::module::api::{EventManager, LifecycleEvent};
use crate::module::context::{
    ContextStats, DeclarationSource, ModuleContext, ResolutionPath, Resolver,
};
use crate::module::loader::{ComponentsLoader, LoadReport};
use crate::module::proxy::Locator;
use crate::module::refresh::{RefreshReport, StagedRefresh};
use crate::module::registry::{
    Declarations, ModuleRecord, ModuleRegistry, Owner, PropertyMap, ServiceDeclaration,
};
use crate::module::sandbox::{CallContext, Library, LibraryCatalog, ResolutionScope, PLATFORM_SCOPE};
use crate::module::traits::{ComponentError, Invocation, ModuleState, ServiceRef};
use crate::utils::{wait_for_shutdown_signal, ShutdownSignal};

/// Per-module load figures
#[derive(Debug, Clone, Serialize)]
pub struct ModuleLoadStats {
    pub module: String,
    pub state: ModuleState,
    #[serde(flatten)]
    pub context: ContextStats,
}

/// Load statistics for the whole container
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadStats {
    pub modules: Vec<ModuleLoadStats>,
    pub exported_names: usize,
    pub cached_bindings: usize,
}

/// Builder for [`ComponentManager`]
#[derive(Default)]
pub struct ComponentManagerBuilder {
    config: ContainerConfig,
    catalog: LibraryCatalog,
    core: Vec<ServiceDeclaration>,
}

impl ComponentManagerBuilder {
    /// Use a container configuration
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a library catalog
    pub fn catalog(mut self, catalog: LibraryCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Declare a platform-level service, resolved locally and never proxied
    pub fn core_definition(mut self, declaration: ServiceDeclaration) -> Self {
        self.core.push(declaration);
        self
    }

    /// Build the manager
    pub fn build(self) -> Result<ComponentManager, ComponentError> {
        let events = Arc::new(EventManager::new());
        let properties = Arc::new(self.config.properties.clone());
        let platform_scope = ResolutionScope::platform(self.catalog.platform().to_vec());

        let core = Arc::new(ModuleContext::new(
            PLATFORM_SCOPE,
            Arc::clone(&platform_scope),
            DeclarationSource::Inline(Declarations::from_services(self.core)),
            Arc::clone(&properties),
            Arc::clone(&events),
        ));
        core.define()?;

        let registry = Arc::new(ModuleRegistry::new());
        for decl in core.declarations() {
            if decl.template {
                registry.add_template(decl);
            } else {
                registry.reserve_core([decl.name]);
            }
        }

        let locator = Locator::new(Arc::clone(&registry), Arc::clone(&platform_scope));
        let inner = Arc::new_cyclic(|this| ManagerInner {
            this: this.clone(),
            config: self.config,
            catalog: self.catalog,
            platform_scope,
            properties,
            core,
            registry,
            locator,
            cache: DashMap::new(),
            consumers: DashMap::new(),
            closed: AtomicBool::new(false),
            dependents: Mutex::new(0),
            events,
        });

        info!(
            "Component manager ready ({} platform libraries, {} named libraries)",
            inner.catalog.platform().len(),
            inner.catalog.library_names().len()
        );
        Ok(ComponentManager { inner })
    }
}

struct ManagerInner {
    this: Weak<ManagerInner>,
    config: ContainerConfig,
    catalog: LibraryCatalog,
    platform_scope: Arc<ResolutionScope>,
    properties: Arc<PropertyMap>,
    core: Arc<ModuleContext>,
    registry: Arc<ModuleRegistry>,
    locator: Locator,
    cache: DashMap<String, ServiceRef>,
    /// owning module → modules that resolved one of its names
    consumers: DashMap<String, BTreeSet<String>>,
    closed: AtomicBool,
    dependents: Mutex<usize>,
    events: Arc<EventManager>,
}

impl ManagerInner {
    fn lookup(&self, name: &str, path: &mut ResolutionPath) -> Result<ServiceRef, ComponentError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ComponentError::Closed);
        }
        if let Some(record) = self.owning_record(name) {
            if let Some(caller) = path.current_module() {
                if caller != record.name() {
                    self.consumers
                        .entry(record.name().to_string())
                        .or_default()
                        .insert(caller.to_string());
                }
            }
            if let ModuleState::Failed(reason) = record.context().state() {
                if self.cache.remove(name).is_some() {
                    debug!("Evicted {} bound to failed module {}", name, record.name());
                }
                return Err(ComponentError::instantiation(
                    name,
                    format!("owning module {} failed: {}", record.name(), reason),
                ));
            }
        }
        if let Some(bound) = self.cache.get(name) {
            return Ok(Arc::clone(bound.value()));
        }

        let service = if self.registry.is_core(name) {
            debug!("Resolving platform service {}", name);
            self.core.get_local(name, self, path)?
        } else if self.registry.is_template(name) && self.registry.owner_of(name).is_none() {
            return Err(ComponentError::TemplateNotInstantiable(name.to_string()));
        } else {
            debug!("Locating {}", name);
            let source: Weak<dyn Resolver> = self.this.clone();
            self.locator.locate(name, self, source, path)?.service
        };

        let bound = Arc::clone(self.cache.entry(name.to_string()).or_insert(service).value());
        if self.closed.load(Ordering::SeqCst) {
            self.cache.remove(name);
            return Err(ComponentError::Closed);
        }
        Ok(bound)
    }

    fn owning_record(&self, name: &str) -> Option<Arc<ModuleRecord>> {
        match self.registry.owner_of(name)? {
            Owner::Module(module) => self.registry.record(&module),
            Owner::Stray => None,
        }
    }

    /// Fail every module that resolved a name from a failed module
    ///
    /// Repeats until no new module fails, so consumers of consumers follow.
    fn fail_consumers(&self) -> Vec<(String, String)> {
        let mut failed = Vec::new();
        loop {
            let mut changed = false;
            for record in self.registry.records() {
                if !record.context().state().is_failed() {
                    continue;
                }
                let consumers: Vec<String> = self
                    .consumers
                    .get(record.name())
                    .map(|c| c.iter().cloned().collect())
                    .unwrap_or_default();
                for consumer in consumers {
                    let Some(dependent) = self.registry.record(&consumer) else {
                        continue;
                    };
                    if dependent.context().state().is_failed() {
                        continue;
                    }
                    let reason = format!("depends on failed module {}", record.name());
                    dependent.context().fail(&reason);
                    failed.push((consumer, reason));
                    changed = true;
                }
            }
            if !changed {
                return failed;
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing component manager");

        for record in self.registry.records().iter().rev() {
            record.context().teardown();
        }
        self.core.teardown();
        self.cache.clear();
        self.events.publish(LifecycleEvent::Closed);
    }
}

impl Resolver for ManagerInner {
    fn resolve(&self, name: &str, path: &mut ResolutionPath) -> Result<ServiceRef, ComponentError> {
        self.lookup(name, path)
    }

    fn template(&self, name: &str) -> Option<ServiceDeclaration> {
        self.registry.template(name)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Keeps the manager open under the last-dependent shutdown policy
pub struct DependentGuard {
    inner: Arc<ManagerInner>,
}

impl Drop for DependentGuard {
    fn drop(&mut self) {
        let remaining = match self.inner.dependents.lock() {
            Ok(mut count) => {
                *count = count.saturating_sub(1);
                *count
            }
            Err(_) => return,
        };
        debug!("Dependent detached, {} remaining", remaining);

        if remaining == 0 && self.inner.config.shutdown_policy == ShutdownPolicy::LastDependentDetached {
            info!("Last dependent detached");
            self.inner.close();
        }
    }
}

/// Handle to the root registry; cheap to clone
#[derive(Clone)]
pub struct ComponentManager {
    inner: Arc<ManagerInner>,
}

impl ComponentManager {
    /// Start building a manager
    pub fn builder() -> ComponentManagerBuilder {
        ComponentManagerBuilder::default()
    }

    /// Manager with the given configuration and only the built-in recipes
    pub fn new(config: ContainerConfig) -> Result<Self, ComponentError> {
        Self::builder().config(config).build()
    }

    /// Container configuration
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// Library catalog modules resolve recipes from
    pub fn catalog(&self) -> &LibraryCatalog {
        &self.inner.catalog
    }

    /// Module registry
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.inner.registry
    }

    /// Look up a service by exported name
    pub fn get(&self, name: &str) -> Result<ServiceRef, ComponentError> {
        self.inner.lookup(name, &mut ResolutionPath::new())
    }

    /// Look up a service that must provide `capability`
    pub fn get_as(&self, name: &str, capability: &str) -> Result<ServiceRef, ComponentError> {
        let service = self.get(name)?;
        if service.capabilities().iter().any(|c| c == capability) {
            Ok(service)
        } else {
            Err(ComponentError::CapabilityMismatch {
                name: name.to_string(),
                capability: capability.to_string(),
            })
        }
    }

    /// Whether a name is known, without resolving anything
    pub fn contains(&self, name: &str) -> bool {
        self.inner.cache.contains_key(name)
            || self.inner.registry.is_core(name)
            || self.inner.registry.owner_of(name).is_some()
            || self.inner.registry.is_template(name)
    }

    /// Every exported name: platform, module-owned and stray
    pub fn get_all_exported_names(&self) -> Vec<String> {
        self.inner.registry.exported_names()
    }

    /// Inject a platform-built instance under `name`
    pub fn register_singleton(
        &self,
        name: impl Into<String>,
        instance: ServiceRef,
    ) -> Result<(), ComponentError> {
        if self.has_been_closed() {
            return Err(ComponentError::Closed);
        }
        let name = name.into();
        if self.inner.registry.is_core(&name) {
            return Err(ComponentError::Unsupported(format!(
                "{} is a platform service and cannot be replaced",
                name
            )));
        }

        match self.inner.cache.entry(name.clone()) {
            Entry::Occupied(_) => Err(ComponentError::Unsupported(format!(
                "{} is already bound",
                name
            ))),
            Entry::Vacant(slot) => {
                self.inner
                    .registry
                    .register_stray(name.clone(), Arc::clone(&instance));
                slot.insert(instance);
                debug!("Registered stray singleton {}", name);
                Ok(())
            }
        }
    }

    /// Call a service from the platform scope
    pub fn invoke(
        &self,
        name: &str,
        invocation: &Invocation,
    ) -> Result<serde_json::Value, ComponentError> {
        let service = self.get(name)?;
        service.invoke(&mut self.call_context(), invocation)
    }

    /// Fresh call context rooted at the platform scope
    pub fn call_context(&self) -> CallContext {
        CallContext::new(Arc::clone(&self.inner.platform_scope))
    }

    /// Discover and register every module under the configured root
    pub fn load_components(&self) -> Result<LoadReport, ComponentError> {
        ComponentsLoader::new(self).load_all()
    }

    /// Register a module whose declarations are supplied by the host
    ///
    /// `libraries` name catalog libraries, searched in order before the
    /// platform scope.
    pub fn add_module(
        &self,
        name: &str,
        declarations: Declarations,
        libraries: &[&str],
    ) -> Result<Arc<ModuleRecord>, ComponentError> {
        let libraries = libraries
            .iter()
            .map(|lib| {
                self.inner.catalog.get(lib).ok_or_else(|| {
                    ComponentError::Definition(format!("Unknown library {} for module {}", lib, name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.register_context(name, DeclarationSource::Inline(declarations), libraries, None)
    }

    pub(crate) fn register_context(
        &self,
        name: &str,
        source: DeclarationSource,
        libraries: Vec<Arc<Library>>,
        directory: Option<PathBuf>,
    ) -> Result<Arc<ModuleRecord>, ComponentError> {
        if self.has_been_closed() {
            return Err(ComponentError::Closed);
        }

        let scope = ResolutionScope::child(name, libraries, Arc::clone(&self.inner.platform_scope));
        let context = ModuleContext::new(
            name,
            scope,
            source,
            Arc::clone(&self.inner.properties),
            Arc::clone(&self.inner.events),
        );
        context.define()?;
        self.inner
            .registry
            .register_module(ModuleRecord::new(Arc::new(context), directory))
    }

    /// Drive every registered module through define and instantiate
    pub fn refresh(&self) -> Result<RefreshReport, ComponentError> {
        StagedRefresh::new(self).run()
    }

    pub(crate) fn resolver(&self) -> &dyn Resolver {
        self.inner.as_ref()
    }

    pub(crate) fn core_context(&self) -> &Arc<ModuleContext> {
        &self.inner.core
    }

    pub(crate) fn fail_consumers(&self) -> Vec<(String, String)> {
        self.inner.fail_consumers()
    }

    /// Modules that resolved a name owned by `module`
    pub fn consumers_of(&self, module: &str) -> Vec<String> {
        self.inner
            .consumers
            .get(module)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Registered module records in registration order
    pub fn modules(&self) -> Vec<Arc<ModuleRecord>> {
        self.inner.registry.records()
    }

    /// Lifecycle state of a module
    pub fn module_state(&self, module: &str) -> Option<ModuleState> {
        self.inner.registry.record(module).map(|r| r.context().state())
    }

    /// Modules cannot be unloaded
    pub fn unregister_module(&self, module: &str) -> Result<(), ComponentError> {
        self.inner.registry.unregister_module(module)
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Register a dependent; see [`ShutdownPolicy::LastDependentDetached`]
    pub fn attach(&self) -> DependentGuard {
        if let Ok(mut count) = self.inner.dependents.lock() {
            *count += 1;
            debug!("Dependent attached, {} total", *count);
        }
        DependentGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Load figures for every module
    pub fn load_stats(&self) -> LoadStats {
        let modules = self
            .modules()
            .iter()
            .map(|r| ModuleLoadStats {
                module: r.name().to_string(),
                state: r.context().state(),
                context: r.context().stats(),
            })
            .collect();
        LoadStats {
            modules,
            exported_names: self.inner.registry.exported_names().len(),
            cached_bindings: self.inner.cache.len(),
        }
    }

    /// Tear down every context; later lookups fail with `Closed`
    pub fn close(&self) {
        self.inner.close();
    }

    /// Whether `close()` has run
    pub fn has_been_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close once `trigger` resolves, handing back its output
    pub async fn close_when<F: Future>(&self, trigger: F) -> F::Output {
        let output = trigger.await;
        if !self.has_been_closed() {
            info!("Shutdown triggered, closing components");
            self.close();
        }
        output
    }

    /// Close on the first SIGTERM, SIGINT or Ctrl+C
    pub async fn close_on_signal(&self) -> ShutdownSignal {
        self.close_when(wait_for_shutdown_signal()).await
    }
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("modules", &self.inner.registry.len())
            .field("cached", &self.inner.cache.len())
            .field("closed", &self.has_been_closed())
            .finish()
    }
}
