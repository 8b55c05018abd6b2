//! Module records and ownership directory
//!
//! Tracks every registered module and which module owns each exported name.
//! Mutated only additively: modules are never unregistered.

use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::module::context::ModuleContext;
use crate::module::registry::declarations::ServiceDeclaration;
use crate::module::sandbox::{ResolutionScope, ScopeInterceptor};
use crate::module::traits::{ComponentError, ServiceRef};

/// One registered module
pub struct ModuleRecord {
    id: Uuid,
    name: String,
    directory: Option<PathBuf>,
    context: Arc<ModuleContext>,
    interceptor: ScopeInterceptor,
}

impl ModuleRecord {
    /// Create a record; the interceptor is derived from the context's scope
    pub fn new(context: Arc<ModuleContext>, directory: Option<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: context.name().to_string(),
            directory,
            interceptor: ScopeInterceptor::new(Arc::clone(context.scope())),
            context,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn scope(&self) -> &Arc<ResolutionScope> {
        self.context.scope()
    }

    pub fn context(&self) -> &Arc<ModuleContext> {
        &self.context
    }

    pub fn interceptor(&self) -> &ScopeInterceptor {
        &self.interceptor
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("state", &self.context.state())
            .finish()
    }
}

/// Owner of an exported name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// Declared by a registered module
    Module(String),
    /// Injected directly by the platform
    Stray,
}

/// Module registry: module name → record, exported name → owner
#[derive(Default)]
pub struct ModuleRegistry {
    records: RwLock<Vec<Arc<ModuleRecord>>>,
    by_name: DashMap<String, Arc<ModuleRecord>>,
    owners: DashMap<String, Owner>,
    strays: DashMap<String, ServiceRef>,
    templates: DashMap<String, ServiceDeclaration>,
    core: RwLock<HashSet<String>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve names defined by the platform itself
    pub fn reserve_core(&self, names: impl IntoIterator<Item = String>) {
        if let Ok(mut core) = self.core.write() {
            core.extend(names);
        }
    }

    /// Whether a name is defined by the platform itself
    pub fn is_core(&self, name: &str) -> bool {
        self.core.read().map(|c| c.contains(name)).unwrap_or(false)
    }

    /// Merge a template upward into the shared namespace
    pub fn add_template(&self, declaration: ServiceDeclaration) {
        if let Some(previous) = self.templates.insert(declaration.name.clone(), declaration) {
            debug!("Template {} redefined", previous.name);
        }
    }

    /// Register a defined module and take ownership of its exported names
    pub fn register_module(&self, record: ModuleRecord) -> Result<Arc<ModuleRecord>, ComponentError> {
        let module = record.name().to_string();
        if self.by_name.contains_key(&module) {
            return Err(ComponentError::Definition(format!(
                "Module {} is already registered",
                module
            )));
        }

        let record = Arc::new(record);
        self.by_name.insert(module.clone(), Arc::clone(&record));
        if let Ok(mut records) = self.records.write() {
            records.push(Arc::clone(&record));
        }

        let mut owned = 0;
        for decl in record.context().declarations() {
            if decl.template {
                self.add_template(decl);
                continue;
            }
            if !decl.singleton {
                warn!(
                    "Service {} in module {} is not a singleton and will not be exported",
                    decl.name, module
                );
                continue;
            }
            if self.is_core(&decl.name) {
                debug!(
                    "Module {} cannot redefine platform service {}",
                    module, decl.name
                );
                continue;
            }

            let previous = self
                .owners
                .insert(decl.name.clone(), Owner::Module(module.clone()));
            if let Some(previous) = previous {
                warn!(
                    "Service {} was owned by {:?}, now owned by module {}",
                    decl.name, previous, module
                );
                self.strays.remove(&decl.name);
            }
            owned += 1;
        }

        info!("Registered module {} exporting {} services", module, owned);
        Ok(record)
    }

    /// Record a platform-injected instance
    pub fn register_stray(&self, name: impl Into<String>, instance: ServiceRef) {
        let name = name.into();
        if let Some(Owner::Module(previous)) = self.owners.insert(name.clone(), Owner::Stray) {
            warn!("Service {} was owned by module {}, now stray", name, previous);
        }
        self.strays.insert(name, instance);
    }

    /// Owner of an exported name, if any
    pub fn owner_of(&self, name: &str) -> Option<Owner> {
        self.owners.get(name).map(|o| o.value().clone())
    }

    /// Record of a module by name
    pub fn record(&self, module: &str) -> Option<Arc<ModuleRecord>> {
        self.by_name.get(module).map(|r| Arc::clone(r.value()))
    }

    /// All records in registration order
    pub fn records(&self) -> Vec<Arc<ModuleRecord>> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Stray instance registered under a name
    pub fn stray(&self, name: &str) -> Option<ServiceRef> {
        self.strays.get(name).map(|s| Arc::clone(s.value()))
    }

    /// Template merged upward under a name
    pub fn template(&self, name: &str) -> Option<ServiceDeclaration> {
        self.templates.get(name).map(|t| t.value().clone())
    }

    /// Whether a template exists under a name
    pub fn is_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Core, module-owned and stray names, sorted
    pub fn exported_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self
            .core
            .read()
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default();
        names.extend(self.owners.iter().map(|o| o.key().clone()));
        names.into_iter().collect()
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Modules cannot be removed once registered
    pub fn unregister_module(&self, module: &str) -> Result<(), ComponentError> {
        Err(ComponentError::Unsupported(format!(
            "cannot unregister module {}: unloading is not supported",
            module
        )))
    }
}
