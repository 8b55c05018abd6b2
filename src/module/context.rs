//! Module contexts
//!
//! A module context owns one module's service declarations and the singletons
//! built from them. It moves through a two-phase lifecycle: `define()` parses
//! declarations without building anything, activation builds services. A
//! lookup against a defined-but-inactive context activates just that context
//! ("bare" activation) before answering.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::module::api::{EventManager, LifecycleEvent};
use crate::module::registry::declarations::{Declarations, PropertyMap, ServiceDeclaration};
use crate::module::sandbox::ResolutionScope;
use crate::module::traits::{ComponentError, ModuleState, ServiceRef};
use crate::module::validation::{DeclarationValidator, ValidationResult};

/// Resolves names that a module does not declare itself
pub trait Resolver: Send + Sync {
    /// Resolve an exported name for a service under construction
    fn resolve(&self, name: &str, path: &mut ResolutionPath) -> Result<ServiceRef, ComponentError>;

    /// Look up a template merged upward by any module
    fn template(&self, name: &str) -> Option<ServiceDeclaration>;

    /// True once the resolver has been shut down
    fn is_closed(&self) -> bool {
        false
    }
}

/// Chain of `module:name` entries currently under construction
#[derive(Debug, Clone, Default)]
pub struct ResolutionPath {
    entries: Vec<String>,
}

impl ResolutionPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.iter().any(|e| e == entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Module whose service is being built at the top of the chain
    pub fn current_module(&self) -> Option<&str> {
        self.entries
            .last()
            .and_then(|entry| entry.split_once(':'))
            .map(|(module, _)| module)
    }

    fn push(&mut self, entry: String) {
        self.entries.push(entry);
    }

    fn pop(&mut self) {
        self.entries.pop();
    }
}

impl fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entries.join(" -> "))
    }
}

/// Where a context reads its declarations from
#[derive(Debug, Clone)]
pub enum DeclarationSource {
    /// Declaration files, concatenated in order
    Files(Vec<PathBuf>),
    /// Declarations supplied by the host
    Inline(Declarations),
}

/// Timing and size figures for one context
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextStats {
    pub declared: usize,
    pub singletons: usize,
    pub define_time: Option<Duration>,
    pub refresh_time: Option<Duration>,
    pub bare_activated: bool,
}

#[derive(Default)]
struct SingletonStore {
    by_name: HashMap<String, ServiceRef>,
    order: Vec<String>,
}

/// Per-module service container
pub struct ModuleContext {
    name: String,
    scope: Arc<ResolutionScope>,
    source: DeclarationSource,
    properties: Arc<PropertyMap>,
    state: Mutex<ModuleState>,
    declarations: RwLock<Vec<ServiceDeclaration>>,
    merged: RwLock<HashMap<String, Arc<ServiceDeclaration>>>,
    singletons: Mutex<SingletonStore>,
    refreshed: AtomicBool,
    stats: Mutex<ContextStats>,
    events: Arc<EventManager>,
}

impl ModuleContext {
    /// Create an unstarted context
    pub fn new(
        name: impl Into<String>,
        scope: Arc<ResolutionScope>,
        source: DeclarationSource,
        properties: Arc<PropertyMap>,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            source,
            properties,
            state: Mutex::new(ModuleState::Unstarted),
            declarations: RwLock::new(Vec::new()),
            merged: RwLock::new(HashMap::new()),
            singletons: Mutex::new(SingletonStore::default()),
            refreshed: AtomicBool::new(false),
            stats: Mutex::new(ContextStats::default()),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &Arc<ResolutionScope> {
        &self.scope
    }

    /// Current lifecycle state
    pub fn state(&self) -> ModuleState {
        self.lock_state().clone()
    }

    /// True once the context has been activated (fully or bare)
    pub fn is_active(&self) -> bool {
        matches!(self.state(), ModuleState::Active)
    }

    /// True once the refresh-completed pass has run
    pub fn is_refreshed(&self) -> bool {
        self.refreshed.load(Ordering::SeqCst)
    }

    /// Snapshot of timing and size figures
    pub fn stats(&self) -> ContextStats {
        let mut stats = self.stats.lock().map(|s| s.clone()).unwrap_or_default();
        stats.singletons = self.lock_singletons().order.len();
        stats
    }

    /// Declarations as parsed by `define()`
    pub fn declarations(&self) -> Vec<ServiceDeclaration> {
        self.declarations
            .read()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Whether the activated context declares a buildable service `name`
    pub fn has_definition(&self, name: &str) -> bool {
        self.merged_declaration(name).is_some_and(|d| !d.template)
    }

    /// Parse declarations into the context
    ///
    /// Idempotent: a context that is already defined or active is left alone.
    pub fn define(&self) -> Result<(), ComponentError> {
        let mut state = self.lock_state();
        match &*state {
            ModuleState::Unstarted => {}
            ModuleState::Failed(reason) => {
                return Err(ComponentError::Definition(format!(
                    "module {} failed: {}",
                    self.name, reason
                )))
            }
            _ => return Ok(()),
        }

        let start = Instant::now();
        let declarations = match self.load_declarations() {
            Ok(d) => d,
            Err(e) => {
                *state = ModuleState::Failed(e.to_string());
                drop(state);
                error!("Failed to define module {}: {}", self.name, e);
                self.events.publish(LifecycleEvent::ModuleFailed {
                    module: self.name.clone(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let count = declarations.services.len();
        if let Ok(mut slot) = self.declarations.write() {
            *slot = declarations.services;
        }
        *state = ModuleState::Defined;
        drop(state);

        if let Ok(mut stats) = self.stats.lock() {
            stats.declared = count;
            stats.define_time = Some(start.elapsed());
        }
        debug!("Defined module {} with {} declarations", self.name, count);
        self.events.publish(LifecycleEvent::ModuleDefined {
            module: self.name.clone(),
            services: count,
        });
        Ok(())
    }

    fn load_declarations(&self) -> Result<Declarations, ComponentError> {
        let mut declarations = match &self.source {
            DeclarationSource::Files(files) => {
                let mut all = Declarations::default();
                for file in files {
                    all.extend(Declarations::from_file(file)?);
                }
                all
            }
            DeclarationSource::Inline(declarations) => declarations.clone(),
        };

        let applied = declarations.apply_overrides(&self.properties);
        if applied > 0 {
            debug!("Applied {} property overrides to module {}", applied, self.name);
        }
        declarations.resolve_placeholders(&self.properties)?;

        match DeclarationValidator::new().validate(&declarations) {
            ValidationResult::Valid => Ok(declarations),
            ValidationResult::Invalid(errors) => Err(ComponentError::Definition(format!(
                "{}: {}",
                self.name,
                errors.join("; ")
            ))),
        }
    }

    /// Activate the context without building anything
    ///
    /// Resolves template inheritance and moves the context to `Active`. Runs
    /// at most once; concurrent callers wait on the state lock.
    pub fn prepare(&self, resolver: &dyn Resolver) -> Result<bool, ComponentError> {
        if matches!(self.state(), ModuleState::Unstarted) {
            self.define()?;
        }

        let mut state = self.lock_state();
        match &*state {
            ModuleState::Defined => {}
            ModuleState::Active => return Ok(false),
            ModuleState::Failed(reason) => {
                return Err(ComponentError::instantiation(
                    &self.name,
                    format!("module failed: {}", reason),
                ))
            }
            ModuleState::Unstarted => {
                return Err(ComponentError::Definition(format!(
                    "module {} is not defined",
                    self.name
                )))
            }
        }

        let merged = match self.merge_declarations(resolver) {
            Ok(merged) => merged,
            Err(e) => {
                drop(state);
                self.fail(&e.to_string());
                return Err(e);
            }
        };
        if let Ok(mut slot) = self.merged.write() {
            *slot = merged;
        }
        *state = ModuleState::Active;
        Ok(true)
    }

    fn merge_declarations(
        &self,
        resolver: &dyn Resolver,
    ) -> Result<HashMap<String, Arc<ServiceDeclaration>>, ComponentError> {
        let raw = self.declarations();
        let local_templates: HashMap<&str, &ServiceDeclaration> = raw
            .iter()
            .filter(|d| d.template)
            .map(|d| (d.name.as_str(), d))
            .collect();

        let mut merged = HashMap::with_capacity(raw.len());
        for decl in &raw {
            let mut resolved = decl.clone();
            let mut seen = HashSet::new();
            while let Some(parent) = resolved.parent.clone() {
                if !seen.insert(parent.clone()) {
                    return Err(ComponentError::Definition(format!(
                        "circular parent chain at {} in {}",
                        parent, decl.name
                    )));
                }
                let template = local_templates
                    .get(parent.as_str())
                    .map(|t| (*t).clone())
                    .or_else(|| resolver.template(&parent))
                    .ok_or_else(|| {
                        ComponentError::Definition(format!(
                            "{} names unknown parent {}",
                            decl.name, parent
                        ))
                    })?;
                resolved.merge_parent(&template);
            }

            if !resolved.template && resolved.recipe.is_none() {
                return Err(ComponentError::Definition(format!(
                    "{} has no recipe",
                    decl.name
                )));
            }
            merged.insert(resolved.name.clone(), Arc::new(resolved));
        }
        Ok(merged)
    }

    /// Answer a lookup for a name this context owns
    ///
    /// Bare-activates the context first if it is only defined.
    pub fn get_local(
        &self,
        name: &str,
        resolver: &dyn Resolver,
        path: &mut ResolutionPath,
    ) -> Result<ServiceRef, ComponentError> {
        if self.prepare(resolver)? {
            info!("Bare activation of module {} to resolve {}", self.name, name);
            if let Ok(mut stats) = self.stats.lock() {
                stats.bare_activated = true;
            }
        }
        self.get_or_create(name, resolver, path)
    }

    fn get_or_create(
        &self,
        name: &str,
        resolver: &dyn Resolver,
        path: &mut ResolutionPath,
    ) -> Result<ServiceRef, ComponentError> {
        if let ModuleState::Failed(reason) = self.state() {
            return Err(ComponentError::instantiation(
                name,
                format!("module {} failed: {}", self.name, reason),
            ));
        }
        if let Some(existing) = self.lock_singletons().by_name.get(name) {
            return Ok(Arc::clone(existing));
        }

        let decl = self
            .merged_declaration(name)
            .ok_or_else(|| ComponentError::UnknownName(name.to_string()))?;
        if decl.template {
            return Err(ComponentError::TemplateNotInstantiable(name.to_string()));
        }

        let entry = format!("{}:{}", self.name, name);
        if path.contains(&entry) {
            return Err(ComponentError::instantiation(
                name,
                format!("circular reference: {} -> {}", path, entry),
            ));
        }

        let recipe_id = decl.recipe.clone().unwrap_or_default();
        let Some(recipe) = self.scope.find_recipe(&recipe_id) else {
            let err = ComponentError::instantiation(
                name,
                format!("recipe {} not visible from scope {}", recipe_id, self.scope.id()),
            );
            self.fail(&err.to_string());
            return Err(err);
        };

        debug!("Building {} in module {}", name, self.name);
        path.push(entry);
        let built = {
            let mut ctx = RecipeContext {
                declaration: decl.as_ref(),
                module: self,
                resolver,
                path: &mut *path,
            };
            recipe(&mut ctx)
        };
        path.pop();

        let service = match built {
            Ok(service) => service,
            Err(e) => {
                let err = match e {
                    ComponentError::Instantiation { .. } => e,
                    other => ComponentError::instantiation(name, other),
                };
                self.fail(&err.to_string());
                return Err(err);
            }
        };

        if !decl.singleton {
            return Ok(service);
        }

        let mut store = self.lock_singletons();
        if self.state().is_failed() {
            drop(store);
            service.destroy();
            return Err(ComponentError::instantiation(
                name,
                format!("module {} failed during construction", self.name),
            ));
        }
        if let Some(existing) = store.by_name.get(name).cloned() {
            drop(store);
            debug!("Discarding duplicate construction of {}", name);
            service.destroy();
            return Ok(existing);
        }
        store.by_name.insert(name.to_string(), Arc::clone(&service));
        store.order.push(name.to_string());
        Ok(service)
    }

    /// Fully activate: bare activation plus the refresh-completed pass
    pub fn instantiate(&self, resolver: &dyn Resolver) -> Result<(), ComponentError> {
        self.prepare(resolver)?;
        self.complete_refresh(resolver)
    }

    /// Build every remaining non-lazy singleton and notify built services
    ///
    /// Runs at most once per context.
    pub fn complete_refresh(&self, resolver: &dyn Resolver) -> Result<(), ComponentError> {
        if self.refreshed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let start = Instant::now();
        let eager: Vec<String> = self
            .declarations()
            .into_iter()
            .filter(|d| d.is_exportable() && !d.lazy)
            .map(|d| d.name)
            .collect();

        let mut path = ResolutionPath::new();
        for name in &eager {
            self.get_or_create(name, resolver, &mut path)?;
        }

        let built: Vec<ServiceRef> = {
            let store = self.lock_singletons();
            store
                .order
                .iter()
                .filter_map(|n| store.by_name.get(n).cloned())
                .collect()
        };
        for service in &built {
            service.context_refreshed(&self.name);
        }

        if let Ok(mut stats) = self.stats.lock() {
            stats.refresh_time = Some(start.elapsed());
        }
        info!(
            "Module {} refreshed with {} singletons",
            self.name,
            built.len()
        );
        self.events.publish(LifecycleEvent::ModuleRefreshed {
            module: self.name.clone(),
            singletons: built.len(),
        });
        Ok(())
    }

    /// Mark the context failed and tear down what it built
    pub fn fail(&self, reason: &str) {
        {
            let mut state = self.lock_state();
            if state.is_failed() {
                return;
            }
            *state = ModuleState::Failed(reason.to_string());
        }
        error!("Module {} failed: {}", self.name, reason);
        self.teardown();
        self.events.publish(LifecycleEvent::ModuleFailed {
            module: self.name.clone(),
            reason: reason.to_string(),
        });
    }

    /// Destroy built singletons in reverse construction order
    pub fn teardown(&self) {
        let drained: Vec<(String, ServiceRef)> = {
            let mut store = self.lock_singletons();
            let order = std::mem::take(&mut store.order);
            let mut by_name = std::mem::take(&mut store.by_name);
            order
                .into_iter()
                .rev()
                .filter_map(|n| by_name.remove(&n).map(|s| (n, s)))
                .collect()
        };
        if drained.is_empty() {
            return;
        }
        debug!("Tearing down {} singletons of module {}", drained.len(), self.name);
        for (_, service) in drained {
            service.destroy();
        }
    }

    fn merged_declaration(&self, name: &str) -> Option<Arc<ServiceDeclaration>> {
        self.merged.read().ok()?.get(name).cloned()
    }

    fn lock_state(&self) -> MutexGuard<'_, ModuleState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Module {} state lock poisoned", self.name);
            poisoned.into_inner()
        })
    }

    fn lock_singletons(&self) -> MutexGuard<'_, SingletonStore> {
        self.singletons
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("name", &self.name)
            .field("scope", &self.scope.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Construction-time view handed to a recipe
pub struct RecipeContext<'a> {
    declaration: &'a ServiceDeclaration,
    module: &'a ModuleContext,
    resolver: &'a dyn Resolver,
    path: &'a mut ResolutionPath,
}

impl<'a> RecipeContext<'a> {
    /// Name of the service being built
    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    /// Name of the owning module
    pub fn module(&self) -> &str {
        self.module.name()
    }

    /// Resolution scope of the owning module
    pub fn scope(&self) -> &Arc<ResolutionScope> {
        self.module.scope()
    }

    /// Literal property value
    pub fn property(&self, key: &str) -> Option<&toml::Value> {
        self.declaration.properties.get(key)
    }

    /// Literal string property
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(toml::Value::as_str)
    }

    /// All literal properties as a JSON object
    pub fn properties_json(&self) -> Result<Value, ComponentError> {
        serde_json::to_value(&self.declaration.properties).map_err(|e| {
            ComponentError::instantiation(self.name(), format!("bad properties: {}", e))
        })
    }

    /// Property names declared as references
    pub fn ref_names(&self) -> Vec<String> {
        self.declaration.refs.keys().cloned().collect()
    }

    /// Resolve the service a reference property points at
    pub fn reference(&mut self, property: &str) -> Result<ServiceRef, ComponentError> {
        let target = self.declaration.refs.get(property).cloned().ok_or_else(|| {
            ComponentError::instantiation(
                self.name(),
                format!("no reference property {}", property),
            )
        })?;
        self.lookup(&target)
    }

    /// Resolve any name: locally declared services directly, others through the root
    pub fn lookup(&mut self, name: &str) -> Result<ServiceRef, ComponentError> {
        if self.module.has_definition(name) {
            self.module.get_or_create(name, self.resolver, self.path)
        } else {
            self.resolver.resolve(name, self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::builtin::{self, CompositeService, VALUE_RECIPE};
    use crate::module::sandbox::Library;
    use crate::module::traits::same_service;
    use std::sync::atomic::AtomicUsize;

    struct NoRoot;

    impl Resolver for NoRoot {
        fn resolve(&self, name: &str, _path: &mut ResolutionPath) -> Result<ServiceRef, ComponentError> {
            Err(ComponentError::UnknownName(name.to_string()))
        }

        fn template(&self, _name: &str) -> Option<ServiceDeclaration> {
            None
        }
    }

    /// Counts its own destruction
    struct Tracked(Arc<AtomicUsize>);

    impl crate::module::traits::Service for Tracked {
        fn capabilities(&self) -> Vec<String> {
            Vec::new()
        }

        fn invoke(
            &self,
            _call: &mut crate::module::sandbox::CallContext,
            invocation: &crate::module::traits::Invocation,
        ) -> Result<Value, ComponentError> {
            Err(ComponentError::Invocation(invocation.to_string()))
        }

        fn destroy(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn context(services: Vec<ServiceDeclaration>, libs: Vec<Arc<Library>>) -> ModuleContext {
        let platform = ResolutionScope::platform(vec![Arc::new(builtin::library())]);
        ModuleContext::new(
            "alpha",
            ResolutionScope::child("alpha", libs, platform),
            DeclarationSource::Inline(Declarations::from_services(services)),
            Arc::new(PropertyMap::new()),
            Arc::new(EventManager::new()),
        )
    }

    #[test]
    fn test_define_is_idempotent() {
        let ctx = context(vec![ServiceDeclaration::new("A", VALUE_RECIPE)], Vec::new());
        assert_eq!(ctx.state(), ModuleState::Unstarted);

        ctx.define().unwrap();
        ctx.define().unwrap();

        assert_eq!(ctx.state(), ModuleState::Defined);
        assert_eq!(ctx.declarations().len(), 1);
        assert_eq!(ctx.stats().singletons, 0);
    }

    #[test]
    fn test_lookup_bare_activates() {
        let ctx = context(vec![ServiceDeclaration::new("A", VALUE_RECIPE)], Vec::new());
        ctx.define().unwrap();

        let a = ctx.get_local("A", &NoRoot, &mut ResolutionPath::new()).unwrap();
        let again = ctx.get_local("A", &NoRoot, &mut ResolutionPath::new()).unwrap();

        assert!(same_service(&a, &again));
        assert!(ctx.is_active());
        assert!(!ctx.is_refreshed());
        assert!(ctx.stats().bare_activated);
    }

    #[test]
    fn test_prototypes_are_fresh() {
        let ctx = context(
            vec![ServiceDeclaration::new("P", VALUE_RECIPE).prototype()],
            Vec::new(),
        );
        let one = ctx.get_local("P", &NoRoot, &mut ResolutionPath::new()).unwrap();
        let two = ctx.get_local("P", &NoRoot, &mut ResolutionPath::new()).unwrap();

        assert!(!same_service(&one, &two));
        assert_eq!(ctx.stats().singletons, 0);
    }

    #[test]
    fn test_instantiate_skips_lazy_and_runs_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let lib = Library::new("alpha").with_recipe("counted", move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            let service: ServiceRef =
                Arc::new(builtin::ValueService::new(serde_json::json!(ctx.name())));
            Ok(service)
        });
        let ctx = context(
            vec![
                ServiceDeclaration::new("A", "counted"),
                ServiceDeclaration::new("L", "counted").lazy(),
            ],
            vec![Arc::new(lib)],
        );

        ctx.define().unwrap();
        ctx.instantiate(&NoRoot).unwrap();
        ctx.instantiate(&NoRoot).unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(ctx.is_refreshed());
        ctx.get_local("L", &NoRoot, &mut ResolutionPath::new()).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_tears_down_and_sticks() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&destroyed);

        let lib = Library::new("alpha")
            .with_recipe("tracked", move |_ctx| {
                let service: ServiceRef = Arc::new(Tracked(Arc::clone(&seen)));
                Ok(service)
            })
            .with_recipe("broken", |_ctx| {
                Err(ComponentError::Invocation("boom".to_string()))
            });
        let ctx = context(
            vec![
                ServiceDeclaration::new("Good", "tracked"),
                ServiceDeclaration::new("Bad", "broken"),
            ],
            vec![Arc::new(lib)],
        );

        let err = ctx.instantiate(&NoRoot).unwrap_err();
        assert!(matches!(err, ComponentError::Instantiation { .. }));
        assert!(ctx.state().is_failed());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        let again = ctx
            .get_local("Good", &NoRoot, &mut ResolutionPath::new())
            .err().unwrap();
        assert!(matches!(again, ComponentError::Instantiation { .. }));
    }

    #[test]
    fn test_duplicate_construction_is_destroyed() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&destroyed);
        let gate = Arc::new(std::sync::Barrier::new(2));
        let lib = Library::new("alpha").with_recipe("gated", move |_ctx| {
            // both builders are past the existing-singleton check here
            gate.wait();
            let service: ServiceRef = Arc::new(Tracked(Arc::clone(&seen)));
            Ok(service)
        });
        let ctx = context(
            vec![ServiceDeclaration::new("A", "gated")],
            vec![Arc::new(lib)],
        );
        ctx.prepare(&NoRoot).unwrap();

        let (one, two) = std::thread::scope(|s| {
            let first = s.spawn(|| ctx.get_local("A", &NoRoot, &mut ResolutionPath::new()));
            let second = s.spawn(|| ctx.get_local("A", &NoRoot, &mut ResolutionPath::new()));
            (first.join().unwrap().unwrap(), second.join().unwrap().unwrap())
        });

        assert!(same_service(&one, &two));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.stats().singletons, 1);
    }

    #[test]
    fn test_current_module_is_top_of_chain() {
        let mut path = ResolutionPath::new();
        assert_eq!(path.current_module(), None);

        path.push("beta:beta.svc".to_string());
        path.push("alpha:alpha.svc".to_string());
        assert_eq!(path.current_module(), Some("alpha"));

        path.pop();
        assert_eq!(path.current_module(), Some("beta"));
    }

    #[test]
    fn test_unknown_name_does_not_fail_context() {
        let ctx = context(vec![ServiceDeclaration::new("A", VALUE_RECIPE)], Vec::new());
        let err = ctx
            .get_local("Missing", &NoRoot, &mut ResolutionPath::new())
            .err().unwrap();

        assert!(err.is_absent());
        assert!(ctx.is_active());
    }

    #[test]
    fn test_local_references_resolve_concretely() {
        let ctx = context(
            vec![
                ServiceDeclaration::new("A", VALUE_RECIPE),
                ServiceDeclaration::new("B", builtin::COMPOSITE_RECIPE).with_ref("a", "A"),
            ],
            Vec::new(),
        );
        ctx.instantiate(&NoRoot).unwrap();

        let a = ctx.get_local("A", &NoRoot, &mut ResolutionPath::new()).unwrap();
        let b = ctx.get_local("B", &NoRoot, &mut ResolutionPath::new()).unwrap();
        let composite = b.as_any().downcast_ref::<CompositeService>().unwrap();
        assert!(same_service(composite.reference("a").unwrap(), &a));
    }

    #[test]
    fn test_local_cycle_is_instantiation_error() {
        let ctx = context(
            vec![
                ServiceDeclaration::new("X", builtin::COMPOSITE_RECIPE).with_ref("y", "Y"),
                ServiceDeclaration::new("Y", builtin::COMPOSITE_RECIPE).with_ref("x", "X"),
            ],
            Vec::new(),
        );

        let err = ctx.instantiate(&NoRoot).unwrap_err();
        assert!(err.to_string().contains("circular reference"));
        assert!(ctx.state().is_failed());
    }

    #[test]
    fn test_template_inheritance() {
        let base = ServiceDeclaration {
            recipe: Some(VALUE_RECIPE.to_string()),
            ..ServiceDeclaration::template("Base")
        }
        .with_property("greeting", "hello")
        .with_property("target", "world");
        let child = ServiceDeclaration {
            recipe: None,
            ..ServiceDeclaration::new("Child", "")
        }
        .with_parent("Base")
        .with_property("target", "campus");
        let ctx = context(vec![base, child], Vec::new());

        let built = ctx
            .get_local("Child", &NoRoot, &mut ResolutionPath::new())
            .unwrap();
        let value = built
            .as_any()
            .downcast_ref::<builtin::ValueService>()
            .unwrap()
            .value()
            .clone();
        assert_eq!(value["greeting"], "hello");
        assert_eq!(value["target"], "campus");

        let err = ctx
            .get_local("Base", &NoRoot, &mut ResolutionPath::new())
            .err().unwrap();
        assert!(matches!(err, ComponentError::TemplateNotInstantiable(_)));
    }

    #[test]
    fn test_unknown_parent_fails_activation() {
        let ctx = context(
            vec![ServiceDeclaration::new("Child", VALUE_RECIPE).with_parent("Nowhere")],
            Vec::new(),
        );
        ctx.define().unwrap();

        let err = ctx.instantiate(&NoRoot).unwrap_err();
        assert!(matches!(err, ComponentError::Definition(_)));
        assert!(ctx.state().is_failed());
    }
}
