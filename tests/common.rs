//! Test utilities for component container tests
//!
//! Provides a components root in a temporary directory, helpers for laying
//! out module directories, and a catalog with a few test recipes.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use component_manager::module::registry::discovery::{
    CLASSES_DIR, DECLARATIONS_FILE, DEMO_DECLARATIONS_FILE, LIB_DIR, MODULE_INF,
};
use component_manager::{
    CallContext, ComponentError, ComponentManager, ContainerConfig, Invocation, Library,
    LibraryCatalog, Service, ServiceRef,
};
use component_manager::module::RecipeContext;

/// Recipe of the scope tracer (platform library)
pub const TRACER_RECIPE: &str = "test.tracer";
/// Capability served by tracers, visible from the platform scope
pub const TRACER_CAPABILITY: &str = "test.Tracer";
/// Recipe that always fails
pub const FAILING_RECIPE: &str = "test.failing";
/// Recipe of the widget in the `gadgets` archive library
pub const WIDGET_RECIPE: &str = "gadgets.widget";
/// Capability declared only by the `gadgets` library
pub const WIDGET_CAPABILITY: &str = "gadgets.Widget";
/// Recipe provided by the `gamma` module's own code
pub const GAMMA_RECIPE: &str = "gamma.counter";

/// Records the active scope, optionally forwarding to the service it references
pub struct TracerService {
    name: String,
    next: Option<ServiceRef>,
    refreshed: Mutex<Vec<String>>,
    counter: Arc<BuildCounter>,
}

impl TracerService {
    pub fn refreshed_by(&self) -> Vec<String> {
        self.refreshed.lock().unwrap().clone()
    }
}

impl Service for TracerService {
    fn capabilities(&self) -> Vec<String> {
        vec![TRACER_CAPABILITY.to_string()]
    }

    fn invoke(&self, call: &mut CallContext, invocation: &Invocation) -> Result<Value, ComponentError> {
        match invocation.method.as_str() {
            "scope" => Ok(json!(call.scope_id().as_str())),
            "name" => Ok(json!(self.name)),
            "trace" => {
                let mut trace = vec![json!(call.scope_id().as_str())];
                if let Some(next) = &self.next {
                    let inner = next.invoke(call, invocation)?;
                    trace.extend(inner.as_array().cloned().unwrap_or_default());
                }
                trace.push(json!(call.scope_id().as_str()));
                Ok(Value::Array(trace))
            }
            other => Err(ComponentError::UnknownMethod {
                capability: invocation.capability.clone(),
                method: other.to_string(),
            }),
        }
    }

    fn context_refreshed(&self, module: &str) {
        self.refreshed.lock().unwrap().push(module.to_string());
    }

    fn destroy(&self) {
        self.counter.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Plain service whose capability the platform cannot see
pub struct WidgetService {
    pub label: String,
}

impl Service for WidgetService {
    fn capabilities(&self) -> Vec<String> {
        vec![WIDGET_CAPABILITY.to_string()]
    }

    fn invoke(&self, _call: &mut CallContext, _invocation: &Invocation) -> Result<Value, ComponentError> {
        Ok(json!(self.label))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Counts constructions per recipe
#[derive(Debug, Default)]
pub struct BuildCounter {
    tracers: AtomicUsize,
    widgets: AtomicUsize,
    destroyed: AtomicUsize,
}

impl BuildCounter {
    pub fn tracers(&self) -> usize {
        self.tracers.load(Ordering::SeqCst)
    }

    pub fn widgets(&self) -> usize {
        self.widgets.load(Ordering::SeqCst)
    }

    /// Tracers destroyed by teardown or discarded as duplicates
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

fn build_tracer(
    ctx: &mut RecipeContext<'_>,
    counter: Arc<BuildCounter>,
) -> Result<ServiceRef, ComponentError> {
    let next = if ctx.ref_names().iter().any(|r| r == "next") {
        Some(ctx.reference("next")?)
    } else {
        None
    };
    let service: ServiceRef = Arc::new(TracerService {
        name: ctx.name().to_string(),
        next,
        refreshed: Mutex::new(Vec::new()),
        counter,
    });
    Ok(service)
}

/// Catalog with the tracer library on the platform and two named libraries
pub fn test_catalog(counter: &Arc<BuildCounter>) -> LibraryCatalog {
    let tracers = Arc::clone(counter);
    let widgets = Arc::clone(counter);

    let mut catalog = LibraryCatalog::new();
    catalog.add_platform_library(
        Library::new("tracer")
            .with_recipe(TRACER_RECIPE, move |ctx| {
                tracers.tracers.fetch_add(1, Ordering::SeqCst);
                build_tracer(ctx, Arc::clone(&tracers))
            })
            .with_recipe(FAILING_RECIPE, |ctx| {
                Err(ComponentError::Invocation(format!("{} refuses to start", ctx.name())))
            })
            .declare_capability(TRACER_CAPABILITY),
    );
    catalog.register(
        Library::new("gadgets")
            .with_recipe(WIDGET_RECIPE, move |ctx| {
                widgets.widgets.fetch_add(1, Ordering::SeqCst);
                let service: ServiceRef = Arc::new(WidgetService {
                    label: ctx.property_str("label").unwrap_or("widget").to_string(),
                });
                Ok(service)
            })
            .declare_capability(WIDGET_CAPABILITY),
    );
    catalog.register(Library::new("gamma").with_recipe(GAMMA_RECIPE, |ctx| {
        let service: ServiceRef = Arc::new(WidgetService {
            label: format!("counter in {}", ctx.module()),
        });
        Ok(service)
    }));
    catalog
}

/// Test fixture for a components root
pub struct ComponentsFixture {
    /// Temporary directory holding everything
    pub temp_dir: TempDir,
    /// Components root
    pub root: PathBuf,
    /// Construction counters shared with the catalog
    pub counter: Arc<BuildCounter>,
}

impl ComponentsFixture {
    /// Create an empty components root
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("components");
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            temp_dir,
            root,
            counter: Arc::new(BuildCounter::default()),
        })
    }

    /// Directory of a module's metadata
    pub fn module_inf(&self, module: &str) -> PathBuf {
        self.root.join(module).join(MODULE_INF)
    }

    /// Write `MODULE-INF/components.toml` for a module
    pub fn write_module(&self, module: &str, declarations: &str) -> Result<PathBuf, std::io::Error> {
        let inf = self.module_inf(module);
        std::fs::create_dir_all(&inf)?;
        std::fs::write(inf.join(DECLARATIONS_FILE), declarations)?;
        Ok(self.root.join(module))
    }

    /// Write `MODULE-INF/components-demo.toml` for a module
    pub fn write_demo(&self, module: &str, declarations: &str) -> Result<(), std::io::Error> {
        let inf = self.module_inf(module);
        std::fs::create_dir_all(&inf)?;
        std::fs::write(inf.join(DEMO_DECLARATIONS_FILE), declarations)
    }

    /// Give a module its own code directory
    pub fn add_classes(&self, module: &str) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(self.module_inf(module).join(CLASSES_DIR))
    }

    /// Bundle an archive named after a catalog library
    pub fn add_archive(&self, module: &str, library: &str) -> Result<(), std::io::Error> {
        let lib = self.module_inf(module).join(LIB_DIR);
        std::fs::create_dir_all(&lib)?;
        std::fs::write(lib.join(format!("{}.lib", library)), b"")
    }

    /// Configuration pointing at this root
    pub fn config(&self) -> ContainerConfig {
        ContainerConfig {
            components_root: self.root.clone(),
            ..ContainerConfig::default()
        }
    }

    /// Manager over this root with the test catalog
    pub fn manager(&self) -> ComponentManager {
        self.manager_with(self.config())
    }

    /// Manager with a custom configuration and the test catalog
    pub fn manager_with(&self, config: ContainerConfig) -> ComponentManager {
        ComponentManager::builder()
            .config(config)
            .catalog(test_catalog(&self.counter))
            .build()
            .unwrap()
    }

    /// Manager that has loaded and refreshed this root
    pub fn started(&self) -> ComponentManager {
        let manager = self.manager();
        manager.load_components().unwrap();
        manager.refresh().unwrap();
        manager
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Invoke `method` on a tracer from the platform scope
pub fn call_tracer(manager: &ComponentManager, name: &str, method: &str) -> Result<Value, ComponentError> {
    manager.invoke(name, &Invocation::new(TRACER_CAPABILITY, method, Value::Null))
}
