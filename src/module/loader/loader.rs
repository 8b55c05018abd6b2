//! Components loader
//!
//! Turns discovered module directories into registered module contexts: builds
//! each module's resolution scope from the catalog, defines the context, and
//! records ownership of its exported names.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::module::context::DeclarationSource;
use crate::module::manager::ComponentManager;
use crate::module::registry::discovery::{DiscoveredModule, ModuleDiscovery};
use crate::module::sandbox::Library;
use crate::module::traits::ComponentError;

/// Outcome of one load pass
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Modules registered, in load order
    pub loaded: Vec<String>,
    /// Modules skipped, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Loads modules found under the configured components root
pub struct ComponentsLoader<'a> {
    manager: &'a ComponentManager,
}

impl<'a> ComponentsLoader<'a> {
    pub fn new(manager: &'a ComponentManager) -> Self {
        Self { manager }
    }

    /// Discover and register every module under the configured root
    pub fn load_all(&self) -> Result<LoadReport, ComponentError> {
        let config = self.manager.config();
        let discovery = ModuleDiscovery::new(&config.components_root)
            .reverse_order(config.reverse_load_order)
            .with_demo(config.demo);
        let discovered = discovery.discover_modules()?;
        Ok(self.load_discovered(&discovered))
    }

    /// Register already-discovered modules in the given order
    ///
    /// A module whose declarations fail to define is skipped; the pass goes on.
    pub fn load_discovered(&self, discovered: &[DiscoveredModule]) -> LoadReport {
        let mut report = LoadReport::default();

        for module in discovered {
            match self.load_discovered_module(module) {
                Ok(()) => report.loaded.push(module.name.clone()),
                Err(e) => {
                    warn!("Skipping module {}: {}", module.name, e);
                    report.skipped.push((module.name.clone(), e.to_string()));
                }
            }
        }

        info!(
            "Loaded {} modules ({} skipped)",
            report.loaded.len(),
            report.skipped.len()
        );
        report
    }

    /// Load a discovered module
    pub fn load_discovered_module(&self, module: &DiscoveredModule) -> Result<(), ComponentError> {
        info!("Loading module: {}", module.name);

        let libraries = self.module_libraries(module);
        debug!(
            "Module {} scope: {:?}",
            module.name,
            libraries.iter().map(|l| l.name()).collect::<Vec<_>>()
        );

        self.manager.register_context(
            &module.name,
            DeclarationSource::Files(module.declaration_files.clone()),
            libraries,
            Some(module.directory.clone()),
        )?;
        Ok(())
    }

    /// Own code first, then bundled archives in file-name order
    fn module_libraries(&self, module: &DiscoveredModule) -> Vec<Arc<Library>> {
        let catalog = self.manager.catalog();
        let mut libraries = Vec::new();

        if module.classes_dir.is_some() {
            match catalog.get(&module.name) {
                Some(own) => libraries.push(own),
                None => warn!(
                    "Module {} has a classes directory but no library named {} is registered",
                    module.name, module.name
                ),
            }
        }

        for archive in module.archive_names() {
            match catalog.get(&archive) {
                Some(library) => libraries.push(library),
                None => warn!(
                    "Archive {}.lib of module {} names no registered library, skipped",
                    archive, module.name
                ),
            }
        }

        libraries
    }
}
