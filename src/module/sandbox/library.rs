//! Recipe libraries
//!
//! A library is the unit of code a module scope can see: a named set of
//! construction recipes plus the capability identifiers the library declares.
//! The host registers libraries in a [`LibraryCatalog`]; module directories
//! refer to them by name.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::module::builtin;
use crate::module::context::RecipeContext;
use crate::module::traits::{CapabilityId, ComponentError, ServiceRef};

/// Construction recipe: builds one service instance from its declaration
pub type RecipeFn =
    dyn Fn(&mut RecipeContext<'_>) -> Result<ServiceRef, ComponentError> + Send + Sync;

/// Named set of recipes and declared capabilities
pub struct Library {
    name: String,
    recipes: HashMap<String, Arc<RecipeFn>>,
    declared: HashSet<CapabilityId>,
}

impl Library {
    /// Create an empty library
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recipes: HashMap::new(),
            declared: HashSet::new(),
        }
    }

    /// Add a recipe
    pub fn with_recipe<F>(mut self, id: impl Into<String>, recipe: F) -> Self
    where
        F: Fn(&mut RecipeContext<'_>) -> Result<ServiceRef, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        let id = id.into();
        if self.recipes.insert(id.clone(), Arc::new(recipe)).is_some() {
            warn!("Recipe {} redefined in library {}", id, self.name);
        }
        self
    }

    /// Declare a capability as part of this library's public surface
    pub fn declare_capability(mut self, capability: impl Into<CapabilityId>) -> Self {
        self.declared.insert(capability.into());
        self
    }

    /// Library name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a recipe
    pub fn recipe(&self, id: &str) -> Option<Arc<RecipeFn>> {
        self.recipes.get(id).cloned()
    }

    /// Whether this library declares a capability
    pub fn declares(&self, capability: &str) -> bool {
        self.declared.contains(capability)
    }

    /// Declared capabilities
    pub fn declared(&self) -> impl Iterator<Item = &CapabilityId> {
        self.declared.iter()
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut recipes: Vec<&String> = self.recipes.keys().collect();
        recipes.sort();
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("recipes", &recipes)
            .field("declared", &self.declared)
            .finish()
    }
}

/// All libraries the host makes available to modules
///
/// The platform libraries form the parent scope of every module; the named
/// libraries are only visible to modules that reference them.
#[derive(Debug, Clone)]
pub struct LibraryCatalog {
    platform: Vec<Arc<Library>>,
    libraries: BTreeMap<String, Arc<Library>>,
}

impl LibraryCatalog {
    /// Create a catalog whose platform scope holds only the built-in recipes
    pub fn new() -> Self {
        Self {
            platform: vec![Arc::new(builtin::library())],
            libraries: BTreeMap::new(),
        }
    }

    /// Add a library to the shared platform scope (searched before built-ins)
    pub fn add_platform_library(&mut self, library: Library) -> &mut Self {
        debug!("Adding platform library {}", library.name());
        self.platform.insert(self.platform.len() - 1, Arc::new(library));
        self
    }

    /// Register a named library that module directories can reference
    pub fn register(&mut self, library: Library) -> &mut Self {
        let name = library.name().to_string();
        if self.libraries.insert(name.clone(), Arc::new(library)).is_some() {
            warn!("Library {} replaced in catalog", name);
        }
        self
    }

    /// Look up a named library
    pub fn get(&self, name: &str) -> Option<Arc<Library>> {
        self.libraries.get(name).cloned()
    }

    /// Platform libraries in search order
    pub fn platform(&self) -> &[Arc<Library>] {
        &self.platform
    }

    /// Names of the registered (non-platform) libraries
    pub fn library_names(&self) -> Vec<String> {
        self.libraries.keys().cloned().collect()
    }
}

impl Default for LibraryCatalog {
    fn default() -> Self {
        Self::new()
    }
}
