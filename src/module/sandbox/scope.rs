//! Isolated resolution scopes
//!
//! Each module resolves recipes through its own scope: its own code first,
//! then its bundled archives in order, then the shared platform scope. The
//! capabilities a scope can see are computed once, when the scope is built.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::module::sandbox::library::{Library, RecipeFn};
use crate::module::traits::CapabilityId;

/// Scope id used for the shared platform scope
pub const PLATFORM_SCOPE: &str = "platform";

/// Identifier of a resolution scope (the module name, or `platform`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(String);

impl ScopeId {
    /// Create a scope id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered chain of libraries with an optional parent
pub struct ResolutionScope {
    id: ScopeId,
    libraries: Vec<Arc<Library>>,
    parent: Option<Arc<ResolutionScope>>,
    visible: HashSet<CapabilityId>,
}

impl ResolutionScope {
    /// Build the root platform scope
    pub fn platform(libraries: Vec<Arc<Library>>) -> Arc<Self> {
        Self::build(ScopeId::new(PLATFORM_SCOPE), libraries, None)
    }

    /// Build a module scope whose lookups fall back to `parent`
    pub fn child(
        id: impl Into<String>,
        libraries: Vec<Arc<Library>>,
        parent: Arc<ResolutionScope>,
    ) -> Arc<Self> {
        Self::build(ScopeId::new(id), libraries, Some(parent))
    }

    fn build(
        id: ScopeId,
        libraries: Vec<Arc<Library>>,
        parent: Option<Arc<ResolutionScope>>,
    ) -> Arc<Self> {
        let mut visible: HashSet<CapabilityId> = libraries
            .iter()
            .flat_map(|lib| lib.declared().cloned())
            .collect();
        if let Some(parent) = &parent {
            visible.extend(parent.visible.iter().cloned());
        }

        Arc::new(Self {
            id,
            libraries,
            parent,
            visible,
        })
    }

    /// Scope id
    pub fn id(&self) -> &ScopeId {
        &self.id
    }

    /// Parent scope, if any
    pub fn parent(&self) -> Option<&Arc<ResolutionScope>> {
        self.parent.as_ref()
    }

    /// Find a recipe: own libraries in order, then the parent chain
    pub fn find_recipe(&self, recipe: &str) -> Option<Arc<RecipeFn>> {
        self.libraries
            .iter()
            .find_map(|lib| lib.recipe(recipe))
            .or_else(|| self.parent.as_ref().and_then(|p| p.find_recipe(recipe)))
    }

    /// Whether a capability is visible from this scope
    pub fn can_see(&self, capability: &str) -> bool {
        self.visible.contains(capability)
    }

    /// All capabilities visible from this scope
    pub fn visible_capabilities(&self) -> &HashSet<CapabilityId> {
        &self.visible
    }

    /// Names of the scope's own libraries, in search order
    pub fn library_names(&self) -> Vec<&str> {
        self.libraries.iter().map(|lib| lib.name()).collect()
    }
}

impl fmt::Debug for ResolutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionScope")
            .field("id", &self.id)
            .field("libraries", &self.library_names())
            .field("parent", &self.parent.as_ref().map(|p| p.id().clone()))
            .finish()
    }
}
