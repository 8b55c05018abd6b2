//! Service declarations parsing
//!
//! Handles parsing `components.toml` declaration files and applying the
//! platform's property overrides and placeholders to them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use crate::module::traits::{CapabilityId, ComponentError};

/// Flat property map consumed by the container (`property@service` overrides
/// and `${key}` placeholder values)
pub type PropertyMap = HashMap<String, String>;

fn default_true() -> bool {
    true
}

/// One declared service (`[[service]]` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDeclaration {
    /// Service name (the exported name, unless this is a template or prototype)
    pub name: String,
    /// Recipe id resolved through the module's scope
    #[serde(default)]
    pub recipe: Option<String>,
    /// Abstract declaration: merged upward, never built
    #[serde(default)]
    pub template: bool,
    /// Singleton (exported) or local prototype
    #[serde(default = "default_true")]
    pub singleton: bool,
    /// Skip pre-instantiation during refresh
    #[serde(default)]
    pub lazy: bool,
    /// Template to inherit from
    #[serde(default)]
    pub parent: Option<String>,
    /// Capabilities the service is known to provide before it is built
    #[serde(default)]
    pub provides: Vec<CapabilityId>,
    /// Literal property values
    #[serde(default)]
    pub properties: BTreeMap<String, toml::Value>,
    /// Property name -> referenced service name, resolved on demand
    #[serde(default)]
    pub refs: BTreeMap<String, String>,
}

impl ServiceDeclaration {
    /// Create a singleton declaration built by `recipe`
    pub fn new(name: impl Into<String>, recipe: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recipe: Some(recipe.into()),
            template: false,
            singleton: true,
            lazy: false,
            parent: None,
            provides: Vec::new(),
            properties: BTreeMap::new(),
            refs: BTreeMap::new(),
        }
    }

    /// Create a template declaration
    pub fn template(name: impl Into<String>) -> Self {
        Self {
            recipe: None,
            template: true,
            ..Self::new(name, "")
        }
    }

    /// Set a literal property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Add a reference to another service
    pub fn with_ref(mut self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.refs.insert(key.into(), target.into());
        self
    }

    /// Declare a capability known before construction
    pub fn providing(mut self, capability: impl Into<CapabilityId>) -> Self {
        self.provides.push(capability.into());
        self
    }

    /// Inherit from a template
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Mark as lazy
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Mark as a local prototype
    pub fn prototype(mut self) -> Self {
        self.singleton = false;
        self
    }

    /// Whether this declaration yields an exported singleton
    pub fn is_exportable(&self) -> bool {
        !self.template && self.singleton
    }

    /// Fill unset fields from a parent template; own values win
    pub fn merge_parent(&mut self, parent: &ServiceDeclaration) {
        if self.recipe.is_none() {
            self.recipe = parent.recipe.clone();
        }
        for (key, value) in &parent.properties {
            self.properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, target) in &parent.refs {
            self.refs.entry(key.clone()).or_insert_with(|| target.clone());
        }
        for capability in &parent.provides {
            if !self.provides.contains(capability) {
                self.provides.push(capability.clone());
            }
        }
        self.parent = parent.parent.clone();
    }
}

/// Parsed declarations of one module (`components.toml` structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Declarations {
    /// Declared services, in file order
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceDeclaration>,
}

impl Declarations {
    /// Load declarations from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ComponentError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ComponentError::Definition(format!(
                "Failed to read declarations file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        Self::parse(&contents).map_err(|e| match e {
            ComponentError::Definition(msg) => {
                ComponentError::Definition(format!("{:?}: {}", path.as_ref(), msg))
            }
            other => other,
        })
    }

    /// Parse declarations from TOML text
    pub fn parse(contents: &str) -> Result<Self, ComponentError> {
        toml::from_str(contents).map_err(|e| {
            ComponentError::Definition(format!("Failed to parse declarations TOML: {}", e))
        })
    }

    /// Create declarations from a list
    pub fn from_services(services: Vec<ServiceDeclaration>) -> Self {
        Self { services }
    }

    /// Append another file's declarations
    pub fn extend(&mut self, other: Declarations) {
        self.services.extend(other.services);
    }

    /// Find a declaration by name
    pub fn get(&self, name: &str) -> Option<&ServiceDeclaration> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Apply `property@service` overrides
    ///
    /// Keys without `@`, and keys naming services not declared here, are
    /// ignored. Returns the number of overrides applied.
    pub fn apply_overrides(&mut self, properties: &PropertyMap) -> usize {
        let mut applied = 0;
        for (key, value) in properties {
            let Some((property, service)) = key.split_once('@') else {
                continue;
            };
            let Some(decl) = self.services.iter_mut().find(|s| s.name == service) else {
                continue;
            };

            decl.properties
                .insert(property.to_string(), toml::Value::String(value.clone()));
            applied += 1;

            if key.contains("password") {
                debug!("Property '{}' set to [***]", key);
            } else {
                debug!("Property '{}' set to [{}]", key, value);
            }
        }
        applied
    }

    /// Substitute `${key}` placeholders in string properties
    pub fn resolve_placeholders(&mut self, properties: &PropertyMap) -> Result<(), ComponentError> {
        for decl in &mut self.services {
            for (key, value) in decl.properties.iter_mut() {
                substitute_value(value, properties).map_err(|missing| {
                    ComponentError::Definition(format!(
                        "Unresolved placeholder ${{{}}} in property {} of {}",
                        missing, key, decl.name
                    ))
                })?;
            }
        }
        Ok(())
    }
}

fn substitute_value(value: &mut toml::Value, properties: &PropertyMap) -> Result<(), String> {
    match value {
        toml::Value::String(s) => {
            if s.contains("${") {
                *s = substitute(s, properties)?;
            }
            Ok(())
        }
        toml::Value::Array(items) => items
            .iter_mut()
            .try_for_each(|item| substitute_value(item, properties)),
        toml::Value::Table(table) => table
            .iter_mut()
            .try_for_each(|(_, item)| substitute_value(item, properties)),
        _ => Ok(()),
    }
}

fn substitute(input: &str, properties: &PropertyMap) -> Result<String, String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // unterminated: keep verbatim
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let key = &after[..end];
        let replacement = properties.get(key).ok_or_else(|| key.to_string())?;
        out.push_str(replacement);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
