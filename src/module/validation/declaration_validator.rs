//! Declaration validation
//!
//! Validates a module's service declarations for structure before the module
//! is registered.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::module::registry::declarations::Declarations;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Declarations are valid
    Valid,
    /// Declarations are invalid with specific errors
    Invalid(Vec<String>),
}

/// Declaration validator
pub struct DeclarationValidator {
    /// Maximum service name length
    max_name_length: usize,
}

impl DeclarationValidator {
    /// Create a new declaration validator
    pub fn new() -> Self {
        Self {
            max_name_length: 256,
        }
    }

    /// Validate a module's declarations
    pub fn validate(&self, declarations: &Declarations) -> ValidationResult {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for decl in &declarations.services {
            if decl.name.is_empty() {
                errors.push("Service name cannot be empty".to_string());
                continue;
            }

            if !self.is_valid_name(&decl.name) {
                errors.push(format!(
                    "Invalid service name: {} (allowed: letters, digits, . _ : $ / -)",
                    decl.name
                ));
            }

            if !seen.insert(decl.name.as_str()) {
                errors.push(format!("Duplicate service name: {}", decl.name));
            }

            let has_recipe = decl.recipe.as_deref().is_some_and(|r| !r.is_empty());
            if !decl.template && !has_recipe && decl.parent.is_none() {
                errors.push(format!(
                    "Service {} needs a recipe or a parent template",
                    decl.name
                ));
            }

            if decl.parent.as_deref() == Some(decl.name.as_str()) {
                errors.push(format!("Service {} cannot be its own parent", decl.name));
            }

            for (property, target) in &decl.refs {
                if target.is_empty() {
                    errors.push(format!(
                        "Reference {} of {} names no service",
                        property, decl.name
                    ));
                }
            }
        }

        if errors.is_empty() {
            debug!(
                "Declaration validation passed for {} services",
                declarations.services.len()
            );
            ValidationResult::Valid
        } else {
            warn!("Declaration validation failed: {:?}", errors);
            ValidationResult::Invalid(errors)
        }
    }

    #[inline]
    fn is_valid_name(&self, name: &str) -> bool {
        if name.len() > self.max_name_length {
            return false;
        }

        name.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '$' | '/' | '-'))
    }
}

impl Default for DeclarationValidator {
    fn default() -> Self {
        Self::new()
    }
}
