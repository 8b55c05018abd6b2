//! Module validation framework
//!
//! Provides structural validation of service declarations.

pub mod declaration_validator;

pub use declaration_validator::{DeclarationValidator, ValidationResult};
