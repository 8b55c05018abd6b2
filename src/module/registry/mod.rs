//! Module registry and discovery
//!
//! Handles module discovery, declaration parsing, and the name → owner
//! directory.

pub mod declarations;
pub mod discovery;
pub mod records;

pub use declarations::{Declarations, PropertyMap, ServiceDeclaration};
pub use discovery::{DiscoveredModule, ModuleDiscovery};
pub use records::{ModuleRecord, ModuleRegistry, Owner};
