//! Module loading system
//!
//! Handles turning discovered module directories into registered contexts.

pub mod loader;

pub use loader::{ComponentsLoader, LoadReport};
