//! Process-wide component manager handle
//!
//! Compatibility entry point for code that cannot be handed a
//! [`ComponentManager`] explicitly. Everything else should take the manager as
//! a parameter.

use std::sync::OnceLock;
use tracing::info;

use crate::module::{ComponentError, ComponentManager, ServiceRef};

static COVER: OnceLock<ComponentManager> = OnceLock::new();

/// Install the process-wide manager; only the first install succeeds
pub fn install(manager: ComponentManager) -> Result<(), ComponentError> {
    COVER.set(manager).map_err(|_| {
        ComponentError::Unsupported("a component manager is already installed".to_string())
    })?;
    info!("Process-wide component manager installed");
    Ok(())
}

/// The installed manager
pub fn instance() -> Result<ComponentManager, ComponentError> {
    COVER
        .get()
        .cloned()
        .ok_or_else(|| ComponentError::NotAvailable("no component manager installed".to_string()))
}

/// Look up a service through the installed manager
pub fn get(name: &str) -> Result<ServiceRef, ComponentError> {
    instance()?.get(name)
}

/// Whether the installed manager knows a name; false before install
pub fn contains(name: &str) -> bool {
    COVER.get().is_some_and(|m| m.contains(name))
}

/// Close the installed manager
pub fn close() -> Result<(), ComponentError> {
    instance()?.close();
    Ok(())
}

/// Whether the installed manager has been closed; false before install
pub fn has_been_closed() -> bool {
    COVER.get().is_some_and(|m| m.has_been_closed())
}
