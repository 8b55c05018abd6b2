//! Component Manager - runtime module container
//!
//! Discovers independently packaged modules on disk, loads each into its own
//! resolution scope, and makes a selected subset of each module's services
//! available by stable name to every other module and to the host.
//!
//! ## Design Principles
//!
//! 1. **Explicit handles**: the [`ComponentManager`] is passed to whoever needs
//!    lookups; [`cover`] is the single process-wide shim
//! 2. **Two-phase lifecycle**: every module is defined before any singleton is
//!    built, and a lookup may bare-activate a module out of order
//! 3. **Dispatch-table proxies**: cross-module calls go through
//!    [`ServiceProxy`] with an explicit [`CallContext`]

pub mod config;
pub mod cover;
pub mod module;
pub mod utils;

pub use config::{ContainerConfig, LoggingConfig, ShutdownPolicy};
pub use module::{
    CallContext, ComponentError, ComponentManager, ComponentManagerBuilder, Declarations,
    Invocation, LifecycleEvent, Library, LibraryCatalog, ModuleState, Service,
    ServiceDeclaration, ServiceProxy, ServiceRef,
};
