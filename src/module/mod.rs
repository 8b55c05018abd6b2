//! Module container
//!
//! Loads independently packaged modules into isolated resolution scopes and
//! exposes their exported services, by name, to every other module and to the
//! host.
//!
//! ## Architecture
//!
//! - **Discovery**: module directories under a components root, in a
//!   deterministic (optionally reversed) order
//! - **Contexts**: one service container per module with a two-phase
//!   define/instantiate lifecycle and on-demand bare activation
//! - **Registry**: module name → record, exported name → owning module
//! - **Proxies**: capability-bounded dispatch tables that run calls inside the
//!   owning module's scope
//! - **Root**: the name-keyed cache the platform queries

pub mod api;
pub mod builtin;
pub mod context;
pub mod loader;
pub mod manager;
pub mod proxy;
pub mod refresh;
pub mod registry;
pub mod sandbox;
pub mod traits;
pub mod validation;

pub use api::{EventManager, LifecycleEvent};
pub use context::{ModuleContext, RecipeContext, ResolutionPath, Resolver};
pub use loader::{ComponentsLoader, LoadReport};
pub use manager::{ComponentManager, ComponentManagerBuilder, DependentGuard, LoadStats};
pub use proxy::{Locator, ServiceHandle, ServiceProxy};
pub use refresh::{RefreshReport, StagedRefresh};
pub use registry::{Declarations, ModuleRecord, ModuleRegistry, Owner, ServiceDeclaration};
pub use sandbox::{CallContext, Library, LibraryCatalog, ResolutionScope};
pub use traits::{ComponentError, Invocation, ModuleState, Service, ServiceRef};
