//! Lazy locator and proxy factory

pub mod locator;
pub mod proxy;

pub use locator::{Locator, ServiceHandle};
pub use proxy::ServiceProxy;
