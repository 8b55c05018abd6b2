//! Platform-facing API surface
//!
//! Provides lifecycle event subscriptions.

pub mod events;

pub use events::{EventManager, LifecycleEvent};
