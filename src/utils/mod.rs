//! Utility modules shared by the library and the helper binary

pub mod env;
pub mod error;
pub mod logging;
pub mod signal;

pub use env::{env_flag, env_opt};
pub use error::log_error;
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use logging::{init_logging, init_logging_from_config};
pub use signal::{wait_for_shutdown_signal, ShutdownSignal};
