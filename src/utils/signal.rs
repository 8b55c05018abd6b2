//! Termination signals
//!
//! Hosts running under the close-on-exit policy wait here and then close the
//! manager; see `ComponentManager::close_on_signal`.

use std::fmt;
use tokio::signal;
use tracing::{info, warn};

/// Signal that ended the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM
    Terminate,
    /// SIGINT or Ctrl+C
    Interrupt,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
        }
    }
}

/// Wait for the first termination signal
///
/// Never resolves if no handler can be installed.
pub async fn wait_for_shutdown_signal() -> ShutdownSignal {
    #[cfg(unix)]
    let received = {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate())
            .and_then(|term| Ok((term, signal(SignalKind::interrupt())?)))
        {
            Ok((mut term, mut interrupt)) => tokio::select! {
                _ = term.recv() => ShutdownSignal::Terminate,
                _ = interrupt.recv() => ShutdownSignal::Interrupt,
            },
            Err(e) => {
                warn!("Failed to register signal handlers, using Ctrl+C only: {}", e);
                ctrl_c().await
            }
        }
    };

    #[cfg(not(unix))]
    let received = ctrl_c().await;

    info!("Received {}", received);
    received
}

async fn ctrl_c() -> ShutdownSignal {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    ShutdownSignal::Interrupt
}
