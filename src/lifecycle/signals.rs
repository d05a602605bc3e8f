//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate every termination signal into the shutdown sequence
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Repeated signals re-enter the orchestrator, which ignores them

use std::sync::Arc;

use crate::lifecycle::shutdown::ShutdownOrchestrator;

/// Termination signals this process reacts to.
pub struct TerminationSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    pub fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                terminate: signal(SignalKind::terminate())?,
                interrupt: signal(SignalKind::interrupt())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next termination signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.terminate.recv() => "SIGTERM",
                _ = self.interrupt.recv() => "SIGINT",
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            "ctrl-c"
        }
    }
}

/// Start the shutdown sequence on every termination signal.
///
/// Runs until the process exits.
pub async fn handle_signals(
    mut signals: TerminationSignals,
    orchestrator: Arc<ShutdownOrchestrator>,
) {
    loop {
        let name = signals.recv().await;
        tracing::info!(signal = name, "Received termination signal");

        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.shutdown().await;
        });
    }
}
