//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Ensure config directory → Connect runtime → Start tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop renderer → Stop load balancer → Cancel the rest → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown sequence
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then runtime, then supervisors
//! - Ordered shutdown: renderer, load balancer, background tasks
//! - Container stops during shutdown are bounded by a grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownOrchestrator};
