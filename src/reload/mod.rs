//! Reload subsystem.
//!
//! # Data Flow
//! ```text
//! detector ──ReloadSender──▶ queue ──▶ ReloadCoordinator::run ─┐
//!                                                              ├─▶ list_running → signal(SIGHUP)
//! control surface ─────────▶ ReloadCoordinator::reload ────────┘
//! ```
//!
//! # Design Decisions
//! - Reload is a signal to the running process, never a restart
//! - Queued requests are handled one at a time, in arrival order
//! - Nothing running is a warning, not an error
//! - Content already signalled for a role is not signalled again; requests
//!   without a known fingerprint always signal

pub mod coordinator;

pub use coordinator::{
    reload_channel, ReloadCoordinator, ReloadError, ReloadOutcome, ReloadRequest, ReloadSender,
    ReloadStatsSnapshot, ReloadTrigger,
};
