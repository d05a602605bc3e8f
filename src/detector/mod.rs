//! Configuration change detection subsystem.
//!
//! # Data Flow
//! ```text
//! rendered haproxy.cfg
//!     → poll.rs  (interval → fingerprint.rs → compare with last)
//!     → watch.rs (notify event → filter on target path)
//!     → ReloadSender (non-blocking hand-off)
//!     → reload coordinator
//! ```
//!
//! # Design Decisions
//! - Strategy chosen by config; both share the same hand-off
//! - Only the polling detector owns a fingerprint; it is never shared
//! - Unreadable files and watch errors are logged, never fatal

pub mod fingerprint;
pub mod poll;
pub mod watch;

pub use fingerprint::{ChangeTracker, Fingerprint};
pub use poll::PollingDetector;
pub use watch::{hold_until, WatchDetector};
