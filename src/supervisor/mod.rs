//! Process supervision subsystem.
//!
//! # Data Flow
//! ```text
//! ManagerConfig
//!     → spec.rs (ManagedProcessSpec per role, immutable)
//!     → process.rs (restart loop, one tokio task per role)
//!         ↔ runtime facade (is_running / create / start / wait_exit / stop)
//!     → state.rs (RoleStatus, read by the control surface)
//! ```
//!
//! # Design Decisions
//! - One supervisor per role; a supervisor holds at most one handle
//! - Adopt or replace an already-running container is a per-role policy
//! - Exits restart immediately; a cancelled stop token always prevents
//!   the next start
//! - Failing to bring a container up is fatal to the whole manager

pub mod process;
pub mod spec;
pub mod state;

pub use process::{ProcessSupervisor, SupervisorError};
pub use spec::{AdoptionPolicy, ManagedProcessSpec, Role};
pub use state::{RoleSnapshot, RoleStatus, SupervisionState};
