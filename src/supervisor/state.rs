//! Supervision state machine.
//!
//! # States
//! - Stopped: initial, and final after a stop request
//! - Starting: looking for / creating the container
//! - Running: waiting on the container's exit
//! - Exited: the container ended on its own; Starting follows
//! - Stopping: a stop request is being carried out
//!
//! # State Transitions
//! ```text
//! Stopped → Starting → Running → Exited → Starting → ...
//!                         │
//!                         └─ stop → Stopping → Stopped
//! ```
//!
//! # Design Decisions
//! - No Failed state: an exit while supervised always leads back to Starting
//! - Written only by the owning supervisor, read lock-free by status queries

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;

use crate::observability::metrics;
use crate::supervisor::spec::Role;

/// Supervision state enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisionState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Exited = 3,
    Stopping = 4,
}

impl From<u8> for SupervisionState {
    fn from(val: u8) -> Self {
        match val {
            1 => SupervisionState::Starting,
            2 => SupervisionState::Running,
            3 => SupervisionState::Exited,
            4 => SupervisionState::Stopping,
            _ => SupervisionState::Stopped,
        }
    }
}

const NO_EXIT: i64 = i64::MIN;

/// Live status of one supervised role.
#[derive(Debug)]
pub struct RoleStatus {
    role: Role,
    name: String,
    state: AtomicU8,
    /// Containers created by this supervisor.
    starts: AtomicU64,
    /// Containers that exited while supervised.
    exits: AtomicU64,
    last_exit_code: AtomicI64,
    container_id: ArcSwapOption<String>,
}

impl RoleStatus {
    pub fn new(role: Role, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            role,
            name: name.into(),
            state: AtomicU8::new(SupervisionState::Stopped as u8),
            starts: AtomicU64::new(0),
            exits: AtomicU64::new(0),
            last_exit_code: AtomicI64::new(NO_EXIT),
            container_id: ArcSwapOption::empty(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SupervisionState {
        SupervisionState::from(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SupervisionState) {
        let previous = SupervisionState::from(self.state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::debug!(role = %self.role, from = ?previous, to = ?state, "Supervision state changed");
            metrics::record_supervision_state(self.role, state);
        }
    }

    pub(crate) fn record_start(&self, container_id: &str) {
        self.starts.fetch_add(1, Ordering::Relaxed);
        self.container_id.store(Some(Arc::new(container_id.to_string())));
        metrics::record_container_start(self.role);
    }

    pub(crate) fn record_adopted(&self, container_id: &str) {
        self.container_id.store(Some(Arc::new(container_id.to_string())));
    }

    pub(crate) fn record_exit(&self, code: Option<i64>) {
        self.exits.fetch_add(1, Ordering::Relaxed);
        self.last_exit_code.store(code.unwrap_or(NO_EXIT), Ordering::Relaxed);
        self.container_id.store(None);
        metrics::record_container_exit(self.role);
    }

    pub(crate) fn clear_container(&self) {
        self.container_id.store(None);
    }

    /// Point-in-time copy for reporting.
    pub fn snapshot(&self) -> RoleSnapshot {
        let code = self.last_exit_code.load(Ordering::Relaxed);
        RoleSnapshot {
            role: self.role,
            container_name: self.name.clone(),
            state: self.state(),
            container_id: self.container_id.load_full().map(|id| id.as_ref().clone()),
            starts: self.starts.load(Ordering::Relaxed),
            exits: self.exits.load(Ordering::Relaxed),
            last_exit_code: (code != NO_EXIT).then_some(code),
        }
    }
}

/// Serializable view of a [`RoleStatus`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleSnapshot {
    pub role: Role,
    pub container_name: String,
    pub state: SupervisionState,
    pub container_id: Option<String>,
    pub starts: u64,
    pub exits: u64,
    pub last_exit_code: Option<i64>,
}
