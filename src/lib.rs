//! HAProxy manager library

pub mod config;
pub mod control;
pub mod detector;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod observability;
pub mod reload;
pub mod runtime;
pub mod supervisor;

pub use config::ManagerConfig;
pub use error::ManagerError;
pub use lifecycle::{Shutdown, ShutdownOrchestrator};
pub use manager::Manager;
