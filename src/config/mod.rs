//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! manager.toml (optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (CONFIG_DIR / INSTANCE_ID / CONSUL_ADDR / SERVICE_NAME overrides)
//!     → validation.rs (semantic checks)
//!     → ManagerConfig (validated, immutable)
//!     → passed by reference to every component at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the manager never re-reads it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ControlConfig;
pub use schema::DetectorConfig;
pub use schema::DetectorStrategy;
pub use schema::ManagerConfig;
