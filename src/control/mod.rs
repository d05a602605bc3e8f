//! Control surface.
//!
//! # Data Flow
//! ```text
//! GET  /status    → handlers.rs → role snapshots + reload counters
//! POST /configure → handlers.rs → writer.rs (compare, atomic write)
//!                               → reload coordinator (signal only)
//! ```
//!
//! # Design Decisions
//! - The payload is opaque bytes; it becomes the file content as-is
//! - No endpoint stops or restarts containers; supervisors own lifecycle
//! - Optional bearer token on every route

pub mod auth;
pub mod handlers;
pub mod writer;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ControlConfig;
use crate::reload::ReloadCoordinator;
use crate::supervisor::RoleStatus;

use self::auth::control_auth_middleware;
use self::handlers::{configure, get_status};

pub use handlers::{ConfigureResponse, ControlError, ManagerStatus};
pub use writer::{ConfigWriter, WriteOutcome};

/// State shared by the control handlers.
#[derive(Clone)]
pub struct ControlState {
    pub roles: Arc<Vec<Arc<RoleStatus>>>,
    pub coordinator: Arc<ReloadCoordinator>,
    pub writer: Arc<ConfigWriter>,
    pub api_key: Option<Arc<str>>,
    pub shutdown: CancellationToken,
}

/// Build the control router with its middleware stack.
#[allow(deprecated)]
pub fn control_router(state: ControlState, config: &ControlConfig) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/configure", post(configure))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            control_auth_middleware,
        ))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_payload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.request_timeout_secs,
                ))),
        )
}

/// Serve `router` until `stop` is cancelled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    stop: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Control surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await?;

    tracing::info!("Control surface stopped");
    Ok(())
}
