//! Operator API.
//!
//! Exposes the breaker's force-override hooks, cache invalidation and a
//! status snapshot over HTTP. Every route sits behind a bearer key.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::authz::AuthorizationCoordinator;

#[derive(Clone)]
pub struct AdminState {
    pub coordinator: Arc<AuthorizationCoordinator>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(coordinator: Arc<AuthorizationCoordinator>, api_key: &str) -> Self {
        Self {
            coordinator,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/circuit/open", post(open_circuit))
        .route("/admin/circuit/close", post(close_circuit))
        .route("/admin/circuit/reset", post(reset_circuit))
        .route("/admin/cache/invalidate", post(invalidate_cache))
        .route("/admin/cache", delete(clear_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
