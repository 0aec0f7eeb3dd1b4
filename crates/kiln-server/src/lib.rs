//! Kiln Server: configuration loading, shared state and the HTTP routes of
//! the control plane.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

pub use config::ServerConfig;
pub use error::{ApiError, ServerError};
pub use state::{AppState, KilnStore};

/// All routes. Everything under `/v1` except login and refresh requires
/// credentials.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route(
            "/v1/certificates",
            get(routes::certificates::list).post(routes::certificates::create),
        )
        .route("/v1/certificates/:id_or_slug", get(routes::certificates::get))
        .route("/v1/tenants/:tenant_id/users", post(routes::users::create))
        .route("/v1/apikeys", post(routes::api_keys::create))
        .route("/v1/apikeys/:id/revoke", post(routes::api_keys::revoke))
        .route("/v1/auth/logout", post(routes::session::logout))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/v1/auth/login", post(routes::session::login))
        .route("/v1/auth/refresh", post(routes::session::refresh))
        .merge(protected)
        .with_state(state)
}
