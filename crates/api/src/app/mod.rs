//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store / cache / registry selection at startup
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: response envelope and query-string mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, BootstrapError, StoreBackend};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, BootstrapError> {
    let services = services::build_services(config).await?;
    Ok(build_router(services, &config.jwt_secret))
}

/// Router over already-wired services.
pub fn build_router(services: AppServices, jwt_secret: &str) -> Router {
    let jwt = Arc::new(stockflow_auth::Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let protected = routes::protected_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(Arc::new(services))))
}
