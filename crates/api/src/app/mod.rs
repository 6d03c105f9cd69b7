//! HTTP API application wiring (Axum router + service wiring).
//!
//! Folder layout:
//! - `services.rs`: infrastructure wiring (event store/bus, projections,
//!   payment authorizer, redemption executor)
//! - `routes/`: HTTP routes + handlers (one file per surface area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(jwt_secret: String) -> Router {
    let jwt = Arc::new(crate::auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::build_services().await);

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
