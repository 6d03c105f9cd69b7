use axum::Router;

pub mod accounts;
pub mod admin;
pub mod merch;
pub mod system;

/// All protected routes (auth middleware is layered on by `build_app`).
pub fn router() -> Router {
    Router::new()
        .merge(merch::router())
        .merge(accounts::router())
        .nest("/admin", admin::router())
}
