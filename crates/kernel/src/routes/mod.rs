//! HTTP route handlers.

pub mod admin;
pub mod engagement;
pub mod health;
pub mod helpers;
pub mod servers;

use axum::Router;

use crate::state::AppState;

/// Every route, bound to `state`. Middleware layers are added by the caller.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(servers::router())
        .merge(engagement::router())
        .merge(admin::router())
        .merge(health::router())
        .with_state(state)
}
