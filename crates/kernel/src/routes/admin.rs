//! Admin endpoints.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppResult;
use crate::state::AppState;

/// Create the admin router.
pub fn router() -> Router<AppState> {
    Router::new().route("/admin/cache/refresh", post(refresh_cache))
}

#[derive(Serialize)]
struct RefreshResponse {
    servers: usize,
    last_update: Option<DateTime<Utc>>,
}

/// Rebuild the enriched collection cache.
async fn refresh_cache(State(state): State<AppState>) -> AppResult<Json<RefreshResponse>> {
    let catalog = state.catalog();
    let servers = catalog.refresh().await?;
    Ok(Json(RefreshResponse {
        servers,
        last_update: catalog.cache().last_update(),
    }))
}
