//! Engagement endpoints: stats, ratings, installs.

use axum::extract::{RawPathParams, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::error::AppResult;
use crate::models::{EngagementAggregate, NewInstall, NewRating};
use crate::routes::helpers::{raw_server_id, user_id};
use crate::state::AppState;

/// Create the engagement router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v0/servers/{id}/stats", get(server_stats))
        .route("/v0/servers/{id}/rating", post(submit_rating))
        .route("/v0/servers/{id}/install", post(record_install))
}

async fn server_stats(
    State(state): State<AppState>,
    params: RawPathParams,
) -> AppResult<Json<EngagementAggregate>> {
    let id = raw_server_id(&params)?;
    let aggregate = state.catalog().engagement_for(&id).await?;
    Ok(Json(aggregate))
}

async fn submit_rating(
    State(state): State<AppState>,
    params: RawPathParams,
    headers: HeaderMap,
    Json(rating): Json<NewRating>,
) -> AppResult<Json<EngagementAggregate>> {
    let id = raw_server_id(&params)?;
    let user = user_id(&headers)?;
    let aggregate = state.catalog().submit_rating(&id, &user, rating).await?;
    Ok(Json(aggregate))
}

async fn record_install(
    State(state): State<AppState>,
    params: RawPathParams,
    headers: HeaderMap,
    body: Option<Json<NewInstall>>,
) -> AppResult<Json<EngagementAggregate>> {
    let id = raw_server_id(&params)?;
    let user = user_id(&headers)?;
    let install = body.map(|Json(install)| install).unwrap_or_default();
    let aggregate = state.catalog().record_install(&id, &user, install).await?;
    Ok(Json(aggregate))
}
