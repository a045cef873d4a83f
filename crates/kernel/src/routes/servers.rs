//! Server listing and lookup.

use axum::extract::{Query, RawPathParams, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::enrich::EnrichedServer;
use crate::error::{AppError, AppResult};
use crate::query::{ServerFilter, split_list};
use crate::routes::helpers::raw_server_id;
use crate::services::ListingRequest;
use crate::state::AppState;

/// Create the server listing router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v0/servers", get(list_servers))
        .route("/v0/servers/{id}", get(get_server))
}

/// Query string for `GET /v0/servers`.
///
/// Numbers arrive as text so a malformed value gets the JSON error body.
#[derive(Debug, Default, Deserialize)]
struct ListParams {
    search: Option<String>,
    category: Option<String>,
    tags: Option<String>,
    min_rating: Option<String>,
    min_installs: Option<String>,
    registry_types: Option<String>,
    transport_types: Option<String>,
    sort: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

impl ListParams {
    fn into_request(self) -> AppResult<ListingRequest> {
        Ok(ListingRequest {
            filter: ServerFilter {
                search: self.search,
                category: self.category,
                tags: split_list(self.tags.as_deref()),
                min_rating: parse_param("min_rating", self.min_rating.as_deref())?,
                min_installs: parse_param("min_installs", self.min_installs.as_deref())?,
                registry_types: split_list(self.registry_types.as_deref()),
                transport_types: split_list(self.transport_types.as_deref()),
            },
            sort: self.sort.unwrap_or_default(),
            limit: parse_param("limit", self.limit.as_deref())?,
            offset: parse_param("offset", self.offset.as_deref())?.unwrap_or(0),
        })
    }
}

fn parse_param<T: std::str::FromStr>(name: &str, raw: Option<&str>) -> AppResult<Option<T>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("invalid {name}: '{v}'"))),
    }
}

#[derive(Serialize)]
struct ListMetadata {
    count: usize,
    total: i64,
    limit: u64,
    offset: u64,
}

#[derive(Serialize)]
struct ListResponse {
    servers: Vec<EnrichedServer>,
    metadata: ListMetadata,
}

async fn list_servers(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ListResponse>> {
    let request = params.into_request()?;
    let page = state.catalog().query_enriched(&request).await?;

    Ok(Json(ListResponse {
        metadata: ListMetadata {
            count: page.servers.len(),
            total: page.total,
            limit: page.limit,
            offset: page.offset,
        },
        servers: page.servers,
    }))
}

async fn get_server(
    State(state): State<AppState>,
    params: RawPathParams,
) -> AppResult<Json<EnrichedServer>> {
    let id = raw_server_id(&params)?;
    let server = state.catalog().get_enriched(&id).await?;
    Ok(Json(server))
}
