//! Shared route helpers.

use axum::extract::RawPathParams;
use axum::http::HeaderMap;

use crate::error::{AppError, AppResult};

/// Header carrying the caller identity, set by the outer auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The still-encoded `{id}` path segment.
///
/// Server ids are percent-encoded names; the catalog decodes them, so the
/// raw segment is passed through instead of axum's decoded one.
pub fn raw_server_id(params: &RawPathParams) -> AppResult<String> {
    params
        .iter()
        .find(|(key, _)| *key == "id")
        .map(|(_, value)| value.to_string())
        .ok_or(AppError::NotFound)
}

/// Caller identity from [`USER_ID_HEADER`].
pub fn user_id(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest(format!("missing {USER_ID_HEADER} header")))
}
