//! Edge handlers: cache check, resolve, cache write, respond.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, CACHE_CONTROL, ETAG, IF_NONE_MATCH},
    },
    response::{IntoResponse, Response},
};
use lectern_api_types::{
    CacheClearRequest, CacheClearResponse, QueryRequest, QueryResponse, X_CACHE_AGE,
    X_CACHE_STATUS,
};
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, warn};

use crate::{
    application::{
        error::{AppError, ErrorReport},
        query::ContentQuery,
    },
    cache::{CacheLookup, now_millis},
};

use super::{
    EdgeState,
    params::{CacheControls, coerce_params, split_controls},
};

const SOURCE: &str = "lectern::http::edge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

pub(super) async fn post_query(
    State(state): State<EdgeState>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return malformed_body(rejection),
    };
    let (controls, _) = split_controls(pairs);
    let query = with_controls(ContentQuery::from(request), controls);
    execute(&state, query, &headers).await
}

/// `GET /content/{method}`: rewritten into a regular query.
pub(super) async fn get_content(
    State(state): State<EdgeState>,
    Path(method): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    let (controls, rest) = split_controls(pairs);
    let query = with_controls(ContentQuery::new(method, coerce_params(rest)), controls);
    execute(&state, query, &headers).await
}

fn with_controls(query: ContentQuery, controls: CacheControls) -> ContentQuery {
    query
        .with_version(controls.deployed_version_id)
        .bypassing_cache(controls.no_cache)
}

#[instrument(skip_all, fields(method = %query.method, version = ?query.deployed_version_id))]
async fn execute(state: &EdgeState, query: ContentQuery, headers: &HeaderMap) -> Response {
    let status = match state.cache.get(&query).await {
        CacheLookup::Hit(entry) => {
            let age = entry.age_seconds(now_millis());
            debug!(target = SOURCE, method = %query.method, cache_key = %entry.query_hash, "serving cached response");
            if etag_matches(headers, &entry.etag) {
                return not_modified(state, &entry.etag, CacheStatus::Hit, Some(age));
            }
            let body = QueryResponse::success(entry.data).with_cached(true);
            return success(state, body, &entry.etag, CacheStatus::Hit, Some(age));
        }
        CacheLookup::Miss => CacheStatus::Miss,
        CacheLookup::Bypass => CacheStatus::Bypass,
    };

    let response = state
        .router
        .dispatch(&query.method, query.params.clone())
        .await;
    if response.is_error() {
        return failure(response, status);
    }

    let data = response.data.unwrap_or(Value::Null);
    let entry = state.cache.set(&query, data).await;
    if etag_matches(headers, &entry.etag) {
        return not_modified(state, &entry.etag, status, None);
    }
    let body = QueryResponse::success(entry.data).with_cached(false);
    success(state, body, &entry.etag, status, None)
}

fn success(
    state: &EdgeState,
    body: QueryResponse,
    etag: &str,
    status: CacheStatus,
    age: Option<u64>,
) -> Response {
    let mut response = Json(body).into_response();
    cache_headers(response.headers_mut(), state, etag, status, age);
    response
}

fn not_modified(state: &EdgeState, etag: &str, status: CacheStatus, age: Option<u64>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    cache_headers(response.headers_mut(), state, etag, status, age);
    response
}

/// Body-level errors keep HTTP 200 and are never cacheable.
fn failure(body: QueryResponse, status: CacheStatus) -> Response {
    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(X_CACHE_STATUS, HeaderValue::from_static(status.as_str()));
    response
}

fn malformed_body(rejection: JsonRejection) -> Response {
    let body = QueryResponse::failure(format!("Invalid request body: {}", rejection.body_text()));
    let mut response = (StatusCode::BAD_REQUEST, Json(body)).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    ErrorReport::from_error(SOURCE, StatusCode::BAD_REQUEST, &rejection).attach(&mut response);
    response
}

fn cache_headers(
    headers: &mut HeaderMap,
    state: &EdgeState,
    etag: &str,
    status: CacheStatus,
    age: Option<u64>,
) {
    headers.insert(X_CACHE_STATUS, HeaderValue::from_static(status.as_str()));
    if let Some(age) = age {
        headers.insert(X_CACHE_AGE, HeaderValue::from(age));
    }
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(ETAG, value);
    }
    let max_age = format!("public, max-age={}", state.cache.config().ttl_seconds);
    if let Ok(value) = HeaderValue::from_str(&max_age) {
        headers.insert(CACHE_CONTROL, value);
    }
}

/// `If-None-Match` matches on any listed tag, weak or strong, or `*`.
fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(IF_NONE_MATCH).and_then(|value| value.to_str().ok()) else {
        return false;
    };
    value.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

pub(super) async fn clear_cache(
    State(state): State<EdgeState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    if !authorized(&state, &headers) {
        return Ok(unauthorized());
    }

    let request: CacheClearRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CacheClearRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::validation(format!("invalid cache clear body: {err}")))?
    };

    let prefix = state.cache.clear_prefix(&request);
    let cleared = state.cache.invalidate(&prefix).await;
    Ok(Json(CacheClearResponse { cleared, prefix }).into_response())
}

fn authorized(state: &EdgeState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.clear_token.as_deref() else {
        warn!(target = SOURCE, "cache clear requested but no token is configured");
        return false;
    };
    let Some(presented) = bearer_token(headers) else {
        return false;
    };
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn unauthorized() -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response();
    ErrorReport::from_message(SOURCE, StatusCode::UNAUTHORIZED, "missing or invalid bearer token")
        .attach(&mut response);
    response
}
