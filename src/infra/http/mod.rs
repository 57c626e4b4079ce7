//! HTTP surface of the edge service.

mod edge;
mod middleware;
mod params;

pub use params::{CacheControls, coerce_params, split_controls};

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    middleware as axum_middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::{application::router::QueryRouter, cache::CacheManager};

use self::middleware::{cors_layer, log_responses, set_request_context};

#[derive(Clone)]
pub struct EdgeState {
    pub router: Arc<QueryRouter>,
    pub cache: Arc<CacheManager>,
    /// Bearer token accepted by `/cache/clear`; clearing is refused when unset.
    pub clear_token: Option<Arc<str>>,
}

impl EdgeState {
    pub fn new(
        router: Arc<QueryRouter>,
        cache: Arc<CacheManager>,
        clear_token: Option<String>,
    ) -> Self {
        Self {
            router,
            cache,
            clear_token: clear_token.map(Arc::from),
        }
    }
}

pub fn build_router(state: EdgeState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/query", post(edge::post_query))
        .route("/content/{method}", get(edge::get_content))
        .route("/cache/clear", post(edge::clear_cache))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(cors_layer())
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn index(State(state): State<EdgeState>) -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "methods": state.router.methods(),
    }))
}
