//! HTTP contract of the edge service, exercised through the real router.

mod support;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Method, Request, Response, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION,
            CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH, ORIGIN,
        },
    },
};
use lectern::cache::{CacheConfig, CacheManager, MemoryKvStore};
use lectern::domain::types::FieldType;
use lectern::infra::http::{EdgeState, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

use support::{Fixture, InMemoryRepo, router};

const TOKEN: &str = "s3cret";

fn app() -> (Router, Arc<InMemoryRepo>) {
    let (mut fixture, project) = Fixture::with_default_project();
    let page = fixture.page(&project, "home", "en");
    let template = fixture.template("hero", &[("title", FieldType::Text)]);
    let section = fixture.section(&template, "Hero");
    fixture.place(&page, section.id, 0);
    fixture.section_value(&section, "title", None, json!("Welcome"));

    let (query_router, repo) = router(fixture);
    let config = CacheConfig::default();
    let store = Arc::new(MemoryKvStore::new(config.max_entries_non_zero()));
    let cache = Arc::new(CacheManager::new(store, config));
    let state = EdgeState::new(Arc::new(query_router), cache, Some(TOKEN.to_string()));
    (build_router(state), repo)
}

fn query_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn home_query(uri: &str) -> Request<Body> {
    query_request(
        uri,
        json!({ "method": "getPageWithFullContent", "params": { "slug": "home" } }),
    )
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn cache_status(response: &Response<Body>) -> &str {
    response.headers()["x-cache-status"].to_str().unwrap()
}

fn clear_request(token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/cache/clear")
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let (app, repo) = app();

    let first = send(&app, home_query("/query")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(cache_status(&first), "MISS");
    assert_eq!(first.headers()[CACHE_CONTROL], "public, max-age=300");
    assert!(first.headers().contains_key(ETAG));
    let first_body = json_body(first).await;
    assert_eq!(first_body["cached"], json!(false));
    let queries = repo.queries();

    let second = send(&app, home_query("/query")).await;
    assert_eq!(cache_status(&second), "HIT");
    let age: u64 = second.headers()["x-cache-age"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(age <= 300);
    let second_body = json_body(second).await;
    assert_eq!(second_body["cached"], json!(true));
    assert_eq!(second_body["data"], first_body["data"]);
    assert_eq!(repo.queries(), queries);
}

#[tokio::test]
async fn no_cache_neither_reads_nor_writes() {
    let (app, _) = app();

    let bypass = send(&app, home_query("/query?no-cache=true")).await;
    assert_eq!(cache_status(&bypass), "BYPASS");

    let next = send(&app, home_query("/query")).await;
    assert_eq!(cache_status(&next), "MISS");

    let bypass = send(&app, home_query("/query?no-cache=true")).await;
    assert_eq!(cache_status(&bypass), "BYPASS");
    assert_eq!(json_body(bypass).await["cached"], json!(false));
}

#[tokio::test]
async fn versions_partition_the_cache() {
    let (app, _) = app();

    send(&app, home_query("/query?deployedVersionId=A")).await;
    let other = send(&app, home_query("/query?deployedVersionId=B")).await;
    assert_eq!(cache_status(&other), "MISS");

    let same = send(&app, home_query("/query?deployedVersionId=A")).await;
    assert_eq!(cache_status(&same), "HIT");
}

#[tokio::test]
async fn errors_are_never_cached() {
    let (app, _) = app();
    let missing = || {
        query_request(
            "/query",
            json!({ "method": "getPage", "params": { "slug": "missing" } }),
        )
    };

    let first = send(&app, missing()).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[CACHE_CONTROL], "no-cache");
    assert_eq!(
        json_body(first).await,
        json!({ "data": null, "error": "Page not found" })
    );

    let second = send(&app, missing()).await;
    assert_eq!(cache_status(&second), "MISS");
}

#[tokio::test]
async fn unknown_method_is_a_body_level_error() {
    let (app, _) = app();
    let response = send(&app, query_request("/query", json!({ "method": "dropTables" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["error"], "Unknown method: dropTables");
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/query")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn matching_etag_returns_not_modified() {
    let (app, _) = app();
    let first = send(&app, home_query("/query")).await;
    let etag = first.headers()[ETAG].clone();

    let mut request = home_query("/query");
    request.headers_mut().insert(IF_NONE_MATCH, etag.clone());
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers()[ETAG], etag);
    assert_eq!(cache_status(&response), "HIT");
}

#[tokio::test]
async fn legacy_path_shares_the_query_pipeline() {
    let (app, _) = app();
    send(&app, home_query("/query")).await;

    let request = Request::builder()
        .uri("/content/getPageWithFullContent?slug=home")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(cache_status(&response), "HIT");
    let body = json_body(response).await;
    assert_eq!(body["data"]["sections"][0]["content"]["title"], "Welcome");
}

#[tokio::test]
async fn cache_clear_requires_bearer_token() {
    let (app, _) = app();

    let response = send(&app, clear_request(None, json!({}))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, clear_request(Some("wrong"), json!({}))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cache_clear_by_version_leaves_other_entries() {
    let (app, _) = app();
    send(&app, home_query("/query?deployedVersionId=A")).await;
    send(&app, home_query("/query")).await;

    let response = send(&app, clear_request(Some(TOKEN), json!({ "versionId": "A" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "cleared": 1, "prefix": "content:vA:" })
    );

    let versioned = send(&app, home_query("/query?deployedVersionId=A")).await;
    assert_eq!(cache_status(&versioned), "MISS");
    let plain = send(&app, home_query("/query")).await;
    assert_eq!(cache_status(&plain), "HIT");

    let response = send(&app, clear_request(Some(TOKEN), json!({}))).await;
    assert_eq!(json_body(response).await["prefix"], "content:");
    let plain = send(&app, home_query("/query")).await;
    assert_eq!(cache_status(&plain), "MISS");
}

#[tokio::test]
async fn preflight_echoes_origin() {
    let (app, repo) = app();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/query")
        .header(ORIGIN, "https://site.example")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://site.example"
    );
    let methods: Vec<&str> = response.headers()[ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .split(',')
        .map(str::trim)
        .collect();
    assert_eq!(methods, ["GET", "POST", "PUT", "DELETE", "OPTIONS"]);
    assert_eq!(repo.queries(), 0);

    let mut request = home_query("/query");
    request
        .headers_mut()
        .insert(ORIGIN, "https://other.example".parse().unwrap());
    let response = send(&app, request).await;
    assert_eq!(
        response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://other.example"
    );
}

#[tokio::test]
async fn health_and_index_describe_the_service() {
    let (app, _) = app();
    let health = send(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(json_body(health).await, json!({ "status": "ok" }));

    let index = send(&app, Request::builder().uri("/").body(Body::empty()).unwrap()).await;
    let body = json_body(index).await;
    assert_eq!(body["name"], "lectern");
    assert!(
        body["methods"]
            .as_array()
            .unwrap()
            .contains(&json!("getPageWithFullContent"))
    );
}
