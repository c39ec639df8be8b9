//! HTTP routes over a service with in-memory backends

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;
use std::sync::Arc;

use common::{FakeFetcher, FakeListing, test_config};
use wikicolor::{services::ColorService, web::WebServer};

fn server() -> (TestServer, Arc<ColorService>) {
    let service = Arc::new(ColorService::with_components(
        test_config(4, 16, 5),
        Arc::new(FakeListing::new(50)),
        Arc::new(FakeFetcher::new([0, 0, 255, 255])),
    ));
    let server = TestServer::new(WebServer::router(Arc::clone(&service))).unwrap();
    (server, service)
}

fn ndjson(body: &str) -> Vec<Value> {
    body.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_colors_streams_one_line_per_image() {
    let (server, _service) = server();

    let response = server
        .get("/colors")
        .add_query_param("max", 7)
        .add_query_param("deadline", "10s")
        .await;

    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "application/x-ndjson");

    let lines = ndjson(&response.text());
    assert_eq!(lines.len(), 7);
    for line in &lines {
        assert_eq!(line["hex"], "#0000ff");
        assert_eq!(line["xterm"], 12);
        assert!(line["error"].is_null());
        assert!(line["url"].as_str().unwrap().starts_with("https://upload.test/"));
    }
}

#[tokio::test]
async fn test_colors_rejects_bad_deadline() {
    let (server, _service) = server();

    let response = server
        .get("/colors")
        .add_query_param("deadline", "whenever")
        .expect_failure()
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("whenever"));
}

#[tokio::test]
async fn test_cached_lists_newest_first_without_network() {
    let (server, service) = server();

    let empty: Vec<Value> = server.get("/cached").await.json();
    assert!(empty.is_empty());

    server.get("/colors").add_query_param("max", 5).await.assert_status_ok();
    assert_eq!(service.cache().len().await, 5);

    let cached: Vec<Value> = server.get("/cached").add_query_param("max", 3).await.json();
    assert_eq!(cached.len(), 3);
    assert!(cached.iter().all(|entry| entry["hex"] == "#0000ff"));
}

#[tokio::test]
async fn test_health_reports_stats() {
    let (server, _service) = server();
    server.get("/colors").add_query_param("max", 2).await.assert_status_ok();

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["strategy"], "first-non-gray");
    assert_eq!(health["cache"]["entries"], 2);
    assert_eq!(health["cache"]["capacity"], 64);
    assert_eq!(health["pool"]["workers"], 4);
}
