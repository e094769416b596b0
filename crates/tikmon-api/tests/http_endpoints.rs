//! HTTP endpoint tests against the mock device
//!
//! Every test writes a configuration file to a temporary directory, builds
//! the router on top of it and drives requests with `oneshot`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tikmon_api::{create_router, AppState};
use tikmon_core::SharedConfig;
use tikmon_device::transport::mock::{MockConfig, MockConnector, MockResponse};
use tikmon_device::{ConnectionPool, Row};
use tikmon_engine::{pool_config, Scraper};
use tower::ServiceExt;

const CONFIG: &str = r#"
global:
  username: admin
  command_timeout: 1s
targets:
  router1:
    host: 10.0.0.1
    modules: [health]
    discover_labels:
      site: lab
  router2:
    host: 10.0.0.2
modules:
  health:
    - command: /system/health/print
      metrics:
        - name: psu-state
          param_type: Enum
          metric_name: psu
          help: power supply state
          labels:
            - name: psu-state
              param_type: String
          enum_values:
            ok: 1
            fail: 0
          enum_values_re:
            - "^warn": 0.5
  broken:
    - command: /broken
"#;

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    dir: TempDir,
    connector: Arc<MockConnector>,
    state: AppState,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), CONFIG);

        let config = Arc::new(SharedConfig::load(dir.path().join("config.yml")).unwrap());
        let connector = Arc::new(MockConnector::new(MockConfig::default()));
        connector.set_response(
            "/system/health/print",
            MockResponse::rows(vec![Row::new().with_field("psu-state", "ok")]),
        );

        let pool = Arc::new(ConnectionPool::new(
            connector.clone(),
            pool_config(&config.snapshot().global),
        ));
        let state = AppState::new(config, Arc::new(Scraper::new(pool)));

        Self {
            dir,
            connector,
            state,
        }
    }

    fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    async fn send(&self, method: Method, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(Method::GET, uri).await
    }
}

fn write_config(dir: &Path, content: &str) {
    fs::write(dir.join("config.yml"), content).unwrap();
}

fn error_kind(body: &str) -> String {
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    json["error"].as_str().unwrap().to_string()
}

// =============================================================================
// Metrics
// =============================================================================

#[tokio::test]
async fn test_scrape_returns_text_format() {
    let harness = Harness::new();
    let request = Request::get("/metrics?target=router1")
        .body(Body::empty())
        .unwrap();
    let response = harness.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        prometheus::TEXT_FORMAT
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("# HELP mikrotik_health_psu power supply state"), "{text}");
    assert!(text.contains("mikrotik_health_psu{psu_state=\"ok\"} 1"), "{text}");
}

#[tokio::test]
async fn test_scrape_explicit_module() {
    let harness = Harness::new();
    let (status, text) = harness.get("/metrics?target=router2&module=health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("mikrotik_health_psu"));
}

#[tokio::test]
async fn test_scrape_errors() {
    let harness = Harness::new();
    harness
        .connector
        .set_response("/broken", MockResponse::trap("no such command"));

    let (status, body) = harness.get("/metrics").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(&body), "bad_request");

    let (status, _) = harness.get("/metrics?target=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = harness.get("/metrics?target=router1&module=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = harness.get("/metrics?target=router1&module=broken").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_kind(&body), "bad_gateway");
}

#[tokio::test]
async fn test_scrape_timeout_and_connection_failure() {
    let harness = Harness::new();
    harness
        .connector
        .set_response("/system/health/print", MockResponse::hang());
    let (status, _) = harness.get("/metrics?target=router1").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

    harness.connector.set_fail_open(true);
    let (status, _) = harness.get("/metrics?target=router2&module=health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Discover, reload, health
// =============================================================================

#[tokio::test]
async fn test_discover_lists_targets() {
    let harness = Harness::new();
    let (status, body) = harness.get("/discover").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        json,
        serde_json::json!([
            { "targets": ["router1"], "labels": { "site": "lab" } },
            { "targets": ["router2"], "labels": {} },
        ])
    );
}

#[tokio::test]
async fn test_reload() {
    let harness = Harness::new();
    harness.get("/metrics?target=router1").await;
    harness.get("/metrics?target=router2&module=health").await;

    // router2 removed, port change ignored
    let changed = CONFIG
        .replace("  router2:\n    host: 10.0.0.2\n", "")
        .replace("global:\n", "global:\n  port: 1234\n");
    write_config(harness.dir.path(), &changed);

    let (status, body) = harness.send(Method::POST, "/-/reload").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["targets"], 1);

    let config = harness.state.config().snapshot();
    assert_eq!(config.global.port, 9436);
    assert!(config.target("router2").is_none());
    assert!(harness.state.scraper().registries().get("router1").is_some());
    assert!(harness.state.scraper().registries().get("router2").is_none());
}

#[tokio::test]
async fn test_rejected_reload_keeps_configuration() {
    let harness = Harness::new();
    write_config(harness.dir.path(), "targets: [not, a, map]\n");

    let (status, body) = harness.send(Method::POST, "/-/reload").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(&body), "bad_request");
    assert!(harness.state.config().snapshot().target("router2").is_some());

    let (status, _) = harness.get("/-/reload").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_health_and_request_ids() {
    let harness = Harness::new();
    let (status, body) = harness.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    harness.get("/health").await;
    assert_eq!(harness.state.next_request_id(), 3);
}
