//! End-to-end tests: YAML config -> registered probes -> HTTP status API.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use systemcheck_server::{AppState, Config, ConfigError, MetricsRegistry, SystemcheckServer, router};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("systemcheck-{}-{}.yaml", name, std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

async fn get_json(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router(state.clone())
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[test]
fn test_load_from_file() {
    let path = write_config(
        "load",
        r#"
http:
  listen_addr: "127.0.0.1:0"
systems:
  - name: db
    interval: 5s
    probe: { type: tcp, address: "127.0.0.1:5432" }
"#,
    );

    let config = assert_ok!(Config::load_from_file(&path));
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.http.listen_addr, "127.0.0.1:0");
    assert_eq!(config.systems[0].name, "db");
}

#[test]
fn test_load_missing_file_is_io_error() {
    let err = assert_err!(Config::load_from_file("/nonexistent/systemcheck-server.yaml"));
    assert!(matches!(err, ConfigError::IoError(_)));
}

#[tokio::test]
async fn test_configured_systems_report_through_api() {
    let up = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let down = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let up_addr = up.local_addr().unwrap();
    let down_addr = down.local_addr().unwrap();
    drop(down);

    let yaml = format!(
        r#"
systems:
  - name: api
    interval: 50ms
    probe: {{ type: tcp, address: "{}", timeout: 200ms }}
  - name: legacy
    interval: 50ms
    buffer_size: 2
    probe: {{ type: tcp, address: "{}", timeout: 200ms }}
"#,
        up_addr, down_addr
    );

    let server = SystemcheckServer::new(assert_ok!(Config::from_yaml(&yaml)));
    assert_ok!(server.register_systems());
    let state = AppState {
        registry: server.registry().clone(),
        metrics: Arc::new(MetricsRegistry::new()),
    };

    // Wait for enough probe rounds to fill legacy's buffer.
    let mut overall = serde_json::Value::Null;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (status, body) = get_json(&state, "/status").await;
        if status == StatusCode::SERVICE_UNAVAILABLE && body["systems"]["api"]["code"] == 0 {
            overall = body;
            break;
        }
    }

    assert_eq!(overall["systems"]["legacy"]["code"], 1);
    assert_eq!(overall["systems"]["api"]["code"], 0);
    assert_eq!(overall["overall_code"], 1);
    assert_eq!(overall["any_starting"], false);

    let (status, body) = get_json(&state, "/status/legacy").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["recent_errors"].as_array().unwrap().len() >= 2);

    server.registry().shutdown();
    let (status, body) = get_json(&state, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["systems"].as_object().unwrap().is_empty());
}
