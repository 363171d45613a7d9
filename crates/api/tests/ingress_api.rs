use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tempdir::TempDir;

use paylake_api::app::{self, Pipeline};
use paylake_api::config::AppConfig;

struct TestServer {
    base_url: String,
    pipeline: Option<Pipeline>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(config: AppConfig) -> Self {
        // Same wiring as prod, but bound to an ephemeral port.
        let pipeline = app::build_pipeline(&config).expect("failed to build pipeline");
        let router = app::build_app(pipeline.services.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url,
            pipeline: Some(pipeline),
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown();
        }
    }
}

fn config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        bucket: "payments".to_string(),
        data_dir: None,
        prefix: "raw".to_string(),
        region: "us-east-1".to_string(),
        queue_url: None,
        visibility_timeout: Duration::from_secs(60),
        max_receive_count: 5,
        batch_size: 5,
        wait_time: Duration::from_millis(50),
        workers: 1,
    }
}

/// Wait for one object to appear under `partition_dir`.
///
/// Persistence is asynchronous (gate -> queue -> worker -> store), and the
/// outbox path adds a relay tick on top. Poll generously.
async fn wait_for_object(partition_dir: &Path) -> PathBuf {
    for _ in 0..300 {
        if let Ok(entries) = std::fs::read_dir(partition_dir) {
            if let Some(entry) = entries.flatten().next() {
                return entry.path();
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("no object appeared under {}", partition_dir.display());
}

async fn wait_for_drain(client: &reqwest::Client, base_url: &str) -> serde_json::Value {
    for _ in 0..300 {
        let body: serde_json::Value = client
            .get(format!("{base_url}/ops/queues"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["total"] == 0 {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("queue did not drain within timeout");
}

#[tokio::test]
async fn health_reports_ok() {
    let srv = TestServer::spawn(config()).await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn gate_echoes_the_supplied_payment_id() {
    let srv = TestServer::spawn(config()).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/payments", srv.base_url))
        .json(&json!({
            "payment_id": "p-known",
            "amount": 12.5,
            "ts": "2026-01-01T00:00:00Z",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["enqueued"], true);
    assert_eq!(body["payment_id"], "p-known");
}

#[tokio::test]
async fn gate_mints_an_id_when_the_caller_omits_it() {
    let srv = TestServer::spawn(config()).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/payments", srv.base_url))
        .json(&json!({"amount": 1.0}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let payment_id = body["payment_id"].as_str().unwrap();
    assert!(payment_id.starts_with("p-"));
    assert_eq!(payment_id.len(), 12);
}

#[tokio::test]
async fn extra_request_fields_are_tolerated() {
    let srv = TestServer::spawn(config()).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/payments", srv.base_url))
        .json(&json!({"amount": 1.0, "currency": "EUR"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_bodies_never_reach_the_queue() {
    let srv = TestServer::spawn(config()).await;
    let client = reqwest::Client::new();

    // Wrong type for amount.
    let res = client
        .post(format!("{}/payments", srv.base_url))
        .json(&json!({"amount": "not a number"}))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_client_error());

    // Not JSON at all.
    let res = client
        .post(format!("{}/payments", srv.base_url))
        .header("content-type", "application/json")
        .body("{ definitely not json")
        .send()
        .await
        .unwrap();
    assert!(res.status().is_client_error());

    let counts: serde_json::Value = client
        .get(format!("{}/ops/queues", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(counts["total"], 0);
    assert_eq!(counts["dead_letters"], 0);
}

#[tokio::test]
async fn payment_lands_in_the_partitioned_raw_zone() {
    let data_dir = TempDir::new("paylake-api").unwrap();
    let mut config = config();
    config.data_dir = Some(data_dir.path().to_path_buf());
    let srv = TestServer::spawn(config).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/payments", srv.base_url))
        .json(&json!({
            "payment_id": "p-e2e",
            "amount": 42.5,
            "ts": "2026-01-01T10:30:00Z",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let partition_dir = data_dir.path().join("payments/raw/dt=2026-01-01");
    let object = wait_for_object(&partition_dir).await;
    assert!(object.to_string_lossy().ends_with(".json"));

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&object).unwrap()).unwrap();
    assert_eq!(stored["payment_id"], "p-e2e");
    assert_eq!(stored["amount"], 42.5);
    assert_eq!(stored["ts"], "2026-01-01T10:30:00Z");

    let counts = wait_for_drain(&client, &srv.base_url).await;
    assert_eq!(counts["dead_letters"], 0);
}

#[tokio::test]
async fn queue_drains_to_zero_after_a_burst() {
    let srv = TestServer::spawn(config()).await;

    let client = reqwest::Client::new();
    for i in 0..3 {
        let res = client
            .post(format!("{}/payments", srv.base_url))
            .json(&json!({"payment_id": format!("p-burst-{i}"), "amount": 1.0}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let counts = wait_for_drain(&client, &srv.base_url).await;
    assert_eq!(counts["dead_letters"], 0);
}

#[tokio::test]
async fn ops_surface_starts_empty_and_purge_is_idempotent() {
    let srv = TestServer::spawn(config()).await;
    let client = reqwest::Client::new();

    let counts: serde_json::Value = client
        .get(format!("{}/ops/queues", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(counts["total"], 0);
    assert_eq!(counts["primary"]["available"], 0);
    assert_eq!(counts["primary"]["in_flight"], 0);
    assert_eq!(counts["primary"]["delayed"], 0);

    let dead: serde_json::Value = client
        .get(format!("{}/ops/dead-letters?limit=5", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dead["count"], 0);
    assert_eq!(dead["entries"], json!([]));

    let purged: serde_json::Value = client
        .post(format!("{}/ops/dead-letters/purge", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(purged, json!({"purged": 0}));
}

#[tokio::test]
async fn outbox_accepts_and_relays_into_the_raw_zone() {
    let data_dir = TempDir::new("paylake-api").unwrap();
    let mut config = config();
    config.data_dir = Some(data_dir.path().to_path_buf());
    let srv = TestServer::spawn(config).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/outbox/payments", srv.base_url))
        .json(&json!({
            "payment_id": "p-outbox",
            "amount": 9.75,
            "ts": "2026-01-02T00:00:00Z",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["accepted"], true);
    assert_eq!(body["payment_id"], "p-outbox");
    assert!(uuid::Uuid::parse_str(body["event_id"].as_str().unwrap()).is_ok());

    // The relay ticks once a second; the worker drains right after.
    let partition_dir = data_dir.path().join("payments/raw/dt=2026-01-02");
    let object = wait_for_object(&partition_dir).await;
    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&object).unwrap()).unwrap();
    assert_eq!(stored["payment_id"], "p-outbox");

    let stats: serde_json::Value = client
        .get(format!("{}/ops/outbox", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["published"], 1);
    assert_eq!(stats["pending"], 0);
}
