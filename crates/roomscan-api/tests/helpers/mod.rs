//! Test helpers: build services and router over temporary directories.
//!
//! Run from workspace root: `cargo test -p roomscan-api`.

#![allow(dead_code)]

pub mod converter;
pub mod fixtures;

use axum_test::TestServer;
use roomscan_api::constants;
use roomscan_api::setup::{initialize_services, routes};
use roomscan_api::AppState;
use roomscan_core::{Config, JobStatus};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use converter::FakeConverter;

pub const TEST_TOKEN: &str = "test-token-0123456789";

/// API path prefix for tests.
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

pub fn bearer() -> String {
    format!("Bearer {}", TEST_TOKEN)
}

/// Test application: server, shared state, and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub gate: Arc<Semaphore>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Let every blocked conversion finish.
    pub fn release_conversions(&self) {
        converter::release(&self.gate);
    }

    /// Poll the status endpoint until the job reaches a terminal state.
    pub async fn wait_for_terminal(&self, id: &str) -> serde_json::Value {
        for _ in 0..200 {
            let response = self
                .server
                .get(&api_path(&format!("/scans/{}", id)))
                .add_header("Authorization", bearer())
                .await;
            let body: serde_json::Value = response.json();
            if body["status"] == "done" || body["status"] == "error" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} did not finish in time", id);
    }

    /// Wait until the queue has picked the job up.
    pub async fn wait_for_status(&self, id: &str, status: JobStatus) {
        let id = roomscan_core::JobId::parse(id).expect("valid id");
        for _ in 0..200 {
            if let Ok(record) = self.state.store.load(&id).await {
                if record.status == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}", id, status);
    }
}

/// Default test app: immediate conversions.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(FakeConverter::open(), |_| {}).await
}

/// Build a test app around `converter`, letting the caller adjust the config.
pub async fn setup_test_app_with(
    converter: FakeConverter,
    configure: impl FnOnce(&mut Config),
) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let mut config = create_test_config(&temp_dir);
    configure(&mut config);

    let gate = converter.gate();
    let services = initialize_services(&config, Arc::new(converter))
        .await
        .expect("Failed to initialize services");
    let state = services.state.clone();
    let app = routes::setup_routes(&config, services.state).expect("Failed to build routes");

    // WebSocket tests need a real socket.
    let server = TestServer::builder()
        .http_transport()
        .build(app)
        .expect("Failed to create test server");

    TestApp {
        server,
        state,
        gate,
        _temp_dir: temp_dir,
    }
}

fn create_test_config(temp_dir: &TempDir) -> Config {
    Config {
        api_token: TEST_TOKEN.to_string(),
        storage_dir: temp_dir.path().join("storage"),
        upload_dir: temp_dir.path().join("uploads"),
        max_upload_bytes: 64 * 1024,
        queue_concurrency: 1,
        queue_max_depth: 10,
        queue_retry_after_secs: 7,
        // Test requests carry no peer address and share one bucket.
        rate_limit_max: 100_000,
        ..Config::default()
    }
}
