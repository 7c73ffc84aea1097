//! Common test utilities for API testing with mocks.
//!
//! Builds an in-process router with a mock catalog and fetcher injected, so
//! the full create/poll/archive/cancel flow can be exercised without a
//! network or external services.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use papyrus_core::{
    load_config_from_str,
    testing::{MockCatalog, MockFetcher},
    Assembler, Catalog, Fetcher, Governor, JobOrchestrator, JobTier, MemoryTier, TieredJobStore,
};
use papyrus_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use papyrus_core::testing::fixtures;

/// In-process server with controllable mocks.
pub struct TestFixture {
    pub router: Router,
    pub catalog: Arc<MockCatalog>,
    pub fetcher: Arc<MockFetcher>,
    pub _temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub bytes: Vec<u8>,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let config = load_config_from_str(
            r#"
[catalog]
base_url = "http://localhost:9200"
"#,
        )
        .expect("test config");

        let store = Arc::new(TieredJobStore::new(
            Arc::new(MemoryTier::new()) as Arc<dyn JobTier>,
            None,
            Arc::new(MemoryTier::new()) as Arc<dyn JobTier>,
        ));
        let catalog = Arc::new(MockCatalog::new());
        let fetcher = Arc::new(MockFetcher::new());
        let governor = Arc::new(Governor::new(4, Duration::ZERO));
        let assembler = Arc::new(Assembler::new(temp_dir.path()));

        let orchestrator = Arc::new(JobOrchestrator::new(
            store,
            Arc::clone(&catalog) as Arc<dyn Catalog>,
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            governor,
            assembler,
        ));

        let state = Arc::new(AppState::new(config, orchestrator));
        let router = create_router(state);

        Self {
            router,
            catalog,
            fetcher,
            _temp_dir: temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(Request::delete(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request(
            Request::post(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body read failed")
            .to_bytes()
            .to_vec();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            body,
            bytes,
        }
    }

    /// Poll a job until it reaches a terminal status.
    pub async fn wait_terminal(&self, job_id: &str) -> Value {
        for _ in 0..500 {
            let response = self.get(&format!("/api/v1/jobs/{}", job_id)).await;
            assert_eq!(response.status, StatusCode::OK);
            let status = response.body["status"].as_str().unwrap_or_default().to_string();
            if matches!(status.as_str(), "completed" | "failed" | "cancelled") {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not reach a terminal status", job_id);
    }
}
