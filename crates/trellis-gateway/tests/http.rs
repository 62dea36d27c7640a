//! Gateway surface tests: the admin API and the dynamic entry point,
//! driven through the axum router with a scripted engine behind the
//! manager.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use extism::UserData;
use http_body_util::BodyExt as _;
use tower::ServiceExt as _;

use trellis_core::script_abi::{
    HandlerInvocation, InvocationKind, RouteRegistration, RouteResponse,
};
use trellis_core::{HandlerId, ProjectId, ProjectSlug};
use trellis_gateway::{AppState, build_router};
use trellis_modules::{HostState, ModuleRegistry, NoPlugins};
use trellis_runtime::engine::{EngineError, EngineFactory, SandboxLimits, ScriptEngine};
use trellis_runtime::{RuntimeManager, RuntimeOptions};
use trellis_storage::kv::MemoryKvStore;
use trellis_storage::projects::{MemoryProjectStore, ProjectRecord, ReleaseArtifact};

struct PingEngine {
    user_data: UserData<HostState>,
}

impl ScriptEngine for PingEngine {
    fn boot(&mut self) -> Result<(), EngineError> {
        let ud = self
            .user_data
            .get()
            .map_err(|e| EngineError::new(e.to_string()))?;
        let mut state = ud.lock().map_err(|_| EngineError::new("state poisoned"))?;
        state.manifest.routes.push(RouteRegistration {
            method: "GET".into(),
            path: "/ping".into(),
            handler: HandlerId(0),
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn invoke(
        &mut self,
        invocation: &HandlerInvocation,
    ) -> Result<Option<RouteResponse>, EngineError> {
        match invocation.kind {
            InvocationKind::Route => Ok(Some(RouteResponse::ok(r#"{"status":"ok"}"#))),
            InvocationKind::Job | InvocationKind::Task => Ok(None),
        }
    }
}

struct PingFactory;

impl EngineFactory for PingFactory {
    fn create(
        &self,
        _wasm: &[u8],
        user_data: UserData<HostState>,
        _limits: &SandboxLimits,
    ) -> Result<Box<dyn ScriptEngine>, EngineError> {
        Ok(Box::new(PingEngine { user_data }))
    }
}

async fn gateway() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryProjectStore::new());
    store
        .upsert(ProjectRecord {
            id: ProjectId::from_static("alpha"),
            slug: ProjectSlug::from_static("alpha"),
            running: false,
            release: Some(ReleaseArtifact {
                version: "v1".into(),
                wasm: vec![0x00, 0x61, 0x73, 0x6d],
            }),
            env: HashMap::new(),
            goals: HashMap::new(),
        })
        .await;
    let modules = ModuleRegistry::new(
        Arc::new(MemoryKvStore::new()),
        dir.path(),
        Arc::new(NoPlugins),
    )
    .unwrap();
    let manager = Arc::new(RuntimeManager::new(
        store,
        modules,
        Box::new(PingFactory),
        RuntimeOptions::default(),
    ));
    (build_router(AppState { manager }), dir)
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, value)
}

#[tokio::test(flavor = "multi_thread")]
async fn health_endpoint_answers() {
    let (app, _dir) = gateway().await;
    let (status, body) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn full_lifecycle_through_the_api() {
    let (app, _dir) = gateway().await;

    // Not started yet: the slug is known but nothing is serving.
    let (status, _) = send(&app, "GET", "/r/alpha/ping").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(&app, "POST", "/api/projects/alpha/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["started"], true);

    let (status, body) = send(&app, "GET", "/r/alpha/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, "GET", "/api/projects/alpha/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "running");
    assert_eq!(body["version"], "v1");

    // Starting again conflicts.
    let (status, _) = send(&app, "POST", "/api/projects/alpha/start").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", "/api/projects/alpha/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], true);
    assert_eq!(body["timed_out"], false);

    let (status, _) = send(&app, "GET", "/r/alpha/ping").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_things_are_404() {
    let (app, _dir) = gateway().await;

    let (status, _) = send(&app, "GET", "/r/ghost/ping").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/api/projects/ghost/start").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/projects/Not%20Valid/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Running instance, no matching route.
    send(&app, "POST", "/api/projects/alpha/start").await;
    let (status, _) = send(&app, "GET", "/r/alpha/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn logs_endpoint_pages() {
    let (app, _dir) = gateway().await;
    send(&app, "POST", "/api/projects/alpha/start").await;

    let (status, body) = send(&app, "GET", "/api/projects/alpha/logs?offset=0&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_array());

    let (status, _) = send(&app, "GET", "/api/projects/ghost/logs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
