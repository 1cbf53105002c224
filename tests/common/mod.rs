//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tempfile::TempDir;
use tokio::net::TcpListener;

use fedpress::config::FederationConfig;
use fedpress::{build_router, FederationRuntime};

/// Test server instance
pub struct TestServer {
    /// http://127.0.0.1:{port}
    pub addr: String,
    pub runtime: FederationRuntime,
    pub client: reqwest::Client,
    pub _temp_dir: TempDir,
}

impl TestServer {
    /// Server with the default test configuration
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Server with a customized configuration
    ///
    /// The base URL is `https://test.example.com`; state lives in a temp
    /// directory behind the filesystem store.
    pub async fn with_config(mutate: impl FnOnce(&mut FederationConfig)) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut config = FederationConfig::for_base_url(
            "https://test.example.com",
            PathBuf::from(temp_dir.path()),
        );
        mutate(&mut config);

        let runtime = FederationRuntime::new(config).expect("runtime");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = format!("http://{}", listener.local_addr().expect("local addr"));
        let app = build_router(runtime.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server");
        });

        Self {
            addr,
            runtime,
            client: reqwest::Client::new(),
            _temp_dir: temp_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

#[derive(Clone)]
struct StubState {
    addr: Arc<std::sync::OnceLock<String>>,
    inbox_hits: Arc<AtomicUsize>,
    inbox_status: Arc<AtomicU16>,
}

/// A stub remote instance: an inbox with a configurable status code and
/// actor documents pointing at it
pub struct StubRemote {
    pub addr: String,
    pub inbox_hits: Arc<AtomicUsize>,
    inbox_status: Arc<AtomicU16>,
}

impl StubRemote {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = format!("http://{}", listener.local_addr().expect("local addr"));

        let state = StubState {
            addr: Arc::new(std::sync::OnceLock::new()),
            inbox_hits: Arc::new(AtomicUsize::new(0)),
            inbox_status: Arc::new(AtomicU16::new(200)),
        };
        state.addr.set(addr.clone()).expect("addr set once");

        let inbox_hits = state.inbox_hits.clone();
        let inbox_status = state.inbox_status.clone();
        let app = Router::new()
            .route("/inbox", post(stub_inbox))
            .route("/users/:name", get(stub_actor))
            .with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub server");
        });

        Self {
            addr,
            inbox_hits,
            inbox_status,
        }
    }

    /// URI of an actor served by this stub
    pub fn actor_uri(&self, name: &str) -> String {
        format!("{}/users/{}", self.addr, name)
    }

    pub fn inbox_url(&self) -> String {
        format!("{}/inbox", self.addr)
    }

    /// Status code the inbox answers with from now on
    pub fn set_inbox_status(&self, code: u16) {
        self.inbox_status.store(code, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.inbox_hits.load(Ordering::SeqCst)
    }
}

async fn stub_inbox(State(state): State<StubState>) -> StatusCode {
    state.inbox_hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::from_u16(state.inbox_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn stub_actor(
    State(state): State<StubState>,
    Path(name): Path<String>,
) -> Json<serde_json::Value> {
    let addr = state.addr.get().expect("addr set");
    Json(serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": format!("{}/users/{}", addr, name),
        "type": "Person",
        "preferredUsername": name,
        "inbox": format!("{}/inbox", addr),
        "outbox": format!("{}/users/{}/outbox", addr, name)
    }))
}
