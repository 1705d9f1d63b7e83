//! Common test utilities for E2E tests
//!
//! Spins up a stub identity backend on an ephemeral port.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use authsession::{AppState, config};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;

/// How the stub answers `GET /api/auth/me`
#[derive(Debug, Clone)]
pub enum Behavior {
    Authenticated { id: i64, name: String },
    Anonymous,
    Unauthorized,
    Forbidden,
    ServerError,
    Malformed,
    Slow(Duration),
}

#[derive(Clone)]
struct Backend {
    behavior: Arc<Mutex<Behavior>>,
    identity_hits: Arc<AtomicUsize>,
    logout_hits: Arc<AtomicUsize>,
    stall_logout: Arc<AtomicBool>,
}

/// Stub backend instance
pub struct TestServer {
    pub addr: String,
    backend: Backend,
}

impl TestServer {
    /// Create a new stub backend answering with `behavior`
    pub async fn new(behavior: Behavior) -> Self {
        let backend = Backend {
            behavior: Arc::new(Mutex::new(behavior)),
            identity_hits: Arc::new(AtomicUsize::new(0)),
            logout_hits: Arc::new(AtomicUsize::new(0)),
            stall_logout: Arc::new(AtomicBool::new(false)),
        };

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route("/api/auth/me", get(current_identity))
            .route("/api/auth/logout", post(logout))
            .with_state(backend.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            backend,
        }
    }

    /// Application config pointing at this backend
    pub fn config(&self, timeout_ms: u64) -> config::AppConfig {
        config_for(&self.addr, timeout_ms)
    }

    /// Fresh application state pointing at this backend
    pub fn state(&self) -> AppState {
        AppState::new(self.config(2_000)).expect("state builds")
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.backend.behavior.lock().unwrap() = behavior;
    }

    /// Make `POST /api/auth/logout` accept the request and never answer
    pub fn stall_logout(&self) {
        self.backend.stall_logout.store(true, Ordering::SeqCst);
    }

    pub fn identity_hits(&self) -> usize {
        self.backend.identity_hits.load(Ordering::SeqCst)
    }

    pub fn logout_hits(&self) -> usize {
        self.backend.logout_hits.load(Ordering::SeqCst)
    }
}

/// Application config for an arbitrary backend address
pub fn config_for(base_url: &str, timeout_ms: u64) -> config::AppConfig {
    config::AppConfig {
        authority: config::AuthorityConfig {
            base_url: base_url.to_string(),
            identity_path: "/api/auth/me".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            timeout_ms,
        },
        session: config::SessionConfig {
            policy: authsession::session::ReconcilePolicy::TrustAuthenticated,
            recheck_interval_seconds: 0,
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

async fn current_identity(State(backend): State<Backend>) -> Response {
    backend.identity_hits.fetch_add(1, Ordering::SeqCst);
    let behavior = backend.behavior.lock().unwrap().clone();

    match behavior {
        Behavior::Authenticated { id, name } => axum::Json(serde_json::json!({
            "authenticated": true,
            "identity": { "id": id, "name": name },
        }))
        .into_response(),
        Behavior::Anonymous => {
            axum::Json(serde_json::json!({ "authenticated": false })).into_response()
        }
        Behavior::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        Behavior::Forbidden => StatusCode::FORBIDDEN.into_response(),
        Behavior::ServerError => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Behavior::Malformed => (StatusCode::OK, "<html>not json</html>").into_response(),
        Behavior::Slow(delay) => {
            tokio::time::sleep(delay).await;
            axum::Json(serde_json::json!({
                "authenticated": true,
                "identity": { "id": 1, "name": "Alice" },
            }))
            .into_response()
        }
    }
}

async fn logout(State(backend): State<Backend>) -> StatusCode {
    backend.logout_hits.fetch_add(1, Ordering::SeqCst);
    if backend.stall_logout.load(Ordering::SeqCst) {
        std::future::pending::<()>().await;
    }
    *backend.behavior.lock().unwrap() = Behavior::Anonymous;
    StatusCode::NO_CONTENT
}
