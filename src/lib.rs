//! AuthSession - client-side authentication session for a social network frontend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Consumers (UI, CLI)                        │
//! │  - read status / identity / loading                         │
//! │  - subscribe to transitions                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       AuthSession                            │
//! │  - login / logout / reconcile                               │
//! │  - coalesced, generation-guarded identity checks            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Identity Authority                         │
//! │  - GET /api/auth/me (reqwest)                               │
//! │  - POST /api/auth/logout                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `session`: Session state machine and identity authority
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod config;
pub mod error;
pub mod metrics;
pub mod session;

use std::sync::Arc;

/// Application state shared by every consumer
///
/// Cloning is cheap; all members are reference counted. The session is
/// built once here and handed out, never reached through a global.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// REST identity authority
    pub authority: Arc<session::HttpIdentityAuthority>,

    /// Authentication session
    pub session: Arc<session::AuthSession>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Build the HTTP client
    /// 2. Resolve identity authority endpoints
    /// 3. Create the session in the `Unknown` state
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or the authority
    /// endpoints are invalid
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        if config.authority.is_plain_http_remote() {
            tracing::warn!(
                base_url = %config.authority.base_url,
                "Identity authority is reached over plain http"
            );
        }

        // Shared by every request so the backend session cookie is kept
        let http_client = Arc::new(
            reqwest::Client::builder()
                .user_agent(concat!("authsession/", env!("CARGO_PKG_VERSION")))
                .cookie_store(true)
                .build()?,
        );

        let authority = Arc::new(session::HttpIdentityAuthority::new(
            Arc::clone(&http_client),
            &config.authority,
        )?);

        let session = Arc::new(
            session::AuthSession::new(
                Arc::clone(&authority) as Arc<dyn session::IdentityAuthority>,
                config.authority.timeout(),
            )
            .with_policy(config.session.policy),
        );

        tracing::info!(
            identity_url = %authority.identity_url(),
            policy = ?config.session.policy,
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            authority,
            session,
        })
    }

    /// End the backend session, then sign the local session out
    ///
    /// The local logout always happens; a failed or timed-out remote call is
    /// only logged.
    pub async fn sign_out(&self) {
        if let Err(error) = self.authority.end_remote_session().await {
            metrics::ERRORS_TOTAL
                .with_label_values(&[error.error_type()])
                .inc();
            tracing::warn!(%error, "Remote logout failed");
        }
        self.session.logout();
    }
}
