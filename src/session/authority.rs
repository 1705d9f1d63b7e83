//! Remote identity authority
//!
//! The backend is the only trust source for "who is signed in". The session
//! asks it through [`IdentityAuthority`]; [`HttpIdentityAuthority`] is the
//! REST implementation used by the application.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use url::Url;

use super::identity::Identity;
use crate::config::AuthorityConfig;
use crate::error::AppError;

/// Answer of the identity authority
///
/// Wire shape: `{ "authenticated": bool, "identity": { ... } }`, where
/// `identity` is only meaningful when `authenticated` is true.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthorityResponse {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

impl AuthorityResponse {
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            authenticated: true,
            identity: Some(identity),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            identity: None,
        }
    }

    /// Reduce the answer to the identity it vouches for
    ///
    /// # Errors
    /// `MalformedPayload` when the authority claims an authenticated session
    /// but sends no identity.
    pub fn into_identity(self) -> Result<Option<Identity>, AppError> {
        match (self.authenticated, self.identity) {
            (true, Some(identity)) => Ok(Some(identity)),
            (true, None) => Err(AppError::MalformedPayload(
                "authenticated response without identity".to_string(),
            )),
            (false, _) => Ok(None),
        }
    }
}

/// Source of truth for the current identity
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    /// Ask who the current client is signed in as
    async fn current_identity(&self) -> Result<AuthorityResponse, AppError>;
}

/// REST identity authority
///
/// Issues `GET {base_url}{identity_path}`. Session cookies are carried by
/// the shared `reqwest::Client`. Every request is bounded by
/// `authority.timeout_ms`.
pub struct HttpIdentityAuthority {
    http_client: Arc<reqwest::Client>,
    identity_url: Url,
    logout_url: Url,
    timeout: Duration,
}

impl HttpIdentityAuthority {
    /// Build the authority from configuration
    ///
    /// # Errors
    /// Returns `InvalidUrl` if the base URL and paths do not form valid URLs
    pub fn new(
        http_client: Arc<reqwest::Client>,
        config: &AuthorityConfig,
    ) -> Result<Self, AppError> {
        Ok(Self {
            http_client,
            identity_url: endpoint_url(&config.base_url, &config.identity_path)?,
            logout_url: endpoint_url(&config.base_url, &config.logout_path)?,
            timeout: config.timeout(),
        })
    }

    pub fn identity_url(&self) -> &Url {
        &self.identity_url
    }

    /// End the server-side session with `POST {base_url}{logout_path}`
    ///
    /// # Errors
    /// Transport errors, timeouts and non-success statuses are returned; the
    /// caller decides whether they matter.
    pub async fn end_remote_session(&self) -> Result<(), AppError> {
        let response = self
            .http_client
            .post(self.logout_url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UnexpectedStatus(status.as_u16()));
        }

        tracing::debug!(url = %self.logout_url, "Remote session ended");
        Ok(())
    }

    fn request_error(&self, error: reqwest::Error) -> AppError {
        if error.is_timeout() {
            AppError::Timeout(self.timeout)
        } else {
            AppError::HttpClient(error)
        }
    }
}

#[async_trait]
impl IdentityAuthority for HttpIdentityAuthority {
    async fn current_identity(&self) -> Result<AuthorityResponse, AppError> {
        tracing::debug!(url = %self.identity_url, "Querying identity authority");

        let response = self
            .http_client
            .get(self.identity_url.clone())
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(AuthorityResponse::anonymous());
        }
        if !status.is_success() {
            return Err(AppError::UnexpectedStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.request_error(e))?;
        serde_json::from_slice(&body).map_err(|e| AppError::MalformedPayload(e.to_string()))
    }
}

/// Join base URL and endpoint path, keeping any path prefix on the base
fn endpoint_url(base_url: &str, path: &str) -> Result<Url, AppError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}
