//! Session state
//!
//! The identity lives inside the `Authenticated` variant, so "identity is
//! present exactly when authenticated" cannot be violated by any value of
//! this type.

use serde::{Deserialize, Serialize};

use super::identity::Identity;

/// Coarse authentication status, without the identity payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Nothing known yet (initial)
    Unknown,
    /// Identity check in flight
    Checking,
    /// Signed in
    Authenticated,
    /// Signed out, or the check failed
    Anonymous,
}

impl SessionStatus {
    /// Metric label
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Unknown => "unknown",
            SessionStatus::Checking => "checking",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Anonymous => "anonymous",
        }
    }
}

/// Full session state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "identity", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unknown,
    Checking,
    Authenticated(Identity),
    Anonymous,
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Unknown => SessionStatus::Unknown,
            SessionState::Checking => SessionStatus::Checking,
            SessionState::Authenticated(_) => SessionStatus::Authenticated,
            SessionState::Anonymous => SessionStatus::Anonymous,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// True while the status is not yet settled
    pub fn loading(&self) -> bool {
        matches!(self, SessionState::Unknown | SessionState::Checking)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// What `reconcile()` does when the session is already authenticated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Trust the in-memory identity and skip the remote check
    #[default]
    TrustAuthenticated,
    /// Query the authority anyway; stay authenticated while the query runs
    Revalidate,
}
