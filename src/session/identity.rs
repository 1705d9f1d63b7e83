//! Authenticated user identity

use serde::{Deserialize, Serialize};

/// Minimal profile of the signed-in user, as returned by the backend.
///
/// Replaced wholesale on every login or successful reconciliation; never
/// patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Backend user ID
    pub id: i64,
    /// Display name
    pub name: String,
    /// Email address, when the backend exposes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
