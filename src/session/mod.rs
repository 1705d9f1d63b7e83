//! Client-side authentication session
//!
//! Handles:
//! - Session state (unknown, checking, authenticated, anonymous)
//! - Login and logout transitions
//! - Reconciliation against the backend identity authority

mod auth_session;
pub mod authority;
mod identity;
mod state;

pub use auth_session::AuthSession;
pub use authority::{AuthorityResponse, HttpIdentityAuthority, IdentityAuthority};
pub use identity::Identity;
pub use state::{ReconcilePolicy, SessionState, SessionStatus};
