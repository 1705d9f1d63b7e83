//! Authentication session state machine
//!
//! ```text
//!            login(identity)                 logout()
//!   any ─────────────────────▶ Authenticated   any ──────────▶ Anonymous
//!
//!   Unknown / Anonymous ── reconcile() ──▶ Checking ──┬─▶ Authenticated
//!                                                     └─▶ Anonymous (negative, error, timeout)
//! ```
//!
//! Each identity check runs on its own task and applies its result itself,
//! so `Checking` resolves even when every `reconcile()` caller has gone away.
//! Overlapping `reconcile()` calls wait on the same check. Checks are stamped
//! with a generation; `login` and `logout` advance the generation and abort
//! the running check so its answer never overwrites the newer state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use super::authority::{AuthorityResponse, IdentityAuthority};
use super::identity::Identity;
use super::state::{ReconcilePolicy, SessionState, SessionStatus};
use crate::error::AppError;
use crate::metrics::{
    ERRORS_TOTAL, RECONCILE_TOTAL, REMOTE_CHECK_DURATION_SECONDS, REMOTE_CHECKS_TOTAL,
    TRANSITIONS_TOTAL,
};

/// Buffered transitions per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 16;

/// Completion of a spawned check, awaitable by every joiner
type CheckDone = Shared<BoxFuture<'static, ()>>;

struct InFlight {
    generation: u64,
    done: CheckDone,
    abort: AbortHandle,
}

struct Inner {
    state: SessionState,
    generation: u64,
    in_flight: Option<InFlight>,
}

/// State shared between the session and its check tasks
struct Core {
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionState>,
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut Inner, next: SessionState) {
        let from = inner.state.status();
        let to = next.status();
        tracing::debug!(from = from.as_str(), to = to.as_str(), "Session transition");
        TRANSITIONS_TOTAL.with_label_values(&[to.as_str()]).inc();

        inner.state = next;
        // No subscribers is fine
        let _ = self.events.send(inner.state.clone());
    }

    /// Apply a check result if that check is still the active one
    fn finish_check(&self, generation: u64, verified: Option<Identity>) {
        let mut inner = self.lock();
        let is_active = matches!(
            &inner.in_flight,
            Some(in_flight) if in_flight.generation == generation
        );
        if !is_active {
            RECONCILE_TOTAL.with_label_values(&["stale"]).inc();
            tracing::debug!(generation, "Discarding superseded identity check");
            return;
        }

        inner.in_flight = None;
        let next = match verified {
            Some(identity) => SessionState::Authenticated(identity),
            None => SessionState::Anonymous,
        };
        self.transition(&mut inner, next);
    }

    /// Invalidate any running check so its result is ignored
    fn supersede_check(inner: &mut Inner) {
        inner.generation += 1;
        if let Some(in_flight) = inner.in_flight.take() {
            in_flight.abort.abort();
            tracing::debug!(
                generation = in_flight.generation,
                "Identity check superseded"
            );
        }
    }
}

/// Client-side authentication session
///
/// Construct one per process and share it (`Arc<AuthSession>`). All
/// operations take `&self`; the internal lock is never held across an
/// await point. `reconcile()` must be called from within a Tokio runtime.
pub struct AuthSession {
    authority: Arc<dyn IdentityAuthority>,
    policy: ReconcilePolicy,
    timeout: Duration,
    core: Arc<Core>,
}

impl AuthSession {
    /// Create a session in the `Unknown` state
    ///
    /// # Arguments
    /// * `authority` - Remote identity authority queried by `reconcile()`
    /// * `timeout` - Upper bound for a single identity check
    pub fn new(authority: Arc<dyn IdentityAuthority>, timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            authority,
            policy: ReconcilePolicy::default(),
            timeout,
            core: Arc::new(Core {
                inner: Mutex::new(Inner {
                    state: SessionState::Unknown,
                    generation: 0,
                    in_flight: None,
                }),
                events,
            }),
        }
    }

    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.core.lock().state.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.core.lock().state.status()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.core.lock().state.identity().cloned()
    }

    pub fn loading(&self) -> bool {
        self.core.lock().state.loading()
    }

    /// Receive every state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.core.events.subscribe()
    }

    /// Mark the session as signed in with `identity`
    pub fn login(&self, identity: Identity) {
        let mut inner = self.core.lock();
        Core::supersede_check(&mut inner);
        tracing::info!(user_id = identity.id, "Session logged in");
        self.core
            .transition(&mut inner, SessionState::Authenticated(identity));
    }

    /// Mark the session as signed out
    pub fn logout(&self) {
        let mut inner = self.core.lock();
        Core::supersede_check(&mut inner);
        tracing::info!("Session logged out");
        self.core.transition(&mut inner, SessionState::Anonymous);
    }

    /// Bring the session in line with the identity authority
    ///
    /// Never fails: a negative answer, a transport error, a malformed
    /// payload and a timeout all end in `Anonymous`. When a check is already
    /// running, this call waits for that check instead of starting another.
    /// Dropping the returned future does not cancel the check.
    pub async fn reconcile(&self) {
        let done = {
            let mut inner = self.core.lock();

            if inner.state.is_authenticated() && self.policy == ReconcilePolicy::TrustAuthenticated
            {
                RECONCILE_TOTAL.with_label_values(&["short_circuit"]).inc();
                tracing::debug!("Session already authenticated; skipping identity check");
                return;
            }

            if let Some(in_flight) = &inner.in_flight {
                RECONCILE_TOTAL.with_label_values(&["coalesced"]).inc();
                tracing::debug!(
                    generation = in_flight.generation,
                    "Joining in-flight identity check"
                );
                in_flight.done.clone()
            } else {
                RECONCILE_TOTAL.with_label_values(&["started"]).inc();
                inner.generation += 1;
                let generation = inner.generation;
                // The task blocks on this lock before applying, so
                // `in_flight` is in place before it can finish.
                let in_flight = self.spawn_check(generation);
                let done = in_flight.done.clone();
                inner.in_flight = Some(in_flight);

                // A revalidation keeps the current identity visible until
                // the authority answers.
                if !inner.state.is_authenticated() {
                    self.core.transition(&mut inner, SessionState::Checking);
                }
                done
            }
        };

        done.await;
    }

    fn spawn_check(&self, generation: u64) -> InFlight {
        let authority = Arc::clone(&self.authority);
        let core = Arc::clone(&self.core);
        let timeout = self.timeout;

        let handle = tokio::spawn(async move {
            let verified = query_authority(authority.as_ref(), timeout).await;
            core.finish_check(generation, verified);
        });
        let abort = handle.abort_handle();
        let done = handle.map(|_| ()).boxed().shared();

        InFlight {
            generation,
            done,
            abort,
        }
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        if let Some(in_flight) = self.core.lock().in_flight.take() {
            in_flight.abort.abort();
        }
    }
}

/// Run one bounded query and reduce it to the identity it vouches for
async fn query_authority(
    authority: &dyn IdentityAuthority,
    timeout: Duration,
) -> Option<Identity> {
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, authority.current_identity()).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(timeout)),
    };
    REMOTE_CHECK_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

    match result.and_then(AuthorityResponse::into_identity) {
        Ok(Some(identity)) => {
            REMOTE_CHECKS_TOTAL.with_label_values(&["authenticated"]).inc();
            tracing::info!(user_id = identity.id, "Identity authority confirmed session");
            Some(identity)
        }
        Ok(None) => {
            REMOTE_CHECKS_TOTAL.with_label_values(&["anonymous"]).inc();
            tracing::debug!("Identity authority reports no session");
            None
        }
        Err(error) => {
            REMOTE_CHECKS_TOTAL.with_label_values(&["failed"]).inc();
            ERRORS_TOTAL.with_label_values(&[error.error_type()]).inc();
            if error.is_reconciliation_failure() {
                tracing::warn!(%error, "Identity check failed; treating session as anonymous");
            } else {
                tracing::error!(%error, "Identity check errored; treating session as anonymous");
            }
            None
        }
    }
}
