//! Session coordinator: coalesced identity fetches with rate-limit backoff.
//!
//! DESIGN
//! ======
//! One `SessionCoordinator` is built at startup and cloned wherever the
//! current identity is needed. It owns a single attempt slot: the first
//! `authenticate()` caller spawns the fetch task and registers a `watch`
//! receiver in the slot; every caller arriving while the slot is occupied
//! clones that receiver and waits on the same outcome. Check-then-create
//! happens inside one lock scope, never across an `.await`.
//!
//! The attempt runs on its own task, so it settles even if every waiter
//! gives up. Rate-limited fetches are retried in a loop after a fixed
//! backoff under the same attempt; waiters keep waiting.
//!
//! ERROR HANDLING
//! ==============
//! Rate limiting is absorbed (surfaced only as a transient `SessionError`).
//! Any other failure settles the attempt and is broadcast to every waiter;
//! each decides for itself whether to call `authenticate()` again.
//! `logout()` never fails: local state is cleared even when the server-side
//! logout does not succeed. Logout bumps an epoch; an attempt started before
//! it still answers its waiters but no longer writes the session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::identity::{IdentityService, UserRecord};
use crate::storage::StorageScopes;

pub const DEFAULT_RATE_LIMIT_BACKOFF_MS: u64 = 3000;

// =============================================================================
// SESSION STATE
// =============================================================================

/// Error surfaced to the rendering layer alongside the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// The identity service is throttling us; a retry is already scheduled.
    RateLimited { message: String },
    /// The last attempt failed for a non-transient reason.
    AuthFailed { message: String },
}

/// Snapshot of the authenticated session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user: Option<UserRecord>,
    /// True only until the first authentication attempt settles.
    pub is_loading: bool,
    pub error: Option<SessionError>,
}

impl Session {
    fn initial() -> Self {
        Self { user: None, is_loading: true, error: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed: {message}")]
    Failed { message: String },
    #[error("authentication attempt ended without a result")]
    Interrupted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between rate-limited identity fetches.
    pub rate_limit_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { rate_limit_backoff: Duration::from_millis(DEFAULT_RATE_LIMIT_BACKOFF_MS) }
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

type Outcome = Result<UserRecord, AuthError>;

struct Attempt {
    id: u64,
    /// Logout epoch the attempt was started in.
    epoch: u64,
    outcome: watch::Receiver<Option<Outcome>>,
}

struct CoordinatorState {
    session: Session,
    attempt: Option<Attempt>,
    attempts_started: u64,
    logout_epoch: u64,
}

struct Inner {
    identity: Arc<dyn IdentityService>,
    storage: StorageScopes,
    config: SessionConfig,
    state: Mutex<CoordinatorState>,
}

/// Process-wide owner of the session and the in-flight authentication attempt.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

impl SessionCoordinator {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityService>, storage: StorageScopes, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity,
                storage,
                config,
                state: Mutex::new(CoordinatorState {
                    session: Session::initial(),
                    attempt: None,
                    attempts_started: 0,
                    logout_epoch: 0,
                }),
            }),
        }
    }

    /// Current session snapshot.
    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.lock_state().session.clone()
    }

    /// True while an authentication attempt is in flight.
    #[must_use]
    pub fn is_authenticating(&self) -> bool {
        self.inner.lock_state().attempt.is_some()
    }

    /// Resolve the current identity, joining the in-flight attempt if there
    /// is one.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Failed`] when the attempt this caller joined ends
    /// in a non-rate-limit failure, or [`AuthError::Interrupted`] if the
    /// attempt task died before publishing a result.
    pub async fn authenticate(&self) -> Result<UserRecord, AuthError> {
        let (id, mut outcome) = self.join_or_start();

        let result = match outcome.wait_for(Option::is_some).await {
            Ok(settled) => (*settled).clone().unwrap_or(Err(AuthError::Interrupted)),
            Err(_) => Err(AuthError::Interrupted),
        };

        if matches!(result, Err(AuthError::Interrupted)) {
            self.inner.abandon_attempt(id);
        }
        result
    }

    /// End the session. The server-side logout is best-effort; local session
    /// state and every client-side storage scope are cleared regardless.
    pub async fn logout(&self) {
        if let Err(e) = self.inner.identity.logout().await {
            warn!(error = %e, "server logout failed; clearing local session anyway");
        }

        {
            let mut state = self.inner.lock_state();
            state.logout_epoch += 1;
            state.attempt = None;
            state.session.user = None;
            state.session.error = None;
        }
        self.inner.storage.purge_all();
        info!("session cleared");
    }

    fn join_or_start(&self) -> (u64, watch::Receiver<Option<Outcome>>) {
        let mut state = self.inner.lock_state();
        if let Some(attempt) = &state.attempt {
            debug!(attempt = attempt.id, "joining in-flight authentication");
            return (attempt.id, attempt.outcome.clone());
        }

        state.attempts_started += 1;
        let id = state.attempts_started;
        let epoch = state.logout_epoch;
        let (tx, rx) = watch::channel(None);
        state.attempt = Some(Attempt { id, epoch, outcome: rx.clone() });
        drop(state);

        debug!(attempt = id, epoch, "starting authentication");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner.run_attempt(id, epoch).await;
            inner.settle(id, epoch, outcome, &tx);
        });
        (id, rx)
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_attempt(&self, id: u64, epoch: u64) -> Outcome {
        let mut rate_limited = 0_u32;
        loop {
            match self.identity.fetch_current_user().await {
                Ok(user) => return Ok(user),
                Err(e) if e.is_rate_limited() => {
                    rate_limited += 1;
                    warn!(
                        attempt = id,
                        rate_limited,
                        backoff_ms = u64::try_from(self.config.rate_limit_backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "identity fetch rate limited; retrying"
                    );
                    {
                        let mut state = self.lock_state();
                        if state.logout_epoch == epoch {
                            state.session.error = Some(SessionError::RateLimited { message: e.message });
                        }
                    }
                    tokio::time::sleep(self.config.rate_limit_backoff).await;
                }
                Err(e) => return Err(AuthError::Failed { message: e.message }),
            }
        }
    }

    fn settle(&self, id: u64, epoch: u64, outcome: Outcome, tx: &watch::Sender<Option<Outcome>>) {
        {
            let mut state = self.lock_state();
            if state.logout_epoch == epoch {
                let session = &mut state.session;
                match &outcome {
                    Ok(user) => {
                        info!(attempt = id, user_id = %user.id, "authenticated");
                        session.user = Some(user.clone());
                        session.error = None;
                    }
                    Err(e) => {
                        warn!(attempt = id, error = %e, "authentication failed");
                        session.user = None;
                        session.error = Some(SessionError::AuthFailed { message: auth_error_message(e) });
                    }
                }
            } else {
                debug!(attempt = id, epoch, "attempt settled after logout; session left cleared");
            }
            state.session.is_loading = false;
            if state.attempt.as_ref().is_some_and(|a| a.id == id) {
                state.attempt = None;
            }
        }
        tx.send_replace(Some(outcome));
    }

    /// The attempt task died without publishing. Release the slot and settle
    /// the session as failed so first-run consumers stop waiting.
    fn abandon_attempt(&self, id: u64) {
        let mut state = self.lock_state();
        let Some(attempt) = state.attempt.as_ref().filter(|a| a.id == id) else {
            return;
        };
        let current_epoch = attempt.epoch == state.logout_epoch;
        warn!(attempt = id, "authentication attempt ended without a result");
        state.attempt = None;
        state.session.is_loading = false;
        if current_epoch {
            state.session.user = None;
            state.session.error = Some(SessionError::AuthFailed { message: AuthError::Interrupted.to_string() });
        }
    }
}

fn auth_error_message(e: &AuthError) -> String {
    match e {
        AuthError::Failed { message } => message.clone(),
        AuthError::Interrupted => e.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
