//! Auto-save store: debounced persistence plus undo/redo history.
//!
//! DESIGN
//! ======
//! `update` changes the live value at once and (re)schedules a commit task
//! that sleeps for the debounce interval. Each new `update` aborts the
//! previous task, so a burst of edits lands as one history entry and one
//! durable write. `undo`/`redo` are synchronous and write through.
//!
//! All mutation happens under one `Mutex` that is never held across an
//! `.await`. A commit task only commits if it is still the registered pending
//! commit when it takes the lock, which closes the window where a task has
//! already woken when `update` or `dispose` aborts it. The task holds a
//! `Weak` reference, so dropping the store drops the state even if a timer is
//! outstanding.
//!
//! `undo`/`redo` settle a pending commit before moving the cursor: undo
//! always steps back from the latest edit, and a late commit can never
//! overwrite an undo.
//!
//! ERROR HANDLING
//! ==============
//! Durable writes are best-effort. Serialization and storage failures are
//! logged; `current`, history, and cursor are unaffected.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::history::{DEFAULT_HISTORY_CAPACITY, History};
use crate::storage::DurableStore;

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoSaveConfig {
    /// Quiet period after the last `update` before it is committed.
    pub debounce: Duration,
    /// Maximum number of history snapshots kept.
    pub history_capacity: usize,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS), history_capacity: DEFAULT_HISTORY_CAPACITY }
    }
}

// =============================================================================
// STATE
// =============================================================================

struct PendingCommit {
    id: u64,
    task: JoinHandle<()>,
}

struct AutoSaveState<T> {
    current: T,
    history: History<T>,
    pending: Option<PendingCommit>,
    commits_scheduled: u64,
    disposed: bool,
}

struct Shared<T> {
    key: String,
    storage: Arc<dyn DurableStore>,
    state: Mutex<AutoSaveState<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, AutoSaveState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispose(&self) {
        let mut state = self.lock();
        if let Some(pending) = state.pending.take() {
            pending.task.abort();
            debug!(key = %self.key, "pending autosave cancelled on dispose");
        }
        state.disposed = true;
    }
}

impl<T: Clone + Serialize> Shared<T> {
    fn fire(&self, id: u64) {
        let mut state = self.lock();
        if state.pending.as_ref().is_none_or(|p| p.id != id) {
            return;
        }
        state.pending = None;
        self.commit_locked(&mut state);
    }

    /// Commit the live value if a commit is pending.
    fn settle_locked(&self, state: &mut AutoSaveState<T>) {
        if let Some(pending) = state.pending.take() {
            pending.task.abort();
            self.commit_locked(state);
        }
    }

    fn commit_locked(&self, state: &mut AutoSaveState<T>) {
        let value = state.current.clone();
        state.history.commit(value);
        debug!(
            key = %self.key,
            cursor = state.history.cursor(),
            len = state.history.len(),
            "autosave committed"
        );
        self.persist_locked(state);
    }

    fn persist_locked(&self, state: &AutoSaveState<T>) {
        if state.disposed {
            return;
        }
        let value = match serde_json::to_value(&state.current) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %self.key, error = %e, "autosave value not serializable; skipping write");
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.key, &value) {
            warn!(key = %self.key, error = %e, "autosave write failed");
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Debounced, history-tracking container for one editing session.
///
/// Dropping the store cancels any pending commit.
pub struct AutoSaveStore<T> {
    shared: Arc<Shared<T>>,
    debounce: Duration,
}

impl<T> AutoSaveStore<T>
where
    T: Clone + Serialize + Send + 'static,
{
    /// Start a session at `initial`. Nothing is written until the first
    /// commit.
    #[must_use]
    pub fn new(key: impl Into<String>, initial: T, storage: Arc<dyn DurableStore>, config: AutoSaveConfig) -> Self {
        let history = History::new(initial.clone(), config.history_capacity);
        Self {
            shared: Arc::new(Shared {
                key: key.into(),
                storage,
                state: Mutex::new(AutoSaveState {
                    current: initial,
                    history,
                    pending: None,
                    commits_scheduled: 0,
                    disposed: false,
                }),
            }),
            debounce: config.debounce,
        }
    }

    /// Start a session from the value previously persisted under `key`,
    /// or from `fallback` if there is none or it cannot be read. Loading
    /// never writes.
    #[must_use]
    pub fn restore(key: impl Into<String>, fallback: T, storage: Arc<dyn DurableStore>, config: AutoSaveConfig) -> Self
    where
        T: DeserializeOwned,
    {
        let key = key.into();
        let initial = match storage.get(&key) {
            Ok(Some(raw)) => match serde_json::from_value::<T>(raw) {
                Ok(value) => {
                    debug!(%key, "autosave restored persisted value");
                    value
                }
                Err(e) => {
                    warn!(%key, error = %e, "persisted autosave value unreadable; using fallback");
                    fallback
                }
            },
            Ok(None) => fallback,
            Err(e) => {
                warn!(%key, error = %e, "autosave load failed; using fallback");
                fallback
            }
        };
        Self::new(key, initial, storage, config)
    }

    /// Replace the live value and (re)start the debounce timer.
    ///
    /// Must be called from within a Tokio runtime. After `dispose` the live
    /// value still changes but nothing is scheduled.
    pub fn update(&self, value: T) {
        let mut state = self.shared.lock();
        state.current = value;
        if let Some(previous) = state.pending.take() {
            previous.task.abort();
        }
        if state.disposed {
            return;
        }

        state.commits_scheduled += 1;
        let id = state.commits_scheduled;
        let deadline = Instant::now() + self.debounce;
        let shared = Arc::downgrade(&self.shared);
        let task = tokio::spawn(fire_after(shared, id, deadline));
        state.pending = Some(PendingCommit { id, task });
    }

    /// Step back one snapshot and persist it immediately. No-op at the
    /// oldest snapshot.
    pub fn undo(&self) {
        let mut state = self.shared.lock();
        self.shared.settle_locked(&mut state);
        let Some(value) = state.history.undo().cloned() else {
            return;
        };
        state.current = value;
        self.shared.persist_locked(&state);
    }

    /// Step forward one snapshot and persist it immediately. No-op at the
    /// newest snapshot.
    pub fn redo(&self) {
        let mut state = self.shared.lock();
        self.shared.settle_locked(&mut state);
        let Some(value) = state.history.redo().cloned() else {
            return;
        };
        state.current = value;
        self.shared.persist_locked(&state);
    }

    /// Commit a pending update now instead of waiting for the timer.
    pub fn flush(&self) {
        let mut state = self.shared.lock();
        self.shared.settle_locked(&mut state);
    }

    /// The live value, including uncommitted updates.
    #[must_use]
    pub fn current(&self) -> T {
        self.shared.lock().current.clone()
    }

    /// Committed snapshots, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<T> {
        self.shared.lock().history.entries().cloned().collect()
    }
}

impl<T> AutoSaveStore<T> {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.shared.key
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.shared.lock().history.cursor()
    }

    /// True if `undo` would change the live value. A pending update counts:
    /// `undo` settles it first and then steps back from it.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        let state = self.shared.lock();
        state.pending.is_some() || state.history.can_undo()
    }

    /// True if `redo` would change the live value. A pending update truncates
    /// the redo tail when it is settled, so there is nothing to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        let state = self.shared.lock();
        state.pending.is_none() && state.history.can_redo()
    }

    /// True while an update is waiting for its debounce timer.
    #[must_use]
    pub fn has_pending_commit(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    /// End the editing session: cancel the pending commit and stop all
    /// further durable writes.
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

impl<T> Drop for AutoSaveStore<T> {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

async fn fire_after<T>(shared: Weak<Shared<T>>, id: u64, deadline: Instant)
where
    T: Clone + Serialize,
{
    tokio::time::sleep_until(deadline).await;
    if let Some(shared) = shared.upgrade() {
        shared.fire(id);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "autosave_test.rs"]
mod tests;
