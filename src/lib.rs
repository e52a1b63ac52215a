//! # journal-state
//!
//! State coordination core for the journaling/coaching dashboard client.
//!
//! Two independent pieces:
//! - [`session::SessionCoordinator`] coalesces concurrent "who am I" requests
//!   into one identity fetch and absorbs rate limiting with a fixed backoff.
//! - [`autosave::AutoSaveStore`] debounces persistence of an editing session
//!   and keeps a bounded undo/redo history.
//!
//! Both talk to the outside world only through the [`identity::IdentityService`]
//! and [`storage::DurableStore`] traits.

pub mod autosave;
pub mod config;
pub mod history;
pub mod identity;
pub mod session;
pub mod storage;

pub use autosave::{AutoSaveConfig, AutoSaveStore};
pub use config::Config;
pub use identity::{HttpIdentityService, IdentityError, IdentityService, UserRecord};
pub use session::{AuthError, Session, SessionConfig, SessionCoordinator, SessionError};
pub use storage::{DurableStore, FileStore, MemoryStore, StorageError, StorageScopes};
