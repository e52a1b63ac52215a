//! Identity service collaborator: who is logged in, and logging out.
//!
//! DESIGN
//! ======
//! `IdentityService` is an async trait so the session coordinator can be
//! driven by mocks in tests. `HttpIdentityService` is the production adapter
//! talking to the dashboard API (`/api/auth/me`, `/api/auth/logout`).
//!
//! ERROR HANDLING
//! ==============
//! Every failure is an `IdentityError` carrying a message and, when the
//! failure came from an HTTP response, its status. A known status decides
//! rate limiting on its own; only status-less errors fall back to looking for
//! a delimited marker (`status 429`, `Too Many Requests`) in the message,
//! since some transports only surface the status as text.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const RATE_LIMIT_MARKERS: [&str; 4] = ["too many requests", "status 429", "status: 429", "status code 429"];
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// The authenticated user as reported by the identity endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique user identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct IdentityError {
    pub message: String,
    pub status: Option<u16>,
}

impl IdentityError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: None }
    }

    #[must_use]
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self { message: message.into(), status: Some(status) }
    }

    /// True when the failure is the server asking us to slow down.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        if let Some(status) = self.status {
            return status == StatusCode::TOO_MANY_REQUESTS.as_u16();
        }
        let message = self.message.to_ascii_lowercase();
        RATE_LIMIT_MARKERS.iter().any(|marker| message.contains(marker))
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(e: reqwest::Error) -> Self {
        Self { message: e.to_string(), status: e.status().map(|s| s.as_u16()) }
    }
}

// =============================================================================
// SERVICE TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait IdentityService: Send + Sync {
    /// Fetch the identity behind the current credentials.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the user is not authenticated, the
    /// request is rate limited, or the transport fails.
    async fn fetch_current_user(&self) -> Result<UserRecord, IdentityError>;

    /// End the server-side session.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the logout request fails.
    async fn logout(&self) -> Result<(), IdentityError>;
}

// =============================================================================
// HTTP ADAPTER
// =============================================================================

pub struct HttpIdentityService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpIdentityService {
    /// Build an adapter for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn status_failure(action: &str, status: StatusCode) -> IdentityError {
    IdentityError::with_status(status.as_u16(), format!("{action} failed: {}", status.as_u16()))
}

#[async_trait::async_trait]
impl IdentityService for HttpIdentityService {
    async fn fetch_current_user(&self) -> Result<UserRecord, IdentityError> {
        let resp = self.http.get(self.endpoint("/api/auth/me")).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(status_failure("identity fetch", status));
        }
        Ok(resp.json::<UserRecord>().await?)
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        let resp = self.http.post(self.endpoint("/api/auth/logout")).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(status_failure("logout", status));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
