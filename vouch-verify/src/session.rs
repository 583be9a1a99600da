//! Pending registration sessions.
//!
//! A registration waits in a short-lived stash between the start of the
//! protocol exchange and the provider callback.

use chrono::{DateTime, Duration, Utc};
use vouch_core::RegistrationRequest;

/// Default registration session expiration time.
const REGISTRATION_EXPIRATION_MINUTES: i64 = 5;

/// A stashed registration awaiting protocol completion.
///
/// Fields are private so callers cannot extend the expiration after the
/// session was created.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    request: RegistrationRequest,
    expires_at: DateTime<Utc>,
}

impl PendingRegistration {
    /// Stash `request` with the default time-to-live.
    #[must_use]
    pub fn new(request: RegistrationRequest) -> Self {
        Self::with_ttl(request, Duration::minutes(REGISTRATION_EXPIRATION_MINUTES))
    }

    /// Stash `request` with an explicit time-to-live.
    #[must_use]
    pub fn with_ttl(request: RegistrationRequest, ttl: Duration) -> Self {
        Self {
            request,
            expires_at: Utc::now() + ttl,
        }
    }

    /// Check if this session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Get the expiration time.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn request(&self) -> &RegistrationRequest {
        &self.request
    }

    pub fn into_request(self) -> RegistrationRequest {
        self.request
    }
}
