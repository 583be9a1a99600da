//! Durable relying-party bookkeeping.
//!
//! The protocol exchange needs two kinds of persistent state: replay nonces
//! from positive assertions and association-secret records. Both are opaque
//! to the admission core; the orchestrator consumes only the cleanup hook.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Maximum age (and future skew) tolerated for a response nonce, in seconds.
pub const NONCE_SKEW_SECS: i64 = 600;

/// Failure of the backing state store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("relying-party state unavailable: {0}")]
pub struct StateError(pub String);

/// A replay nonce as received in a positive assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseNonce {
    /// Provider endpoint the nonce was issued by.
    pub server_url: String,
    pub timestamp: DateTime<Utc>,
    pub salt: String,
}

impl ResponseNonce {
    /// Parse the wire form: a `YYYY-MM-DDThh:mm:ssZ` UTC instant
    /// immediately followed by opaque salt characters.
    #[must_use]
    pub fn parse(server_url: &str, raw: &str) -> Option<Self> {
        // The timestamp portion has a fixed width of 20 characters.
        if raw.len() < 20 || !raw.is_char_boundary(20) {
            return None;
        }
        let (ts, salt) = raw.split_at(20);
        let timestamp = DateTime::parse_from_rfc3339(ts).ok()?;
        Some(Self {
            server_url: server_url.to_string(),
            timestamp: timestamp.with_timezone(&Utc),
            salt: salt.to_string(),
        })
    }

    /// Whether the nonce timestamp falls within the accepted skew window
    /// around `now`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.timestamp).num_seconds().abs() <= NONCE_SKEW_SECS
    }
}

/// An association-secret record kept on behalf of the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRecord {
    pub server_url: String,
    pub handle: String,
    /// Opaque secret material; never interpreted here.
    pub secret: Vec<u8>,
    pub assoc_type: String,
    pub issued: DateTime<Utc>,
    pub lifetime_secs: i64,
}

impl AssociationRecord {
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued + Duration::seconds(self.lifetime_secs)
    }
}

/// Durable protocol bookkeeping consumed by verifier implementations.
///
/// Only [`cleanup`](Self::cleanup) is invoked by the registration
/// orchestrator; the remaining operations are protocol plumbing.
#[async_trait]
pub trait RelyingPartyState: Send + Sync {
    /// Record a nonce. Returns false when the nonce is stale or was already
    /// seen, in which case the assertion must be rejected as a replay.
    async fn use_nonce(&self, nonce: &ResponseNonce) -> Result<bool, StateError>;

    /// Persist an association record, replacing any previous record with
    /// the same server URL and handle.
    async fn save_association(&self, assoc: &AssociationRecord) -> Result<(), StateError>;

    /// Drop the association named by a provider's `invalidate_handle`.
    async fn invalidate_association(&self, server_url: &str, handle: &str)
        -> Result<(), StateError>;

    /// Delete nonces outside the skew window and associations past their
    /// lifetime. Returns the number of rows removed; idempotent.
    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, StateError>;
}

/// Lower bound of the nonce freshness window around `now`; anything at or
/// before this instant is sweepable.
#[must_use]
pub fn nonce_horizon(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(NONCE_SKEW_SECS)
}
