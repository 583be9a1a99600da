//! Terminal outcomes of a verification exchange.

use serde::{Deserialize, Serialize};

/// Identity asserted by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    /// Identity string as asserted by the provider.
    pub identity_url: String,
    /// Canonical identifier, when the provider supplies one.
    pub canonical_id: Option<String>,
}

impl VerifiedIdentity {
    pub fn new(identity_url: impl Into<String>) -> Self {
        Self {
            identity_url: identity_url.into(),
            canonical_id: None,
        }
    }

    pub fn with_canonical(mut self, canonical_id: impl Into<String>) -> Self {
        self.canonical_id = Some(canonical_id.into());
        self
    }

    /// The identifier admission decisions are made against: the canonical
    /// id when the provider supplied one, the asserted URL otherwise.
    #[must_use]
    pub fn resolved(&self) -> &str {
        self.canonical_id.as_deref().unwrap_or(&self.identity_url)
    }
}

/// Result of a completed verification exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerificationOutcome {
    /// The provider asserted the identity and the assertion checked out.
    Success(VerifiedIdentity),
    /// The user declined at the provider.
    Cancelled,
    /// The exchange completed negatively.
    Failed { reason: String },
    /// The completion payload was not a well-formed protocol response.
    Malformed,
}
