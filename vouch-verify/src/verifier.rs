//! The identity-verification boundary.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::outcome::VerificationOutcome;

/// Where to send the user agent to continue the exchange at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationHandoff {
    pub redirect_url: String,
}

/// The claimed identity could not be resolved to a provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    #[error("identifier scheme is not supported: {0}")]
    UnsupportedScheme(String),

    #[error("could not fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("no provider endpoint advertised by {0}")]
    NoEndpoint(String),
}

/// Boundary to the external single-sign-on protocol.
///
/// Implementations own the wire exchange, including signature handling;
/// callers treat them as opaque and only see [`VerificationOutcome`]s.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Begin verification of `identity`. `return_to` is the absolute
    /// callback URL the provider sends the user agent back to.
    async fn begin(
        &self,
        identity: &str,
        return_to: &str,
    ) -> Result<VerificationHandoff, DiscoveryError>;

    /// Complete the exchange from callback parameters.
    ///
    /// `current_url` is the absolute URL the callback arrived at. Returns
    /// `None` when the parameters are not a protocol completion at all,
    /// i.e. the endpoint was hit outside an exchange.
    async fn complete(
        &self,
        params: &BTreeMap<String, String>,
        current_url: &str,
    ) -> Option<VerificationOutcome>;
}
