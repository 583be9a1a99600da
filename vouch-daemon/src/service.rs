//! Registration orchestration.
//!
//! Glues the protocol boundary, the session stash and the admission engine
//! together. Expired state is always swept before an admission decision so
//! the trust-chain check never runs against records that should be gone.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use vouch_core::{decide, Admission, RegistrationRequest, WhitelistEntry};
use vouch_verify::state::RelyingPartyState;
use vouch_verify::{IdentityVerifier, PendingRegistration, VerificationOutcome};

use crate::error::RegistrationError;
use crate::limiter::RegistrationRateLimiter;
use crate::stash::RegistrationStash;
use crate::store::{EntryId, StoreError, WhitelistStore};

/// Orchestrates the registration flow and answers lookups.
pub struct RegistrationService {
    store: Arc<WhitelistStore>,
    stash: Arc<RegistrationStash>,
    verifier: Arc<dyn IdentityVerifier>,
    limiter: RegistrationRateLimiter,
    public_base_url: String,
}

/// Result of beginning a registration: where to send the user agent.
#[derive(Debug, Clone)]
pub struct StartedRegistration {
    pub redirect_url: String,
    /// State token the callback must carry.
    pub state: String,
}

impl RegistrationService {
    pub fn new(
        store: Arc<WhitelistStore>,
        stash: Arc<RegistrationStash>,
        verifier: Arc<dyn IdentityVerifier>,
        limiter: RegistrationRateLimiter,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            stash,
            verifier,
            limiter,
            public_base_url,
        }
    }

    /// The absolute callback URL for a given state token.
    pub fn return_to(&self, state: &str) -> String {
        format!("{}/whitelist/finish?state={state}", self.public_base_url)
    }

    /// Rebuild the absolute URL an inbound request arrived at from its
    /// path-and-query portion.
    pub fn callback_url(&self, path_and_query: &str) -> String {
        format!("{}{path_and_query}", self.public_base_url)
    }

    /// Validate and stash a registration request, then begin the protocol
    /// exchange for its claimed issuer.
    pub async fn start(
        &self,
        request: RegistrationRequest,
    ) -> Result<StartedRegistration, RegistrationError> {
        self.limiter.check()?;
        request.validate()?;

        let issuer = request.issuer.clone();
        let state = self.stash.put(PendingRegistration::new(request)).await;
        let return_to = self.return_to(&state);

        let handoff = self.verifier.begin(&issuer, &return_to).await?;

        tracing::info!(issuer = %issuer, "Registration started");
        Ok(StartedRegistration {
            redirect_url: handoff.redirect_url,
            state,
        })
    }

    /// Complete a registration from the protocol callback.
    ///
    /// Sweeps expired entries and stale protocol state, completes the
    /// verification exchange, runs the admission engine, and persists the
    /// admitted entry. Anything but a successful verification leaves the
    /// allow-list untouched.
    pub async fn finish(
        &self,
        state: &str,
        params: &BTreeMap<String, String>,
        current_url: &str,
    ) -> Result<(EntryId, WhitelistEntry), RegistrationError> {
        self.limiter.check()?;

        let now = Utc::now();
        let swept = self.store.sweep_expired(now).await?;
        if swept > 0 {
            tracing::debug!(count = swept, "Swept expired whitelist entries");
        }
        let cleaned = self
            .store
            .cleanup(now)
            .await
            .map_err(|e| RegistrationError::Storage(e.to_string()))?;
        if cleaned > 0 {
            tracing::debug!(count = cleaned, "Dropped stale relying-party state");
        }

        let outcome = self
            .verifier
            .complete(params, current_url)
            .await
            .ok_or(RegistrationError::NotCallback)?;

        let verified = match outcome {
            VerificationOutcome::Success(verified) => verified,
            VerificationOutcome::Cancelled => return Err(RegistrationError::ProtocolCancelled),
            VerificationOutcome::Failed { reason } => {
                return Err(RegistrationError::ProtocolFailure(reason))
            }
            VerificationOutcome::Malformed => {
                return Err(RegistrationError::ProtocolFailure(
                    "malformed protocol response".to_string(),
                ))
            }
            // The verifier contract has no other terminal states; hitting
            // one is an internal-consistency violation, not a user error.
            other => unreachable!("unknown verification outcome: {other:?}"),
        };

        let claimed_issuer = verified.resolved().to_string();
        let request = self
            .stash
            .take(state)
            .await
            .ok_or(RegistrationError::SessionExpired)?
            .into_request();

        let admission = decide(&claimed_issuer, &request, now, self.store.as_ref()).await?;
        match admission {
            Admission::Admit { entry, bootstrap: true } => {
                match self.store.insert_bootstrap(&entry).await? {
                    Some(id) => {
                        tracing::info!(target = %entry.target, "Bootstrap entry admitted");
                        Ok((id, entry))
                    }
                    // Lost the first-writer race: the store is no longer
                    // empty, so the claim is re-evaluated against the
                    // winner's entry.
                    None => self.admit_non_bootstrap(&claimed_issuer, &request, now).await,
                }
            }
            Admission::Admit { entry, bootstrap: false } => {
                let id = self.store.insert(&entry).await?;
                tracing::info!(issuer = %entry.issuer, target = %entry.target, "Entry admitted");
                Ok((id, entry))
            }
            Admission::Reject { reason } => {
                tracing::info!(issuer = %claimed_issuer, reason = %reason, "Registration rejected");
                Err(RegistrationError::AdmissionRejected)
            }
        }
    }

    async fn admit_non_bootstrap(
        &self,
        claimed_issuer: &str,
        request: &RegistrationRequest,
        now: chrono::DateTime<Utc>,
    ) -> Result<(EntryId, WhitelistEntry), RegistrationError> {
        match decide(claimed_issuer, request, now, self.store.as_ref()).await? {
            Admission::Admit { entry, .. } => {
                let id = self.store.insert(&entry).await?;
                tracing::info!(issuer = %entry.issuer, target = %entry.target, "Entry admitted");
                Ok((id, entry))
            }
            Admission::Reject { reason } => {
                tracing::info!(issuer = %claimed_issuer, reason = %reason, "Registration rejected");
                Err(RegistrationError::AdmissionRejected)
            }
        }
    }

    /// Whether `identity` is currently whitelisted and unexpired.
    pub async fn is_whitelisted(&self, identity: &str) -> Result<bool, StoreError> {
        self.store.find_active_target(identity, Utc::now()).await
    }
}
