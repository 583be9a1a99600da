//! The whitelist entry record and its activity rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single allow-list record.
///
/// Entries are append-only: they are created through an admit decision,
/// removed only by the expiry sweep, and never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// Identity that vouched for this entry (the verified party at creation
    /// time). The very first entry ever inserted vouches for itself.
    pub issuer: String,
    /// Identity granted whitelisted status. Lookup key; uniqueness is not
    /// structurally enforced.
    pub target: String,
    /// Free-text annotation recording who is behind the target identity.
    pub note: Option<String>,
    /// Terminal entry: cannot be used to vouch for further registrations.
    pub no_further: bool,
    /// When set, `expire` governs validity.
    pub temporary: bool,
    /// Expiry instant; meaningful only when `temporary` is set.
    pub expire: Option<DateTime<Utc>>,
    /// Best-effort bookkeeping; not load-bearing for admission.
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl WhitelistEntry {
    /// An entry is active while it is permanent, or temporary with an
    /// expiry still in the future.
    ///
    /// A temporary entry without an expiry instant is never active; request
    /// validation prevents such entries from being created.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.temporary || self.expire.is_some_and(|e| e > now)
    }

    /// Active and non-terminal: may vouch for new registrations.
    #[must_use]
    pub fn is_eligible_issuer(&self, now: DateTime<Utc>) -> bool {
        self.is_active(now) && !self.no_further
    }
}
