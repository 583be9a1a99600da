//! The trust-chain admission decision.
//!
//! A new identity is admitted to the allow-list only when the identity that
//! initiated the registration is itself an unexpired, non-terminal entry.
//! The one exception is the bootstrap case: the very first entry ever
//! admitted vouches for itself and becomes the root of trust.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::WhitelistEntry;
use crate::request::RegistrationRequest;

/// Failure of the backing directory; the only way [`decide`] can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("allow-list directory unavailable: {0}")]
pub struct DirectoryError(pub String);

/// Read-only view of the allow-list consulted by the admission engine.
///
/// The handle is injected explicitly into [`decide`]; the engine holds no
/// storage state of its own.
#[async_trait]
pub trait IssuerDirectory: Send + Sync {
    /// Whether the allow-list currently holds zero entries.
    async fn is_empty(&self) -> Result<bool, DirectoryError>;

    /// Whether any entry with `target == identity` is active and
    /// non-terminal at `now`. Existence only; ties are irrelevant.
    async fn eligible_issuer_exists(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DirectoryError>;
}

/// Outcome of the trust-chain admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Admission {
    /// Admit the registration and persist `entry`.
    ///
    /// `bootstrap` marks the first-ever, self-vouched entry; it must be
    /// inserted with first-writer-wins semantics since two concurrent
    /// registrations can both observe an empty directory.
    Admit {
        entry: WhitelistEntry,
        bootstrap: bool,
    },
    /// Reject the registration; the allow-list is left untouched.
    Reject { reason: String },
}

impl Admission {
    /// Returns true for either admit variant.
    pub fn is_admit(&self) -> bool {
        matches!(self, Self::Admit { .. })
    }
}

/// Decide whether `claimed_issuer` may vouch for the requested registration.
///
/// This is a single-hop check: the claimed issuer must itself be a
/// currently eligible stored entry. Reachability from the root of trust is
/// never recomputed; eligibility is a local property of one record.
///
/// With an empty directory the request bootstraps the allow-list: the
/// verified identity is admitted vouching for itself, regardless of the
/// requested target. Self-vouching against a non-empty directory gets no
/// special treatment and follows the ordinary eligibility check.
pub async fn decide<D>(
    claimed_issuer: &str,
    request: &RegistrationRequest,
    now: DateTime<Utc>,
    directory: &D,
) -> Result<Admission, DirectoryError>
where
    D: IssuerDirectory + ?Sized,
{
    if directory.is_empty().await? {
        return Ok(Admission::Admit {
            entry: build_entry(claimed_issuer, claimed_issuer, request, now),
            bootstrap: true,
        });
    }

    if directory.eligible_issuer_exists(claimed_issuer, now).await? {
        Ok(Admission::Admit {
            entry: build_entry(claimed_issuer, &request.target, request, now),
            bootstrap: false,
        })
    } else {
        Ok(Admission::Reject {
            reason: format!("{claimed_issuer} is not an eligible issuer"),
        })
    }
}

fn build_entry(
    issuer: &str,
    target: &str,
    request: &RegistrationRequest,
    now: DateTime<Utc>,
) -> WhitelistEntry {
    WhitelistEntry {
        issuer: issuer.to_string(),
        target: target.to_string(),
        note: request.note.clone(),
        no_further: request.no_further,
        temporary: request.temporary,
        expire: request.expire,
        created_at: Some(now),
        modified_at: Some(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// In-memory directory over a plain entry list.
    struct TestDirectory(Vec<WhitelistEntry>);

    #[async_trait]
    impl IssuerDirectory for TestDirectory {
        async fn is_empty(&self) -> Result<bool, DirectoryError> {
            Ok(self.0.is_empty())
        }

        async fn eligible_issuer_exists(
            &self,
            identity: &str,
            now: DateTime<Utc>,
        ) -> Result<bool, DirectoryError> {
            Ok(self
                .0
                .iter()
                .any(|e| e.target == identity && e.is_eligible_issuer(now)))
        }
    }

    /// Directory whose backing store is down.
    struct BrokenDirectory;

    #[async_trait]
    impl IssuerDirectory for BrokenDirectory {
        async fn is_empty(&self) -> Result<bool, DirectoryError> {
            Err(DirectoryError("connection refused".to_string()))
        }

        async fn eligible_issuer_exists(
            &self,
            _identity: &str,
            _now: DateTime<Utc>,
        ) -> Result<bool, DirectoryError> {
            Err(DirectoryError("connection refused".to_string()))
        }
    }

    fn stored(target: &str, no_further: bool, expire: Option<DateTime<Utc>>) -> WhitelistEntry {
        WhitelistEntry {
            issuer: "https://root.example/".to_string(),
            target: target.to_string(),
            note: None,
            no_further,
            temporary: expire.is_some(),
            expire,
            created_at: None,
            modified_at: None,
        }
    }

    fn request(target: &str) -> RegistrationRequest {
        RegistrationRequest {
            issuer: "https://claimed.example/".to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_directory_bootstraps_with_self_vouched_entry() {
        let directory = TestDirectory(Vec::new());
        let now = Utc::now();

        let admission = decide(
            "https://first.example/",
            &request("https://someone-else.example/"),
            now,
            &directory,
        )
        .await
        .unwrap();

        match admission {
            Admission::Admit { entry, bootstrap } => {
                assert!(bootstrap);
                // The requested target is ignored; the verified identity
                // becomes the root of trust.
                assert_eq!(entry.issuer, "https://first.example/");
                assert_eq!(entry.target, "https://first.example/");
            }
            Admission::Reject { .. } => panic!("bootstrap must admit"),
        }
    }

    #[tokio::test]
    async fn bootstrap_carries_request_metadata() {
        let directory = TestDirectory(Vec::new());
        let now = Utc::now();
        let mut req = request("https://b.example/");
        req.note = Some("site owner".to_string());
        req.no_further = true;

        let admission = decide("https://first.example/", &req, now, &directory)
            .await
            .unwrap();

        match admission {
            Admission::Admit { entry, .. } => {
                assert_eq!(entry.note.as_deref(), Some("site owner"));
                assert!(entry.no_further);
            }
            Admission::Reject { .. } => panic!("bootstrap must admit"),
        }
    }

    #[tokio::test]
    async fn eligible_issuer_admits_target() {
        let now = Utc::now();
        let directory = TestDirectory(vec![stored("https://claimed.example/", false, None)]);

        let admission = decide(
            "https://claimed.example/",
            &request("https://new.example/"),
            now,
            &directory,
        )
        .await
        .unwrap();

        match admission {
            Admission::Admit { entry, bootstrap } => {
                assert!(!bootstrap);
                assert_eq!(entry.issuer, "https://claimed.example/");
                assert_eq!(entry.target, "https://new.example/");
            }
            Admission::Reject { .. } => panic!("eligible issuer must admit"),
        }
    }

    #[tokio::test]
    async fn unknown_issuer_rejected() {
        let now = Utc::now();
        let directory = TestDirectory(vec![stored("https://other.example/", false, None)]);

        let admission = decide(
            "https://claimed.example/",
            &request("https://new.example/"),
            now,
            &directory,
        )
        .await
        .unwrap();

        assert!(!admission.is_admit());
    }

    #[tokio::test]
    async fn terminal_issuer_rejected() {
        let now = Utc::now();
        let directory = TestDirectory(vec![stored("https://claimed.example/", true, None)]);

        let admission = decide(
            "https://claimed.example/",
            &request("https://new.example/"),
            now,
            &directory,
        )
        .await
        .unwrap();

        assert!(!admission.is_admit());
    }

    #[tokio::test]
    async fn expired_issuer_rejected() {
        let now = Utc::now();
        let directory = TestDirectory(vec![stored(
            "https://claimed.example/",
            false,
            Some(now - Duration::seconds(1)),
        )]);

        let admission = decide(
            "https://claimed.example/",
            &request("https://new.example/"),
            now,
            &directory,
        )
        .await
        .unwrap();

        assert!(!admission.is_admit());
    }

    #[tokio::test]
    async fn self_vouch_against_nonempty_directory_is_not_special() {
        let now = Utc::now();
        // Store holds an unrelated entry; the claimed issuer vouching for
        // itself still needs ordinary eligibility.
        let directory = TestDirectory(vec![stored("https://other.example/", false, None)]);

        let admission = decide(
            "https://claimed.example/",
            &request("https://claimed.example/"),
            now,
            &directory,
        )
        .await
        .unwrap();

        assert!(!admission.is_admit());
    }

    #[tokio::test]
    async fn directory_failure_propagates() {
        let result = decide(
            "https://claimed.example/",
            &request("https://new.example/"),
            Utc::now(),
            &BrokenDirectory,
        )
        .await;

        assert!(result.is_err());
    }
}
