//! Typed registration requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registration request as submitted by the party starting verification.
///
/// Named, typed fields validated before any of them can reach the admission
/// engine; there is no loosely-typed field bag carried through the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Identity the requester claims will vouch for the registration. The
    /// verified identity replaces this claim after the protocol exchange.
    pub issuer: String,
    /// Identity to be whitelisted.
    pub target: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub no_further: bool,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
}

/// Validation failures for a registration request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("issuer identity must not be empty")]
    EmptyIssuer,

    #[error("target identity must not be empty")]
    EmptyTarget,

    /// A temporary entry without an expiry would never be active yet never
    /// be swept; reject it up front.
    #[error("temporary registrations require an expiry instant")]
    MissingExpire,
}

impl RegistrationRequest {
    /// Check the request before it is stashed for the protocol exchange.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.issuer.trim().is_empty() {
            return Err(RequestError::EmptyIssuer);
        }
        if self.target.trim().is_empty() {
            return Err(RequestError::EmptyTarget);
        }
        if self.temporary && self.expire.is_none() {
            return Err(RequestError::MissingExpire);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            issuer: "https://root.example/".to_string(),
            target: "https://alice.example/".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_request_passes() {
        assert_eq!(request().validate(), Ok(()));
    }

    #[test]
    fn empty_issuer_rejected() {
        let mut r = request();
        r.issuer = "  ".to_string();
        assert_eq!(r.validate(), Err(RequestError::EmptyIssuer));
    }

    #[test]
    fn empty_target_rejected() {
        let mut r = request();
        r.target = String::new();
        assert_eq!(r.validate(), Err(RequestError::EmptyTarget));
    }

    #[test]
    fn temporary_without_expire_rejected() {
        let mut r = request();
        r.temporary = true;
        assert_eq!(r.validate(), Err(RequestError::MissingExpire));
    }

    #[test]
    fn temporary_with_expire_passes() {
        let mut r = request();
        r.temporary = true;
        r.expire = Some(chrono::Utc::now());
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn form_fields_default() {
        let r: RegistrationRequest = serde_json::from_str(
            r#"{"issuer":"https://a.example/","target":"https://b.example/"}"#,
        )
        .unwrap();
        assert!(!r.no_further);
        assert!(!r.temporary);
        assert_eq!(r.expire, None);
        assert_eq!(r.note, None);
    }
}
