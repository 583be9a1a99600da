//! Error types for the registration and lookup surface.
//!
//! Every protocol- and admission-level failure is recovered at the request
//! boundary and rendered as a failure response; none crash the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use vouch_core::{DirectoryError, RequestError};
use vouch_verify::DiscoveryError;

use crate::store::StoreError;

/// Failures surfaced by registration and lookup requests.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The claimed issuer could not be resolved at protocol level.
    #[error("OpenID discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Verification completed negatively.
    #[error("authentication failed: {0}")]
    ProtocolFailure(String),

    /// The user declined at the provider.
    #[error("authentication cancelled")]
    ProtocolCancelled,

    /// The inbound call is not a valid protocol completion.
    #[error("not an authorized relying-party callback")]
    NotCallback,

    /// Verification succeeded but the trust-chain check failed.
    #[error("not allowed to whitelist")]
    AdmissionRejected,

    /// The per-session stash had no live record for the callback.
    #[error("unknown or expired registration session")]
    SessionExpired,

    #[error("invalid registration request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("rate limit exceeded, try again later")]
    RateLimited,
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<DirectoryError> for RegistrationError {
    fn from(err: DirectoryError) -> Self {
        Self::Storage(err.0)
    }
}

impl RegistrationError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Discovery(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ProtocolFailure(_)
            | Self::ProtocolCancelled
            | Self::NotCallback
            | Self::AdmissionRejected
            | Self::SessionExpired => StatusCode::FORBIDDEN,
        }
    }
}

/// Failure response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Convenience alias for handler results.
pub type ApiResult<T> = Result<T, RegistrationError>;
