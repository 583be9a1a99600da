//! Protocol-boundary types for delegated identity verification.
//!
//! This crate is intentionally IO-free:
//! - No filesystem operations
//! - No network calls
//! - No database interactions
//! - No logging
//!
//! The actual wire exchange lives behind the [`verifier::IdentityVerifier`]
//! trait and the durable protocol bookkeeping behind
//! [`state::RelyingPartyState`]; `vouch-daemon` supplies both.

pub mod outcome;
pub mod session;
pub mod state;
pub mod verifier;

pub use outcome::{VerificationOutcome, VerifiedIdentity};
pub use session::PendingRegistration;
pub use state::{AssociationRecord, RelyingPartyState, ResponseNonce, StateError};
pub use verifier::{DiscoveryError, IdentityVerifier, VerificationHandoff};
