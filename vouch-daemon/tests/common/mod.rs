//! Test harness for registration-flow integration tests.
//!
//! Assembles the real router, service, stash and an in-memory SQLite store,
//! with the verifier boundary replaced by a scriptable stub so no network
//! or protocol exchange is involved.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use sqlx::SqlitePool;
use tower::ServiceExt;
use vouch_core::RegistrationRequest;
use vouch_daemon::api::{create_router, AppState};
use vouch_daemon::limiter::RegistrationRateLimiter;
use vouch_daemon::service::RegistrationService;
use vouch_daemon::stash::RegistrationStash;
use vouch_daemon::store::WhitelistStore;
use vouch_verify::{
    DiscoveryError, IdentityVerifier, VerificationHandoff, VerificationOutcome,
};

pub const BASE_URL: &str = "http://site.example";

/// Scriptable verifier double.
///
/// `begin` redirects straight back to the callback URL; `complete` replays
/// whatever outcome the test configured, treating parameter sets without an
/// `openid.mode` as not-a-callback.
pub struct StubVerifier {
    outcome: Mutex<VerificationOutcome>,
    fail_discovery: Mutex<bool>,
}

impl StubVerifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(VerificationOutcome::Cancelled),
            fail_discovery: Mutex::new(false),
        })
    }
}

#[async_trait]
impl IdentityVerifier for StubVerifier {
    async fn begin(
        &self,
        identity: &str,
        return_to: &str,
    ) -> Result<VerificationHandoff, DiscoveryError> {
        if *self.fail_discovery.lock().unwrap() {
            return Err(DiscoveryError::NoEndpoint(identity.to_string()));
        }
        Ok(VerificationHandoff {
            redirect_url: return_to.to_string(),
        })
    }

    async fn complete(
        &self,
        params: &BTreeMap<String, String>,
        _current_url: &str,
    ) -> Option<VerificationOutcome> {
        if !params.contains_key("openid.mode") {
            return None;
        }
        Some(self.outcome.lock().unwrap().clone())
    }
}

pub struct TestHarness {
    pub store: Arc<WhitelistStore>,
    pub app: Router,
    verifier: Arc<StubVerifier>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = Arc::new(WhitelistStore::new(pool).await.unwrap());
        let verifier = StubVerifier::new();

        let service = Arc::new(RegistrationService::new(
            store.clone(),
            Arc::new(RegistrationStash::new()),
            verifier.clone(),
            // Generous limits so tests never trip the limiter.
            RegistrationRateLimiter::new(1000, 1000),
            BASE_URL.to_string(),
        ));

        Self {
            store,
            app: create_router(AppState::new(service)),
            verifier,
        }
    }

    /// Script the outcome the verifier reports for the next completions.
    pub fn set_outcome(&self, outcome: VerificationOutcome) {
        *self.verifier.outcome.lock().unwrap() = outcome;
    }

    /// Make discovery fail on the next `begin`.
    pub fn fail_discovery(&self) {
        *self.verifier.fail_discovery.lock().unwrap() = true;
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    /// POST the registration form; returns the raw response.
    pub async fn post_start(&self, request: &RegistrationRequest) -> Response<Body> {
        let body = serde_urlencoded::to_string(request).unwrap();
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/whitelist/start")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// Extract the state token from the start redirect.
    pub fn state_from_redirect(response: &Response<Body>) -> String {
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get(header::LOCATION)
            .expect("redirect must carry a Location header")
            .to_str()
            .unwrap();
        location
            .split_once("state=")
            .expect("callback URL must carry the state token")
            .1
            .split('&')
            .next()
            .unwrap()
            .to_string()
    }

    /// Hit the callback endpoint as the provider would.
    pub async fn get_finish(&self, state: &str) -> Response<Body> {
        self.get(&format!(
            "/whitelist/finish?state={state}&openid.mode=id_res"
        ))
        .await
    }

    /// Run the whole registration flow for one request.
    pub async fn register(&self, request: &RegistrationRequest) -> Response<Body> {
        let started = self.post_start(request).await;
        let state = Self::state_from_redirect(&started);
        self.get_finish(&state).await
    }
}

/// A permanent registration request.
pub fn request(issuer: &str, target: &str) -> RegistrationRequest {
    RegistrationRequest {
        issuer: issuer.to_string(),
        target: target.to_string(),
        ..Default::default()
    }
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
