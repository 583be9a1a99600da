//! HTTP handlers.

use std::collections::BTreeMap;

use axum::extract::{OriginalUri, Query, State};
use axum::response::Redirect;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use vouch_core::{RegistrationRequest, WhitelistEntry};

use crate::error::ApiResult;

use super::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    /// Pre-fill for the target identity.
    pub oid: Option<String>,
}

/// GET /whitelist/start - the continuation form, as JSON.
///
/// The `oid` query variable pre-fills the target identity.
pub async fn start_form(Query(query): Query<StartQuery>) -> Json<RegistrationRequest> {
    Json(RegistrationRequest {
        target: query.oid.unwrap_or_default(),
        ..Default::default()
    })
}

/// POST /whitelist/start - begin the verification exchange.
///
/// Stashes the submitted request and redirects the user agent to the
/// claimed issuer's provider.
pub async fn start(
    State(state): State<AppState>,
    Form(request): Form<RegistrationRequest>,
) -> ApiResult<Redirect> {
    let started = state.service.start(request).await?;
    Ok(Redirect::to(&started.redirect_url))
}

/// Success view of a finished registration.
#[derive(Debug, Serialize)]
pub struct FinishResponse {
    pub id: i64,
    pub entry: WhitelistEntry,
}

/// GET /whitelist/finish - the protocol callback.
pub async fn finish(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<BTreeMap<String, String>>,
) -> ApiResult<Json<FinishResponse>> {
    let token = params.get("state").cloned().unwrap_or_default();
    let current_url = state.service.callback_url(
        uri.path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(uri.path()),
    );

    let (id, entry) = state.service.finish(&token, &params, &current_url).await?;
    Ok(Json(FinishResponse { id: id.0, entry }))
}

/// GET /whitelist/check - plain lookup.
///
/// The first query variable's value is the identity to check; the response
/// body is the literal text `true` or `false`.
pub async fn check(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> ApiResult<String> {
    let (_, whitelisted) = lookup(&state, &params).await?;
    Ok(if whitelisted { "true" } else { "false" }.to_string())
}

/// GET /whitelist/check_json - structured lookup.
///
/// Same input as the plain variant; the response is a single-key object
/// mapping the query variable name to the boolean result.
pub async fn check_json(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> ApiResult<Json<serde_json::Value>> {
    let (name, whitelisted) = lookup(&state, &params).await?;
    Ok(Json(serde_json::json!({ name: whitelisted })))
}

/// Resolve the first query variable to (name, is_whitelisted).
///
/// With nothing to check the answer is negative under the placeholder name.
async fn lookup(
    state: &AppState,
    params: &BTreeMap<String, String>,
) -> ApiResult<(String, bool)> {
    match params.iter().next() {
        Some((name, identity)) => {
            let whitelisted = state.service.is_whitelisted(identity).await?;
            Ok((name.clone(), whitelisted))
        }
        None => Ok(("fail".to_string(), false)),
    }
}
