//! Stateless relying-party verifier.
//!
//! Implements [`IdentityVerifier`] without any local protocol cryptography:
//! positive assertions are sent back to the provider for direct
//! verification (`check_authentication`), so signature checking stays with
//! the party that produced the signature. Locally this module only does
//! endpoint discovery, callback classification, `return_to` validation and
//! replay-nonce bookkeeping.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use vouch_verify::state::{RelyingPartyState, ResponseNonce};
use vouch_verify::{
    DiscoveryError, IdentityVerifier, VerificationHandoff, VerificationOutcome, VerifiedIdentity,
};

const OPENID_NS: &str = "http://specs.openid.net/auth/2.0";

/// XRI global context symbols; i-name identifiers are not supported.
const XRI_GLOBAL_SYMBOLS: &[char] = &['=', '@', '+', '$', '!', '('];

/// Stateless relying-party implementation of the verification boundary.
pub struct RelyingPartyVerifier {
    http: reqwest::Client,
    state: Arc<dyn RelyingPartyState>,
    /// Realm (trust root) presented to the provider.
    realm: String,
}

impl RelyingPartyVerifier {
    pub fn new(state: Arc<dyn RelyingPartyState>, realm: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            state,
            realm,
        }
    }

    /// Fetch the identity page and extract the provider endpoint.
    async fn discover(&self, identity: &str) -> Result<String, DiscoveryError> {
        let response = self
            .http
            .get(identity)
            .send()
            .await
            .map_err(|e| DiscoveryError::Fetch {
                url: identity.to_string(),
                reason: e.to_string(),
            })?;

        let body = response.text().await.map_err(|e| DiscoveryError::Fetch {
            url: identity.to_string(),
            reason: e.to_string(),
        })?;

        provider_from_html(&body).ok_or_else(|| DiscoveryError::NoEndpoint(identity.to_string()))
    }

    /// Validate a positive assertion and resolve the verified identity.
    async fn verify_assertion(
        &self,
        params: &BTreeMap<String, String>,
        current_url: &str,
    ) -> VerificationOutcome {
        let Some(return_to) = params.get("openid.return_to") else {
            return VerificationOutcome::Malformed;
        };
        if !return_to_matches(return_to, current_url) {
            return VerificationOutcome::Failed {
                reason: "return_to does not match the callback URL".to_string(),
            };
        }

        let Some(endpoint) = params.get("openid.op_endpoint") else {
            return VerificationOutcome::Malformed;
        };

        let Some(raw_nonce) = params.get("openid.response_nonce") else {
            return VerificationOutcome::Malformed;
        };
        let Some(nonce) = ResponseNonce::parse(endpoint, raw_nonce) else {
            return VerificationOutcome::Malformed;
        };
        match self.state.use_nonce(&nonce).await {
            Ok(true) => {}
            Ok(false) => {
                return VerificationOutcome::Failed {
                    reason: "response nonce replayed or stale".to_string(),
                }
            }
            Err(e) => {
                return VerificationOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }

        // The provider declared an association stale; drop our record of it.
        if let Some(handle) = params.get("openid.invalidate_handle") {
            if let Err(e) = self.state.invalidate_association(endpoint, handle).await {
                tracing::warn!(error = %e, handle = %handle, "Failed to invalidate association");
            }
        }

        match self.check_authentication(endpoint, params).await {
            Ok(true) => {}
            Ok(false) => {
                return VerificationOutcome::Failed {
                    reason: "provider rejected the assertion".to_string(),
                }
            }
            Err(reason) => return VerificationOutcome::Failed { reason },
        }

        let claimed_id = params.get("openid.claimed_id");
        let identity_url = params.get("openid.identity").or(claimed_id);
        let Some(identity_url) = identity_url else {
            return VerificationOutcome::Malformed;
        };

        let mut verified = VerifiedIdentity::new(identity_url.clone());
        if let Some(claimed) = claimed_id {
            verified = verified.with_canonical(claimed.clone());
        }
        VerificationOutcome::Success(verified)
    }

    /// Ask the provider to verify its own signature (direct verification).
    async fn check_authentication(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<bool, String> {
        let mut form: Vec<(String, String)> = params
            .iter()
            .filter(|(k, _)| k.starts_with("openid.") && *k != "openid.mode")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        form.push(("openid.mode".to_string(), "check_authentication".to_string()));

        let response = self
            .http
            .post(endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(key_value_response(&body)
            .get("is_valid")
            .is_some_and(|v| v == "true"))
    }
}

#[async_trait]
impl IdentityVerifier for RelyingPartyVerifier {
    async fn begin(
        &self,
        identity: &str,
        return_to: &str,
    ) -> Result<VerificationHandoff, DiscoveryError> {
        let identity = normalize_identifier(identity)?;
        let endpoint = self.discover(&identity).await?;

        let mut url = Url::parse(&endpoint).map_err(|e| DiscoveryError::Fetch {
            url: endpoint.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("openid.ns", OPENID_NS)
            .append_pair("openid.mode", "checkid_setup")
            .append_pair("openid.claimed_id", &identity)
            .append_pair("openid.identity", &identity)
            .append_pair("openid.return_to", return_to)
            .append_pair("openid.realm", &self.realm);

        Ok(VerificationHandoff {
            redirect_url: url.to_string(),
        })
    }

    async fn complete(
        &self,
        params: &BTreeMap<String, String>,
        current_url: &str,
    ) -> Option<VerificationOutcome> {
        // No mode at all: the endpoint was hit outside an exchange.
        let mode = params.get("openid.mode")?;

        let outcome = match mode.as_str() {
            "cancel" => VerificationOutcome::Cancelled,
            "error" => VerificationOutcome::Failed {
                reason: params
                    .get("openid.error")
                    .cloned()
                    .unwrap_or_else(|| "provider error".to_string()),
            },
            "setup_needed" => VerificationOutcome::Failed {
                reason: "provider requires user setup".to_string(),
            },
            "id_res" => self.verify_assertion(params, current_url).await,
            _ => VerificationOutcome::Malformed,
        };
        Some(outcome)
    }
}

/// Normalize a user-supplied identifier, rejecting XRI i-names.
fn normalize_identifier(identity: &str) -> Result<String, DiscoveryError> {
    let identity = identity.trim();
    let unprefixed = identity.strip_prefix("xri://").unwrap_or(identity);
    if identity.starts_with("xri://")
        || unprefixed
            .chars()
            .next()
            .is_some_and(|c| XRI_GLOBAL_SYMBOLS.contains(&c))
    {
        return Err(DiscoveryError::UnsupportedScheme(identity.to_string()));
    }

    if identity.starts_with("http://") || identity.starts_with("https://") {
        Ok(identity.to_string())
    } else {
        Ok(format!("http://{identity}"))
    }
}

/// Extract the provider endpoint advertised in an HTML identity page.
///
/// Looks for `<link rel="openid2.provider">` first, then the 1.x
/// `openid.server` relation.
fn provider_from_html(html: &str) -> Option<String> {
    link_href(html, "openid2.provider").or_else(|| link_href(html, "openid.server"))
}

fn link_href(html: &str, rel: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(start) = lower[search_from..].find("<link") {
        let start = search_from + start;
        let end = lower[start..].find('>')? + start;
        let tag = &html[start..end];
        let tag_lower = &lower[start..end];

        if attribute_value(tag, tag_lower, "rel")
            .is_some_and(|v| v.split_ascii_whitespace().any(|r| r.eq_ignore_ascii_case(rel)))
        {
            if let Some(href) = attribute_value(tag, tag_lower, "href") {
                return Some(href.to_string());
            }
        }
        search_from = end;
    }
    None
}

/// Pull a quoted attribute value out of a tag, preserving original case.
fn attribute_value<'a>(tag: &'a str, tag_lower: &str, name: &str) -> Option<&'a str> {
    let mut from = 0;
    loop {
        let at = tag_lower[from..].find(name)? + from;
        let rest = &tag_lower[at + name.len()..];
        let eq = rest.find(|c: char| !c.is_ascii_whitespace());
        match eq {
            Some(i) if rest[i..].starts_with('=') => {
                let value_start = at + name.len() + i + 1;
                let value = tag[value_start..].trim_start();
                let quote = value.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let inner = &value[1..];
                    let close = inner.find(quote)?;
                    return Some(&inner[..close]);
                }
                // Unquoted value: read to whitespace.
                let close = value
                    .find(|c: char| c.is_ascii_whitespace())
                    .unwrap_or(value.len());
                return Some(&value[..close]);
            }
            _ => {
                from = at + name.len();
                if from >= tag_lower.len() {
                    return None;
                }
            }
        }
    }
}

/// Check that the asserted `return_to` matches the URL the callback arrived
/// at: same scheme, authority and path, and every query pair of the
/// asserted URL present in the actual one.
fn return_to_matches(asserted: &str, actual: &str) -> bool {
    let (Ok(asserted), Ok(actual)) = (Url::parse(asserted), Url::parse(actual)) else {
        return false;
    };

    if asserted.scheme() != actual.scheme()
        || asserted.host_str() != actual.host_str()
        || asserted.port_or_known_default() != actual.port_or_known_default()
        || asserted.path() != actual.path()
    {
        return false;
    }

    let actual_pairs: Vec<(String, String)> = actual
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    asserted
        .query_pairs()
        .all(|(k, v)| actual_pairs.iter().any(|(ak, av)| *ak == k && *av == v))
}

/// Parse a direct-verification response: `key:value` lines.
fn key_value_response(body: &str) -> BTreeMap<String, String> {
    body.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
