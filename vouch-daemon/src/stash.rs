//! In-memory stash of registrations awaiting the protocol callback.

use std::collections::HashMap;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::RwLock;
use vouch_verify::PendingRegistration;

const STATE_TOKEN_BYTES: usize = 16;

/// Short-lived per-session registration stash, keyed by the opaque state
/// token carried through the protocol exchange.
pub struct RegistrationStash {
    inner: RwLock<HashMap<String, PendingRegistration>>,
}

impl RegistrationStash {
    /// Create a new empty stash.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Stash `pending` under a fresh random state token and return it.
    ///
    /// Expired sessions are purged on the way in so abandoned exchanges do
    /// not accumulate.
    pub async fn put(&self, pending: PendingRegistration) -> String {
        let token = state_token();

        let mut inner = self.inner.write().await;
        inner.retain(|_, p| !p.is_expired());
        inner.insert(token.clone(), pending);
        token
    }

    /// Remove and return the stash entry for `token`.
    ///
    /// An expired entry is treated as a miss; either way the token is
    /// single-use.
    pub async fn take(&self, token: &str) -> Option<PendingRegistration> {
        let mut inner = self.inner.write().await;
        match inner.remove(token) {
            Some(p) if !p.is_expired() => Some(p),
            _ => None,
        }
    }

    /// Number of live sessions (includes not-yet-purged expired entries).
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl Default for RegistrationStash {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate an unguessable state token.
fn state_token() -> String {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
