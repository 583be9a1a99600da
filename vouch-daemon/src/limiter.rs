//! Rate limiting for the registration endpoints.
//!
//! Prevents brute-force probing of the admission check and abuse of the
//! outbound discovery fetches.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::error::RegistrationError;

/// Rate limiter for registration start/finish requests.
pub struct RegistrationRateLimiter {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RegistrationRateLimiter {
    /// Create a new rate limiter with the specified sustained rate and
    /// burst size.
    pub fn new(per_second: u32, burst_size: u32) -> Self {
        let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::new(2).unwrap());
        let burst_size = NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::new(10).unwrap());

        let quota = Quota::per_second(per_second).allow_burst(burst_size);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Check if a request should be allowed.
    pub fn check(&self) -> Result<(), RegistrationError> {
        match self.limiter.check() {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::warn!("Rate limit exceeded for registration endpoint");
                Err(RegistrationError::RateLimited)
            }
        }
    }
}

impl Default for RegistrationRateLimiter {
    fn default() -> Self {
        // 2 requests/second with burst of 10
        Self::new(2, 10)
    }
}

impl Clone for RegistrationRateLimiter {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
        }
    }
}
