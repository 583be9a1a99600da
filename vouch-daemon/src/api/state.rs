//! Shared handler state.

use std::sync::Arc;

use crate::service::RegistrationService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RegistrationService>,
    pub version: String,
}

impl AppState {
    pub fn new(service: Arc<RegistrationService>) -> Self {
        Self {
            service,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
