/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 * - Clone is expected to be cheap (everything behind Arc)
 */
use std::sync::Arc;

use crate::services::auth::AuthService;
use crate::services::auth::dpop::{NonceAuthority, ProofValidator};
use crate::services::clients::ClientDirectory;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub clients: Arc<dyn ClientDirectory>,
    pub dpop: Arc<ProofValidator>,
    pub nonces: Arc<NonceAuthority>,
    // Canonical external base URL for htu reconstruction (None = use
    // forwarded/Host headers).
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(
        auth: Arc<AuthService>,
        clients: Arc<dyn ClientDirectory>,
        dpop: Arc<ProofValidator>,
        nonces: Arc<NonceAuthority>,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            auth,
            clients,
            dpop,
            nonces,
            public_base_url,
        }
    }
}
