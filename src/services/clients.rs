//! Per-client DPoP validation policy and the directory that resolves it.
//!
//! The policy is deliberately a plain value type (no dependency on `Config`)
//! so the proof validator and the arbitrator stay testable in isolation.

use std::collections::HashMap;

/// Which Authorization schemes a client's tokens may be presented under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeMode {
    BearerOnly,
    DpopOnly,
    BearerOrDpop,
}

impl SchemeMode {
    pub fn allows_bearer(&self) -> bool {
        matches!(self, Self::BearerOnly | Self::BearerOrDpop)
    }

    pub fn allows_dpop(&self) -> bool {
        matches!(self, Self::DpopOnly | Self::BearerOrDpop)
    }
}

/// How proof freshness is established.
///
/// - `IssuedAt`: plain iat window check.
/// - `Nonce`: server-issued nonce only; the iat window check is skipped
///   (iat must still be present and well-typed).
/// - `IssuedAtAndNonce`: both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessMode {
    IssuedAt,
    Nonce,
    IssuedAtAndNonce,
}

impl FreshnessMode {
    pub fn checks_iat_window(&self) -> bool {
        matches!(self, Self::IssuedAt | Self::IssuedAtAndNonce)
    }

    pub fn requires_nonce(&self) -> bool {
        matches!(self, Self::Nonce | Self::IssuedAtAndNonce)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationPolicy {
    pub mode: SchemeMode,
    pub freshness: FreshnessMode,
    // Allowed iat drift (client clock skew), seconds.
    pub iat_leeway_seconds: i64,
    // Maximum acceptable age of a proof (now - iat), seconds.
    pub max_age_seconds: i64,
    // Require the proof to be bound to the access token (ath claim).
    pub require_ath: bool,
    // Lifetime of server-issued nonces for this client, seconds.
    pub nonce_ttl_seconds: u64,
}

/// Resolve the validation policy for a client.
///
/// The hosting layer owns where client configuration actually lives; the
/// auth core only needs this lookup.
pub trait ClientDirectory: Send + Sync {
    fn find_client(&self, client_id: &str) -> Option<ValidationPolicy>;

    // Policy applied when the token carries no client_id or the client is
    // not individually configured.
    fn default_policy(&self) -> ValidationPolicy;
}

/// Directory backed by a fixed map, built at startup.
pub struct StaticClientDirectory {
    default: ValidationPolicy,
    overrides: HashMap<String, ValidationPolicy>,
}

impl StaticClientDirectory {
    pub fn new(default: ValidationPolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>, policy: ValidationPolicy) -> Self {
        self.overrides.insert(client_id.into(), policy);
        self
    }
}

impl ClientDirectory for StaticClientDirectory {
    fn find_client(&self, client_id: &str) -> Option<ValidationPolicy> {
        self.overrides.get(client_id).copied()
    }

    fn default_policy(&self) -> ValidationPolicy {
        self.default
    }
}
