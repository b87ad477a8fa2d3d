//! Token binding: the `cnf` (confirmation) claim tying an issued token to a
//! proof key thumbprint.
//!
//! Set once at issuance, immutable afterwards, read-only at every proof
//! verification for that token.

use serde::{Deserialize, Serialize};

/// Confirmation claim carried inside an access/refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CnfClaim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jkt: Option<String>,
}

/// Build the confirmation claim for a token being issued against `jkt`.
/// Issuance flows call this exactly once per token.
pub fn bind(jkt: impl Into<String>) -> CnfClaim {
    CnfClaim {
        jkt: Some(jkt.into()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingCheck {
    // Token carries no confirmation claim: legitimately a classic bearer token.
    Unbound,
    Match,
    Mismatch,
}

/// Compare a token's stored thumbprint against one obtained from a freshly
/// verified proof.
pub fn check(cnf_jkt: Option<&str>, presented_jkt: &str) -> BindingCheck {
    match cnf_jkt {
        None => BindingCheck::Unbound,
        Some(bound) if bound == presented_jkt => BindingCheck::Match,
        Some(_) => BindingCheck::Mismatch,
    }
}
