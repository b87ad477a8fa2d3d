pub mod core;
pub mod nonce;
pub mod thumbprint;

pub use self::core::{ProofError, ProofValidationRequest, ProofValidator, VerifiedProof};
pub use nonce::{NonceAuthority, NonceCheck};
