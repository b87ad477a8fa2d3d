//! JWK thumbprints (RFC 7638).
//!
//! The canonical JSON is rebuilt from parsed key components in lexicographic
//! member order, so whatever field order the proof header used on the wire
//! cannot influence the digest. Pure and side-effect-free.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use sha2::{Digest, Sha256};

use crate::services::auth::dpop::core::ProofError;

/// Compute the RFC 7638 thumbprint of a public JWK.
///
/// Callers are responsible for rejecting keys with private components
/// before invoking this; only public members enter the digest.
pub fn thumbprint(jwk: &Jwk) -> Result<String, ProofError> {
    // Canonical member sets, lexicographic order, no whitespace:
    //   EC:  {"crv","kty","x","y"}
    //   OKP: {"crv","kty","x"}
    //   RSA: {"e","kty","n"}
    let canonical = match &jwk.algorithm {
        AlgorithmParameters::EllipticCurve(p) => {
            let crv = curve_name(&p.curve)?;
            format!(
                "{{\"crv\":\"{}\",\"kty\":\"EC\",\"x\":\"{}\",\"y\":\"{}\"}}",
                crv, p.x, p.y
            )
        }
        AlgorithmParameters::OctetKeyPair(p) => {
            let crv = curve_name(&p.curve)?;
            format!("{{\"crv\":\"{}\",\"kty\":\"OKP\",\"x\":\"{}\"}}", crv, p.x)
        }
        AlgorithmParameters::RSA(p) => {
            format!("{{\"e\":\"{}\",\"kty\":\"RSA\",\"n\":\"{}\"}}", p.e, p.n)
        }
        // Symmetric (oct) keys have no business in a proof header.
        _ => return Err(ProofError::UnsupportedKey),
    };

    let digest = Sha256::digest(canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

fn curve_name(curve: &EllipticCurve) -> Result<&'static str, ProofError> {
    Ok(match curve {
        EllipticCurve::P256 => "P-256",
        EllipticCurve::P384 => "P-384",
        EllipticCurve::P521 => "P-521",
        EllipticCurve::Ed25519 => "Ed25519",
    })
}
