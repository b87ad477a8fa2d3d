//! DPoP proof validation (RFC 9449) - core logic.
//!
//! The validator owns the full check sequence for one proof: structure,
//! self-certifying signature, claim bindings (htm/htu/iat/ath), nonce policy
//! and replay protection. It does not know about Axum extractors; the
//! arbitrator middleware builds a `ProofValidationRequest` and interprets the
//! outcome.

use std::sync::Arc;

use axum::http::{HeaderMap, Method, Uri, header};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, jwk::Jwk};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::services::auth::dpop::nonce::{NonceAuthority, NonceCheck};
use crate::services::auth::dpop::thumbprint::thumbprint;
use crate::services::auth::replay::ReplayStore;
use crate::services::clients::ValidationPolicy;
use crate::services::clock::Clock;

/// JWK members that carry private or symmetric key material. A proof header
/// containing any of these is rejected outright.
const PRIVATE_JWK_MEMBERS: &[&str] = &["d", "p", "q", "dp", "dq", "qi", "oth", "k"];

#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("malformed DPoP proof")]
    Malformed,
    #[error("unsupported DPoP alg: {0}")]
    UnsupportedAlgorithm(String),
    #[error("proof jwk contains private key material")]
    PrivateKeyLeaked,
    #[error("unsupported jwk for DPoP")]
    UnsupportedKey,
    #[error("invalid DPoP proof signature")]
    SignatureInvalid,
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),
    #[error("htm mismatch")]
    MethodMismatch,
    #[error("htu mismatch")]
    UrlMismatch,
    #[error("iat outside the acceptance window")]
    Stale,
    #[error("server nonce required")]
    NonceRequired { nonce: String },
    #[error("server nonce is unknown, expired or already used")]
    NonceInvalid { nonce: String },
    #[error("proof identifier already seen")]
    ReplayDetected,
    #[error("ath mismatch")]
    AccessTokenHashMismatch,
    #[error("replay backend unavailable")]
    ReplayUnavailable,
}

impl ProofError {
    /// Nonce the client should retry with, when this failure carries one.
    pub fn retry_nonce(&self) -> Option<&str> {
        match self {
            Self::NonceRequired { nonce } | Self::NonceInvalid { nonce } => Some(nonce),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DpopClaims {
    // HTTP method
    htm: Option<String>,
    // HTTP URI
    htu: Option<String>,
    // issued-at (seconds since epoch)
    iat: Option<i64>,
    // unique proof identifier
    jti: Option<String>,
    // access token hash (base64url(SHA-256(access_token)))
    ath: Option<String>,
    // server-provided nonce (per-client policy)
    nonce: Option<String>,
}

/// Everything the validator needs to judge one proof against one request.
pub struct ProofValidationRequest<'a> {
    pub proof: &'a str,
    pub method: &'a Method,
    // Absolute request URL as the client saw it (see `expected_url`).
    pub url: &'a str,
    // Present on resource requests; the proof must then hash-bind to it.
    pub access_token: Option<&'a str>,
    // Scope key for server nonces (typically the client id).
    pub nonce_context: &'a str,
    pub policy: &'a ValidationPolicy,
}

/// Outcome of a fully validated proof.
#[derive(Debug, Clone)]
pub struct VerifiedProof {
    pub jkt: String,
    pub jti: String,
    pub iat: i64,
}

pub struct ProofValidator {
    replay: Arc<dyn ReplayStore>,
    nonces: Arc<NonceAuthority>,
    clock: Arc<dyn Clock>,
    // Server-side clock skew allowance, folded into the replay window.
    server_skew_seconds: i64,
}

impl ProofValidator {
    pub fn new(
        replay: Arc<dyn ReplayStore>,
        nonces: Arc<NonceAuthority>,
        clock: Arc<dyn Clock>,
        server_skew_seconds: i64,
    ) -> Self {
        Self {
            replay,
            nonces,
            clock,
            server_skew_seconds,
        }
    }

    /// Validate a proof. Checks run in a fixed order and the first failure
    /// short-circuits, so an early failure reveals nothing about later steps.
    pub async fn validate(
        &self,
        req: ProofValidationRequest<'_>,
    ) -> Result<VerifiedProof, ProofError> {
        // 1) Structure: three segments, strict typ, allowed asymmetric alg,
        //    public-only jwk.
        let (header_value, algorithm) = parse_proof_header(req.proof)?;

        let jwk_value = header_value.get("jwk").ok_or(ProofError::Malformed)?;
        if PRIVATE_JWK_MEMBERS.iter().any(|m| jwk_value.get(m).is_some()) {
            return Err(ProofError::PrivateKeyLeaked);
        }
        let jwk: Jwk =
            serde_json::from_value(jwk_value.clone()).map_err(|_| ProofError::Malformed)?;

        // 2) Signature, verified against the key the proof itself carries.
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|_| ProofError::UnsupportedKey)?;

        let mut validation = Validation::new(algorithm);
        // A proof is not an access token: no exp, no iss/aud.
        validation.validate_exp = false;
        validation.required_spec_claims.remove("exp");

        let token_data =
            decode::<DpopClaims>(req.proof, &decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        ProofError::SignatureInvalid
                    }
                    _ => ProofError::Malformed,
                }
            })?;
        let claims = token_data.claims;

        // 3) Required claims.
        let jti = claims.jti.ok_or(ProofError::MissingClaim("jti"))?;
        let htm = claims.htm.ok_or(ProofError::MissingClaim("htm"))?;
        let htu = claims.htu.ok_or(ProofError::MissingClaim("htu"))?;
        let iat = claims.iat.ok_or(ProofError::MissingClaim("iat"))?;

        // 4) Method / URL binding.
        if !htm.eq_ignore_ascii_case(req.method.as_str()) {
            return Err(ProofError::MethodMismatch);
        }
        if normalize_htu(&htu) != normalize_htu(req.url) {
            return Err(ProofError::UrlMismatch);
        }

        // 5) Freshness window (skipped when the policy is nonce-only).
        let now = self.clock.now();
        if req.policy.freshness.checks_iat_window() {
            let leeway = req.policy.iat_leeway_seconds;
            // Inclusive bounds on both edges.
            if iat > now + leeway {
                return Err(ProofError::Stale);
            }
            if iat < now - req.policy.max_age_seconds - leeway {
                return Err(ProofError::Stale);
            }
        }

        // 6) Access-token binding. A present ath must always match; a missing
        //    ath fails when the policy makes binding mandatory.
        if let Some(access_token) = req.access_token {
            match &claims.ath {
                Some(ath) => {
                    if *ath != compute_ath(access_token) {
                        return Err(ProofError::AccessTokenHashMismatch);
                    }
                }
                None if req.policy.require_ath => {
                    return Err(ProofError::MissingClaim("ath"));
                }
                None => {}
            }
        }

        // 7) Server nonce. Missing or failed nonces carry a fresh value so
        //    the client can retry.
        if req.policy.freshness.requires_nonce() {
            match &claims.nonce {
                None => {
                    return Err(ProofError::NonceRequired {
                        nonce: self.nonces.issue(req.nonce_context),
                    });
                }
                Some(value) => {
                    let check = self.nonces.validate_and_consume(req.nonce_context, value);
                    if check != NonceCheck::Valid {
                        warn!(?check, "dpop nonce rejected");
                        return Err(ProofError::NonceInvalid {
                            nonce: self.nonces.issue(req.nonce_context),
                        });
                    }
                }
            }
        }

        // 8) Replay protection, keyed per signing key. The window covers both
        //    early and late arrival: twice the larger of server skew and the
        //    client's whole backward acceptance span.
        let jkt = thumbprint(&jwk)?;
        let client_span = req.policy.iat_leeway_seconds + req.policy.max_age_seconds;
        let window = 2 * self.server_skew_seconds.max(client_span);

        let replay_key = format!("{}:{}", jkt, jti);
        let first_time = self
            .replay
            .check_and_store(&replay_key, window.max(1) as u64)
            .await
            .map_err(|e| {
                warn!(error = ?e, "replay backend failure");
                ProofError::ReplayUnavailable
            })?;
        if !first_time {
            warn!(jkt = %jkt, "dpop replay detected");
            return Err(ProofError::ReplayDetected);
        }

        Ok(VerifiedProof { jkt, jti, iat })
    }
}

/// Decode the JOSE header segment and screen typ/alg before any signature
/// work. Returns the raw header JSON (for jwk screening) and the algorithm.
fn parse_proof_header(proof: &str) -> Result<(serde_json::Value, Algorithm), ProofError> {
    let mut segments = proof.split('.');
    let header_b64 = match (segments.next(), segments.next(), segments.next()) {
        (Some(h), Some(p), Some(s))
            if segments.next().is_none() && !p.is_empty() && !s.is_empty() =>
        {
            h
        }
        _ => return Err(ProofError::Malformed),
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| ProofError::Malformed)?;
    let header_value: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| ProofError::Malformed)?;

    // typ MUST be "dpop+jwt"; absence is treated as invalid to keep the
    // policy strict.
    match header_value.get("typ").and_then(|v| v.as_str()) {
        Some(typ) if typ.eq_ignore_ascii_case("dpop+jwt") => {}
        _ => return Err(ProofError::Malformed),
    }

    let alg = header_value
        .get("alg")
        .and_then(|v| v.as_str())
        .ok_or(ProofError::Malformed)?;
    let algorithm = match alg {
        "ES256" => Algorithm::ES256,
        "ES384" => Algorithm::ES384,
        "EdDSA" => Algorithm::EdDSA,
        "RS256" => Algorithm::RS256,
        "PS256" => Algorithm::PS256,
        // "none" and HS* fall through here with everything else unknown.
        other => return Err(ProofError::UnsupportedAlgorithm(other.to_string())),
    };

    Ok((header_value, algorithm))
}

/// Rebuild the absolute URL the client signed into htu.
///
/// RFC 9449 expects an absolute URI; in practice this service often sits
/// behind a proxy, so we prefer the configured public base URL and fall back
/// to forwarded headers.
pub fn expected_url(headers: &HeaderMap, uri: &Uri, public_base_url: Option<&str>) -> String {
    if let Some(base) = public_base_url {
        if let Ok(url) = build_url_from_base(base, uri) {
            return url;
        }
        // Misconfigured base URL: stay resilient and use forwarded headers.
    }
    build_url_from_forwarded(headers, uri)
}

fn build_url_from_base(base: &str, uri: &Uri) -> Result<String, url::ParseError> {
    // `base` should look like: https://api.example.com
    let mut url = url::Url::parse(base)?;
    url.set_path(uri.path());
    url.set_query(uri.query());
    Ok(url.to_string())
}

fn build_url_from_forwarded(headers: &HeaderMap, uri: &Uri) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}{}", scheme, host, uri)
}

/// Normalization used only for htu equality comparison:
/// - lowercase scheme/host
/// - drop default ports
/// - strip query string and fragment from both sides
fn normalize_htu(htu: &str) -> String {
    if let Ok(url) = url::Url::parse(htu) {
        let scheme = url.scheme().to_ascii_lowercase();
        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let port = url
            .port()
            .filter(|p| !((scheme == "http" && *p == 80) || (scheme == "https" && *p == 443)));
        let mut out = String::new();
        out.push_str(&scheme);
        out.push_str("://");
        out.push_str(&host);
        if let Some(port) = port {
            out.push(':');
            out.push_str(&port.to_string());
        }
        out.push_str(url.path());
        out
    } else {
        // Fallback (should not happen for valid proofs).
        htu.to_string()
    }
}

pub(crate) fn compute_ath(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::replay::MemoryReplayStore;
    use crate::services::clients::{FreshnessMode, SchemeMode};
    use crate::services::clock::FixedClock;
    use ed25519_dalek::{Signer, SigningKey};

    const NOW: i64 = 1_700_000_000;
    const URL: &str = "https://api.test/api/v1/resource";

    fn test_policy(freshness: FreshnessMode) -> ValidationPolicy {
        ValidationPolicy {
            mode: SchemeMode::BearerOrDpop,
            freshness,
            iat_leeway_seconds: 5,
            max_age_seconds: 300,
            require_ath: true,
            nonce_ttl_seconds: 300,
        }
    }

    struct Harness {
        validator: ProofValidator,
        nonces: Arc<NonceAuthority>,
        clock: Arc<FixedClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(FixedClock::at(NOW));
        let nonces = Arc::new(NonceAuthority::new(300, clock.clone()));
        let replay = Arc::new(MemoryReplayStore::new(clock.clone()));
        let validator = ProofValidator::new(replay, nonces.clone(), clock.clone(), 5);
        Harness {
            validator,
            nonces,
            clock,
        }
    }

    fn test_key() -> SigningKey {
        SigningKey::generate(&mut rand_core::OsRng)
    }

    fn jwk_json(key: &SigningKey) -> serde_json::Value {
        let x = URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes());
        serde_json::json!({ "kty": "OKP", "crv": "Ed25519", "x": x })
    }

    fn sign_compact(
        key: &SigningKey,
        header: serde_json::Value,
        payload: serde_json::Value,
    ) -> String {
        let h = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let p = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        let signing_input = format!("{}.{}", h, p);
        let sig = key.sign(signing_input.as_bytes());
        let s = URL_SAFE_NO_PAD.encode(sig.to_bytes());
        format!("{}.{}", signing_input, s)
    }

    fn proof_with(
        key: &SigningKey,
        jti: &str,
        mutate: impl FnOnce(&mut serde_json::Map<String, serde_json::Value>),
    ) -> String {
        let header = serde_json::json!({
            "typ": "dpop+jwt",
            "alg": "EdDSA",
            "jwk": jwk_json(key),
        });
        let mut payload = serde_json::Map::new();
        payload.insert("jti".into(), jti.into());
        payload.insert("htm".into(), "GET".into());
        payload.insert("htu".into(), URL.into());
        payload.insert("iat".into(), NOW.into());
        mutate(&mut payload);
        sign_compact(key, header, serde_json::Value::Object(payload))
    }

    fn request<'a>(proof: &'a str, policy: &'a ValidationPolicy) -> ProofValidationRequest<'a> {
        ProofValidationRequest {
            proof,
            method: &Method::GET,
            url: URL,
            access_token: None,
            nonce_context: "client-a",
            policy,
        }
    }

    #[tokio::test]
    async fn valid_proof_yields_key_thumbprint() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);
        let proof = proof_with(&key, "j1", |_| {});

        let verified = h.validator.validate(request(&proof, &policy)).await.unwrap();
        let expected_jkt = thumbprint(&serde_json::from_value(jwk_json(&key)).unwrap()).unwrap();
        assert_eq!(verified.jkt, expected_jkt);
        assert_eq!(verified.jti, "j1");
    }

    #[tokio::test]
    async fn url_comparison_strips_query_and_fragment() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);
        let proof = proof_with(&key, "j-query", |p| {
            p.insert("htu".into(), format!("{}?page=2#top", URL).into());
        });

        let mut req = request(&proof, &policy);
        req.url = "https://API.TEST:443/api/v1/resource?cursor=abc";
        assert!(h.validator.validate(req).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_typ_is_malformed() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);
        let proof = sign_compact(
            &key,
            serde_json::json!({ "typ": "JWT", "alg": "EdDSA", "jwk": jwk_json(&key) }),
            serde_json::json!({ "jti": "j2", "htm": "GET", "htu": URL, "iat": NOW }),
        );

        assert!(matches!(
            h.validator.validate(request(&proof, &policy)).await,
            Err(ProofError::Malformed)
        ));
    }

    #[tokio::test]
    async fn alg_none_and_hs256_are_unsupported() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);

        for alg in ["none", "HS256"] {
            let proof = sign_compact(
                &key,
                serde_json::json!({ "typ": "dpop+jwt", "alg": alg, "jwk": jwk_json(&key) }),
                serde_json::json!({ "jti": "j3", "htm": "GET", "htu": URL, "iat": NOW }),
            );
            assert!(matches!(
                h.validator.validate(request(&proof, &policy)).await,
                Err(ProofError::UnsupportedAlgorithm(_))
            ));
        }
    }

    #[tokio::test]
    async fn private_key_material_is_rejected() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);

        let mut jwk = jwk_json(&key);
        jwk.as_object_mut()
            .unwrap()
            .insert("d".into(), "AAAA".into());
        let proof = sign_compact(
            &key,
            serde_json::json!({ "typ": "dpop+jwt", "alg": "EdDSA", "jwk": jwk }),
            serde_json::json!({ "jti": "j4", "htm": "GET", "htu": URL, "iat": NOW }),
        );

        assert!(matches!(
            h.validator.validate(request(&proof, &policy)).await,
            Err(ProofError::PrivateKeyLeaked)
        ));
    }

    #[tokio::test]
    async fn signature_by_a_different_key_is_invalid() {
        let h = harness();
        let key = test_key();
        let other = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);

        // Header advertises `key`, signature made with `other`.
        let proof = sign_compact(
            &other,
            serde_json::json!({ "typ": "dpop+jwt", "alg": "EdDSA", "jwk": jwk_json(&key) }),
            serde_json::json!({ "jti": "j5", "htm": "GET", "htu": URL, "iat": NOW }),
        );

        assert!(matches!(
            h.validator.validate(request(&proof, &policy)).await,
            Err(ProofError::SignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn missing_claims_are_named() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);
        let proof = sign_compact(
            &key,
            serde_json::json!({ "typ": "dpop+jwt", "alg": "EdDSA", "jwk": jwk_json(&key) }),
            serde_json::json!({ "jti": "j6", "htm": "GET", "iat": NOW }),
        );

        assert!(matches!(
            h.validator.validate(request(&proof, &policy)).await,
            Err(ProofError::MissingClaim("htu"))
        ));
    }

    #[tokio::test]
    async fn method_mismatch_is_rejected() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);
        let proof = proof_with(&key, "j7", |p| {
            p.insert("htm".into(), "POST".into());
        });

        assert!(matches!(
            h.validator.validate(request(&proof, &policy)).await,
            Err(ProofError::MethodMismatch)
        ));
    }

    #[tokio::test]
    async fn freshness_bounds_are_inclusive() {
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);
        let lower = NOW - policy.max_age_seconds - policy.iat_leeway_seconds;
        let upper = NOW + policy.iat_leeway_seconds;

        for (iat, ok) in [
            (lower, true),
            (lower - 1, false),
            (upper, true),
            (upper + 1, false),
        ] {
            let h = harness();
            let proof = proof_with(&key, &format!("j-iat-{}", iat), |p| {
                p.insert("iat".into(), iat.into());
            });
            let res = h.validator.validate(request(&proof, &policy)).await;
            if ok {
                assert!(res.is_ok(), "iat={} should be accepted", iat);
            } else {
                assert!(
                    matches!(res, Err(ProofError::Stale)),
                    "iat={} should be stale",
                    iat
                );
            }
        }
    }

    #[tokio::test]
    async fn nonce_only_policy_skips_iat_window() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::Nonce);
        let nonce = h.nonces.issue("client-a");
        let proof = proof_with(&key, "j8", |p| {
            p.insert("iat".into(), (NOW - 10_000).into());
            p.insert("nonce".into(), nonce.into());
        });

        assert!(h.validator.validate(request(&proof, &policy)).await.is_ok());
    }

    #[tokio::test]
    async fn ath_must_match_presented_access_token() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);
        let proof = proof_with(&key, "j9", |p| {
            p.insert("ath".into(), compute_ath("token-one").into());
        });

        let mut req = request(&proof, &policy);
        req.access_token = Some("token-two");
        assert!(matches!(
            h.validator.validate(req).await,
            Err(ProofError::AccessTokenHashMismatch)
        ));
    }

    #[tokio::test]
    async fn missing_ath_fails_when_binding_is_mandatory() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);
        let proof = proof_with(&key, "j10", |_| {});

        let mut req = request(&proof, &policy);
        req.access_token = Some("token-one");
        assert!(matches!(
            h.validator.validate(req).await,
            Err(ProofError::MissingClaim("ath"))
        ));
    }

    #[tokio::test]
    async fn missing_nonce_returns_a_retry_nonce() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAtAndNonce);
        let proof = proof_with(&key, "j11", |_| {});

        let err = h
            .validator
            .validate(request(&proof, &policy))
            .await
            .unwrap_err();
        let nonce = match &err {
            ProofError::NonceRequired { nonce } => nonce.clone(),
            other => panic!("expected NonceRequired, got {:?}", other),
        };

        // Retrying with the issued nonce and a fresh jti succeeds.
        let retry = proof_with(&key, "j12", |p| {
            p.insert("nonce".into(), nonce.into());
        });
        assert!(h.validator.validate(request(&retry, &policy)).await.is_ok());
    }

    #[tokio::test]
    async fn consumed_nonce_cannot_be_replayed() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAtAndNonce);
        let nonce = h.nonces.issue("client-a");

        let first = proof_with(&key, "j13", |p| {
            p.insert("nonce".into(), nonce.clone().into());
        });
        assert!(h.validator.validate(request(&first, &policy)).await.is_ok());

        // Same nonce on a different proof: one-time use.
        let second = proof_with(&key, "j14", |p| {
            p.insert("nonce".into(), nonce.into());
        });
        let err = h
            .validator
            .validate(request(&second, &policy))
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::NonceInvalid { .. }));
        assert!(err.retry_nonce().is_some());
    }

    #[tokio::test]
    async fn replayed_jti_is_a_hard_failure() {
        let h = harness();
        let key = test_key();
        let policy = test_policy(FreshnessMode::IssuedAt);
        let proof = proof_with(&key, "j15", |_| {});

        assert!(h.validator.validate(request(&proof, &policy)).await.is_ok());
        let err = h
            .validator
            .validate(request(&proof, &policy))
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::ReplayDetected));
        assert!(err.retry_nonce().is_none());
    }

    #[tokio::test]
    async fn replay_window_expires_with_the_clock() {
        let h = harness();
        let key = test_key();
        let mut policy = test_policy(FreshnessMode::Nonce);
        policy.iat_leeway_seconds = 2;
        policy.max_age_seconds = 10;

        let nonce = h.nonces.issue("client-a");
        let proof = proof_with(&key, "j16", |p| {
            p.insert("nonce".into(), nonce.into());
        });
        assert!(h.validator.validate(request(&proof, &policy)).await.is_ok());

        // After 2 * (leeway + max_age) the jti may legitimately reappear;
        // the nonce requirement is what protects from that point on.
        h.clock.advance(25);
        let nonce = h.nonces.issue("client-a");
        let again = proof_with(&key, "j16", |p| {
            p.insert("iat".into(), (NOW + 25).into());
            p.insert("nonce".into(), nonce.into());
        });
        assert!(h.validator.validate(request(&again, &policy)).await.is_ok());
    }

    #[test]
    fn normalize_htu_examples() {
        assert_eq!(
            normalize_htu("https://EX.COM:443/a?x=1#frag"),
            "https://ex.com/a"
        );
        assert_eq!(
            normalize_htu("http://ex.com:8080/a/b"),
            "http://ex.com:8080/a/b"
        );
    }
}
