//! Bearer/DPoP arbitration for protected routes.
//!
//! One middleware owns the whole authentication decision for `/api/v1/*`:
//! which scheme the request used, whether the access token is valid, whether
//! the proof (if any) validates, and whether token and proof agree on the
//! key. On success an `AuthCtx` is inserted into request extensions for the
//! handlers; on failure the response is a 401 built by the challenge module.
//!
//! Ordering is deliberate: the token is verified before the proof so the
//! client identity (and with it the per-client policy) is known when the
//! proof is judged.

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderMap, HeaderValue, Method, Request, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use crate::api::v1::extractors::AuthCtx;
use crate::middleware::auth::challenge::{self, Challenge, Denial, Scheme};
use crate::services::auth::VerifiedAccessToken;
use crate::services::auth::binding::{self, BindingCheck};
use crate::services::auth::dpop::core as dpop_core;
use crate::services::auth::dpop::{ProofError, ProofValidationRequest};
use crate::state::AppState;

const DPOP_HEADER: &str = "dpop";

/// Apply the arbitrator to a router.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8: from_fn cannot take a State extractor, so the state is
    // passed explicitly via from_fn_with_state.
    router.layer(middleware::from_fn_with_state(state, arbitrate))
}

async fn arbitrate(
    State(state): State<AppState>,
    OriginalUri(original_uri): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&state, &original_uri, req.headers(), req.method()).await {
        Ok(outcome) => {
            req.extensions_mut().insert(outcome.ctx);
            let mut response = next.run(req).await;
            // Proactive nonce rotation: when the policy demands nonces, a
            // successful response already carries the value for the next
            // proof.
            if let Some(nonce) = outcome.next_nonce {
                if let Ok(value) = HeaderValue::from_str(&nonce) {
                    response
                        .headers_mut()
                        .insert(challenge::DPOP_NONCE_HEADER, value);
                }
            }
            response
        }
        Err(denial) => denial.into_response(),
    }
}

struct Authenticated {
    ctx: AuthCtx,
    next_nonce: Option<String>,
}

async fn authenticate(
    state: &AppState,
    original_uri: &Uri,
    headers: &HeaderMap,
    method: &Method,
) -> Result<Authenticated, Denial> {
    let default_mode = state.clients.default_policy().mode;

    let Some(authorization) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Err(Denial::for_mode(default_mode));
    };

    let Some((scheme_raw, token)) = authorization.split_once(' ') else {
        return Err(Denial::for_mode(default_mode));
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(Denial::for_mode(default_mode));
    }

    let scheme = if scheme_raw.eq_ignore_ascii_case("bearer") {
        Scheme::Bearer
    } else if scheme_raw.eq_ignore_ascii_case("dpop") {
        Scheme::Dpop
    } else {
        return Err(Denial::for_mode(default_mode));
    };

    // Exactly one DPoP header is acceptable; duplicates are ambiguous and
    // rejected before any crypto work.
    let mut proofs = headers.get_all(DPOP_HEADER).iter();
    let proof_header = proofs.next();
    if proofs.next().is_some() {
        return Err(Denial::new(Challenge::with_error(
            Scheme::Dpop,
            challenge::ERR_INVALID_DPOP_PROOF,
            "multiple DPoP headers",
        )));
    }

    // Token first: identity and per-client policy come from the token.
    let verified = match state.auth.verify_verified(token) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(error = ?err, "access token verification failed");
            return Err(Denial::new(Challenge::with_error(
                scheme,
                challenge::ERR_INVALID_TOKEN,
                "access token validation failed",
            )));
        }
    };

    let policy = verified
        .client_id
        .as_deref()
        .and_then(|id| state.clients.find_client(id))
        .unwrap_or_else(|| state.clients.default_policy());

    match scheme {
        Scheme::Bearer => {
            if !policy.mode.allows_bearer() {
                return Err(Denial::for_mode(policy.mode));
            }
            // A key-bound token presented without its proof is a downgrade
            // attempt, not a plain Bearer request.
            if verified.cnf_jkt.is_some() {
                tracing::warn!(
                    user_id = %verified.user_id,
                    "sender-constrained token presented as Bearer"
                );
                return Err(Denial::new(Challenge::with_error(
                    Scheme::Bearer,
                    challenge::ERR_INVALID_TOKEN,
                    "token requires a DPoP proof",
                )));
            }

            Ok(Authenticated {
                ctx: auth_ctx(verified, None),
                next_nonce: None,
            })
        }
        Scheme::Dpop => {
            if !policy.mode.allows_dpop() {
                return Err(Denial::for_mode(policy.mode));
            }

            let Some(proof) = proof_header.and_then(|v| v.to_str().ok()) else {
                return Err(Denial::new(Challenge::with_error(
                    Scheme::Dpop,
                    challenge::ERR_INVALID_DPOP_PROOF,
                    "missing DPoP proof",
                )));
            };

            let expected_url = dpop_core::expected_url(
                headers,
                original_uri,
                state.public_base_url.as_deref(),
            );
            let nonce_context = verified
                .client_id
                .clone()
                .unwrap_or_else(|| verified.user_id.to_string());

            let proof_result = state
                .dpop
                .validate(ProofValidationRequest {
                    proof,
                    method,
                    url: &expected_url,
                    access_token: Some(token),
                    nonce_context: &nonce_context,
                    policy: &policy,
                })
                .await;

            let verified_proof = match proof_result {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(error = ?err, "dpop proof rejected");
                    return Err(match err {
                        ProofError::NonceRequired { nonce } => Denial::new(
                            Challenge::with_error(
                                Scheme::Dpop,
                                challenge::ERR_USE_DPOP_NONCE,
                                "server nonce required",
                            ),
                        )
                        .with_nonce(nonce),
                        ProofError::NonceInvalid { nonce } => Denial::new(
                            Challenge::with_error(
                                Scheme::Dpop,
                                challenge::ERR_USE_DPOP_NONCE,
                                "server nonce rejected",
                            ),
                        )
                        .with_nonce(nonce),
                        _ => Denial::new(Challenge::with_error(
                            Scheme::Dpop,
                            challenge::ERR_INVALID_DPOP_PROOF,
                            "DPoP proof validation failed",
                        )),
                    });
                }
            };

            // The proof key and the token binding must agree. An unbound
            // token under the DPoP scheme fails the same way: there is no
            // binding for the proof to satisfy.
            match binding::check(verified.cnf_jkt.as_deref(), &verified_proof.jkt) {
                BindingCheck::Match => {}
                BindingCheck::Unbound | BindingCheck::Mismatch => {
                    tracing::warn!(
                        user_id = %verified.user_id,
                        jkt = %verified_proof.jkt,
                        "token/proof key binding failed"
                    );
                    return Err(Denial::new(Challenge::with_error(
                        Scheme::Dpop,
                        challenge::ERR_INVALID_TOKEN,
                        "token is not bound to the presented key",
                    )));
                }
            }

            let next_nonce = policy
                .freshness
                .requires_nonce()
                .then(|| state.nonces.issue(&nonce_context));

            Ok(Authenticated {
                ctx: auth_ctx(verified, Some(verified_proof.jkt)),
                next_nonce,
            })
        }
    }
}

fn auth_ctx(token: VerifiedAccessToken, dpop_jkt: Option<String>) -> AuthCtx {
    AuthCtx {
        user_id: token.user_id,
        scopes: token
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        roles: token.roles.unwrap_or_default(),
        jti: token.jti,
        dpop_jkt,
    }
}
