//! WWW-Authenticate challenge construction (RFC 6750 / RFC 9449).
//!
//! Every authentication denial leaves the server through this module so the
//! challenge grammar stays in one place. The arbitrator decides *which*
//! denial applies; this module only knows how to say it on the wire.

use axum::Json;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::error::ErrorResponse;

pub const ERR_INVALID_TOKEN: &str = "invalid_token";
pub const ERR_INVALID_DPOP_PROOF: &str = "invalid_dpop_proof";
pub const ERR_USE_DPOP_NONCE: &str = "use_dpop_nonce";

/// JWS algorithms this server accepts in DPoP proofs, advertised via the
/// `algs` challenge parameter. Must stay in sync with the validator's
/// allowlist.
pub const SUPPORTED_ALGS: &str = "ES256 ES384 RS256 PS256 EdDSA";

pub const DPOP_NONCE_HEADER: HeaderName = HeaderName::from_static("dpop-nonce");

use crate::services::clients::SchemeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Bearer,
    Dpop,
}

impl Scheme {
    fn label(&self) -> &'static str {
        match self {
            Self::Bearer => "Bearer",
            Self::Dpop => "DPoP",
        }
    }
}

/// One challenge within a WWW-Authenticate header.
#[derive(Debug, Clone)]
pub struct Challenge {
    scheme: Scheme,
    error: Option<&'static str>,
    // Kept to fixed strings so no quoting/escaping is ever needed.
    description: Option<&'static str>,
}

impl Challenge {
    /// A scheme advertisement with no error attribution, used when the
    /// request carried no usable credentials.
    pub fn bare(scheme: Scheme) -> Self {
        Self {
            scheme,
            error: None,
            description: None,
        }
    }

    pub fn with_error(scheme: Scheme, error: &'static str, description: &'static str) -> Self {
        Self {
            scheme,
            error: Some(error),
            description: Some(description),
        }
    }

    fn render(&self) -> String {
        let mut params: Vec<String> = Vec::new();
        if let Some(error) = self.error {
            params.push(format!("error=\"{}\"", error));
        }
        if let Some(description) = self.description {
            params.push(format!("error_description=\"{}\"", description));
        }
        if self.scheme == Scheme::Dpop {
            params.push(format!("algs=\"{}\"", SUPPORTED_ALGS));
        }

        if params.is_empty() {
            self.scheme.label().to_string()
        } else {
            format!("{} {}", self.scheme.label(), params.join(", "))
        }
    }
}

/// A complete 401 denial: one or more challenges, optionally accompanied by
/// a fresh server nonce in the DPoP-Nonce header.
#[derive(Debug)]
pub struct Denial {
    challenges: Vec<Challenge>,
    nonce: Option<String>,
}

impl Denial {
    pub fn new(challenge: Challenge) -> Self {
        Self {
            challenges: vec![challenge],
            nonce: None,
        }
    }

    /// Bare challenges advertising every scheme the resolved policy allows.
    /// Used both for credential-less requests and for requests using a
    /// scheme the policy forbids.
    pub fn for_mode(mode: SchemeMode) -> Self {
        let mut challenges = Vec::new();
        if mode.allows_bearer() {
            challenges.push(Challenge::bare(Scheme::Bearer));
        }
        if mode.allows_dpop() {
            challenges.push(Challenge::bare(Scheme::Dpop));
        }
        Self {
            challenges,
            nonce: None,
        }
    }

    pub fn with_nonce(mut self, nonce: String) -> Self {
        self.nonce = Some(nonce);
        self
    }

    fn www_authenticate(&self) -> String {
        self.challenges
            .iter()
            .map(Challenge::render)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        // The headers carry the protocol-level answer; the JSON body repeats
        // it in the app-wide error shape for human readers and API clients.
        let code = self
            .challenges
            .iter()
            .find_map(|c| c.error)
            .unwrap_or("unauthorized");
        let message = self
            .challenges
            .iter()
            .find_map(|c| c.description)
            .unwrap_or("authentication required");
        let body = ErrorResponse::new(code, message);

        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();

        if let Ok(value) = HeaderValue::from_str(&self.www_authenticate()) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        if let Some(nonce) = &self.nonce {
            if let Ok(value) = HeaderValue::from_str(nonce) {
                response.headers_mut().insert(DPOP_NONCE_HEADER, value);
            }
        }

        response
    }
}
