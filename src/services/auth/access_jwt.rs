use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::{error::Error as StdError, fmt};
use uuid::Uuid;

use crate::services::auth::binding::CnfClaim;

// Errors returned by access-token verification + strict claim validation.
#[derive(Debug)]
pub enum AccessJwtError {
    Jwt(jsonwebtoken::errors::Error),
    MissingOrInvalidAud,
    EmptyClaim(&'static str),
    InvalidSubUuid,
}

impl fmt::Display for AccessJwtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jwt(e) => write!(f, "jwt verification failed: {}", e),
            Self::MissingOrInvalidAud => write!(f, "missing or invalid 'aud' claim"),
            Self::EmptyClaim(name) => write!(f, "empty '{}' claim", name),
            Self::InvalidSubUuid => write!(f, "invalid 'sub' (expected UUID)"),
        }
    }
}

impl StdError for AccessJwtError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Jwt(e) => Some(e),
            _ => None,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AccessJwtError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::Jwt(e)
    }
}

fn aud_is_present_and_valid(aud: &serde_json::Value) -> bool {
    match aud {
        // Typical: aud is a string.
        serde_json::Value::String(s) => !s.trim().is_empty(),
        // Also valid: aud is an array of strings.
        serde_json::Value::Array(arr) => arr.iter().any(|v| match v {
            serde_json::Value::String(s) => !s.trim().is_empty(),
            _ => false,
        }),
        // Missing claim ends up as Null due to #[serde(default)].
        _ => false,
    }
}

/// Access token (JWT) claims.
///
/// NOTE:
/// - `aud` can be either string or array; jsonwebtoken validates it via
///   `Validation::set_audience`, we only check non-emptiness here.
/// - `cnf.jkt` is the sender-constrained key binding (see services::auth::binding).
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    // Keep as Value to accept both string and array.
    #[serde(default)]
    pub aud: serde_json::Value,

    pub sub: String,
    pub exp: u64,

    #[serde(default)]
    pub jti: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,

    #[serde(default)]
    pub cnf: Option<CnfClaim>,
}

/// Verified, application-facing shape of an accepted access token.
///
/// `sub` is a UUID by project convention and is promoted to `Uuid` here.
#[derive(Debug, Clone)]
pub struct VerifiedAccessToken {
    pub user_id: Uuid,

    pub client_id: Option<String>,
    pub jti: Option<String>,
    pub scope: Option<String>,
    pub roles: Option<Vec<String>>,

    // Thumbprint the token was bound to at issuance, if any.
    pub cnf_jkt: Option<String>,
}

/// EdDSA (Ed25519) access-token verifier.
///
/// This is the arbitrator's external collaborator: it knows nothing about
/// proofs, only about the access token itself (and the binding it carries).
/// Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct AuthService {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("validation", &self.validation)
            .finish()
    }
}

impl AuthService {
    pub fn new(
        access_public_key_pem: &str,
        issuer: &str,
        audience: &str,
        leeway_seconds: u64,
    ) -> Result<Self, String> {
        let decoding_key = DecodingKey::from_ed_pem(access_public_key_pem.as_bytes())
            .map_err(|e| format!("invalid ed25519 public key pem: {}", e))?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.leeway = leeway_seconds;

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    // Verify and decode a JWT access token.
    fn verify(&self, token: &str) -> Result<AccessTokenClaims, jsonwebtoken::errors::Error> {
        let data =
            jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)?;

        Ok(data.claims)
    }

    /// Verify + strict claim validation.
    ///
    /// `jsonwebtoken::Validation` already checks signature, `exp`, `iss`
    /// and `aud`. This method additionally requires the claims to be
    /// present *and not empty*, and `sub` to be a UUID.
    fn verify_strict(&self, token: &str) -> Result<AccessTokenClaims, AccessJwtError> {
        let claims = self.verify(token)?;

        if claims.iss.trim().is_empty() {
            return Err(AccessJwtError::EmptyClaim("iss"));
        }
        if claims.sub.trim().is_empty() {
            return Err(AccessJwtError::EmptyClaim("sub"));
        }
        if claims.exp == 0 {
            return Err(AccessJwtError::EmptyClaim("exp"));
        }
        if !aud_is_present_and_valid(&claims.aud) {
            return Err(AccessJwtError::MissingOrInvalidAud);
        }
        if Uuid::parse_str(&claims.sub).is_err() {
            return Err(AccessJwtError::InvalidSubUuid);
        }

        Ok(claims)
    }

    /// Verify + strict claim validation, converted into the
    /// application-facing type. Entry point for the arbitrator.
    pub fn verify_verified(&self, token: &str) -> Result<VerifiedAccessToken, AccessJwtError> {
        let claims = self.verify_strict(token)?;

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| AccessJwtError::InvalidSubUuid)?;

        Ok(VerifiedAccessToken {
            user_id,
            client_id: claims.client_id,
            jti: claims.jti,
            scope: claims.scope,
            roles: claims.roles,
            cnf_jkt: claims.cnf.and_then(|c| c.jkt),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
    use ed25519_dalek::pkcs8::{EncodePrivateKey, EncodePublicKey};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const ISS: &str = "https://issuer.test";
    const AUD: &str = "https://api.test";

    fn keypair() -> (EncodingKey, AuthService) {
        let sk = SigningKey::generate(&mut rand_core::OsRng);
        let private_pem = sk.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = sk.verifying_key().to_public_key_pem(LineEnding::LF).unwrap();

        let encoding = EncodingKey::from_ed_pem(private_pem.as_bytes()).unwrap();
        let service = AuthService::new(&public_pem, ISS, AUD, 0).unwrap();
        (encoding, service)
    }

    fn sign(encoding: &EncodingKey, claims: serde_json::Value) -> String {
        encode(&Header::new(Algorithm::EdDSA), &claims, encoding).unwrap()
    }

    #[test]
    fn accepts_valid_token_and_extracts_binding() {
        let (encoding, service) = keypair();
        let sub = Uuid::new_v4();
        let token = sign(
            &encoding,
            serde_json::json!({
                "iss": ISS,
                "aud": AUD,
                "sub": sub.to_string(),
                "exp": chrono::Utc::now().timestamp() + 300,
                "client_id": "spa",
                "scope": "read write",
                "cnf": { "jkt": "thumb" },
            }),
        );

        let verified = service.verify_verified(&token).unwrap();
        assert_eq!(verified.user_id, sub);
        assert_eq!(verified.client_id.as_deref(), Some("spa"));
        assert_eq!(verified.cnf_jkt.as_deref(), Some("thumb"));
    }

    #[test]
    fn rejects_wrong_audience() {
        let (encoding, service) = keypair();
        let token = sign(
            &encoding,
            serde_json::json!({
                "iss": ISS,
                "aud": "https://other.test",
                "sub": Uuid::new_v4().to_string(),
                "exp": chrono::Utc::now().timestamp() + 300,
            }),
        );

        assert!(matches!(
            service.verify_verified(&token),
            Err(AccessJwtError::Jwt(_))
        ));
    }

    #[test]
    fn rejects_non_uuid_subject() {
        let (encoding, service) = keypair();
        let token = sign(
            &encoding,
            serde_json::json!({
                "iss": ISS,
                "aud": AUD,
                "sub": "alice",
                "exp": chrono::Utc::now().timestamp() + 300,
            }),
        );

        assert!(matches!(
            service.verify_verified(&token),
            Err(AccessJwtError::InvalidSubUuid)
        ));
    }

    #[test]
    fn rejects_tampered_signature() {
        let (encoding, service) = keypair();
        let token = sign(
            &encoding,
            serde_json::json!({
                "iss": ISS,
                "aud": AUD,
                "sub": Uuid::new_v4().to_string(),
                "exp": chrono::Utc::now().timestamp() + 300,
            }),
        );

        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });

        assert!(service.verify_verified(&tampered).is_err());
    }
}
