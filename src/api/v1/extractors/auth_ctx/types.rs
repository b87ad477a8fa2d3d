/*
 * Responsibility
 * - The authenticated-request context as handlers see it
 * - The arbitrator middleware validates credentials and stores this in
 *   request extensions; handlers only ever receive this type
 *
 * Notes
 * - Token and proof validation live in middleware/services; this is the
 *   contract type and stays free of any crypto
 */

use uuid::Uuid;

/// Context attached to every authenticated request.
///
/// - `user_id` is the internal user id (UUID by convention)
/// - `scopes` / `roles` are coarse-grained authorization inputs
/// - `jti` is for audit/correlation
/// - `dpop_jkt` is the proof-key thumbprint; Some(..) exactly when the
///   request authenticated under the DPoP scheme
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub user_id: Uuid,
    pub scopes: Vec<String>,
    pub roles: Vec<String>,
    pub jti: Option<String>,
    pub dpop_jkt: Option<String>,
}
