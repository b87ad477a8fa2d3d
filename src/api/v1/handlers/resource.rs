/*
 * Responsibility
 * - Sample protected endpoints demonstrating the AuthCtx contract
 * - get_resource: a plain payload that only authenticated callers reach
 * - whoami: echoes the authenticated context (debugging / integration aid)
 */
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::api::v1::extractors::AuthCtxExtractor;

pub async fn get_resource(AuthCtxExtractor(ctx): AuthCtxExtractor) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "resource": "demo",
            "owner": ctx.user_id,
        })),
    )
}

pub async fn whoami(AuthCtxExtractor(ctx): AuthCtxExtractor) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "user_id": ctx.user_id,
            "scopes": ctx.scopes,
            "roles": ctx.roles,
            "jti": ctx.jti,
            // Present only when the request was DPoP-authenticated.
            "dpop_jkt": ctx.dpop_jkt,
        })),
    )
}
