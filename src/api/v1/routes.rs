/*
 * Responsibility
 * - v1 URL structure
 * - Everything registered here is expected to sit behind the arbitrator
 *   (applied in app.rs); nothing in v1 is public.
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::resource::{get_resource, whoami};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/resource", get(get_resource))
        .route("/whoami", get(whoami))
}
