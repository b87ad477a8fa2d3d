/*
 * Responsibility
 * - Config load → dependency construction → Router assembly
 * - Middleware application (HTTP layers + the auth arbitrator)
 * - axum::serve() startup
 */
use anyhow::{Context, Result};
use axum::{Router, routing::get};
use std::{panic, process, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::{Config, ReplayBackend};
use crate::middleware;
use crate::services::auth::AuthService;
use crate::services::auth::dpop::{NonceAuthority, ProofValidator};
use crate::services::auth::replay::{MemoryReplayStore, ReplayStore, ValkeyReplayStore};
use crate::services::clients::StaticClientDirectory;
use crate::services::clock::{Clock, SystemClock};
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,dpop_guard=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    // Keep the default hook as a fallback (prints to stderr with location/payload).
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get "lost"
        // (stderr can be hidden depending on how the process is launched).
        tracing::error!(?info, "panic");

        // In development, fail fast. In production, keep the server running
        // and rely on the default hook's stderr output.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env().context("configuration")?;

    let abort_on_panic = !config.app_env.is_production();
    init_panic_hook(abort_on_panic);

    tracing::info!(
        "starting resource server in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(config: &Config) -> Result<AppState> {
    let auth = AuthService::new(
        &config.access_jwt_public_key_pem,
        &config.auth_issuer,
        &config.auth_audience,
        config.access_token_leeway_seconds,
    )
    .map_err(|e| anyhow::anyhow!(e))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let replay: Arc<dyn ReplayStore> = match config.replay_backend {
        ReplayBackend::Memory => Arc::new(MemoryReplayStore::new(clock.clone())),
        ReplayBackend::Valkey => {
            // Config guarantees the URL is present for this backend.
            let url = config.redis_url.as_deref().context("REDIS_URL")?;
            let store = ValkeyReplayStore::new(url)
                .await
                .map_err(|e| anyhow::anyhow!("replay backend: {}", e))?;
            tracing::info!("replay protection backed by valkey");
            Arc::new(store)
        }
    };

    let nonces = Arc::new(NonceAuthority::new(
        config.dpop_policy.nonce_ttl_seconds,
        clock.clone(),
    ));
    let dpop = Arc::new(ProofValidator::new(
        replay,
        nonces.clone(),
        clock,
        config.dpop_server_skew_seconds,
    ));

    // Per-client overrides would be loaded here; the environment currently
    // only describes the default policy.
    let clients = Arc::new(StaticClientDirectory::new(config.dpop_policy));

    Ok(AppState::new(
        Arc::new(auth),
        clients,
        dpop,
        nonces,
        config.public_base_url.clone(),
    ))
}

fn build_router(state: AppState) -> Router {
    // /health stays outside the arbitrator; everything under /api/v1 is
    // authenticated.
    let v1 = middleware::auth::access::apply(api::v1::routes(), state.clone());

    let app = Router::new()
        .route("/health", get(api::v1::handlers::health::health))
        .nest("/api/v1", v1)
        .with_state(state);

    middleware::http::apply(app)
}
