/*
 * Responsibility
 * - Load configuration from environment variables (auth, DPoP policy, replay backend)
 * - Validate configuration values (fail startup on anything missing/unparseable)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::services::clients::{FreshnessMode, SchemeMode, ValidationPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Where observed proof identifiers live.
///
/// `Memory` is correct for a single instance; `Valkey` is for running more
/// than one replica behind a load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayBackend {
    Memory,
    Valkey,
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub auth_issuer: String,
    pub auth_audience: String,
    pub access_token_leeway_seconds: u64,
    pub access_jwt_public_key_pem: String,

    // Canonical external base URL used to rebuild the htu the client signed.
    // When unset we fall back to forwarded/Host headers.
    pub public_base_url: Option<String>,

    // Default per-client validation policy (clients may override via the
    // client directory).
    pub dpop_policy: ValidationPolicy,
    // Server-side clock skew allowance, folded into the replay window.
    pub dpop_server_skew_seconds: i64,

    pub replay_backend: ReplayBackend,
    pub redis_url: Option<String>,
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = env_parse("PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let auth_issuer =
            std::env::var("AUTH_ISSUER").map_err(|_| ConfigError::Missing("AUTH_ISSUER"))?;
        let auth_audience =
            std::env::var("AUTH_AUDIENCE").map_err(|_| ConfigError::Missing("AUTH_AUDIENCE"))?;
        let access_token_leeway_seconds = env_parse("ACCESS_TOKEN_LEEWAY_SECONDS", 60)?;

        let access_jwt_public_key_pem = std::env::var("ACCESS_JWT_PUBLIC_KEY_PEM")
            .map_err(|_| ConfigError::Missing("ACCESS_JWT_PUBLIC_KEY_PEM"))?
            .replace("\\n", "\n");

        let public_base_url = std::env::var("PUBLIC_BASE_URL").ok().filter(|s| !s.is_empty());

        let mode = match std::env::var("DPOP_MODE")
            .unwrap_or_else(|_| "both".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "bearer" => SchemeMode::BearerOnly,
            "dpop" => SchemeMode::DpopOnly,
            "both" => SchemeMode::BearerOrDpop,
            _ => return Err(ConfigError::Invalid("DPOP_MODE")),
        };

        let freshness = match std::env::var("DPOP_FRESHNESS")
            .unwrap_or_else(|_| "iat".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "iat" => FreshnessMode::IssuedAt,
            "nonce" => FreshnessMode::Nonce,
            "iat+nonce" | "nonce+iat" => FreshnessMode::IssuedAtAndNonce,
            _ => return Err(ConfigError::Invalid("DPOP_FRESHNESS")),
        };

        let dpop_policy = ValidationPolicy {
            mode,
            freshness,
            iat_leeway_seconds: env_parse("DPOP_IAT_LEEWAY_SECONDS", 5)?,
            max_age_seconds: env_parse("DPOP_MAX_AGE_SECONDS", 300)?,
            require_ath: env_parse("DPOP_REQUIRE_ATH", true)?,
            nonce_ttl_seconds: env_parse("DPOP_NONCE_TTL_SECONDS", 300)?,
        };

        let dpop_server_skew_seconds = env_parse("DPOP_SERVER_SKEW_SECONDS", 5)?;

        let replay_backend = match std::env::var("REPLAY_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => ReplayBackend::Memory,
            "valkey" | "redis" => ReplayBackend::Valkey,
            _ => return Err(ConfigError::Invalid("REPLAY_BACKEND")),
        };

        let redis_url = std::env::var("REDIS_URL").ok();
        if replay_backend == ReplayBackend::Valkey && redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }

        Ok(Self {
            addr,
            app_env,
            auth_issuer,
            auth_audience,
            access_token_leeway_seconds,
            access_jwt_public_key_pem,
            public_base_url,
            dpop_policy,
            dpop_server_skew_seconds,
            replay_backend,
            redis_url,
        })
    }
}
