//! Environment-driven configuration, read once at startup.

use std::time::Duration;

/// Gateway configuration, assembled once in `main` from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub upstream_base_url: String,
    pub upstream_content_base_url: String,
    pub upstream_partner_id: String,
    pub upstream_api_key: String,
    pub database_url: String,
    pub port: u16,
    pub mapbox_token: Option<String>,
    pub request_deadline: Duration,
    pub governor_sweep_interval: Duration,
    pub cache_sweep_interval: Duration,
}

impl Config {
    /// Load from environment, applying documented defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            upstream_base_url: require_env("UPSTREAM_BASE_URL")?,
            upstream_content_base_url: env_or("UPSTREAM_CONTENT_BASE_URL", "UPSTREAM_BASE_URL")?,
            upstream_partner_id: require_env("UPSTREAM_PARTNER_ID")?,
            upstream_api_key: require_env("UPSTREAM_API_KEY")?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://voyagegate.db".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            mapbox_token: std::env::var("MAPBOX_TOKEN").ok(),
            request_deadline: Duration::from_secs(env_u64("REQUEST_DEADLINE_SECS", 60)),
            governor_sweep_interval: Duration::from_secs(env_u64(
                "GOVERNOR_SWEEP_INTERVAL_SECS",
                300,
            )),
            cache_sweep_interval: Duration::from_secs(env_u64("CACHE_SWEEP_INTERVAL_SECS", 300)),
        })
    }
}

fn require_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing required environment variable {key}"))
}

fn env_or(key: &str, fallback_key: &str) -> anyhow::Result<String> {
    std::env::var(key).or_else(|_| require_env(fallback_key))
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
