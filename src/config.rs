use serde::Deserialize;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub gateway_url: String,
    /// Bound on a single charge gateway call; a timeout is a transient failure
    pub gateway_timeout_secs: u64,
    /// Consecutive failures after which a pledge is paused for human review
    pub max_consecutive_failures: i32,
    /// Retry backoff: min(retry_base_secs * 2^n, retry_max_secs)
    pub retry_base_secs: i64,
    pub retry_max_secs: i64,
    pub retry_jitter: bool,
    /// Pledges charged in parallel within one batch
    pub max_concurrent_charges: usize,
    pub scheduler_tick_secs: u64,
    pub scheduler_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/givecycle".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            gateway_url: std::env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:9090".to_string()),
            gateway_timeout_secs: env_parse("GATEWAY_TIMEOUT_SECS", 30),
            max_consecutive_failures: env_parse("MAX_CONSECUTIVE_FAILURES", 3),
            retry_base_secs: env_parse("RETRY_BASE_SECS", 300),
            retry_max_secs: env_parse("RETRY_MAX_SECS", 21_600),
            retry_jitter: env_parse("RETRY_JITTER", false),
            max_concurrent_charges: env_parse("MAX_CONCURRENT_CHARGES", 8),
            scheduler_tick_secs: env_parse("SCHEDULER_TICK_SECS", 300),
            scheduler_enabled: env_parse("SCHEDULER_ENABLED", true),
        })
    }
}
