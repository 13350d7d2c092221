use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub relay_base_url: String,
    pub api_token: Option<String>,
    pub poll_interval_ms: u64,
    pub status_timeout_secs: u64,
    pub max_rate_limit_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            relay_base_url: env::var("RELAY_BASE_URL")?,
            api_token: env::var("RELAY_API_TOKEN").ok(),
            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            status_timeout_secs: env::var("STATUS_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            max_rate_limit_attempts: env::var("MAX_RATE_LIMIT_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
        })
    }
}
