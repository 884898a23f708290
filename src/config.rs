use std::env;

#[derive(Debug, Clone)]
pub struct Config {
  pub api_base_url: String,
  pub poll_interval_ms: u64,
}

impl Config {
  pub fn from_env() -> Self {
    Self {
      api_base_url: env::var("API_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8080".into()),
      poll_interval_ms: env::var("POLL_INTERVAL_MS")
        .unwrap_or_else(|_| "2000".into())
        .parse()
        .unwrap_or(2000),
    }
  }
}
