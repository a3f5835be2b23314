use serde::Deserialize;

/// Mirrors the three Flask-style presets the original service shipped with.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl Environment {
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "testing" => Environment::Testing,
            "production" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// (max_pages, concurrency_cap, request_timeout_secs)
    pub fn preset(self) -> (usize, usize, u64) {
        match self {
            Environment::Development => (100, 10, 30),
            Environment::Testing => (10, 5, 30),
            Environment::Production => (100, 50, 60),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub redis: RedisConfig,
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,
    #[serde(default = "default_max_content_size")]
    pub max_content_size: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            secret_key: default_secret_key(),
            max_pages: default_max_pages(),
            concurrency: default_concurrency(),
            max_connections: default_max_connections(),
            request_timeout_secs: default_request_timeout_secs(),
            progress_tick_ms: default_progress_tick_ms(),
            max_content_size: default_max_content_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
            state_ttl_secs: default_state_ttl_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
        }
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate")]
    pub requests_per_second: f64,
    #[serde(default = "default_burst")]
    pub burst: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate(),
            burst: default_burst(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            redis: RedisConfig::default(),
            rate_limit: RateLimitConfig::default(),
            environment: Environment::default(),
        }
    }
}

impl AppConfig {
    /// Apply the `(max_pages, concurrency, timeout)` preset for `self.environment`,
    /// but only to fields the config file left at their hardcoded default —
    /// an explicit config value always wins over the preset.
    pub fn apply_environment_preset(&mut self) {
        let (max_pages, concurrency, timeout) = self.environment.preset();
        if self.general.max_pages == default_max_pages() {
            self.general.max_pages = max_pages;
        }
        if self.general.concurrency == default_concurrency() {
            self.general.concurrency = concurrency;
        }
        if self.general.request_timeout_secs == default_request_timeout_secs() {
            self.general.request_timeout_secs = timeout;
        }
    }
}

fn default_port() -> u16 {
    5000
}
fn default_secret_key() -> String {
    "default-secret-key".to_string()
}
fn default_max_pages() -> usize {
    100
}
fn default_concurrency() -> usize {
    10
}
fn default_max_connections() -> usize {
    100
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_progress_tick_ms() -> u64 {
    500
}
fn default_max_content_size() -> usize {
    500_000
}
fn default_cache_ttl_secs() -> u64 {
    24 * 3600
}
fn default_state_ttl_secs() -> u64 {
    3600
}
fn default_redis_host() -> String {
    "localhost".to_string()
}
fn default_redis_port() -> u16 {
    6379
}
fn default_rate() -> f64 {
    2.0
}
fn default_burst() -> f64 {
    5.0
}
