//! Configuration module

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub api_key_header: ApiKeyHeader,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

/// A player registered at start-up
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub username: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Header carrying the API key. One convention per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiKeyHeader {
    #[default]
    XApiKey,
    Authorization,
}

impl ApiKeyHeader {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKeyHeader::XApiKey => "X-API-Key",
            ApiKeyHeader::Authorization => "Authorization",
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            api_key_header: ApiKeyHeader::default(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_base_url() -> String {
    "https://api.donutsmp.net/v1/".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("DonutSMP-Poller/{}", env!("CARGO_PKG_VERSION"))
}

fn default_interval_secs() -> u64 {
    60
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parsed base URL. Always ends with `/` so endpoint paths join below it.
    pub fn base_url(&self) -> Result<Url, AppError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)
            .map_err(|e| AppError::Config(format!("api.base_url {}: {}", self.base_url, e)))?;
        if url.scheme() != "https" {
            return Err(AppError::Config(format!(
                "api.base_url must use https: {}",
                self.base_url
            )));
        }
        Ok(url)
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("DONUTSMP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.api.base_url()?;
        if self.api.timeout_secs == 0 {
            return Err(AppError::Config("api.timeout_secs must be > 0".to_string()));
        }
        if self.poll.interval_secs == 0 {
            return Err(AppError::Config("poll.interval_secs must be > 0".to_string()));
        }
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::Config("api.user_agent must not be empty".to_string()));
        }
        Ok(())
    }
}
