//! `recipe-proxy.toml` loading.
//!
//! Every section is optional and the defaults reproduce the hosted deployment: Spoonacular as the
//! upstream, the key in `SPOONACULAR_API_KEY`, and `reav.space` plus `localhost` as trusted
//! origins. The API key itself is never stored in the file, only the name of the variable holding
//! it.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::cors::CorsPolicy;
use crate::http::Uri;
use crate::recipe::{ApiKey, UpstreamConfig};

pub const DEFAULT_CONFIG_FILE: &str = "recipe-proxy.toml";
pub const DEFAULT_BASE_URL: &str = "https://api.spoonacular.com";
pub const DEFAULT_API_KEY_ENV: &str = "SPOONACULAR_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("configuration failed validation: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

pub struct ConfigLoader {
    config: ProxyConfig,
}

impl ConfigLoader {
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ProxyConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str(&contents)
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn into_config(self) -> ProxyConfig {
        self.config
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub upstream: UpstreamSection,
    #[serde(default)]
    pub cors: CorsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ProxyConfig {
    /// Resolve the upstream credential through `lookup`, normally `std::env::var`.
    ///
    /// Unset and empty values both resolve to `None`.
    pub fn resolve_api_key<F>(&self, lookup: F) -> Option<ApiKey>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        lookup(&self.upstream.api_key_env)
            .filter(|value| !value.trim().is_empty())
            .map(ApiKey::new)
    }

    pub fn upstream_config<F>(&self, lookup: F) -> UpstreamConfig
    where
        F: FnOnce(&str) -> Option<String>,
    {
        UpstreamConfig::new(&self.upstream.base_url, self.resolve_api_key(lookup))
    }

    pub fn cors_policy(&self) -> CorsPolicy {
        CorsPolicy::new(
            self.cors.exact_origins.iter().cloned(),
            self.cors.origin_suffixes.iter().cloned(),
            self.cors.dev_markers.iter().cloned(),
        )
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct UpstreamSection {
    #[serde(default = "default_base_url")]
    #[validate(custom(function = "validate_base_url"))]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    #[validate(length(min = 1))]
    pub api_key_env: String,
    /// Request timeout; the transport default applies when unset.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub timeout_secs: Option<u64>,
}

impl UpstreamSection {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn validate_base_url(value: &str) -> Result<(), ValidationError> {
    let uri: Uri = value
        .parse()
        .map_err(|_| ValidationError::new("base_url_unparseable"))?;
    match (uri.scheme_str(), uri.authority()) {
        (Some("http" | "https"), Some(_)) if uri.query().is_none() => Ok(()),
        _ => Err(ValidationError::new("base_url_must_be_http")),
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CorsSection {
    #[serde(default = "default_exact_origins")]
    pub exact_origins: Vec<String>,
    #[serde(default = "default_origin_suffixes")]
    pub origin_suffixes: Vec<String>,
    #[serde(default = "default_dev_markers")]
    pub dev_markers: Vec<String>,
}

impl Default for CorsSection {
    fn default() -> Self {
        Self {
            exact_origins: default_exact_origins(),
            origin_suffixes: default_origin_suffixes(),
            dev_markers: default_dev_markers(),
        }
    }
}

fn default_exact_origins() -> Vec<String> {
    CorsPolicy::default().exact_origins().to_vec()
}

fn default_origin_suffixes() -> Vec<String> {
    CorsPolicy::default().origin_suffixes().to_vec()
}

fn default_dev_markers() -> Vec<String> {
    CorsPolicy::default().dev_markers().to_vec()
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub echo_stdout: Option<bool>,
}

impl LoggingSection {
    /// Effective filter; `echo_stdout = false` silences output entirely.
    pub fn level_filter(&self) -> LevelFilter {
        if self.echo_stdout.unwrap_or(true) {
            self.level.into()
        } else {
            LevelFilter::Off
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "off" => Ok(Self::Off),
            other => Err(serde::de::Error::custom(format!(
                "logging level must be trace, debug, info, warn, error, or off (got `{}`)",
                other
            ))),
        }
    }
}
