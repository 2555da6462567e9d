//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `IMGRELAY_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`, may be absent)
//! 2. **Environment variables** - Variables prefixed with `IMGRELAY_` override YAML values
//!
//! For nested values, use double underscores. For example, `IMGRELAY_PROVIDER__API_KEY=...`
//! sets `provider.api_key`, which is the recommended way to supply the image host credential.
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 3000
//! provider:
//!   url: https://pic.in.th/api/1/upload
//!   api_key_header: X-API-Key
//!   timeout: 30s
//! limits:
//!   max_file_size: 10485760
//! cors:
//!   allowed_origins: ["https://upload.example.com"]
//! ```

use anyhow::bail;
use axum::http::HeaderName;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::types::RelayCredential;

/// Default upload endpoint of the image host.
pub const DEFAULT_PROVIDER_URL: &str = "https://pic.in.th/api/1/upload";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IMGRELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// The image host the relay forwards uploads to
    pub provider: ProviderConfig,
    /// Upload size limits
    pub limits: LimitsConfig,
    /// Cross-origin access to the relay endpoint
    pub cors: CorsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Image host configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Upload endpoint that receives the re-packaged multipart form
    pub url: Url,
    /// Secret API key, attached only to outbound requests
    pub api_key: Option<RelayCredential>,
    /// Header carrying the API key
    pub api_key_header: String,
    /// Deadline for the whole outbound call (request plus response body)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Upload limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum size in bytes of the uploaded file. Default: 10MB
    pub max_file_size: u64,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
///
/// An empty origin list means no CORS headers are emitted and only same-origin pages can call
/// the relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// One allowed CORS origin.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            provider: ProviderConfig::default(),
            limits: LimitsConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_PROVIDER_URL).expect("default provider URL is valid"),
            api_key: None,
            api_key_header: "X-API-Key".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config
            .validate()
            .map_err(|e| figment::Error::from(format!("Invalid configuration: {e}")))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.provider.api_key {
            Some(key) if !key.is_empty() => {}
            _ => bail!(
                "provider.api_key is not configured. \
                 Please set IMGRELAY_PROVIDER__API_KEY environment variable or add provider.api_key to config file."
            ),
        }

        if HeaderName::from_bytes(self.provider.api_key_header.as_bytes()).is_err() {
            bail!(
                "provider.api_key_header '{}' is not a valid HTTP header name",
                self.provider.api_key_header
            );
        }

        if !matches!(self.provider.url.scheme(), "http" | "https") {
            bail!(
                "provider.url must be an http(s) URL, got scheme '{}'",
                self.provider.url.scheme()
            );
        }

        if self.provider.timeout.is_zero() {
            bail!("provider.timeout must be greater than 0");
        }

        if self.limits.max_file_size == 0 {
            bail!("limits.max_file_size must be greater than 0");
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can override specific values
            .merge(Env::prefixed("IMGRELAY_").split("__").ignore(&["config"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
