use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::exporter::ErrorHandler;

pub const DEFAULT_ENDPOINT: &str = "https://api.datadoghq.com/";
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    Gzip,
    #[default]
    None,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATADOG_EXPORTER_API_KEY is required but not set")]
    ApiKeyMissing,

    #[error("DATADOG_EXPORTER_ENDPOINT is not a valid URL: {0}")]
    EndpointInvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("DATADOG_EXPORTER_COMPRESSION has invalid value: {0} (expected \"gzip\" or \"none\")")]
    InvalidCompression(String),
}

/// Exporter configuration. Only `api_key` is required.
#[derive(Clone)]
pub struct Options {
    /// Datadog API key, sent as the `api_key` query parameter.
    pub api_key: String,

    /// Base URL of the Datadog API.
    pub endpoint: Url,

    /// Client used for uploads. When unset a client with `export_timeout` is built.
    pub http_client: Option<reqwest::Client>,

    /// Called with every error raised after construction. When unset, errors are logged.
    pub on_error: Option<Arc<dyn ErrorHandler>>,

    /// Max time a view waits in the buffer before upload. Zero selects the bundler default.
    pub bundle_delay_threshold: Duration,

    /// Number of views buffered before a batch upload. Zero selects the bundler default.
    pub bundle_count_threshold: usize,

    /// Host reported on every series. Resolved from the OS when unset.
    pub host: Option<String>,

    pub compression: Compression,
    pub export_timeout: Duration,
}

impl Options {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("DATADOG_EXPORTER_"))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_key = vars
            .get("DATADOG_EXPORTER_API_KEY")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::ApiKeyMissing)?
            .clone();
        let endpoint = parse_endpoint(vars)?;
        let host = vars
            .get("DATADOG_EXPORTER_HOST")
            .filter(|s| !s.is_empty())
            .cloned();
        let compression = parse_compression(vars)?;
        let export_timeout = parse_duration_ms(
            vars,
            "DATADOG_EXPORTER_EXPORT_TIMEOUT_MS",
            DEFAULT_EXPORT_TIMEOUT,
        )?;
        let bundle_delay_threshold =
            parse_duration_ms(vars, "DATADOG_EXPORTER_BUNDLE_DELAY_MS", Duration::ZERO)?;
        let bundle_count_threshold = parse_count(vars, "DATADOG_EXPORTER_BUNDLE_COUNT")?;

        Ok(Self {
            api_key,
            endpoint,
            http_client: None,
            on_error: None,
            bundle_delay_threshold,
            bundle_count_threshold,
            host,
            compression,
            export_timeout,
        })
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_endpoint(),
            http_client: None,
            on_error: None,
            bundle_delay_threshold: Duration::ZERO,
            bundle_count_threshold: 0,
            host: None,
            compression: Compression::None,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint.as_str())
            .field("http_client", &self.http_client.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("bundle_delay_threshold", &self.bundle_delay_threshold)
            .field("bundle_count_threshold", &self.bundle_count_threshold)
            .field("host", &self.host)
            .field("compression", &self.compression)
            .field("export_timeout", &self.export_timeout)
            .finish()
    }
}

fn default_endpoint() -> Url {
    Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL")
}

fn parse_endpoint(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    match vars
        .get("DATADOG_EXPORTER_ENDPOINT")
        .filter(|s| !s.is_empty())
    {
        Some(raw) => Url::parse(raw).map_err(|_| ConfigError::EndpointInvalidUrl(raw.clone())),
        None => Ok(default_endpoint()),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(default),
    }
}

fn parse_count(vars: &HashMap<String, String>, name: &str) -> Result<usize, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(0),
    }
}

fn parse_compression(vars: &HashMap<String, String>) -> Result<Compression, ConfigError> {
    match vars
        .get("DATADOG_EXPORTER_COMPRESSION")
        .map(|s| s.as_str())
    {
        Some("none") | None => Ok(Compression::None),
        Some("gzip") => Ok(Compression::Gzip),
        Some(other) => Err(ConfigError::InvalidCompression(other.to_owned())),
    }
}

#[cfg(test)]
mod tests;
