use std::collections::HashMap;
use std::time::Duration;

use super::*;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn parses_api_key_and_applies_defaults() {
    let options = Options::parse(&vars(&[("DATADOG_EXPORTER_API_KEY", "abc123")])).unwrap();
    assert_eq!(options.api_key, "abc123");
    assert_eq!(options.endpoint.as_str(), DEFAULT_ENDPOINT);
    assert_eq!(options.compression, Compression::None);
    assert_eq!(options.export_timeout, DEFAULT_EXPORT_TIMEOUT);
    assert_eq!(
        options.bundle_delay_threshold,
        Duration::ZERO,
        "unset delay should defer to the bundler default"
    );
    assert_eq!(options.bundle_count_threshold, 0);
    assert!(options.host.is_none());
}

#[test]
fn rejects_missing_api_key() {
    let err = Options::parse(&vars(&[])).unwrap_err();
    assert!(
        matches!(err, ConfigError::ApiKeyMissing),
        "should require api key"
    );
}

#[test]
fn rejects_empty_api_key() {
    let err = Options::parse(&vars(&[("DATADOG_EXPORTER_API_KEY", "")])).unwrap_err();
    assert!(
        matches!(err, ConfigError::ApiKeyMissing),
        "should reject empty api key"
    );
}

#[test]
fn overrides_endpoint_and_host() {
    let options = Options::parse(&vars(&[
        ("DATADOG_EXPORTER_API_KEY", "k"),
        ("DATADOG_EXPORTER_ENDPOINT", "https://api.datadoghq.eu/"),
        ("DATADOG_EXPORTER_HOST", "worker-7"),
    ]))
    .unwrap();
    assert_eq!(options.endpoint.host_str(), Some("api.datadoghq.eu"));
    assert_eq!(options.host.as_deref(), Some("worker-7"));
}

#[test]
fn rejects_invalid_endpoint_url() {
    let err = Options::parse(&vars(&[
        ("DATADOG_EXPORTER_API_KEY", "k"),
        ("DATADOG_EXPORTER_ENDPOINT", "not a url"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::EndpointInvalidUrl(_)));
}

#[test]
fn parses_bundle_thresholds() {
    let options = Options::parse(&vars(&[
        ("DATADOG_EXPORTER_API_KEY", "k"),
        ("DATADOG_EXPORTER_BUNDLE_DELAY_MS", "2500"),
        ("DATADOG_EXPORTER_BUNDLE_COUNT", "50"),
    ]))
    .unwrap();
    assert_eq!(options.bundle_delay_threshold, Duration::from_millis(2500));
    assert_eq!(options.bundle_count_threshold, 50);
}

#[test]
fn rejects_non_numeric_bundle_count() {
    let err = Options::parse(&vars(&[
        ("DATADOG_EXPORTER_API_KEY", "k"),
        ("DATADOG_EXPORTER_BUNDLE_COUNT", "lots"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidNumeric(_, _)));
}

#[test]
fn custom_export_timeout() {
    let options = Options::parse(&vars(&[
        ("DATADOG_EXPORTER_API_KEY", "k"),
        ("DATADOG_EXPORTER_EXPORT_TIMEOUT_MS", "750"),
    ]))
    .unwrap();
    assert_eq!(options.export_timeout, Duration::from_millis(750));
}

#[test]
fn parses_gzip_compression() {
    let options = Options::parse(&vars(&[
        ("DATADOG_EXPORTER_API_KEY", "k"),
        ("DATADOG_EXPORTER_COMPRESSION", "gzip"),
    ]))
    .unwrap();
    assert_eq!(options.compression, Compression::Gzip);
}

#[test]
fn rejects_unknown_compression() {
    let err = Options::parse(&vars(&[
        ("DATADOG_EXPORTER_API_KEY", "k"),
        ("DATADOG_EXPORTER_COMPRESSION", "zstd"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidCompression(_)));
}

#[test]
fn debug_output_redacts_api_key() {
    let options = Options::new("super-secret");
    let rendered = format!("{options:?}");
    assert!(!rendered.contains("super-secret"), "{rendered}");
}
