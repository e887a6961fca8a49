use std::env;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::domain::{BulkAction, TimestampFormat};
use crate::index_name::resolve_index_name;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
    #[error("Invalid endpoint URL '{0}'")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to read {name}: {reason}")]
    File { name: String, reason: String },
}

/// HTTP client policy for the OpenSearch connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
    /// Extra attempts for a failed bulk request. `0` disables retry.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub enable_metrics: bool,
    pub enable_debug_logger: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_backoff: Duration::from_millis(200),
            enable_metrics: false,
            enable_debug_logger: false,
        }
    }
}

/// Thresholds for the per-push bulk indexer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerSettings {
    /// Dispatch a bulk request once this many documents are buffered.
    pub flush_documents: usize,
    /// Dispatch a bulk request once the buffered NDJSON reaches this size.
    pub flush_bytes: usize,
    /// Concurrent bulk requests per session.
    pub workers: usize,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            flush_documents: 1000,
            flush_bytes: 5_000_000,
            workers: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub client: ClientSettings,
    pub indexer: IndexerSettings,
    pub dataset: String,
    pub namespace: String,
    /// Explicit index name; overrides the derived `ss4o_traces-*` name.
    pub traces_index: String,
    pub unix_timestamp: bool,
    pub bulk_action: BulkAction,
    /// Upper bound for one `push_batch` call, including the final flush.
    pub push_timeout: Duration,
    /// OTLP HTTP receiver port
    pub otlp_http_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client: ClientSettings::default(),
            indexer: IndexerSettings::default(),
            dataset: "default".to_string(),
            namespace: "namespace".to_string(),
            traces_index: String::new(),
            unix_timestamp: false,
            bulk_action: BulkAction::Create,
            push_timeout: Duration::from_secs(60),
            otlp_http_port: 4318,
        }
    }
}

impl Settings {
    /// Build settings from an arbitrary variable lookup.
    ///
    /// `get_configuration` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let endpoint =
            lookup("OPENSEARCH_ENDPOINT").ok_or_else(|| ConfigError::Missing("OPENSEARCH_ENDPOINT".into()))?;

        let client = ClientSettings {
            endpoint,
            username: lookup("OPENSEARCH_USERNAME").filter(|u| !u.is_empty()),
            password: lookup_secret(&lookup, "OPENSEARCH_PASSWORD")?,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.client.request_timeout.as_secs(),
            )?),
            max_retries: parse_or(&lookup, "CLIENT_MAX_RETRIES", defaults.client.max_retries)?,
            retry_backoff: Duration::from_millis(parse_or(
                &lookup,
                "CLIENT_RETRY_BACKOFF_MS",
                defaults.client.retry_backoff.as_millis() as u64,
            )?),
            enable_metrics: parse_or(&lookup, "CLIENT_ENABLE_METRICS", defaults.client.enable_metrics)?,
            enable_debug_logger: parse_or(
                &lookup,
                "CLIENT_DEBUG_LOGGER",
                defaults.client.enable_debug_logger,
            )?,
        };

        let indexer = IndexerSettings {
            flush_documents: parse_or(&lookup, "BULK_FLUSH_DOCUMENTS", defaults.indexer.flush_documents)?,
            flush_bytes: parse_or(&lookup, "BULK_FLUSH_BYTES", defaults.indexer.flush_bytes)?,
            workers: parse_or(&lookup, "BULK_WORKERS", defaults.indexer.workers)?,
        };

        let settings = Settings {
            client,
            indexer,
            dataset: lookup("SSO_DATASET").unwrap_or(defaults.dataset),
            namespace: lookup("SSO_NAMESPACE").unwrap_or(defaults.namespace),
            traces_index: lookup("SSO_TRACES_INDEX").unwrap_or_default(),
            unix_timestamp: parse_or(&lookup, "SSO_UNIX_TIMESTAMP", defaults.unix_timestamp)?,
            bulk_action: parse_or(&lookup, "SSO_BULK_ACTION", defaults.bulk_action)?,
            push_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PUSH_TIMEOUT_SECS",
                defaults.push_timeout.as_secs(),
            )?),
            otlp_http_port: parse_or(&lookup, "OTLP_HTTP_PORT", defaults.otlp_http_port)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings and returns an error if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint(&self.client.endpoint)?;

        if self.dataset.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("dataset must be specified".into()));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("namespace must be specified".into()));
        }
        if self.indexer.flush_documents == 0 {
            return Err(ConfigError::InvalidConfig(
                "Bulk flush document threshold must be greater than 0".into(),
            ));
        }
        if self.indexer.flush_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "Bulk flush byte threshold must be greater than 0".into(),
            ));
        }
        if self.indexer.workers == 0 {
            return Err(ConfigError::InvalidConfig(
                "Bulk worker count must be greater than 0".into(),
            ));
        }
        if self.client.request_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".into(),
            ));
        }
        if self.push_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig("Push timeout must be greater than 0".into()));
        }
        if self.otlp_http_port == 0 {
            return Err(ConfigError::InvalidConfig("Port cannot be 0".into()));
        }
        Ok(())
    }

    /// Index every document of this exporter is written to.
    #[must_use]
    pub fn index_name(&self) -> String {
        resolve_index_name(&self.traces_index, &self.dataset, &self.namespace)
    }

    #[must_use]
    pub fn timestamp_format(&self) -> TimestampFormat {
        TimestampFormat::from_unix_flag(self.unix_timestamp)
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    if endpoint.trim().is_empty() {
        return Err(ConfigError::InvalidConfig("endpoint must be specified".into()));
    }
    let url = Url::parse(endpoint).map_err(|_| ConfigError::InvalidUrl(endpoint.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(ConfigError::InvalidUrl(endpoint.to_string())),
    }
}

fn parse_or<T, F>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

/// Read a secret, with support for the `_FILE` suffix (Docker Secrets)
fn lookup_secret<F>(lookup: &F, name: &str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let file_env = format!("{name}_FILE");
    if let Some(path) = lookup(&file_env) {
        return fs::read_to_string(&path)
            .map(|content| Some(content.trim().to_string()))
            .map_err(|e| ConfigError::File {
                name: file_env,
                reason: e.to_string(),
            });
    }
    Ok(lookup(name).filter(|v| !v.is_empty()))
}

/// Load settings from the process environment.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    Settings::from_lookup(|name| env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_with_only_endpoint() {
        let settings =
            Settings::from_lookup(lookup_from(&[("OPENSEARCH_ENDPOINT", "http://opensearch:9200")])).unwrap();

        assert_eq!(settings.client.endpoint, "http://opensearch:9200");
        assert_eq!(settings.dataset, "default");
        assert_eq!(settings.namespace, "namespace");
        assert_eq!(settings.bulk_action, BulkAction::Create);
        assert_eq!(settings.client.max_retries, 0);
        assert!(!settings.client.enable_metrics);
        assert!(!settings.client.enable_debug_logger);
        assert_eq!(settings.index_name(), "ss4o_traces-default-namespace");
        assert_eq!(settings.timestamp_format(), TimestampFormat::Rfc3339);
    }

    #[test]
    fn test_missing_endpoint_fails() {
        let err = Settings::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OPENSEARCH_ENDPOINT".into()));
    }

    #[test]
    fn test_overrides_are_applied() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENSEARCH_ENDPOINT", "https://search.example.com"),
            ("OPENSEARCH_USERNAME", "admin"),
            ("OPENSEARCH_PASSWORD", "secret"),
            ("SSO_DATASET", "checkout"),
            ("SSO_NAMESPACE", "prod"),
            ("SSO_UNIX_TIMESTAMP", "true"),
            ("SSO_BULK_ACTION", "index"),
            ("BULK_FLUSH_DOCUMENTS", "50"),
            ("BULK_WORKERS", "4"),
            ("CLIENT_MAX_RETRIES", "2"),
        ]))
        .unwrap();

        assert_eq!(settings.client.username.as_deref(), Some("admin"));
        assert_eq!(settings.client.password.as_deref(), Some("secret"));
        assert_eq!(settings.bulk_action, BulkAction::Index);
        assert_eq!(settings.indexer.flush_documents, 50);
        assert_eq!(settings.indexer.workers, 4);
        assert_eq!(settings.client.max_retries, 2);
        assert_eq!(settings.timestamp_format(), TimestampFormat::UnixMillis);
        assert_eq!(settings.index_name(), "ss4o_traces-checkout-prod");
    }

    #[test]
    fn test_explicit_index_wins() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENSEARCH_ENDPOINT", "http://localhost:9200"),
            ("SSO_TRACES_INDEX", "my-traces"),
        ]))
        .unwrap();
        assert_eq!(settings.index_name(), "my-traces");
    }

    #[test]
    fn test_invalid_bulk_action_fails() {
        let err = Settings::from_lookup(lookup_from(&[
            ("OPENSEARCH_ENDPOINT", "http://localhost:9200"),
            ("SSO_BULK_ACTION", "upsert"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "SSO_BULK_ACTION"));
    }

    #[test]
    fn test_unparsable_number_fails() {
        let err = Settings::from_lookup(lookup_from(&[
            ("OPENSEARCH_ENDPOINT", "http://localhost:9200"),
            ("BULK_WORKERS", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "BULK_WORKERS"));
    }

    #[test]
    fn test_password_file_is_read() {
        let path = std::env::temp_dir().join(format!("ss4o-password-{}", std::process::id()));
        fs::write(&path, "from-file\n").unwrap();

        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENSEARCH_ENDPOINT", "http://localhost:9200"),
            ("OPENSEARCH_PASSWORD", "ignored"),
            ("OPENSEARCH_PASSWORD_FILE", path.to_str().unwrap()),
        ]))
        .unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(settings.client.password.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_missing_password_file_fails() {
        let err = Settings::from_lookup(lookup_from(&[
            ("OPENSEARCH_ENDPOINT", "http://localhost:9200"),
            ("OPENSEARCH_PASSWORD_FILE", "/nonexistent/ss4o/password"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::File { .. }));
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("http://localhost:9200").is_ok());
        assert!(validate_endpoint("https://search.example.com").is_ok());
        assert!(validate_endpoint("").is_err());
        assert!(validate_endpoint("   ").is_err());
        assert!(validate_endpoint("not a url").is_err());
        assert!(validate_endpoint("ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_empty_dataset_fails() {
        let settings = Settings {
            dataset: String::new(),
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("dataset must be specified"));
    }

    #[test]
    fn test_validate_empty_namespace_fails() {
        let settings = Settings {
            namespace: "  ".into(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_zero_thresholds_fail() {
        for indexer in [
            IndexerSettings {
                flush_documents: 0,
                ..IndexerSettings::default()
            },
            IndexerSettings {
                flush_bytes: 0,
                ..IndexerSettings::default()
            },
            IndexerSettings {
                workers: 0,
                ..IndexerSettings::default()
            },
        ] {
            let settings = Settings {
                indexer,
                ..Settings::default()
            };
            assert!(settings.validate().is_err(), "{indexer:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_default_settings_succeeds() {
        assert!(Settings::default().validate().is_ok());
    }
}
