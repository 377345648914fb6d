//! Publisher and connection configuration.
//!
//! Configuration is always an explicit value handed to the component that
//! needs it. There is no process-wide state.

use crate::error::{ClientError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default maximum batch size in bytes (1MB).
pub const DEFAULT_BATCH_MAX_BYTES: usize = 1024 * 1024;

/// Default maximum age of a batch before it is flushed.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_millis(100);

/// Default timeout for registry and broker requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of publish requests that may wait for the delivery task.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Behavioural options for a [`Publisher`](crate::Publisher).
///
/// ## Defaults
///
/// | option                 | default |
/// |------------------------|---------|
/// | `validate_on_send`     | `true`  |
/// | `auto_register_schema` | `true`  |
/// | `fail_on_incompatible` | `true`  |
/// | `batch_size`           | 100     |
/// | `batch_max_bytes`      | 1MB     |
/// | `batch_timeout`        | 100ms   |
/// | `request_timeout`      | 30s     |
/// | `queue_capacity`       | 10,000  |
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    /// Validate each payload against its bound schema before it leaves the
    /// client. Non-conforming records never reach the sink.
    pub validate_on_send: bool,

    /// Register the derived schema when binding. When disabled the publisher
    /// binds to the latest schema already registered for the subject.
    pub auto_register_schema: bool,

    /// Abort binding when the registry refuses the derived schema as
    /// incompatible. When disabled the publisher falls back to the latest
    /// registered schema and logs a warning.
    pub fail_on_incompatible: bool,

    /// Maximum number of records per batch.
    pub batch_size: usize,

    /// Maximum batch size in bytes.
    pub batch_max_bytes: usize,

    /// Maximum time a record waits in a batch before it is flushed.
    pub batch_timeout: Duration,

    /// Timeout applied to `flush()` and `close()`.
    pub request_timeout: Duration,

    /// Capacity of the queue between `publish()` and the delivery task.
    /// `publish()` waits for room when the queue is full.
    pub queue_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            validate_on_send: true,
            auto_register_schema: true,
            fail_on_incompatible: true,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_max_bytes: DEFAULT_BATCH_MAX_BYTES,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PublisherConfig {
    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClientError::ConfigError("batch_size must be at least 1".to_string()));
        }
        if self.batch_max_bytes == 0 {
            return Err(ClientError::ConfigError(
                "batch_max_bytes must be at least 1".to_string(),
            ));
        }
        if self.batch_timeout.is_zero() {
            return Err(ClientError::ConfigError("batch_timeout must be non-zero".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::ConfigError(
                "request_timeout must be non-zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ClientError::ConfigError(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Credentials presented to an HTTP endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
}

// Secrets stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
        }
    }
}

/// Connection settings for an HTTP collaborator (schema registry or broker
/// REST gateway).
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    /// Base URL, e.g. `https://registry.example.com:8081`.
    pub url: String,

    /// Optional credentials.
    pub credentials: Option<Credentials>,

    /// PEM file with an additional trusted root certificate.
    pub ca_cert_path: Option<PathBuf>,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: None,
            ca_cert_path: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Base URL without a trailing slash, after checking it parses as an
    /// http(s) URL.
    pub fn base_url(&self) -> Result<String> {
        let parsed = reqwest::Url::parse(&self.url)
            .map_err(|e| ClientError::ConfigError(format!("Invalid URL '{}': {}", self.url, e)))?;

        match parsed.scheme() {
            "http" | "https" => Ok(self.url.trim_end_matches('/').to_string()),
            other => Err(ClientError::ConfigError(format!(
                "Unsupported URL scheme '{}' in '{}'",
                other, self.url
            ))),
        }
    }

    /// Build the HTTP client for this endpoint.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.request_timeout);

        if let Some(path) = &self.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                ClientError::ConfigError(format!(
                    "Failed to read CA certificate {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ClientError::ConfigError(format!(
                    "Invalid CA certificate {}: {}",
                    path.display(),
                    e
                ))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        builder
            .build()
            .map_err(|e| ClientError::ConfigError(format!("Failed to create HTTP client: {}", e)))
    }

    /// Attach credentials, if any, to an outgoing request.
    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(Credentials::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(Credentials::Bearer(token)) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publisher_defaults() {
        let config = PublisherConfig::default();
        assert!(config.validate_on_send);
        assert!(config.auto_register_schema);
        assert!(config.fail_on_incompatible);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batch_timeout, Duration::from_millis(100));
        assert_eq!(config.queue_capacity, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_publisher_config_rejects_zero_limits() {
        let config = PublisherConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::ConfigError(_))));

        let config = PublisherConfig {
            batch_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::ConfigError(_))));
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let endpoint = EndpointConfig::new("http://localhost:8081/");
        assert_eq!(endpoint.base_url().unwrap(), "http://localhost:8081");
    }

    #[test]
    fn test_base_url_rejects_malformed() {
        assert!(matches!(
            EndpointConfig::new("not a url").base_url(),
            Err(ClientError::ConfigError(_))
        ));
        assert!(matches!(
            EndpointConfig::new("ftp://registry:21").base_url(),
            Err(ClientError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_ca_cert_is_config_error() {
        let endpoint =
            EndpointConfig::new("https://localhost:8081").with_ca_cert("/nonexistent/ca.pem");
        assert!(matches!(endpoint.http_client(), Err(ClientError::ConfigError(_))));
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let basic = Credentials::Basic {
            username: "svc".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{:?}", basic);
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));

        let bearer = format!("{:?}", Credentials::Bearer("tok3n".into()));
        assert!(!bearer.contains("tok3n"));
    }
}
