//! Producer settings file.
//!
//! ```toml
//! [schema_registry]
//! url = "http://localhost:8081"
//! username = "svc-payments"
//! password = "..."
//!
//! [broker]
//! url = "http://localhost:8080"
//!
//! [producer]
//! validate_on_send = true
//! auto_register_schema = true
//! fail_on_incompatible = true
//! send_interval_ms = 3000
//! ```
//!
//! A `url` of `memory://` on either table selects the in-process
//! collaborator instead, so the demos run without any server.

use anyhow::{Context, Result};
use schemagate_client::{
    ClientError, Credentials, EndpointConfig, HttpSchemaRegistryClient, MemoryLogSink,
    MemorySchemaRegistry, PublisherConfig, RecordSink, RestSink, SchemaRegistryClient,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// URL that selects the in-process registry or broker.
pub const MEMORY_URL: &str = "memory://";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub schema_registry: RegistrySettings,
    pub broker: BrokerSettings,
    pub producer: ProducerSettings,
}

/// Username/password or bearer token for an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub url: String,
    #[serde(flatten)]
    pub auth: AuthSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            auth: AuthSettings::default(),
            ca_cert: None,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub url: String,
    #[serde(flatten)]
    pub auth: AuthSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
    pub timeout_ms: u64,
    /// Partitions of the topic created by the in-process broker.
    pub partitions: u32,
    /// Make the in-process broker re-validate every record.
    pub enforce_schemas: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            auth: AuthSettings::default(),
            ca_cert: None,
            timeout_ms: 30_000,
            partitions: 3,
            enforce_schemas: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSettings {
    pub validate_on_send: bool,
    pub auto_register_schema: bool,
    pub fail_on_incompatible: bool,
    pub batch_size: usize,
    pub batch_max_bytes: usize,
    pub batch_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub queue_capacity: usize,
    /// Pause between sends of the continuous producer.
    pub send_interval_ms: u64,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        let defaults = PublisherConfig::default();
        Self {
            validate_on_send: defaults.validate_on_send,
            auto_register_schema: defaults.auto_register_schema,
            fail_on_incompatible: defaults.fail_on_incompatible,
            batch_size: defaults.batch_size,
            batch_max_bytes: defaults.batch_max_bytes,
            batch_timeout_ms: defaults.batch_timeout.as_millis() as u64,
            request_timeout_ms: defaults.request_timeout.as_millis() as u64,
            queue_capacity: defaults.queue_capacity,
            send_interval_ms: 3_000,
        }
    }
}

/// Registry and broker built from [`Settings`].
pub struct Collaborators {
    pub registry: Arc<dyn SchemaRegistryClient>,
    pub sink: Arc<dyn RecordSink>,
}

impl AuthSettings {
    fn credentials(&self, table: &str) -> std::result::Result<Option<Credentials>, ClientError> {
        match (&self.username, &self.password, &self.token) {
            (None, None, None) => Ok(None),
            (None, None, Some(token)) => Ok(Some(Credentials::Bearer(token.clone()))),
            (Some(username), Some(password), None) => Ok(Some(Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            })),
            (Some(_), None, None) | (None, Some(_), None) => Err(ClientError::ConfigError(
                format!("[{}] username and password must be given together", table),
            )),
            (_, _, Some(_)) => Err(ClientError::ConfigError(format!(
                "[{}] token cannot be combined with username/password",
                table
            ))),
        }
    }
}

fn endpoint(
    table: &str,
    url: &str,
    auth: &AuthSettings,
    ca_cert: Option<&PathBuf>,
    timeout_ms: u64,
) -> std::result::Result<EndpointConfig, ClientError> {
    if timeout_ms == 0 {
        return Err(ClientError::ConfigError(format!(
            "[{}] timeout_ms must be non-zero",
            table
        )));
    }
    let mut endpoint =
        EndpointConfig::new(url).with_request_timeout(Duration::from_millis(timeout_ms));
    if let Some(credentials) = auth.credentials(table)? {
        endpoint = endpoint.with_credentials(credentials);
    }
    if let Some(path) = ca_cert {
        endpoint = endpoint.with_ca_cert(path.clone());
    }
    endpoint.base_url()?;
    Ok(endpoint)
}

impl Settings {
    /// Load settings from a TOML file. Missing tables and keys take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Write settings to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;
        Ok(())
    }

    /// Replace the configured URLs, e.g. from environment overrides.
    pub fn override_urls(&mut self, registry_url: Option<String>, broker_url: Option<String>) {
        if let Some(url) = registry_url {
            self.schema_registry.url = url;
        }
        if let Some(url) = broker_url {
            self.broker.url = url;
        }
    }

    pub fn registry_in_memory(&self) -> bool {
        self.schema_registry.url == MEMORY_URL
    }

    pub fn broker_in_memory(&self) -> bool {
        self.broker.url == MEMORY_URL
    }

    /// Check every table without touching the network.
    pub fn validate(&self) -> std::result::Result<(), ClientError> {
        if !self.registry_in_memory() {
            self.registry_endpoint()?;
        }
        if self.broker_in_memory() {
            if self.broker.partitions == 0 {
                return Err(ClientError::ConfigError(
                    "[broker] partitions must be at least 1".to_string(),
                ));
            }
        } else {
            self.broker_endpoint()?;
        }
        self.publisher_config().validate()
    }

    pub fn registry_endpoint(&self) -> std::result::Result<EndpointConfig, ClientError> {
        let registry = &self.schema_registry;
        endpoint(
            "schema_registry",
            &registry.url,
            &registry.auth,
            registry.ca_cert.as_ref(),
            registry.timeout_ms,
        )
    }

    pub fn broker_endpoint(&self) -> std::result::Result<EndpointConfig, ClientError> {
        let broker = &self.broker;
        endpoint(
            "broker",
            &broker.url,
            &broker.auth,
            broker.ca_cert.as_ref(),
            broker.timeout_ms,
        )
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        let producer = &self.producer;
        PublisherConfig {
            validate_on_send: producer.validate_on_send,
            auto_register_schema: producer.auto_register_schema,
            fail_on_incompatible: producer.fail_on_incompatible,
            batch_size: producer.batch_size,
            batch_max_bytes: producer.batch_max_bytes,
            batch_timeout: Duration::from_millis(producer.batch_timeout_ms),
            request_timeout: Duration::from_millis(producer.request_timeout_ms),
            queue_capacity: producer.queue_capacity,
        }
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.producer.send_interval_ms)
    }

    /// Build the registry and broker. An in-process broker gets `topic`
    /// created up front.
    pub async fn connect(&self, topic: &str) -> Result<Collaborators> {
        let registry: Arc<dyn SchemaRegistryClient> = if self.registry_in_memory() {
            Arc::new(MemorySchemaRegistry::new())
        } else {
            Arc::new(
                HttpSchemaRegistryClient::new(self.registry_endpoint()?)
                    .context("Failed to create schema registry client")?,
            )
        };

        let sink: Arc<dyn RecordSink> = if self.broker_in_memory() {
            let sink = if self.broker.enforce_schemas {
                MemoryLogSink::with_enforcement(Arc::clone(&registry))
            } else {
                MemoryLogSink::new()
            };
            sink.create_topic(topic, self.broker.partitions)
                .await
                .with_context(|| format!("Failed to create topic '{}'", topic))?;
            Arc::new(sink)
        } else {
            Arc::new(
                RestSink::new(self.broker_endpoint()?).context("Failed to create broker client")?,
            )
        };

        Ok(Collaborators { registry, sink })
    }
}
