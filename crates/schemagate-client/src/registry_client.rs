//! Schema registry collaborators.
//!
//! [`SchemaRegistryClient`] is the seam between the publisher and whatever
//! holds the schemas. Two implementations ship with the crate:
//!
//! - [`HttpSchemaRegistryClient`]: Confluent-compatible REST API over HTTP(S)
//! - [`MemorySchemaRegistry`]: in-process registry for tests and offline demos

use crate::config::EndpointConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use moka::future::Cache;
use schemagate_schema::{
    check_compatibility, CompatibilityMode, RegisterSchemaRequest, RegisterSchemaResponse,
    RegisteredSchema, Schema, SchemaByIdResponse, SchemaError, SchemaFormat, SchemaId,
    SchemaResponse, SchemaVersion, SubjectVersion,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Operations the publisher needs from a schema registry.
#[async_trait]
pub trait SchemaRegistryClient: Send + Sync {
    /// Register `schema` under `subject` and return its id.
    ///
    /// Registering a schema identical to one already registered under the
    /// subject returns the existing id. A schema that violates the subject's
    /// compatibility rule fails with [`SchemaError::IncompatibleSchema`].
    async fn register(&self, subject: &str, schema: &Schema) -> Result<SchemaId>;

    /// Fetch a registered version (or the latest) of a subject.
    async fn get_schema(&self, subject: &str, version: SchemaVersion) -> Result<RegisteredSchema>;

    /// Fetch a schema by its registry-wide id.
    async fn get_schema_by_id(&self, id: SchemaId) -> Result<Arc<Schema>>;

    /// Subjects and versions under which schema `id` is registered.
    async fn subject_versions(&self, id: SchemaId) -> Result<Vec<SubjectVersion>>;
}

/// Error body returned by Confluent-compatible registries.
#[derive(Debug, Default, Deserialize)]
struct RegistryErrorBody {
    error_code: Option<i32>,
    message: Option<String>,
}

const SUBJECT_NOT_FOUND: i32 = 40401;
const VERSION_NOT_FOUND: i32 = 40402;

/// What a failed request was looking for; decides how a 404 is reported.
enum Lookup<'a> {
    Register { subject: &'a str },
    Version { subject: &'a str, version: SchemaVersion },
    Id(SchemaId),
}

/// HTTP client for a Confluent-compatible schema registry.
///
/// Endpoints used:
///
/// - `POST /subjects/{subject}/versions`
/// - `GET /subjects/{subject}/versions/{version|latest}`
/// - `GET /schemas/ids/{id}`
/// - `GET /schemas/ids/{id}/versions`
///
/// Schema ids are immutable, so schemas fetched by id and ids returned by
/// registration are cached.
pub struct HttpSchemaRegistryClient {
    endpoint: EndpointConfig,
    base_url: String,
    http_client: reqwest::Client,
    schema_cache: Cache<SchemaId, Arc<Schema>>,
    /// (subject, schema fingerprint) -> id
    registration_cache: Cache<(String, String), SchemaId>,
}

impl HttpSchemaRegistryClient {
    /// Create a client for the registry at `endpoint`.
    ///
    /// Fails with `ConfigError` on a malformed URL or unreadable CA
    /// certificate. No request is made until the first call.
    pub fn new(endpoint: EndpointConfig) -> Result<Self> {
        let base_url = endpoint.base_url()?;
        let http_client = endpoint.http_client()?;

        // Cache up to 1,000 schemas for 1 hour
        let schema_cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(3600))
            .build();

        let registration_cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Ok(Self {
            endpoint,
            base_url,
            http_client,
            schema_cache,
            registration_cache,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.endpoint
            .authorize(request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("Schema registry unreachable: {}", e)))
    }

    async fn failure(response: reqwest::Response, lookup: Lookup<'_>) -> ClientError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed: RegistryErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = parsed.message.clone().unwrap_or(body);
        classify_failure(status, parsed.error_code, message, lookup)
    }
}

fn classify_failure(
    status: u16,
    error_code: Option<i32>,
    message: String,
    lookup: Lookup<'_>,
) -> ClientError {
    match status {
        401 | 403 => ClientError::ConfigError(format!(
            "Schema registry rejected credentials (HTTP {}): {}",
            status, message
        )),
        404 => match lookup {
            Lookup::Version { subject, version } => {
                if error_code == Some(VERSION_NOT_FOUND) {
                    SchemaError::SchemaNotFound {
                        subject: subject.to_string(),
                        version: version.to_string(),
                    }
                    .into()
                } else {
                    SchemaError::SubjectNotFound(subject.to_string()).into()
                }
            }
            Lookup::Id(id) => SchemaError::SchemaNotFound {
                subject: format!("id:{}", id),
                version: SchemaVersion::Latest.to_string(),
            }
            .into(),
            Lookup::Register { subject } if error_code == Some(SUBJECT_NOT_FOUND) => {
                SchemaError::SubjectNotFound(subject.to_string()).into()
            }
            Lookup::Register { .. } => ClientError::RegistryError { status, message },
        },
        409 => SchemaError::IncompatibleSchema(message).into(),
        422 => SchemaError::InvalidSchema(message).into(),
        500..=599 => ClientError::Transport(format!(
            "Schema registry returned HTTP {}: {}",
            status, message
        )),
        _ => ClientError::RegistryError { status, message },
    }
}

#[async_trait]
impl SchemaRegistryClient for HttpSchemaRegistryClient {
    async fn register(&self, subject: &str, schema: &Schema) -> Result<SchemaId> {
        let cache_key = (subject.to_string(), schema.fingerprint());
        if let Some(id) = self.registration_cache.get(&cache_key).await {
            tracing::debug!(subject = subject, schema_id = %id, "Registration cache hit");
            return Ok(id);
        }

        let url = format!("{}/subjects/{}/versions", self.base_url, subject);
        let request = RegisterSchemaRequest {
            schema: schema.canonical(),
            schema_type: Some(SchemaFormat::Json),
        };

        let response = self.send(self.http_client.post(&url).json(&request)).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, Lookup::Register { subject }).await);
        }

        let registered: RegisterSchemaResponse = response.json().await.map_err(|e| {
            ClientError::Internal(format!("Failed to parse registration response: {}", e))
        })?;
        let id = SchemaId(registered.id);

        self.registration_cache.insert(cache_key, id).await;
        self.schema_cache.insert(id, Arc::new(schema.clone())).await;

        tracing::debug!(
            schema_id = %id,
            subject = subject,
            "Schema registered successfully"
        );

        Ok(id)
    }

    async fn get_schema(&self, subject: &str, version: SchemaVersion) -> Result<RegisteredSchema> {
        let url = format!("{}/subjects/{}/versions/{}", self.base_url, subject, version);

        let response = self.send(self.http_client.get(&url)).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, Lookup::Version { subject, version }).await);
        }

        let body: SchemaResponse = response.json().await.map_err(|e| {
            ClientError::Internal(format!("Failed to parse schema response: {}", e))
        })?;
        let schema = Arc::new(Schema::parse_str(&body.schema)?);
        let id = SchemaId(body.id);

        self.schema_cache.insert(id, Arc::clone(&schema)).await;

        tracing::debug!(
            schema_id = %id,
            subject = %body.subject,
            version = body.version,
            "Schema retrieved successfully"
        );

        Ok(RegisteredSchema {
            id,
            subject: body.subject,
            version: body.version,
            schema,
        })
    }

    async fn get_schema_by_id(&self, id: SchemaId) -> Result<Arc<Schema>> {
        if let Some(schema) = self.schema_cache.get(&id).await {
            return Ok(schema);
        }

        let url = format!("{}/schemas/ids/{}", self.base_url, id);

        let response = self.send(self.http_client.get(&url)).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, Lookup::Id(id)).await);
        }

        let body: SchemaByIdResponse = response.json().await.map_err(|e| {
            ClientError::Internal(format!("Failed to parse schema response: {}", e))
        })?;
        if body.schema_type != SchemaFormat::Json {
            return Err(SchemaError::InvalidSchema(format!(
                "Schema {} has type {}, expected JSON",
                id,
                body.schema_type.as_str()
            ))
            .into());
        }
        let schema = Arc::new(Schema::parse_str(&body.schema)?);

        self.schema_cache.insert(id, Arc::clone(&schema)).await;
        Ok(schema)
    }

    async fn subject_versions(&self, id: SchemaId) -> Result<Vec<SubjectVersion>> {
        let url = format!("{}/schemas/ids/{}/versions", self.base_url, id);

        let response = self.send(self.http_client.get(&url)).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, Lookup::Id(id)).await);
        }

        response.json().await.map_err(|e| {
            ClientError::Internal(format!("Failed to parse subject versions response: {}", e))
        })
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: i32,
    /// Identical schemas share one id across subjects
    ids_by_canonical: HashMap<String, SchemaId>,
    schemas_by_id: HashMap<SchemaId, Arc<Schema>>,
    /// Subject -> [(version, id)] in registration order
    subject_versions: HashMap<String, Vec<(i32, SchemaId)>>,
    subject_compat: HashMap<String, CompatibilityMode>,
    global_compat: CompatibilityMode,
}

/// In-process schema registry.
///
/// Follows registry semantics: ids are global and stable, re-registering an
/// identical schema is a no-op returning the existing id, and new versions are
/// checked against the subject's compatibility mode (BACKWARD unless set).
/// It can be switched "offline" to simulate an unreachable registry.
#[derive(Debug)]
pub struct MemorySchemaRegistry {
    state: RwLock<RegistryState>,
    available: AtomicBool,
}

impl Default for MemorySchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                next_id: 1,
                ..Default::default()
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the registry going away (`false`) or coming back (`true`).
    /// While unavailable every call fails with `ClientError::Transport`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Set the default compatibility mode.
    pub async fn set_compatibility(&self, mode: CompatibilityMode) {
        self.state.write().await.global_compat = mode;
    }

    /// Override the compatibility mode for one subject.
    pub async fn set_subject_compatibility(&self, subject: &str, mode: CompatibilityMode) {
        self.state
            .write()
            .await
            .subject_compat
            .insert(subject.to_string(), mode);
    }

    /// Registered versions of `subject`, oldest first.
    pub async fn versions(&self, subject: &str) -> Vec<i32> {
        self.state
            .read()
            .await
            .subject_versions
            .get(subject)
            .map(|versions| versions.iter().map(|(v, _)| *v).collect())
            .unwrap_or_default()
    }

    /// All subjects with at least one version, sorted.
    pub async fn subjects(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut subjects: Vec<_> = state.subject_versions.keys().cloned().collect();
        subjects.sort();
        subjects
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::Transport(
                "Schema registry unreachable: connection refused".to_string(),
            ))
        }
    }
}

#[async_trait]
impl SchemaRegistryClient for MemorySchemaRegistry {
    async fn register(&self, subject: &str, schema: &Schema) -> Result<SchemaId> {
        self.ensure_available()?;

        let canonical = schema.canonical();
        let mut state = self.state.write().await;

        // Check if this exact schema already exists for this subject
        if let Some(versions) = state.subject_versions.get(subject) {
            for (_, id) in versions {
                let existing = &state.schemas_by_id[id];
                if existing.canonical() == canonical {
                    tracing::debug!(subject = subject, schema_id = %id, "Schema already registered");
                    return Ok(*id);
                }
            }
        }

        let mode = state
            .subject_compat
            .get(subject)
            .copied()
            .unwrap_or(state.global_compat);

        if let Some(versions) = state.subject_versions.get(subject) {
            let to_check: Vec<_> = if mode.is_transitive() {
                versions.iter().collect()
            } else {
                versions.last().into_iter().collect()
            };

            for (version, id) in to_check {
                let existing = &state.schemas_by_id[id];
                if !check_compatibility(existing, schema, mode) {
                    return Err(SchemaError::IncompatibleSchema(format!(
                        "New schema is not compatible with version {} under {:?} mode",
                        version, mode
                    ))
                    .into());
                }
            }
        }

        let existing_id = state.ids_by_canonical.get(&canonical).copied();
        let id = match existing_id {
            Some(id) => id,
            None => {
                let id = SchemaId(state.next_id);
                state.next_id += 1;
                state.ids_by_canonical.insert(canonical, id);
                state.schemas_by_id.insert(id, Arc::new(schema.clone()));
                id
            }
        };

        let versions = state.subject_versions.entry(subject.to_string()).or_default();
        let version = versions.last().map_or(1, |(v, _)| v + 1);
        versions.push((version, id));

        tracing::info!(
            id = %id,
            subject = subject,
            version = version,
            "Schema registered"
        );

        Ok(id)
    }

    async fn get_schema(&self, subject: &str, version: SchemaVersion) -> Result<RegisteredSchema> {
        self.ensure_available()?;

        let state = self.state.read().await;
        let versions = state
            .subject_versions
            .get(subject)
            .ok_or_else(|| SchemaError::SubjectNotFound(subject.to_string()))?;

        let found = match version {
            SchemaVersion::Latest => versions.last(),
            SchemaVersion::Number(n) => versions.iter().find(|(v, _)| *v == n),
        };
        let (version_number, id) = found.ok_or_else(|| SchemaError::SchemaNotFound {
            subject: subject.to_string(),
            version: version.to_string(),
        })?;

        Ok(RegisteredSchema {
            id: *id,
            subject: subject.to_string(),
            version: *version_number,
            schema: Arc::clone(&state.schemas_by_id[id]),
        })
    }

    async fn get_schema_by_id(&self, id: SchemaId) -> Result<Arc<Schema>> {
        self.ensure_available()?;

        let state = self.state.read().await;
        state.schemas_by_id.get(&id).cloned().ok_or_else(|| {
            SchemaError::SchemaNotFound {
                subject: format!("id:{}", id),
                version: SchemaVersion::Latest.to_string(),
            }
            .into()
        })
    }

    async fn subject_versions(&self, id: SchemaId) -> Result<Vec<SubjectVersion>> {
        self.ensure_available()?;

        let state = self.state.read().await;
        if !state.schemas_by_id.contains_key(&id) {
            return Err(SchemaError::SchemaNotFound {
                subject: format!("id:{}", id),
                version: SchemaVersion::Latest.to_string(),
            }
            .into());
        }

        let mut found: Vec<SubjectVersion> = state
            .subject_versions
            .iter()
            .flat_map(|(subject, versions)| {
                versions
                    .iter()
                    .filter(|(_, registered)| *registered == id)
                    .map(move |(version, _)| SubjectVersion {
                        subject: subject.clone(),
                        version: *version,
                    })
            })
            .collect();
        found.sort_by(|a, b| a.subject.cmp(&b.subject).then(a.version.cmp(&b.version)));
        Ok(found)
    }
}
