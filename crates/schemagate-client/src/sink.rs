//! Broker sinks.
//!
//! A [`RecordSink`] is the broker-facing half of the publisher: it reports how
//! many partitions a topic has and appends batches to a partition. Sinks may
//! enforce schema conformance themselves; a refusal on those grounds is a
//! [`SinkError::Rejected`], never confused with [`SinkError::Unavailable`].

use crate::batch::BatchRecord;
use crate::config::EndpointConfig;
use crate::error::{ClientError, Result};
use crate::registry_client::SchemaRegistryClient;
use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use schemagate_schema::{decode_schema_id, value_subject, SchemaId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Per-record failure reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The broker refused the record (schema enforcement, bad request).
    #[error("Record rejected by broker: {0}")]
    Rejected(String),

    /// The broker could not be reached or failed internally.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Topic '{0}' not found")]
    TopicNotFound(String),
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Broker-facing operations used by the publisher's delivery task.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Number of partitions of `topic`.
    async fn partition_count(&self, topic: &str) -> SinkResult<u32>;

    /// Append `records` to one partition, in order.
    ///
    /// Returns one result per input record, in the same order. Offsets of
    /// accepted records increase monotonically within the partition.
    async fn append(
        &self,
        topic: &str,
        partition: u32,
        records: Vec<BatchRecord>,
    ) -> Vec<SinkResult<u64>>;
}

/// A record committed to a [`MemoryLogSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub offset: u64,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub timestamp: u64,
}

/// In-process partitioned log.
///
/// Topics must be created before use. With [`MemoryLogSink::with_enforcement`]
/// every record must be schema-framed with the id of a schema registered
/// under the topic's `<topic>-value` subject, and must conform to that
/// schema; anything else is rejected before it is stored.
pub struct MemoryLogSink {
    /// topic -> partitions -> records
    topics: RwLock<HashMap<String, Vec<Vec<StoredRecord>>>>,
    enforcement: Option<Enforcement>,
    available: AtomicBool,
}

/// Broker-side schema check, run with the `jsonschema` crate against the
/// registered JSON Schema document.
struct Enforcement {
    registry: Arc<dyn SchemaRegistryClient>,
    /// Compiled validators by schema id
    validators: Cache<SchemaId, Arc<jsonschema::Validator>>,
}

impl Enforcement {
    fn new(registry: Arc<dyn SchemaRegistryClient>) -> Self {
        let validators = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(3600))
            .build();
        Self {
            registry,
            validators,
        }
    }

    async fn check(&self, topic: &str, value: &[u8]) -> SinkResult<()> {
        let (schema_id, body) = decode_schema_id(value)
            .map_err(|e| SinkError::Rejected(format!("Record carries no schema id: {}", e)))?;

        let subject = value_subject(topic);
        let registered = match self.registry.subject_versions(schema_id).await {
            Ok(registered) => registered,
            Err(ClientError::Schema(_)) => {
                return Err(SinkError::Rejected(format!("Unknown schema id {}", schema_id)))
            }
            Err(e) => return Err(SinkError::Unavailable(e.to_string())),
        };
        if !registered.iter().any(|sv| sv.subject == subject) {
            return Err(SinkError::Rejected(format!(
                "Schema id {} is not registered under subject '{}'",
                schema_id, subject
            )));
        }

        let validator = self.validator(schema_id).await?;
        let instance: Value = serde_json::from_slice(body)
            .map_err(|e| SinkError::Rejected(format!("Value is not valid JSON: {}", e)))?;

        let errors: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Rejected(format!(
                "Record does not conform to schema {}: {}",
                schema_id,
                errors.join("; ")
            )))
        }
    }

    async fn validator(&self, schema_id: SchemaId) -> SinkResult<Arc<jsonschema::Validator>> {
        if let Some(validator) = self.validators.get(&schema_id).await {
            return Ok(validator);
        }

        let schema = match self.registry.get_schema_by_id(schema_id).await {
            Ok(schema) => schema,
            Err(ClientError::Schema(_)) => {
                return Err(SinkError::Rejected(format!("Unknown schema id {}", schema_id)))
            }
            Err(e) => return Err(SinkError::Unavailable(e.to_string())),
        };

        let compiled = jsonschema::validator_for(&schema.to_json_schema()).map_err(|e| {
            SinkError::Unavailable(format!("Failed to compile JSON schema {}: {}", schema_id, e))
        })?;
        let compiled = Arc::new(compiled);
        self.validators.insert(schema_id, Arc::clone(&compiled)).await;
        Ok(compiled)
    }
}

impl Default for MemoryLogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLogSink {
    /// A sink that stores whatever it is given.
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            enforcement: None,
            available: AtomicBool::new(true),
        }
    }

    /// A sink that re-validates every record against the registry.
    pub fn with_enforcement(registry: Arc<dyn SchemaRegistryClient>) -> Self {
        Self {
            enforcement: Some(Enforcement::new(registry)),
            ..Self::new()
        }
    }

    /// Create `topic` with `partitions` partitions. Existing topics are left
    /// untouched.
    pub async fn create_topic(&self, topic: &str, partitions: u32) -> Result<()> {
        if partitions == 0 {
            return Err(ClientError::ConfigError(format!(
                "Topic '{}' needs at least one partition",
                topic
            )));
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions as usize]);
        Ok(())
    }

    /// Simulate the broker going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Records committed to one partition, oldest first.
    pub async fn records(&self, topic: &str, partition: u32) -> Vec<StoredRecord> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .cloned()
            .unwrap_or_default()
    }

    /// Total records committed to `topic` across partitions.
    pub async fn record_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|partitions| partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> SinkResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SinkError::Unavailable("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl RecordSink for MemoryLogSink {
    async fn partition_count(&self, topic: &str) -> SinkResult<u32> {
        self.ensure_available()?;
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|partitions| partitions.len() as u32)
            .ok_or_else(|| SinkError::TopicNotFound(topic.to_string()))
    }

    async fn append(
        &self,
        topic: &str,
        partition: u32,
        records: Vec<BatchRecord>,
    ) -> Vec<SinkResult<u64>> {
        if let Err(e) = self.ensure_available() {
            return vec![Err(e); records.len()];
        }

        // Verdicts first so the log lock is never held across registry calls
        let mut verdicts = Vec::with_capacity(records.len());
        for record in &records {
            let verdict = match &self.enforcement {
                Some(enforcement) => enforcement.check(topic, &record.value).await,
                None => Ok(()),
            };
            verdicts.push(verdict);
        }

        let mut topics = self.topics.write().await;
        let Some(log) = topics
            .get_mut(topic)
            .and_then(|partitions| partitions.get_mut(partition as usize))
        else {
            let err = SinkError::TopicNotFound(format!("{}/{}", topic, partition));
            return vec![Err(err); records.len()];
        };

        records
            .into_iter()
            .zip(verdicts)
            .map(|(record, verdict)| {
                verdict?;
                let offset = log.len() as u64;
                log.push(StoredRecord {
                    offset,
                    key: record.key,
                    value: record.value,
                    timestamp: record.timestamp,
                });
                Ok(offset)
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct ProduceRequest {
    topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProduceResponse {
    offset: u64,
}

#[derive(Debug, Deserialize)]
struct TopicInfo {
    partitions: u32,
}

/// Header carrying the schema id when a framed record is sent over REST.
pub const SCHEMA_ID_HEADER: &str = "X-Schema-Id";

/// Sink for a broker REST gateway.
///
/// Endpoints used:
///
/// - `GET /api/v1/topics/{topic}` for the partition count
/// - `POST /api/v1/produce` once per record
///
/// The gateway takes record values as text, so the schema frame is stripped
/// and its id sent in the `X-Schema-Id` header. The gateway validates values
/// against the subject's latest schema and answers 400 on a mismatch.
pub struct RestSink {
    endpoint: EndpointConfig,
    base_url: String,
    http_client: reqwest::Client,
}

impl RestSink {
    pub fn new(endpoint: EndpointConfig) -> Result<Self> {
        let base_url = endpoint.base_url()?;
        let http_client = endpoint.http_client()?;
        Ok(Self {
            endpoint,
            base_url,
            http_client,
        })
    }

    async fn produce_one(&self, topic: &str, partition: u32, record: BatchRecord) -> SinkResult<u64> {
        let (schema_id, value) = match decode_schema_id(&record.value) {
            Ok((id, body)) => (Some(id), body),
            Err(_) => (None, &record.value[..]),
        };
        let value = text(value, "value")?;
        let key = record.key.as_deref().map(|k| text(k, "key")).transpose()?;

        let request = ProduceRequest {
            topic: topic.to_string(),
            key,
            value,
            partition: Some(partition),
        };

        let url = format!("{}/api/v1/produce", self.base_url);
        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(id) = schema_id {
            builder = builder.header(SCHEMA_ID_HEADER, id.to_string());
        }

        let response = self
            .endpoint
            .authorize(builder)
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let produced: ProduceResponse = response
                .json()
                .await
                .map_err(|e| SinkError::Unavailable(format!("Malformed produce response: {}", e)))?;
            return Ok(produced.offset);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            404 => SinkError::TopicNotFound(topic.to_string()),
            400..=499 => SinkError::Rejected(body),
            _ => SinkError::Unavailable(format!("HTTP {}: {}", status.as_u16(), body)),
        })
    }
}

/// The gateway only carries text; anything else is refused, never rewritten.
fn text(bytes: &[u8], what: &str) -> SinkResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| SinkError::Rejected(format!("{} is not UTF-8", what)))
}

#[async_trait]
impl RecordSink for RestSink {
    async fn partition_count(&self, topic: &str) -> SinkResult<u32> {
        let url = format!("{}/api/v1/topics/{}", self.base_url, topic);
        let response = self
            .endpoint
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(SinkError::TopicNotFound(topic.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Unavailable(format!(
                "Topic lookup failed with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let info: TopicInfo = response
            .json()
            .await
            .map_err(|e| SinkError::Unavailable(format!("Malformed topic response: {}", e)))?;
        Ok(info.partitions)
    }

    async fn append(
        &self,
        topic: &str,
        partition: u32,
        records: Vec<BatchRecord>,
    ) -> Vec<SinkResult<u64>> {
        let mut results = Vec::with_capacity(records.len());
        let mut outage: Option<SinkError> = None;

        for record in records {
            // Later records must not land ahead of an earlier failed one
            if let Some(err) = &outage {
                results.push(Err(err.clone()));
                continue;
            }
            let result = self.produce_one(topic, partition, record).await;
            if let Err(err @ SinkError::Unavailable(_)) = &result {
                outage = Some(err.clone());
            }
            results.push(result);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry_client::MemorySchemaRegistry;
    use schemagate_schema::{
        derive_schema, encode_with_schema_id, validate, DeclaredType, Schema, ShapeDescriptor,
        Transaction,
    };

    fn record(value: impl Into<Bytes>) -> BatchRecord {
        BatchRecord::new(Some(Bytes::from("ACC-1001")), value.into(), 0)
    }

    #[tokio::test]
    async fn test_offsets_are_sequential_per_partition() {
        let sink = MemoryLogSink::new();
        sink.create_topic("transactions", 2).await.unwrap();

        let first = sink
            .append("transactions", 0, vec![record("a"), record("b")])
            .await;
        let second = sink.append("transactions", 0, vec![record("c")]).await;
        let other = sink.append("transactions", 1, vec![record("d")]).await;

        assert_eq!(first, vec![Ok(0), Ok(1)]);
        assert_eq!(second, vec![Ok(2)]);
        assert_eq!(other, vec![Ok(0)]);
        assert_eq!(sink.record_count("transactions").await, 4);
        assert_eq!(sink.partition_count("transactions").await, Ok(2));
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let sink = MemoryLogSink::new();
        assert_eq!(
            sink.partition_count("missing").await,
            Err(SinkError::TopicNotFound("missing".into()))
        );
        let results = sink.append("missing", 0, vec![record("a")]).await;
        assert!(matches!(results[0], Err(SinkError::TopicNotFound(_))));
    }

    #[tokio::test]
    async fn test_unavailable_sink() {
        let sink = MemoryLogSink::new();
        sink.create_topic("transactions", 1).await.unwrap();
        sink.set_available(false);

        let results = sink.append("transactions", 0, vec![record("a"), record("b")]).await;
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(SinkError::Unavailable(_)))));
        assert_eq!(sink.record_count("transactions").await, 0);
    }

    #[tokio::test]
    async fn test_enforcement() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let schema = Schema::for_shape::<Transaction>().unwrap();
        let id = registry.register("transactions-value", &schema).await.unwrap();

        let sink = MemoryLogSink::with_enforcement(registry);
        sink.create_topic("transactions", 1).await.unwrap();

        let good = br#"{"transactionId":"TXN-1","accountId":"ACC-1001","amount":10.5,"currency":"SAR","merchant":"Noon","country":"SA","timestamp":1}"#;
        let results = sink
            .append(
                "transactions",
                0,
                vec![
                    record(Bytes::from_static(b"this is not even JSON")),
                    record(encode_with_schema_id(id, br#"{"transactionId":"TXN-1"}"#)),
                    record(encode_with_schema_id(SchemaId(999), good)),
                    record(encode_with_schema_id(id, good)),
                ],
            )
            .await;

        assert!(matches!(results[0], Err(SinkError::Rejected(_))));
        assert!(matches!(&results[1], Err(SinkError::Rejected(msg)) if msg.contains("accountId")));
        assert!(matches!(&results[2], Err(SinkError::Rejected(msg)) if msg.contains("999")));
        assert_eq!(results[3], Ok(0));
        assert_eq!(sink.record_count("transactions").await, 1);
    }

    #[tokio::test]
    async fn test_enforcement_rejects_id_of_another_subject() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        registry
            .register("transactions-value", &Schema::for_shape::<Transaction>().unwrap())
            .await
            .unwrap();
        let loose = derive_schema(
            &ShapeDescriptor::new("Loose").optional_field("transactionId", DeclaredType::Text),
        )
        .unwrap();
        let other_id = registry.register("other-value", &loose).await.unwrap();

        let sink = MemoryLogSink::with_enforcement(registry);
        sink.create_topic("transactions", 1).await.unwrap();

        let results = sink
            .append(
                "transactions",
                0,
                vec![record(encode_with_schema_id(
                    other_id,
                    br#"{"transactionId":"TXN-BAD"}"#,
                ))],
            )
            .await;

        assert!(
            matches!(&results[0], Err(SinkError::Rejected(msg)) if msg.contains("transactions-value"))
        );
        assert_eq!(sink.record_count("transactions").await, 0);
    }

    #[tokio::test]
    async fn test_enforcement_accepts_whole_float_for_integer() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let id = registry
            .register("transactions-value", &Schema::for_shape::<Transaction>().unwrap())
            .await
            .unwrap();
        let sink = MemoryLogSink::with_enforcement(registry);
        sink.create_topic("transactions", 1).await.unwrap();

        let whole = br#"{"transactionId":"TXN-1","accountId":"ACC-1001","amount":10.0,"currency":"SAR","merchant":"Noon","country":"SA","timestamp":1700000000000.0}"#;
        let fraction = br#"{"transactionId":"TXN-2","accountId":"ACC-1001","amount":10.0,"currency":"SAR","merchant":"Noon","country":"SA","timestamp":1.5}"#;
        let results = sink
            .append(
                "transactions",
                0,
                vec![
                    record(encode_with_schema_id(id, whole)),
                    record(encode_with_schema_id(id, fraction)),
                ],
            )
            .await;

        assert_eq!(results[0], Ok(0));
        assert!(matches!(&results[1], Err(SinkError::Rejected(msg)) if msg.contains("integer")));
    }

    #[tokio::test]
    async fn test_enforcement_admits_null_for_optional_field() {
        let registry = Arc::new(MemorySchemaRegistry::new());
        let schema = derive_schema(
            &ShapeDescriptor::new("Note")
                .field("id", DeclaredType::Text)
                .optional_field("body", DeclaredType::Text),
        )
        .unwrap();
        let id = registry.register("notes-value", &schema).await.unwrap();
        let sink = MemoryLogSink::with_enforcement(registry);
        sink.create_topic("notes", 1).await.unwrap();

        let payload = br#"{"id":"n1","body":null}"#;
        assert!(validate(payload, &schema).is_conforming());

        let results = sink
            .append("notes", 0, vec![record(encode_with_schema_id(id, payload))])
            .await;
        assert_eq!(results, vec![Ok(0)]);
    }
}
