//! Schema-governed publisher.
//!
//! ## Flow
//!
//! ```text
//!  publish(topic, key, payload, &bound)
//!    │  validate (optional) ──▶ non-conforming: Rejected(Validation), never sent
//!    │  frame [0x00][schema id][payload]
//!    ▼
//!  command queue (bounded, queue_capacity)
//!    │
//!    ▼
//!  delivery task ── partition (SipHash(key) % n, round-robin if keyless)
//!    │              BatchManager (size / bytes / age)
//!    │              RecordSink::append
//!    ▼
//!  acks released strictly in publish order
//! ```
//!
//! ## Ordering
//!
//! Every sink call is made by the single delivery task, and acknowledgements
//! are released in the order records were published, client-side rejections
//! included. Acks for the same key therefore resolve in send order.
//!
//! ## Lifecycle
//!
//! `flush()` pushes every buffered batch out and waits until their acks are
//! released. `close()` does the same and stops the delivery task. Dropping a
//! publisher without closing it stops the task at once; unresolved acks
//! resolve to `Rejected(Abandoned)`.
//!
//! ## Example
//!
//! ```ignore
//! use schemagate_client::{MemoryLogSink, MemorySchemaRegistry, Publisher};
//! use schemagate_schema::Transaction;
//! use std::sync::Arc;
//!
//! let publisher = Publisher::builder()
//!     .registry(Arc::new(MemorySchemaRegistry::new()))
//!     .sink(Arc::new(MemoryLogSink::new()))
//!     .build()?;
//!
//! let bound = publisher.bind_schema::<Transaction>("transactions").await?;
//! let ack = publisher
//!     .publish("transactions", Some("ACC-1001"), payload, &bound)
//!     .await
//!     .wait()
//!     .await;
//! publisher.close().await?;
//! ```

use crate::ack::{Acknowledgement, PendingAck, RejectReason};
use crate::batch::{BatchManager, BatchRecord, QueuedRecord};
use crate::config::PublisherConfig;
use crate::error::{ClientError, Result};
use crate::registry_client::SchemaRegistryClient;
use crate::sink::{RecordSink, SinkError, SinkResult};
use bytes::Bytes;
use schemagate_schema::{
    encode_with_schema_id, validate, value_subject, RecordShape, RegisteredSchema, Schema,
    SchemaError, SchemaId, SchemaVersion,
};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on how long a ripe batch waits for the delivery task's timer.
const MAX_TICK: Duration = Duration::from_millis(50);

/// A schema bound to a topic: what `publish` frames and validates against.
///
/// Cheap to clone; the schema itself is shared read-only.
#[derive(Debug, Clone)]
pub struct BoundSchema {
    topic: String,
    subject: String,
    id: SchemaId,
    version: Option<i32>,
    schema: Arc<Schema>,
}

impl BoundSchema {
    fn from_registered(topic: &str, registered: RegisteredSchema) -> Self {
        Self {
            topic: topic.to_string(),
            subject: registered.subject,
            id: registered.id,
            version: Some(registered.version),
            schema: registered.schema,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    /// Subject version, when the binding came from a lookup rather than a
    /// registration.
    pub fn version(&self) -> Option<i32> {
        self.version
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

/// Builder for [`Publisher`].
#[derive(Default)]
pub struct PublisherBuilder {
    registry: Option<Arc<dyn SchemaRegistryClient>>,
    sink: Option<Arc<dyn RecordSink>>,
    config: PublisherConfig,
}

impl PublisherBuilder {
    /// Schema registry used by `bind_schema` (required).
    pub fn registry(mut self, registry: Arc<dyn SchemaRegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Broker sink records are delivered to (required).
    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace every option at once.
    pub fn config(mut self, config: PublisherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn validate_on_send(mut self, enabled: bool) -> Self {
        self.config.validate_on_send = enabled;
        self
    }

    pub fn auto_register_schema(mut self, enabled: bool) -> Self {
        self.config.auto_register_schema = enabled;
        self
    }

    pub fn fail_on_incompatible(mut self, enabled: bool) -> Self {
        self.config.fail_on_incompatible = enabled;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Build the publisher and start its delivery task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the registry or sink is missing or a limit is zero.
    pub fn build(self) -> Result<Publisher> {
        let registry = self
            .registry
            .ok_or_else(|| ClientError::ConfigError("registry is required".to_string()))?;
        let sink = self
            .sink
            .ok_or_else(|| ClientError::ConfigError("sink is required".to_string()))?;
        self.config.validate()?;

        let (commands, receiver) = mpsc::channel(self.config.queue_capacity);
        let tick = self
            .config
            .batch_timeout
            .min(MAX_TICK)
            .max(Duration::from_millis(1));

        let task = DeliveryTask {
            sink,
            batches: BatchManager::new(
                self.config.batch_size,
                self.config.batch_max_bytes,
                self.config.batch_timeout,
            ),
            partition_counts: HashMap::new(),
            round_robin: 0,
            in_flight: VecDeque::new(),
            first_sequence: 0,
        };
        let delivery = tokio::spawn(task.run(receiver, tick));

        info!(
            validate_on_send = self.config.validate_on_send,
            auto_register_schema = self.config.auto_register_schema,
            batch_size = self.config.batch_size,
            "Publisher started"
        );

        Ok(Publisher {
            registry,
            config: self.config,
            commands,
            delivery: Some(delivery),
        })
    }
}

/// Publishes records to a broker sink under a registered schema.
pub struct Publisher {
    registry: Arc<dyn SchemaRegistryClient>,
    config: PublisherConfig,
    commands: mpsc::Sender<Command>,
    delivery: Option<JoinHandle<()>>,
}

impl Publisher {
    pub fn builder() -> PublisherBuilder {
        PublisherBuilder::default()
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Derive the schema of `T` and bind it to `topic`.
    ///
    /// With `auto_register_schema` the derived schema is registered under
    /// `<topic>-value`. If the registry refuses it as incompatible and
    /// `fail_on_incompatible` is off, the latest registered schema is bound
    /// instead. Without `auto_register_schema` the latest registered schema is
    /// bound and nothing is registered.
    ///
    /// # Errors
    ///
    /// - `Schema(UnsupportedType)` if `T` has a field with no schema type
    /// - `Schema(IncompatibleSchema)` if registration is refused
    /// - `Transport` if the registry is unreachable
    pub async fn bind_schema<T: RecordShape>(&self, topic: &str) -> Result<BoundSchema> {
        let schema = Schema::for_shape::<T>()?;
        self.bind(topic, schema).await
    }

    /// Bind an explicit schema to `topic`, following the same rules as
    /// [`Publisher::bind_schema`].
    pub async fn bind(&self, topic: &str, schema: Schema) -> Result<BoundSchema> {
        let subject = value_subject(topic);

        if !self.config.auto_register_schema {
            let latest = self
                .registry
                .get_schema(&subject, SchemaVersion::Latest)
                .await?;
            info!(
                topic = topic,
                subject = %subject,
                schema_id = %latest.id,
                version = latest.version,
                "Bound to latest registered schema"
            );
            return Ok(BoundSchema::from_registered(topic, latest));
        }

        match self.registry.register(&subject, &schema).await {
            Ok(id) => {
                info!(topic = topic, subject = %subject, schema_id = %id, "Schema bound");
                Ok(BoundSchema {
                    topic: topic.to_string(),
                    subject,
                    id,
                    version: None,
                    schema: Arc::new(schema),
                })
            }
            Err(ClientError::Schema(SchemaError::IncompatibleSchema(reason)))
                if !self.config.fail_on_incompatible =>
            {
                warn!(
                    subject = %subject,
                    reason = %reason,
                    "Derived schema is incompatible, falling back to latest registered schema"
                );
                let latest = self
                    .registry
                    .get_schema(&subject, SchemaVersion::Latest)
                    .await?;
                Ok(BoundSchema::from_registered(topic, latest))
            }
            Err(e) => Err(e),
        }
    }

    /// Publish a raw payload under `schema`.
    ///
    /// Returns once the record is queued for delivery. With
    /// `validate_on_send`, a non-conforming payload is never sent and its ack
    /// resolves to `Rejected(Validation)`.
    pub async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
        schema: &BoundSchema,
    ) -> PendingAck {
        if self.config.validate_on_send {
            let outcome = validate(payload, &schema.schema);
            if !outcome.is_conforming() {
                debug!(topic = topic, key = ?key, outcome = %outcome, "Record failed validation");
                return self
                    .enqueue(topic, key, Disposition::Reject(RejectReason::Validation { outcome }))
                    .await;
            }
        }

        let framed = encode_with_schema_id(schema.id, payload);
        self.enqueue(topic, key, Disposition::Deliver(framed)).await
    }

    /// Serialize `record` to JSON and publish it.
    ///
    /// # Errors
    ///
    /// `SerializationError` if `record` cannot be represented as JSON.
    pub async fn publish_record<T: Serialize>(
        &self,
        topic: &str,
        key: Option<&str>,
        record: &T,
        schema: &BoundSchema,
    ) -> Result<PendingAck> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| ClientError::SerializationError(e.to_string()))?;
        Ok(self.publish(topic, key, &payload, schema).await)
    }

    /// Send a payload as-is: no validation, no schema frame.
    ///
    /// Only a sink that enforces schemas can stop such a record.
    pub async fn publish_unvalidated(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> PendingAck {
        self.enqueue(
            topic,
            key,
            Disposition::Deliver(Bytes::copy_from_slice(payload)),
        )
        .await
    }

    async fn enqueue(&self, topic: &str, key: Option<&str>, disposition: Disposition) -> PendingAck {
        let (ack, pending) = PendingAck::new(topic);
        let envelope = Envelope {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            timestamp: now_millis(),
            disposition,
            ack,
        };

        // On failure the envelope, and with it the ack sender, is dropped,
        // so `pending` resolves to Abandoned.
        if self.commands.send(Command::Publish(envelope)).await.is_err() {
            warn!(topic = topic, "Delivery task is gone, record abandoned");
        }
        pending
    }

    /// Send every buffered record and wait until all acks issued so far
    /// have been released.
    ///
    /// # Errors
    ///
    /// - `Closed` if the delivery task has stopped
    /// - `Transport` if the flush does not finish within `request_timeout`
    pub async fn flush(&self) -> Result<()> {
        let (done, finished) = oneshot::channel();
        self.commands
            .send(Command::Flush(done))
            .await
            .map_err(|_| ClientError::Closed)?;
        self.await_completion(finished, "flush").await
    }

    /// Flush and stop the delivery task, releasing the registry and sink.
    pub async fn close(mut self) -> Result<()> {
        let (done, finished) = oneshot::channel();
        self.commands
            .send(Command::Close(done))
            .await
            .map_err(|_| ClientError::Closed)?;
        self.await_completion(finished, "close").await?;

        if let Some(delivery) = self.delivery.take() {
            delivery
                .await
                .map_err(|e| ClientError::Internal(format!("Delivery task failed: {}", e)))?;
        }

        info!("Publisher closed");
        Ok(())
    }

    async fn await_completion(
        &self,
        finished: oneshot::Receiver<()>,
        operation: &str,
    ) -> Result<()> {
        match tokio::time::timeout(self.config.request_timeout, finished).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Transport(format!(
                "{} did not complete within {:?}",
                operation, self.config.request_timeout
            ))),
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if let Some(delivery) = self.delivery.take() {
            debug!("Publisher dropped without close, abandoning pending records");
            delivery.abort();
        }
    }
}

/// Partition for a keyed record: SipHash of the key modulo `partition_count`.
///
/// A topic reported with no partitions maps every key to partition 0.
pub fn partition_for_key(key: &[u8], partition_count: u32) -> u32 {
    if partition_count == 0 {
        return 0;
    }
    let mut hasher = siphasher::sip::SipHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partition_count as u64) as u32
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

enum Command {
    Publish(Envelope),
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

struct Envelope {
    topic: String,
    key: Option<String>,
    timestamp: u64,
    disposition: Disposition,
    ack: oneshot::Sender<Acknowledgement>,
}

enum Disposition {
    /// Hand the value to the sink
    Deliver(Bytes),
    /// Already decided on the client
    Reject(RejectReason),
}

/// A published record whose ack has not been released yet.
struct InFlight {
    topic: String,
    key: Option<String>,
    ack: oneshot::Sender<Acknowledgement>,
    outcome: Option<Acknowledgement>,
}

/// Owns batching, partition metadata and ack release.
struct DeliveryTask {
    sink: Arc<dyn RecordSink>,
    batches: BatchManager,
    partition_counts: HashMap<String, u32>,
    round_robin: u32,
    /// Unreleased records in publish order
    in_flight: VecDeque<InFlight>,
    /// Sequence number of `in_flight.front()`
    first_sequence: u64,
}

impl DeliveryTask {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, tick: Duration) {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Publish(envelope)) => {
                        self.enqueue(envelope).await;
                        self.flush_ready().await;
                    }
                    Some(Command::Flush(done)) => {
                        self.flush_all().await;
                        let _ = done.send(());
                    }
                    Some(Command::Close(done)) => {
                        self.flush_all().await;
                        let _ = done.send(());
                        break;
                    }
                    None => break,
                },
                _ = ticker.tick() => self.flush_ready().await,
            }
        }

        let (partitions, buffered, buffered_bytes) = self.batches.stats();
        debug!(
            unreleased = self.in_flight.len(),
            partitions = partitions,
            buffered = buffered,
            buffered_bytes = buffered_bytes,
            "Delivery task stopped"
        );
    }

    async fn enqueue(&mut self, envelope: Envelope) {
        let sequence = self.first_sequence + self.in_flight.len() as u64;
        let Envelope {
            topic,
            key,
            timestamp,
            disposition,
            ack,
        } = envelope;

        let outcome = match disposition {
            Disposition::Reject(reason) => Some(Acknowledgement::Rejected {
                topic: topic.clone(),
                reason,
            }),
            Disposition::Deliver(value) => match self.partition_for(&topic, key.as_deref()).await {
                Ok(partition) => {
                    let record = BatchRecord::new(
                        key.as_ref().map(|k| Bytes::from(k.clone())),
                        value,
                        timestamp,
                    );
                    self.batches
                        .append(&topic, partition, QueuedRecord { sequence, record });
                    None
                }
                Err(e) => Some(Acknowledgement::Rejected {
                    topic: topic.clone(),
                    reason: RejectReason::Transport {
                        message: e.to_string(),
                    },
                }),
            },
        };

        self.in_flight.push_back(InFlight {
            topic,
            key,
            ack,
            outcome,
        });
        self.release();
    }

    async fn partition_for(&mut self, topic: &str, key: Option<&str>) -> SinkResult<u32> {
        let count = match self.partition_counts.get(topic) {
            Some(count) => *count,
            None => {
                let count = self.sink.partition_count(topic).await?;
                if count == 0 {
                    return Err(SinkError::TopicNotFound(topic.to_string()));
                }
                debug!(topic = topic, partitions = count, "Cached partition count");
                self.partition_counts.insert(topic.to_string(), count);
                count
            }
        };

        Ok(match key {
            Some(key) => partition_for_key(key.as_bytes(), count),
            None => {
                self.round_robin = self.round_robin.wrapping_add(1);
                self.round_robin % count
            }
        })
    }

    async fn flush_ready(&mut self) {
        for (topic, partition, records) in self.batches.ready_batches() {
            self.send_batch(&topic, partition, records).await;
        }
        self.release();
    }

    async fn flush_all(&mut self) {
        for (topic, partition, records) in self.batches.flush_all() {
            self.send_batch(&topic, partition, records).await;
        }
        self.release();
    }

    async fn send_batch(&mut self, topic: &str, partition: u32, records: Vec<QueuedRecord>) {
        let (sequences, batch): (Vec<u64>, Vec<BatchRecord>) = records
            .into_iter()
            .map(|queued| (queued.sequence, queued.record))
            .unzip();
        let record_count = batch.len();

        let mut results = self.sink.append(topic, partition, batch).await.into_iter();
        let mut transport_failures = 0usize;

        for sequence in sequences {
            let ack = match results.next() {
                Some(Ok(offset)) => Acknowledgement::Accepted {
                    topic: topic.to_string(),
                    partition,
                    offset,
                },
                Some(Err(SinkError::Rejected(message))) => Acknowledgement::Rejected {
                    topic: topic.to_string(),
                    reason: RejectReason::ServerValidation { message },
                },
                Some(Err(e)) => {
                    transport_failures += 1;
                    Acknowledgement::Rejected {
                        topic: topic.to_string(),
                        reason: RejectReason::Transport {
                            message: e.to_string(),
                        },
                    }
                }
                None => {
                    transport_failures += 1;
                    Acknowledgement::Rejected {
                        topic: topic.to_string(),
                        reason: RejectReason::Transport {
                            message: "sink returned no result for record".to_string(),
                        },
                    }
                }
            };
            self.settle(sequence, ack);
        }

        if transport_failures > 0 {
            // Metadata may be stale after a broker failure
            self.partition_counts.remove(topic);
            error!(
                topic = topic,
                partition = partition,
                failed = transport_failures,
                total = record_count,
                "Batch delivery failed"
            );
        } else {
            debug!(topic = topic, partition = partition, records = record_count, "Batch delivered");
        }
    }

    fn settle(&mut self, sequence: u64, ack: Acknowledgement) {
        let index = (sequence - self.first_sequence) as usize;
        if let Some(entry) = self.in_flight.get_mut(index) {
            entry.outcome = Some(ack);
        }
    }

    /// Release resolved acks from the front of the queue, stopping at the
    /// first record still waiting on the sink.
    fn release(&mut self) {
        while self
            .in_flight
            .front()
            .is_some_and(|entry| entry.outcome.is_some())
        {
            let Some(entry) = self.in_flight.pop_front() else {
                break;
            };
            self.first_sequence += 1;

            let Some(ack) = entry.outcome else {
                continue;
            };
            let key = entry.key.as_deref().unwrap_or("-");
            match &ack {
                Acknowledgement::Accepted {
                    partition, offset, ..
                } => info!(
                    topic = %entry.topic,
                    key = key,
                    partition = partition,
                    offset = offset,
                    outcome = "accepted",
                    "Publish acknowledged"
                ),
                Acknowledgement::Rejected { reason, .. } => warn!(
                    topic = %entry.topic,
                    key = key,
                    outcome = "rejected",
                    reason = %reason,
                    "Publish rejected"
                ),
            }

            // The caller may have dropped its PendingAck
            let _ = entry.ack.send(ack);
        }
    }
}
