//! schemagate Client
//!
//! Publishes records to a broker only after they have been checked against a
//! schema held in a schema registry.
//!
//! # Features
//!
//! - **Schema binding**: derive a record's schema and register it under
//!   `<topic>-value`, or bind to the latest registered version
//! - **Validation on send**: non-conforming records never leave the client
//! - **Acknowledgements**: every publish yields a [`PendingAck`] that resolves
//!   to accepted (partition, offset) or a typed [`RejectReason`]
//! - **Batching**: per-partition batches flushed on size, bytes or age
//! - **Collaborators**: HTTP and in-memory implementations of both the
//!   registry ([`SchemaRegistryClient`]) and the broker ([`RecordSink`])
//!
//! # Usage
//!
//! ```ignore
//! use schemagate_client::{
//!     EndpointConfig, HttpSchemaRegistryClient, Publisher, RestSink,
//! };
//! use schemagate_schema::Transaction;
//! use std::sync::Arc;
//!
//! let registry = HttpSchemaRegistryClient::new(EndpointConfig::new("http://localhost:8081"))?;
//! let sink = RestSink::new(EndpointConfig::new("http://localhost:8080"))?;
//!
//! let publisher = Publisher::builder()
//!     .registry(Arc::new(registry))
//!     .sink(Arc::new(sink))
//!     .build()?;
//!
//! let bound = publisher.bind_schema::<Transaction>("transactions").await?;
//! let ack = publisher
//!     .publish_record("transactions", Some(txn.account_id()), &txn, &bound)
//!     .await?
//!     .await;
//! println!("{}", ack);
//! ```

pub mod ack;
pub mod batch;
pub mod config;
pub mod error;
pub mod publisher;
pub mod registry_client;
pub mod sink;

pub use ack::{Acknowledgement, PendingAck, RejectReason};
pub use batch::BatchRecord;
pub use config::{Credentials, EndpointConfig, PublisherConfig};
pub use error::{ClientError, Result};
pub use publisher::{partition_for_key, BoundSchema, Publisher, PublisherBuilder};
pub use registry_client::{HttpSchemaRegistryClient, MemorySchemaRegistry, SchemaRegistryClient};
pub use sink::{MemoryLogSink, RecordSink, RestSink, SinkError, SinkResult, StoredRecord};
