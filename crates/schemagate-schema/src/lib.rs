//! schemagate Schema
//!
//! Schema derivation, record validation and schema-id framing for
//! schema-governed publishing.
//!
//! # Features
//!
//! - **Derivation**: explicit record shapes become JSON Schema documents
//! - **Validation**: deterministic accept/reject classification of payloads
//! - **Compatibility**: backward, forward and full evolution rules
//! - **Framing**: Confluent wire format (magic byte + schema ID)
//!
//! # Usage
//!
//! ```ignore
//! use schemagate_schema::{validate, Schema, Transaction, ValidationOutcome};
//!
//! let schema = Schema::for_shape::<Transaction>()?;
//!
//! let outcome = validate(br#"{"transactionId":"TXN-1","accountId":"ACC-1"}"#, &schema);
//! assert_eq!(outcome, ValidationOutcome::MissingField { field: "amount".into() });
//! ```

pub mod compatibility;
pub mod error;
pub mod shape;
pub mod transaction;
pub mod types;
pub mod validator;
pub mod wire;

pub use compatibility::check_compatibility;
pub use error::{Result, SchemaError};
pub use shape::{derive_schema, DeclaredType, FieldDescriptor, RecordShape, ShapeDescriptor};
pub use transaction::{Country, Currency, Transaction};
pub use types::*;
pub use validator::{validate, validate_record, validate_value, ValidationOutcome};
pub use wire::{decode_schema_id, encode_with_schema_id};
