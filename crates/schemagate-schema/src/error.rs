//! Schema Error Types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchemaError>;

#[derive(Error, Debug)]
pub enum SchemaError {
    /// A declared field type has no JSON Schema equivalent.
    #[error("Unsupported type for field '{field}': {type_name}")]
    UnsupportedType { field: String, type_name: String },

    #[error("Schema compatibility error: {0}")]
    IncompatibleSchema(String),

    #[error("Schema not found: {subject} version {version}")]
    SchemaNotFound { subject: String, version: String },

    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
