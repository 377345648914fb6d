//! Error types for schemagate client operations.
//!
//! These are *setup* errors: building a publisher, binding a schema, talking
//! to the registry. Per-record failures never surface here; they resolve the
//! record's [`PendingAck`](crate::PendingAck) with a
//! [`RejectReason`](crate::RejectReason) instead.
//!
//! ## Error Handling Strategy
//!
//! - **Retriable errors**: `Transport`
//! - **Client errors**: `ConfigError`, `Schema`
//! - **Fatal errors**: `Closed`, `Internal`
//!
//! ## Examples
//!
//! ```ignore
//! use schemagate_client::{ClientError, Publisher};
//! use schemagate_schema::{SchemaError, Transaction};
//!
//! match publisher.bind_schema::<Transaction>("transactions").await {
//!     Ok(bound) => println!("Bound schema id {}", bound.id()),
//!     Err(ClientError::Schema(SchemaError::IncompatibleSchema(reason))) => {
//!         eprintln!("Registry refused the schema: {}", reason);
//!     }
//!     Err(e) if e.is_retriable() => eprintln!("Registry unreachable, retry later: {}", e),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use schemagate_schema::SchemaError;
use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for schemagate client operations.
///
/// ## Error Categories
///
/// - **Configuration**: `ConfigError`
/// - **Schema**: `Schema` (derivation, compatibility, registry lookups)
/// - **Communication**: `Transport`, `RegistryError`
/// - **Processing**: `SerializationError`
/// - **Lifecycle**: `Closed`
/// - **Unknown**: `Internal`
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid client configuration.
    ///
    /// ## Causes
    /// - Malformed registry or broker URL
    /// - Zero batch size, timeout or queue capacity
    /// - Unreadable CA certificate
    /// - Credentials rejected by the registry (401/403)
    ///
    /// ## Resolution
    /// Fix the configuration; retrying will not help.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Schema derivation, compatibility or lookup failure.
    ///
    /// Fatal for the subject in question. A rejected registration never
    /// alters what the registry already holds.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The schema registry or broker could not be reached.
    ///
    /// ## Causes
    /// - Connection refused or reset
    /// - Request timed out
    /// - Server returned 5xx
    ///
    /// ## Resolution
    /// Retry later. The retry policy is the caller's decision.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The registry answered with an error the client does not map to a
    /// more specific variant.
    #[error("Schema registry error (HTTP {status}): {message}")]
    RegistryError { status: u16, message: String },

    /// A record could not be serialized to JSON.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The publisher's delivery task is no longer running.
    #[error("Publisher is closed")]
    Closed,

    /// Internal error (bug).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}
