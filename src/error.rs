//! Error types for bindings, the record store and the channel layer.

use crate::types::{BindingId, OperationId};
use thiserror::Error;

/// Main error type for binding operations.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("Binding registration failed: {0}")]
    Registration(String),

    #[error("Binding for {0} has no stream name")]
    MissingStream(String),

    #[error("Binding for {0} has no serializer configured")]
    MissingSerializer(String),

    #[error("No membership snapshot for {op:?} in {binding:?} (post-change hook ran without pre-change hook)")]
    SnapshotMissing { binding: BindingId, op: OperationId },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record of kind {0} has no primary key")]
    MissingPrimaryKey(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Delivery error: {0}")]
    Delivery(String),
}

impl From<serde_json::Error> for BindingError {
    fn from(e: serde_json::Error) -> Self {
        BindingError::Serialization(e.to_string())
    }
}

/// Result type for binding operations.
pub type Result<T> = std::result::Result<T, BindingError>;
