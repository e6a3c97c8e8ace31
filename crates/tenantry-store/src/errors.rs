//! Error handling for tenantry-store
//!
//! Wraps tenantry-core ExError with store-specific helpers

use tenantry_core::errors::{ExError, ExErrorKind};
use thiserror::Error;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Failures decoding a stored value into a declared column kind
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("column {entity}.{column} holds {found}, expected {expected}")]
    UnexpectedType {
        entity: String,
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("column {entity}.{column} holds an invalid UUID: {value}")]
    InvalidUuid {
        entity: String,
        column: String,
        value: String,
    },
}

impl From<DecodeError> for ExError {
    fn from(err: DecodeError) -> Self {
        let entity = match &err {
            DecodeError::UnexpectedType { entity, .. } | DecodeError::InvalidUuid { entity, .. } => {
                entity.clone()
            }
        };
        ExError::new(ExErrorKind::Serialization)
            .with_op("decode_row")
            .with_entity(entity)
            .with_message(err.to_string())
    }
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Create a configuration error
pub fn config_error(reason: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("store_config")
        .with_message(reason)
}

/// A write matched no row: the row changed or vanished since it was loaded
pub fn row_missing(op: &str, entity: &str, key: &str) -> ExError {
    ExError::new(ExErrorKind::Concurrency)
        .with_op(op.to_string())
        .with_entity(entity.to_string())
        .with_message(format!("no row with key {} was affected", key))
}
