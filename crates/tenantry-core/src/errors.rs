use tenantry_core_types::TenantId;
use thiserror::Error;

use crate::model::ColumnKind;
use crate::tracking::{EntityState, StateEvent};

/// Result type alias using TenancyError
pub type Result<T> = std::result::Result<T, TenancyError>;

/// Result type alias using the canonical ExError
pub type ExResult<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling, testing, and log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Ambient context
    MissingContext,

    // Schema / metadata
    InvalidSchema,
    InvalidCascadeMarker,
    UnknownEntity,
    UnknownColumn,

    // Tracking
    InvalidInput,
    TypeMismatch,
    NotFound,
    AlreadyExists,
    IllegalTransition,

    // Execution
    Cancelled,
    Io,
    Serialization,
    Persistence,
    Concurrency,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::MissingContext => "ERR_MISSING_CONTEXT",
            ExErrorKind::InvalidSchema => "ERR_INVALID_SCHEMA",
            ExErrorKind::InvalidCascadeMarker => "ERR_INVALID_CASCADE_MARKER",
            ExErrorKind::UnknownEntity => "ERR_UNKNOWN_ENTITY",
            ExErrorKind::UnknownColumn => "ERR_UNKNOWN_COLUMN",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::TypeMismatch => "ERR_TYPE_MISMATCH",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::IllegalTransition => "ERR_ILLEGAL_TRANSITION",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification for programmatic handling plus optional context
/// (operation, entity, tenant) for debugging. Store and engine layers return
/// this type; the kernel's `TenancyError` converts into it.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity: Option<String>,
    tenant_id: Option<TenantId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity: None,
            tenant_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity type context
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Add tenant context
    pub fn with_tenant_id(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity type context, if any
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Get the tenant context, if any
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(tenant_id) = &self.tenant_id {
            write!(f, " (tenant_id: {})", tenant_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for the tenancy kernel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TenancyError {
    // ===== Ambient Context =====
    /// `TenantScope::current()` was called with no tenant set in this flow
    #[error("No tenant is set in the current context; use TenantScope::set_current or TenantScope::begin first")]
    MissingContext,

    // ===== Schema Errors =====
    /// A set-null-on-delete marker cannot be honoured
    #[error("Invalid cascade marker on {entity}.{column}: {reason}")]
    InvalidCascadeMarker {
        entity: String,
        column: String,
        reason: String,
    },

    /// The schema itself is malformed
    #[error("Invalid schema: {reason}")]
    InvalidSchema { reason: String },

    /// Entity type is not registered in the schema
    #[error("Unknown entity type: {entity}")]
    UnknownEntity { entity: String },

    /// Column is not declared on the entity type
    #[error("Unknown column {column} on entity {entity}")]
    UnknownColumn { entity: String, column: String },

    // ===== Tracking Errors =====
    /// A key has the wrong number of components
    #[error("Key for {entity} has {actual} values, expected {expected}")]
    KeyArity {
        entity: String,
        expected: usize,
        actual: usize,
    },

    /// A primary key column has no value
    #[error("Primary key column {entity}.{column} has no value")]
    MissingKeyValue { entity: String, column: String },

    /// A non-nullable column was given a null
    #[error("Column {entity}.{column} is not nullable")]
    NullViolation { entity: String, column: String },

    /// A value does not fit the declared column kind
    #[error("Column {entity}.{column} expects {expected:?}, got {actual}")]
    TypeMismatch {
        entity: String,
        column: String,
        expected: ColumnKind,
        actual: String,
    },

    /// Primary key columns cannot be edited once tracked
    #[error("Primary key column {entity}.{column} is immutable")]
    ImmutableKey { entity: String, column: String },

    /// The same identity is already tracked
    #[error("Entity {entity} with key {key} is already tracked")]
    DuplicateKey { entity: String, key: String },

    /// The identity is not tracked by this unit of work
    #[error("Entity {entity} with key {key} is not tracked")]
    NotTracked { entity: String, key: String },

    /// The lifecycle state machine does not allow this event
    #[error("Entity {entity} with key {key} cannot go from {from} on {event}")]
    IllegalTransition {
        entity: String,
        key: String,
        from: EntityState,
        event: StateEvent,
    },

    // ===== Execution Errors =====
    /// The enclosing operation was cancelled
    #[error("Operation {op} was cancelled")]
    Cancelled { op: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Conversion from TenancyError to ExError
impl From<TenancyError> for ExError {
    fn from(err: TenancyError) -> Self {
        let message = err.to_string();
        match err {
            TenancyError::MissingContext => ExError::new(ExErrorKind::MissingContext)
                .with_op("tenant_scope")
                .with_message(message),
            TenancyError::InvalidCascadeMarker { entity, .. } => {
                ExError::new(ExErrorKind::InvalidCascadeMarker)
                    .with_op("dependency_index_build")
                    .with_entity(entity)
                    .with_message(message)
            }
            TenancyError::InvalidSchema { .. } => ExError::new(ExErrorKind::InvalidSchema)
                .with_op("schema_build")
                .with_message(message),
            TenancyError::UnknownEntity { entity } => ExError::new(ExErrorKind::UnknownEntity)
                .with_entity(entity)
                .with_message(message),
            TenancyError::UnknownColumn { entity, .. } => ExError::new(ExErrorKind::UnknownColumn)
                .with_entity(entity)
                .with_message(message),
            TenancyError::KeyArity { entity, .. }
            | TenancyError::MissingKeyValue { entity, .. }
            | TenancyError::NullViolation { entity, .. }
            | TenancyError::ImmutableKey { entity, .. } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_entity(entity)
                    .with_message(message)
            }
            TenancyError::TypeMismatch { entity, .. } => ExError::new(ExErrorKind::TypeMismatch)
                .with_entity(entity)
                .with_message(message),
            TenancyError::DuplicateKey { entity, .. } => ExError::new(ExErrorKind::AlreadyExists)
                .with_entity(entity)
                .with_message(message),
            TenancyError::NotTracked { entity, .. } => ExError::new(ExErrorKind::NotFound)
                .with_entity(entity)
                .with_message(message),
            TenancyError::IllegalTransition { entity, .. } => {
                ExError::new(ExErrorKind::IllegalTransition)
                    .with_entity(entity)
                    .with_message(message)
            }
            TenancyError::Cancelled { op } => ExError::new(ExErrorKind::Cancelled)
                .with_op(op)
                .with_message(message),
            TenancyError::Internal { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ExErrorKind::MissingContext.code(), "ERR_MISSING_CONTEXT");
        assert_eq!(
            ExErrorKind::InvalidCascadeMarker.code(),
            "ERR_INVALID_CASCADE_MARKER"
        );
        assert_eq!(ExErrorKind::Persistence.code(), "ERR_PERSISTENCE");
    }

    #[test]
    fn test_missing_context_converts() {
        let ex: ExError = TenancyError::MissingContext.into();
        assert_eq!(ex.kind(), ExErrorKind::MissingContext);
        assert_eq!(ex.op(), Some("tenant_scope"));
    }

    #[test]
    fn test_invalid_marker_keeps_entity() {
        let ex: ExError = TenancyError::InvalidCascadeMarker {
            entity: "parts_orders".to_string(),
            column: "dealership_id".to_string(),
            reason: "column is part of the primary key".to_string(),
        }
        .into();

        assert_eq!(ex.kind(), ExErrorKind::InvalidCascadeMarker);
        assert_eq!(ex.entity(), Some("parts_orders"));
        assert!(ex.message().contains("dealership_id"));
    }

    #[test]
    fn test_display_includes_code_and_context() {
        let tenant = TenantId::generate();
        let ex = ExError::new(ExErrorKind::Persistence)
            .with_op("save_changes")
            .with_entity("vehicles")
            .with_tenant_id(tenant)
            .with_message("disk full");

        let rendered = ex.to_string();
        assert!(rendered.starts_with("[ERR_PERSISTENCE]"));
        assert!(rendered.contains("save_changes"));
        assert!(rendered.contains("vehicles"));
        assert!(rendered.contains(&tenant.to_string()));
    }

    #[test]
    fn test_source_chain() {
        let inner = ExError::new(ExErrorKind::Io).with_message("inner");
        let outer = ExError::new(ExErrorKind::Persistence).with_source(inner);

        assert_eq!(
            outer.source_error().map(|e| e.kind()),
            Some(ExErrorKind::Io)
        );
        assert!(std::error::Error::source(&outer).is_some());
    }
}
