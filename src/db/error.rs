//! Error types for repository operations.
//!
//! Structured context travels with every error so the scheduler can decide
//! whether a failure is transient (retry with backoff) or permanent.

use std::fmt;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Structured context for repository errors.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation being performed (e.g. "upsert_precomputed")
    pub operation: Option<String>,
    /// The entity type involved (e.g. "patio", "building")
    pub entity: Option<String>,
    /// The entity ID if applicable
    pub entity_id: Option<String>,
    /// Whether this error is retryable
    pub retryable: bool,
}

impl ErrorContext {
    /// Create a new error context with an operation name.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    /// Set the entity type.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Set the entity ID.
    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    /// Mark this error as retryable.
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(ref entity) = self.entity {
            parts.push(format!("entity={}", entity));
        }
        if let Some(ref id) = self.entity_id {
            parts.push(format!("id={}", id));
        }
        if self.retryable {
            parts.push("retryable=true".to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Backend connection errors. Typically transient and retryable.
    #[error("Connection error: {message} {context}")]
    ConnectionError {
        message: String,
        context: ErrorContext,
    },

    /// Storage read/write errors.
    #[error("Storage error: {message} {context}")]
    StorageError {
        message: String,
        context: ErrorContext,
    },

    /// Requested entity was not found.
    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// Data failed validation before or after a storage operation.
    #[error("Validation error: {message} {context}")]
    ValidationError {
        message: String,
        context: ErrorContext,
    },
}

impl RepositoryError {
    pub fn connection(message: impl Into<String>, context: ErrorContext) -> Self {
        RepositoryError::ConnectionError {
            message: message.into(),
            context,
        }
    }

    pub fn storage(message: impl Into<String>, context: ErrorContext) -> Self {
        RepositoryError::StorageError {
            message: message.into(),
            context,
        }
    }

    pub fn not_found(message: impl Into<String>, context: ErrorContext) -> Self {
        RepositoryError::NotFound {
            message: message.into(),
            context,
        }
    }

    pub fn validation(message: impl Into<String>, context: ErrorContext) -> Self {
        RepositoryError::ValidationError {
            message: message.into(),
            context,
        }
    }

    /// Whether the scheduler should retry this failure with backoff.
    /// Connection trouble is always considered transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            RepositoryError::ConnectionError { .. } => true,
            RepositoryError::StorageError { context, .. } => context.retryable,
            RepositoryError::NotFound { .. } => false,
            RepositoryError::ValidationError { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new("upsert_precomputed")
            .with_entity("patio")
            .with_entity_id(42)
            .retryable();
        let rendered = ctx.to_string();
        assert!(rendered.contains("operation=upsert_precomputed"));
        assert!(rendered.contains("entity=patio"));
        assert!(rendered.contains("id=42"));
        assert!(rendered.contains("retryable=true"));
    }

    #[test]
    fn test_retryability() {
        let conn = RepositoryError::connection("socket closed", ErrorContext::default());
        assert!(conn.is_retryable());

        let missing = RepositoryError::not_found("patio 7", ErrorContext::default());
        assert!(!missing.is_retryable());

        let transient = RepositoryError::storage("lock timeout", ErrorContext::default().retryable());
        assert!(transient.is_retryable());
    }
}
