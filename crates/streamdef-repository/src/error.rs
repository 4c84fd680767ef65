//! Repository error types.
//!
//! Domain errors carry the entity, identifier and parent level they refer to,
//! and render the way API clients see them, e.g.
//! `sink "my-sink" not found in the source`. [`RepositoryError::kind`]
//! classifies every variant so transport layers can map them to status codes.

use streamdef_store::StoreError;
use streamdef_types::{EntityKind, VersionNumber};

/// Result type alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Coarse classification of [`RepositoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    CountLimitReached,
    Validation,
    Conflict,
    Cancelled,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The entity, or the ancestor it was addressed through, does not exist.
    #[error("{entity} \"{id}\" not found in the {parent}")]
    NotFound { entity: String, id: String, parent: &'static str },

    /// An active entity with the same key exists.
    #[error("{entity} \"{id}\" already exists in the {parent}")]
    AlreadyExists { entity: String, id: String, parent: &'static str },

    /// Creating the entity or version would exceed a configured cap.
    #[error("{entity} count limit reached in the {parent}, the maximum is {limit}")]
    CountLimitReached { entity: &'static str, limit: u64, parent: &'static str },

    /// The requested change is not allowed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Concurrent modifications kept invalidating the operation.
    #[error("Conflict: concurrent modification detected, gave up after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// The caller cancelled the operation before it committed.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store failed while serving a request.
    #[error("Store error during {operation} of \"{key}\": {message}")]
    Store { operation: &'static str, key: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        RepositoryError::NotFound {
            entity: kind.as_str().to_string(),
            id: id.into(),
            parent: kind.parent_name(),
        }
    }

    pub fn deleted_not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        RepositoryError::NotFound {
            entity: format!("deleted {}", kind.as_str()),
            id: id.into(),
            parent: kind.parent_name(),
        }
    }

    pub fn version_not_found(kind: EntityKind, id: &str, version: VersionNumber) -> Self {
        RepositoryError::NotFound {
            entity: format!("{} version", kind.as_str()),
            id: format!("{id}/{version}"),
            parent: kind.parent_name(),
        }
    }

    pub fn already_exists(kind: EntityKind, id: impl Into<String>) -> Self {
        RepositoryError::AlreadyExists {
            entity: kind.as_str().to_string(),
            id: id.into(),
            parent: kind.parent_name(),
        }
    }

    /// Wraps a store failure with the operation and key it happened on.
    pub fn store(operation: &'static str, key: impl Into<String>, err: StoreError) -> Self {
        match err {
            StoreError::Serialization(e) => RepositoryError::Serialization(e.to_string()),
            other => RepositoryError::Store { operation, key: key.into(), message: other.to_string() },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound { .. } => ErrorKind::NotFound,
            RepositoryError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            RepositoryError::CountLimitReached { .. } => ErrorKind::CountLimitReached,
            RepositoryError::Validation(_) => ErrorKind::Validation,
            RepositoryError::Conflict { .. } => ErrorKind::Conflict,
            RepositoryError::Cancelled => ErrorKind::Cancelled,
            RepositoryError::Serialization(_)
            | RepositoryError::Store { .. }
            | RepositoryError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code an API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists | ErrorKind::Conflict => 409,
            ErrorKind::CountLimitReached => 422,
            ErrorKind::Validation => 400,
            ErrorKind::Cancelled => 499,
            ErrorKind::Internal => 500,
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Serialization(e) => RepositoryError::Serialization(e.to_string()),
            StoreError::Conflict => RepositoryError::Conflict { attempts: 1 },
            other => RepositoryError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RepositoryError::not_found(EntityKind::Sink, "my-sink");
        assert_eq!(err.to_string(), r#"sink "my-sink" not found in the source"#);

        let err = RepositoryError::deleted_not_found(EntityKind::Branch, "567");
        assert_eq!(err.to_string(), r#"deleted branch "567" not found in the project"#);

        let err = RepositoryError::already_exists(EntityKind::Branch, "567");
        assert_eq!(err.to_string(), r#"branch "567" already exists in the project"#);

        let err = RepositoryError::version_not_found(EntityKind::Sink, "my-sink", VersionNumber(10));
        assert_eq!(err.to_string(), r#"sink version "my-sink/0000000010" not found in the source"#);

        let err =
            RepositoryError::CountLimitReached { entity: "source", limit: 100, parent: "branch" };
        assert_eq!(err.to_string(), "source count limit reached in the branch, the maximum is 100");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RepositoryError::not_found(EntityKind::Source, "s").status_code(), 404);
        assert_eq!(RepositoryError::already_exists(EntityKind::Source, "s").status_code(), 409);
        assert_eq!(RepositoryError::Validation("x".into()).status_code(), 400);
        assert_eq!(RepositoryError::Conflict { attempts: 3 }.status_code(), 409);
        assert_eq!(RepositoryError::Cancelled.status_code(), 499);
    }

    #[test]
    fn test_store_error_keeps_context() {
        let err = RepositoryError::store(
            "get",
            "definition/sink/active/1/2/a/b",
            StoreError::Connection("reset".into()),
        );
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(
            err.to_string(),
            r#"Store error during get of "definition/sink/active/1/2/a/b": Connection error: reset"#
        );
    }
}
