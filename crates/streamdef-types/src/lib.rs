//! # Streamdef Types - Shared Definition Types
//!
//! Types shared by every layer of the stream definition service:
//!
//! - [`keys`] - hierarchical `Branch → Source → Sink` keys and list scopes
//! - [`mixins`] - lifecycle field groups (`Created`, `Version`, `Switchable`, `SoftDeletable`)
//! - [`definition`] - the [`Definition`] trait implemented by every entity record
//! - [`branch`], [`source`], [`sink`] - the entity records themselves
//!
//! Nothing in this crate performs I/O. State transitions on mixins are pure
//! and are persisted by the repository layer.

#![deny(unsafe_code)]

pub mod branch;
pub mod definition;
pub mod keys;
pub mod mixins;
pub mod sink;
pub mod source;

use serde::{Deserialize, Serialize};

pub use branch::Branch;
pub use definition::{Definition, EntityKind};
pub use keys::{
    BranchId, BranchKey, DefinitionKey, ObjectKey, ProjectId, SinkId, SinkKey, SourceId, SourceKey,
};
pub use mixins::{
    By, ByKind, Created, Deleted, Disabled, Enabled, SoftDeletable, Switchable, Undeleted, Version,
    VersionNumber,
};
pub use sink::{Sink, SinkType, TableColumn, TableSink};
pub use source::{HttpSource, Source, SourceType};

// ============================================================================
// Store Revisions
// ============================================================================

/// Monotonic revision of the key-value store.
///
/// Every committed write transaction advances the store revision by one. Each
/// stored key remembers the revision that created it and the one that last
/// modified it, which is what optimistic concurrency checks compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors reported by key-value store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A transaction precondition did not hold.
    #[error("Conflict")]
    Conflict,

    /// The requested revision is no longer available in the change history.
    #[error("Revision {requested} has been compacted (compacted up to {compacted})")]
    Compacted { requested: Revision, compacted: Revision },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_ordering() {
        let rev = Revision::zero();
        assert!(rev.is_zero());
        assert_eq!(rev.next(), Revision(1));
        assert!(Revision(2) > Revision(1));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Compacted { requested: Revision(3), compacted: Revision(10) };
        assert_eq!(err.to_string(), "Revision 3 has been compacted (compacted up to 10)");
        assert_eq!(StoreError::Conflict.to_string(), "Conflict");
    }
}
