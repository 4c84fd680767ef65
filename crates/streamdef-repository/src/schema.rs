//! Store key layout of entity records.
//!
//! - `definition/{type}/active/{key}` → current record of a live entity
//! - `definition/{type}/deleted/{key}` → current record of a soft-deleted entity
//! - `definition/{type}/version/{key}/{number:010}` → immutable version record
//!
//! `{type}` is `branch`, `source` or `sink`; `{key}` is the rendered entity key
//! (`project/branch[/source[/sink]]`). A record is never present under both
//! `active` and `deleted` at once.

use std::fmt;

use streamdef_types::{EntityKind, ObjectKey, VersionNumber};

use crate::error::{RepositoryError, RepositoryResult};

/// Root prefix of all definition keys.
pub const ROOT: &str = "definition";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Active,
    Deleted,
    Version,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Active => "active",
            Partition::Deleted => "deleted",
            Partition::Version => "version",
        }
    }
}

/// Key builder for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    kind: EntityKind,
}

impl Schema {
    pub fn new(kind: EntityKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Prefix of a whole partition, e.g. `definition/sink/active/`.
    pub fn partition(&self, partition: Partition) -> String {
        format!("{}/{}/{}/", ROOT, self.kind, partition.as_str())
    }

    pub fn active(&self, key: &impl fmt::Display) -> String {
        format!("{}{}", self.partition(Partition::Active), key)
    }

    pub fn deleted(&self, key: &impl fmt::Display) -> String {
        format!("{}{}", self.partition(Partition::Deleted), key)
    }

    /// Prefix of all version records of one entity.
    pub fn versions_of(&self, key: &impl fmt::Display) -> String {
        format!("{}{}/", self.partition(Partition::Version), key)
    }

    pub fn version(&self, key: &impl fmt::Display, number: VersionNumber) -> String {
        format!("{}{}", self.versions_of(key), number)
    }

    /// Prefix of all records of this type below `scope` in a partition.
    ///
    /// The scope has to be a strict ancestor level: sinks can be listed per
    /// project, branch or source, sources per project or branch.
    pub fn in_scope(&self, partition: Partition, scope: &ObjectKey) -> RepositoryResult<String> {
        if scope.depth() >= self.kind.depth() {
            return Err(RepositoryError::Validation(format!(
                "cannot list {} records in a {} scope",
                self.kind,
                scope.level_name()
            )));
        }
        Ok(format!("{}{}/", self.partition(partition), scope))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use streamdef_types::{BranchKey, ProjectId};

    use super::*;

    #[test]
    fn test_entity_keys() {
        let key = BranchKey::new(123, 456).source("my-source").sink("my-sink");
        let schema = Schema::new(EntityKind::Sink);

        assert_eq!(schema.active(&key), "definition/sink/active/123/456/my-source/my-sink");
        assert_eq!(schema.deleted(&key), "definition/sink/deleted/123/456/my-source/my-sink");
        assert_eq!(
            schema.version(&key, VersionNumber(6)),
            "definition/sink/version/123/456/my-source/my-sink/0000000006"
        );
    }

    #[test]
    fn test_scope_prefixes() {
        let branch = BranchKey::new(123, 456);
        let schema = Schema::new(EntityKind::Source);

        assert_eq!(
            schema.in_scope(Partition::Active, &ObjectKey::Project(ProjectId(123))).unwrap(),
            "definition/source/active/123/"
        );
        assert_eq!(
            schema.in_scope(Partition::Deleted, &ObjectKey::Branch(branch)).unwrap(),
            "definition/source/deleted/123/456/"
        );
    }

    #[test]
    fn test_scope_must_be_an_ancestor() {
        let source = BranchKey::new(1, 2).source("s");
        let schema = Schema::new(EntityKind::Source);

        let err = schema.in_scope(Partition::Active, &ObjectKey::Source(source)).unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
    }
}
