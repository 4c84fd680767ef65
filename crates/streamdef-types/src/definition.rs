//! The [`Definition`] trait shared by branch, source and sink records.
//!
//! # Content hash
//!
//! [`Definition::content_hash`] fingerprints the JSON encoding of a record with
//! the top-level `version` object removed. Excluded fields, all inside `version`:
//! `number`, `hash`, `description`, `at`, `by`. Every other field, including the
//! lifecycle mixins, contributes to the hash. Object keys are encoded in sorted
//! order, so the hash does not depend on field declaration order.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};

use crate::{
    keys::DefinitionKey,
    mixins::{By, Created, SoftDeletable, Switchable, Version, VersionNumber},
};

/// Number of hex characters kept from the SHA-256 digest.
const HASH_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Branch,
    Source,
    Sink,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Branch => "branch",
            EntityKind::Source => "source",
            EntityKind::Sink => "sink",
        }
    }

    /// Name of the parent level, as used in error messages.
    pub fn parent_name(&self) -> &'static str {
        match self {
            EntityKind::Branch => "project",
            EntityKind::Source => "branch",
            EntityKind::Sink => "source",
        }
    }

    /// Number of path segments in keys of this kind.
    pub fn depth(&self) -> usize {
        match self {
            EntityKind::Branch => 2,
            EntityKind::Source => 3,
            EntityKind::Sink => 4,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A versioned, switchable, soft-deletable entity record.
pub trait Definition:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Key: DefinitionKey;

    const KIND: EntityKind;

    fn key(&self) -> &Self::Key;
    fn created(&self) -> &Created;
    fn created_mut(&mut self) -> &mut Created;
    fn version(&self) -> &Version;
    fn version_mut(&mut self) -> &mut Version;
    fn switchable(&self) -> &Switchable;
    fn switchable_mut(&mut self) -> &mut Switchable;
    fn soft_deletable(&self) -> &SoftDeletable;
    fn soft_deletable_mut(&mut self) -> &mut SoftDeletable;

    /// Validation of entity-specific fields.
    fn validate_fields(&self) -> Result<(), String> {
        Ok(())
    }

    /// Full record validation, run before every write.
    fn validate(&self) -> Result<(), String> {
        self.key().validate()?;
        self.switchable().validate()?;
        self.soft_deletable().validate()?;
        self.validate_fields()
    }

    fn version_number(&self) -> VersionNumber {
        self.version().number
    }

    fn content_hash(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("version");
        }
        let digest = Sha256::digest(serde_json::to_vec(&value)?);
        let mut hash = hex::encode(digest);
        hash.truncate(HASH_LEN);
        Ok(hash)
    }

    /// Advances the version by one and stamps it with the current content hash.
    fn increment_version(
        &mut self,
        now: DateTime<Utc>,
        by: &By,
        description: impl Into<String>,
    ) -> Result<(), serde_json::Error> {
        let hash = self.content_hash()?;
        let version = self.version_mut();
        version.number = version.number.next();
        version.hash = hash;
        version.description = description.into();
        version.at = Some(now);
        version.by = Some(by.clone());
        Ok(())
    }
}

/// Implements the mixin accessors of [`Definition`] for a record with the
/// standard `key`, `created`, `version`, `switchable`, `soft_deletable` fields.
macro_rules! definition_accessors {
    () => {
        fn key(&self) -> &Self::Key {
            &self.key
        }

        fn created(&self) -> &$crate::mixins::Created {
            &self.created
        }

        fn created_mut(&mut self) -> &mut $crate::mixins::Created {
            &mut self.created
        }

        fn version(&self) -> &$crate::mixins::Version {
            &self.version
        }

        fn version_mut(&mut self) -> &mut $crate::mixins::Version {
            &mut self.version
        }

        fn switchable(&self) -> &$crate::mixins::Switchable {
            &self.switchable
        }

        fn switchable_mut(&mut self) -> &mut $crate::mixins::Switchable {
            &mut self.switchable
        }

        fn soft_deletable(&self) -> &$crate::mixins::SoftDeletable {
            &self.soft_deletable
        }

        fn soft_deletable_mut(&mut self) -> &mut $crate::mixins::SoftDeletable {
            &mut self.soft_deletable
        }
    };
}

pub(crate) use definition_accessors;
