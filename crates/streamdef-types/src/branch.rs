//! Branch record.

use serde::{Deserialize, Serialize};

use crate::{
    definition::{Definition, EntityKind, definition_accessors},
    keys::BranchKey,
    mixins::{Created, SoftDeletable, Switchable, Version},
};

/// A branch of a project. Sources live inside branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    #[serde(flatten)]
    pub key: BranchKey,
    #[serde(default)]
    pub created: Created,
    #[serde(default)]
    pub version: Version,
    #[serde(flatten)]
    pub switchable: Switchable,
    #[serde(flatten)]
    pub soft_deletable: SoftDeletable,
    /// Marks the default branch of the project.
    #[serde(default)]
    pub is_default: bool,
}

impl Branch {
    pub fn new(key: BranchKey) -> Self {
        Self {
            key,
            created: Created::default(),
            version: Version::default(),
            switchable: Switchable::default(),
            soft_deletable: SoftDeletable::default(),
            is_default: false,
        }
    }

    pub fn default_branch(key: BranchKey) -> Self {
        Self { is_default: true, ..Self::new(key) }
    }
}

impl Definition for Branch {
    type Key = BranchKey;

    const KIND: EntityKind = EntityKind::Branch;

    definition_accessors!();
}
