//! Hierarchical entity keys.
//!
//! Keys nest the way the entities do:
//!
//! ```text
//! BranchKey { project_id, branch_id }
//!   └── SourceKey { branch_key, source_id }
//!         └── SinkKey { source_key, sink_id }
//! ```
//!
//! Rendering a key with [`Display`](std::fmt::Display) yields a `/`-delimited path
//! (`"123/456/my-source/my-sink"`) that is a string prefix of every descendant's
//! path. The store layout and all prefix scans rely on that property.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub u64);

/// Branch identifier, unique within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(pub u64);

/// Source identifier, unique within a branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

/// Sink identifier, unique within a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SinkId(pub String);

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

display_inner!(ProjectId, BranchId, SourceId, SinkId);

/// Checks a string identifier used as a single path segment.
fn validate_segment(level: &str, id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{level} id cannot be empty"));
    }
    if id.contains('/') {
        return Err(format!("{level} id \"{id}\" cannot contain \"/\""));
    }
    Ok(())
}

impl SourceId {
    pub fn validate(&self) -> Result<(), String> {
        validate_segment("source", &self.0)
    }
}

impl SinkId {
    pub fn validate(&self) -> Result<(), String> {
        validate_segment("sink", &self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SinkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SinkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Key of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchKey {
    pub project_id: ProjectId,
    pub branch_id: BranchId,
}

/// Key of a source, embedding the key of its branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceKey {
    #[serde(flatten)]
    pub branch_key: BranchKey,
    pub source_id: SourceId,
}

/// Key of a sink, embedding the key of its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkKey {
    #[serde(flatten)]
    pub source_key: SourceKey,
    pub sink_id: SinkId,
}

impl BranchKey {
    pub fn new(project_id: u64, branch_id: u64) -> Self {
        Self { project_id: ProjectId(project_id), branch_id: BranchId(branch_id) }
    }

    /// Key of a source inside this branch.
    pub fn source(&self, source_id: impl Into<SourceId>) -> SourceKey {
        SourceKey { branch_key: *self, source_id: source_id.into() }
    }
}

impl SourceKey {
    /// Key of a sink inside this source.
    pub fn sink(&self, sink_id: impl Into<SinkId>) -> SinkKey {
        SinkKey { source_key: self.clone(), sink_id: sink_id.into() }
    }

    pub fn project_id(&self) -> ProjectId {
        self.branch_key.project_id
    }
}

impl SinkKey {
    pub fn branch_key(&self) -> BranchKey {
        self.source_key.branch_key
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.branch_id)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.branch_key, self.source_id)
    }
}

impl fmt::Display for SinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_key, self.sink_id)
    }
}

/// Any level of the key hierarchy.
///
/// Used wherever an operation accepts "an ancestor" (list scopes, cascades,
/// watch scopes). Dispatch is an exhaustive `match`, so adding a level is a
/// compile error everywhere it matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    Project(ProjectId),
    Branch(BranchKey),
    Source(SourceKey),
    Sink(SinkKey),
}

impl ObjectKey {
    /// Number of path segments in the rendered key.
    pub fn depth(&self) -> usize {
        match self {
            ObjectKey::Project(_) => 1,
            ObjectKey::Branch(_) => 2,
            ObjectKey::Source(_) => 3,
            ObjectKey::Sink(_) => 4,
        }
    }

    /// The enclosing level; `None` for a project.
    pub fn parent(&self) -> Option<ObjectKey> {
        match self {
            ObjectKey::Project(_) => None,
            ObjectKey::Branch(k) => Some(k.parent()),
            ObjectKey::Source(k) => Some(k.parent()),
            ObjectKey::Sink(k) => Some(k.parent()),
        }
    }

    /// Last path segment.
    pub fn id(&self) -> String {
        match self {
            ObjectKey::Project(k) => k.to_string(),
            ObjectKey::Branch(k) => k.id(),
            ObjectKey::Source(k) => k.id(),
            ObjectKey::Sink(k) => k.id(),
        }
    }

    /// Entity name of this level, as used in error messages.
    pub fn level_name(&self) -> &'static str {
        match self {
            ObjectKey::Project(_) => "project",
            ObjectKey::Branch(_) => "branch",
            ObjectKey::Source(_) => "source",
            ObjectKey::Sink(_) => "sink",
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKey::Project(k) => fmt::Display::fmt(k, f),
            ObjectKey::Branch(k) => fmt::Display::fmt(k, f),
            ObjectKey::Source(k) => fmt::Display::fmt(k, f),
            ObjectKey::Sink(k) => fmt::Display::fmt(k, f),
        }
    }
}

impl From<ProjectId> for ObjectKey {
    fn from(value: ProjectId) -> Self {
        ObjectKey::Project(value)
    }
}

impl From<BranchKey> for ObjectKey {
    fn from(value: BranchKey) -> Self {
        ObjectKey::Branch(value)
    }
}

impl From<SourceKey> for ObjectKey {
    fn from(value: SourceKey) -> Self {
        ObjectKey::Source(value)
    }
}

impl From<SinkKey> for ObjectKey {
    fn from(value: SinkKey) -> Self {
        ObjectKey::Sink(value)
    }
}

/// Behaviour shared by the keys of persisted entities.
pub trait DefinitionKey:
    Clone + fmt::Debug + fmt::Display + PartialEq + Into<ObjectKey> + Send + Sync + 'static
{
    /// Key of the direct parent.
    fn parent(&self) -> ObjectKey;

    /// Identifier of the entity within its parent (the last path segment).
    fn id(&self) -> String;

    /// Checks that every segment renders as exactly one path segment.
    fn validate(&self) -> Result<(), String>;
}

impl DefinitionKey for BranchKey {
    fn parent(&self) -> ObjectKey {
        ObjectKey::Project(self.project_id)
    }

    fn id(&self) -> String {
        self.branch_id.to_string()
    }

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl DefinitionKey for SourceKey {
    fn parent(&self) -> ObjectKey {
        ObjectKey::Branch(self.branch_key)
    }

    fn id(&self) -> String {
        self.source_id.to_string()
    }

    fn validate(&self) -> Result<(), String> {
        self.source_id.validate()
    }
}

impl DefinitionKey for SinkKey {
    fn parent(&self) -> ObjectKey {
        ObjectKey::Source(self.source_key.clone())
    }

    fn id(&self) -> String {
        self.sink_id.to_string()
    }

    fn validate(&self) -> Result<(), String> {
        self.source_key.validate()?;
        self.sink_id.validate()
    }
}
