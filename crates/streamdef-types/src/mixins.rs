//! Lifecycle field groups embedded in every entity record.
//!
//! Each mixin owns a small piece of state and the pure transitions over it.
//! Persisting a transition (and deciding whether it produces a version record)
//! is the job of the repository layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Actor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByKind {
    User,
    System,
}

/// The actor responsible for a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct By {
    pub kind: ByKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl By {
    pub fn user(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            kind: ByKind::User,
            token_id: None,
            user_id: Some(user_id.into()),
            user_name: Some(user_name.into()),
        }
    }

    pub fn system() -> Self {
        Self { kind: ByKind::System, token_id: None, user_id: None, user_name: None }
    }

    pub fn with_token(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }
}

// ============================================================================
// Created
// ============================================================================

/// Creation timestamp and actor, written once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Created {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<By>,
}

impl Created {
    /// Records the creation. Has no effect once a creation time is set.
    pub fn set_creation(&mut self, now: DateTime<Utc>, by: &By) {
        if self.at.is_none() {
            self.at = Some(now);
            self.by = Some(by.clone());
        }
    }

    pub fn is_set(&self) -> bool {
        self.at.is_some()
    }
}

// ============================================================================
// Versioned
// ============================================================================

/// Sequential version number, starting at 1 for the first stored version.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionNumber(pub u32);

impl VersionNumber {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Zero-padded to ten digits so that version keys sort numerically.
impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub number: VersionNumber,
    /// Content fingerprint, see [`Definition::content_hash`](crate::Definition::content_hash).
    pub hash: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<By>,
}

// ============================================================================
// Switchable
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disabled {
    pub by: By,
    pub at: DateTime<Utc>,
    pub reason: String,
    /// Set when the disablement was inherited from a parent.
    pub disabled_with_parent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enabled {
    pub by: By,
    pub at: DateTime<Utc>,
}

/// Enabled/disabled state. At most one side is populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Switchable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<Disabled>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Enabled>,
}

impl Switchable {
    pub fn disable(
        &mut self,
        now: DateTime<Utc>,
        by: &By,
        reason: impl Into<String>,
        disabled_with_parent: bool,
    ) {
        self.enabled = None;
        self.disabled =
            Some(Disabled { by: by.clone(), at: now, reason: reason.into(), disabled_with_parent });
    }

    pub fn enable(&mut self, now: DateTime<Utc>, by: &By) {
        self.disabled = None;
        self.enabled = Some(Enabled { by: by.clone(), at: now });
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        !self.is_disabled()
    }

    /// Disabled by a request targeting this entity, not by a parent cascade.
    pub fn is_disabled_directly(&self) -> bool {
        self.disabled.as_ref().is_some_and(|d| !d.disabled_with_parent)
    }

    pub fn is_disabled_with_parent(&self) -> bool {
        self.disabled.as_ref().is_some_and(|d| d.disabled_with_parent)
    }

    pub fn disabled_at(&self) -> Option<DateTime<Utc>> {
        self.disabled.as_ref().map(|d| d.at)
    }

    pub fn enabled_at(&self) -> Option<DateTime<Utc>> {
        self.enabled.as_ref().map(|e| e.at)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.disabled.is_some() && self.enabled.is_some() {
            return Err("entity cannot be both disabled and enabled".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// SoftDeletable
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    /// Cleared when the deletion was inherited from a parent.
    pub directly: bool,
    pub at: DateTime<Utc>,
    pub by: By,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Undeleted {
    pub at: DateTime<Utc>,
    pub by: By,
}

/// Deleted/undeleted state. At most one side is populated; a record that was
/// never deleted carries neither.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftDeletable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<Deleted>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undeleted: Option<Undeleted>,
}

impl SoftDeletable {
    pub fn delete(&mut self, now: DateTime<Utc>, by: &By, directly: bool) {
        self.undeleted = None;
        self.deleted = Some(Deleted { directly, at: now, by: by.clone() });
    }

    pub fn undelete(&mut self, now: DateTime<Utc>, by: &By) {
        self.deleted = None;
        self.undeleted = Some(Undeleted { at: now, by: by.clone() });
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }

    pub fn is_deleted_directly(&self) -> bool {
        self.deleted.as_ref().is_some_and(|d| d.directly)
    }

    pub fn is_deleted_with_parent(&self) -> bool {
        self.deleted.as_ref().is_some_and(|d| !d.directly)
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted.as_ref().map(|d| d.at)
    }

    pub fn undeleted_at(&self) -> Option<DateTime<Utc>> {
        self.undeleted.as_ref().map(|u| u.at)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.deleted.is_some() && self.undeleted.is_some() {
            return Err("entity cannot be both deleted and undeleted".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap()
    }

    #[test]
    fn test_version_number_is_zero_padded() {
        assert_eq!(VersionNumber(1).to_string(), "0000000001");
        assert_eq!(VersionNumber(1234).to_string(), "0000001234");
        assert_eq!(VersionNumber(9).next(), VersionNumber(10));
    }

    #[test]
    fn test_created_is_set_once() {
        let mut created = Created::default();
        created.set_creation(now(), &By::user("1", "alice"));
        created.set_creation(now() + chrono::Duration::hours(1), &By::system());

        assert_eq!(created.at, Some(now()));
        assert_eq!(created.by, Some(By::user("1", "alice")));
    }

    #[test]
    fn test_switchable_transitions() {
        let by = By::system();
        let mut s = Switchable::default();
        assert!(s.is_enabled());

        s.disable(now(), &by, "maintenance", false);
        assert!(s.is_disabled());
        assert!(s.is_disabled_directly());
        assert!(s.enabled.is_none());

        s.enable(now(), &by);
        assert!(s.is_enabled());
        assert!(s.disabled.is_none());

        s.disable(now(), &by, "parent disabled", true);
        assert!(s.is_disabled_with_parent());
        assert!(!s.is_disabled_directly());
    }

    #[test]
    fn test_soft_deletable_transitions() {
        let by = By::system();
        let mut s = SoftDeletable::default();
        assert!(!s.is_deleted());

        s.delete(now(), &by, false);
        assert!(s.is_deleted_with_parent());
        assert!(s.undeleted.is_none());

        s.undelete(now(), &by);
        assert!(!s.is_deleted());
        assert_eq!(s.undeleted_at(), Some(now()));
    }

    #[test]
    fn test_validate_rejects_both_sides() {
        let by = By::system();
        let mut s = Switchable::default();
        s.enable(now(), &by);
        s.disabled =
            Some(Disabled { by: by.clone(), at: now(), reason: String::new(), disabled_with_parent: false });
        assert!(s.validate().is_err());

        let mut d = SoftDeletable::default();
        d.delete(now(), &by, true);
        d.undeleted = Some(Undeleted { at: now(), by });
        assert!(d.validate().is_err());
    }

    #[derive(Debug, Clone)]
    enum Transition {
        Disable(bool),
        Enable,
        Delete(bool),
        Undelete,
    }

    fn transition() -> impl Strategy<Value = Transition> {
        prop_oneof![
            any::<bool>().prop_map(Transition::Disable),
            Just(Transition::Enable),
            any::<bool>().prop_map(Transition::Delete),
            Just(Transition::Undelete),
        ]
    }

    proptest! {
        #[test]
        fn prop_transitions_keep_sides_exclusive(steps in prop::collection::vec(transition(), 1..32)) {
            let by = By::system();
            let mut switchable = Switchable::default();
            let mut deletable = SoftDeletable::default();

            for step in steps {
                match step {
                    Transition::Disable(with_parent) => switchable.disable(now(), &by, "r", with_parent),
                    Transition::Enable => switchable.enable(now(), &by),
                    Transition::Delete(directly) => deletable.delete(now(), &by, directly),
                    Transition::Undelete => deletable.undelete(now(), &by),
                }
                prop_assert!(switchable.validate().is_ok());
                prop_assert!(deletable.validate().is_ok());
            }
        }
    }
}
