//! Source record.

use serde::{Deserialize, Serialize};

use crate::{
    definition::{Definition, EntityKind, definition_accessors},
    keys::SourceKey,
    mixins::{Created, SoftDeletable, Switchable, Version},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Http,
}

/// Configuration of an HTTP source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSource {
    /// Secret part of the public import URL.
    pub secret: String,
}

/// An ingestion endpoint inside a branch. Sinks live inside sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(flatten)]
    pub key: SourceKey,
    #[serde(default)]
    pub created: Created,
    #[serde(default)]
    pub version: Version,
    #[serde(flatten)]
    pub switchable: Switchable,
    #[serde(flatten)]
    pub soft_deletable: SoftDeletable,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpSource>,
}

impl Source {
    pub fn new(key: SourceKey, name: impl Into<String>) -> Self {
        Self {
            key,
            created: Created::default(),
            version: Version::default(),
            switchable: Switchable::default(),
            soft_deletable: SoftDeletable::default(),
            source_type: SourceType::Http,
            name: name.into(),
            description: String::new(),
            http: None,
        }
    }

    pub fn with_http(mut self, secret: impl Into<String>) -> Self {
        self.source_type = SourceType::Http;
        self.http = Some(HttpSource { secret: secret.into() });
        self
    }
}

impl Definition for Source {
    type Key = SourceKey;

    const KIND: EntityKind = EntityKind::Source;

    definition_accessors!();

    fn validate_fields(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("source name cannot be empty".to_string());
        }
        Ok(())
    }
}
