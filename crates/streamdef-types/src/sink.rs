//! Sink record.

use serde::{Deserialize, Serialize};

use crate::{
    definition::{Definition, EntityKind, definition_accessors},
    keys::SinkKey,
    mixins::{Created, SoftDeletable, Switchable, Version},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkType {
    #[default]
    Table,
}

/// One column of the target table and the record field it is filled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub primary_key: bool,
}

/// Target table of a table sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSink {
    pub table_id: String,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
}

/// A destination of records received by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sink {
    #[serde(flatten)]
    pub key: SinkKey,
    #[serde(default)]
    pub created: Created,
    #[serde(default)]
    pub version: Version,
    #[serde(flatten)]
    pub switchable: Switchable,
    #[serde(flatten)]
    pub soft_deletable: SoftDeletable,
    #[serde(rename = "type")]
    pub sink_type: SinkType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableSink>,
}

impl Sink {
    pub fn new(key: SinkKey, name: impl Into<String>) -> Self {
        Self {
            key,
            created: Created::default(),
            version: Version::default(),
            switchable: Switchable::default(),
            soft_deletable: SoftDeletable::default(),
            sink_type: SinkType::Table,
            name: name.into(),
            description: String::new(),
            table: None,
        }
    }

    pub fn with_table(mut self, table_id: impl Into<String>, columns: Vec<TableColumn>) -> Self {
        self.sink_type = SinkType::Table;
        self.table = Some(TableSink { table_id: table_id.into(), columns });
        self
    }
}

impl Definition for Sink {
    type Key = SinkKey;

    const KIND: EntityKind = EntityKind::Sink;

    definition_accessors!();

    fn validate_fields(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("sink name cannot be empty".to_string());
        }
        if let Some(table) = &self.table {
            if table.table_id.is_empty() {
                return Err("sink table id cannot be empty".to_string());
            }
        }
        Ok(())
    }
}
