//! Schema snapshot model
//!
//! One structural capture of a database schema: tables keyed by
//! `"<schema>.<table>"`, each with its columns, primary keys and foreign keys.
//! This is the shape the fetch layer hands us and the shape every stage of
//! the diff / graph / layout pipeline reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Complete schema snapshot at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    /// Schema this snapshot was fetched for, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub checksum: String,
    /// Qualified table key -> table structure
    pub tables: BTreeMap<String, TableDescriptor>,
}

impl SchemaSnapshot {
    pub fn new(schema: Option<String>, tables: BTreeMap<String, TableDescriptor>) -> Self {
        let checksum = Self::compute_checksum(&tables);
        Self {
            schema,
            captured_at: Utc::now(),
            checksum,
            tables,
        }
    }

    /// Compute checksum from schema content.
    ///
    /// Tables live in a `BTreeMap` and primary keys in a `BTreeSet`, so the
    /// serialized form is canonical regardless of the order the fetch layer
    /// produced them in.
    pub fn compute_checksum(tables: &BTreeMap<String, TableDescriptor>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(tables).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn fk_count(&self) -> usize {
        self.tables.values().map(|t| t.foreign_keys.len()).sum()
    }

    pub fn table(&self, key: &str) -> Option<&TableDescriptor> {
        self.tables.get(key)
    }

    /// Find the table in this (older) snapshot matching `key` of a newer one.
    ///
    /// Exact key first; otherwise the single table sharing the unqualified
    /// name, so `public.users` still matches `users` or `app.users` when the
    /// schema qualifier changed between captures. Tables for which
    /// `still_present` holds exist under their own key in the newer snapshot
    /// and are never borrowed by another key. Ambiguous names match nothing.
    pub fn matching_table(
        &self,
        key: &str,
        still_present: impl Fn(&str) -> bool,
    ) -> Option<(&str, &TableDescriptor)> {
        if let Some((k, t)) = self.tables.get_key_value(key) {
            return Some((k.as_str(), t));
        }

        let wanted = table_name(key);
        let mut candidates = self
            .tables
            .iter()
            .filter(|(k, _)| table_name(k) == wanted && !still_present(k));

        match (candidates.next(), candidates.next()) {
            (Some((k, t)), None) => Some((k.as_str(), t)),
            _ => None,
        }
    }
}

/// Split a qualified key into `(schema, table)`.
pub fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, key),
    }
}

/// Unqualified table name of a key (`"public.users"` -> `"users"`)
pub fn table_name(key: &str) -> &str {
    split_key(key).1
}

/// Table structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub primary_keys: BTreeSet<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_keys.contains(column)
    }

    pub fn is_foreign_key(&self, column: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.column == column)
    }
}

/// Column representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default = "default_nullable", deserialize_with = "deserialize_nullable")]
    pub nullable: bool,
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default_value: None,
        }
    }
}

/// Foreign key relationship (single column)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub column: String,
    /// Referenced table, qualified or bare; may not exist in the snapshot
    pub ref_table: String,
    #[serde(default)]
    pub ref_column: String,
}

impl ForeignKeyDescriptor {
    pub fn new(
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            ref_table: ref_table.into(),
            ref_column: ref_column.into(),
        }
    }
}

fn default_nullable() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NullableRepr {
    Flag(bool),
    Text(String),
}

/// information_schema reports nullability as `"YES"` / `"NO"`; clients
/// that already normalized it send a bool.
fn deserialize_nullable<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<NullableRepr>::deserialize(deserializer)? {
        Some(NullableRepr::Flag(flag)) => flag,
        Some(NullableRepr::Text(text)) => {
            text.eq_ignore_ascii_case("yes") || text.eq_ignore_ascii_case("true")
        }
        None => true,
    })
}
