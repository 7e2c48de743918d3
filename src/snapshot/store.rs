//! Snapshot pair
//!
//! Holds the current snapshot and exactly one previous generation. Older
//! snapshots are dropped as soon as a new one arrives.

use crate::snapshot::diff::{DiffEngine, SchemaDiff};
use crate::snapshot::model::SchemaSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata about a snapshot (lightweight, used in responses)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub checksum: String,
    pub table_count: usize,
    pub fk_count: usize,
}

impl From<&SchemaSnapshot> for SnapshotMetadata {
    fn from(snapshot: &SchemaSnapshot) -> Self {
        Self {
            schema: snapshot.schema.clone(),
            captured_at: snapshot.captured_at,
            checksum: snapshot.checksum.clone(),
            table_count: snapshot.table_count(),
            fk_count: snapshot.fk_count(),
        }
    }
}

/// How an incoming snapshot related to the one it replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Nothing was loaded before
    FirstLoad,
    /// Same schema loaded again; the old current became the baseline
    Refresh,
    /// A different schema was selected; there is no baseline to diff against
    SchemaSwitch,
}

/// Current snapshot plus a single generation of history
#[derive(Debug, Default)]
pub struct SnapshotPair {
    current: Option<SchemaSnapshot>,
    previous: Option<SchemaSnapshot>,
}

impl SnapshotPair {
    /// Make `snapshot` current, shifting the old current into `previous`.
    pub fn update(&mut self, snapshot: SchemaSnapshot) -> UpdateKind {
        let kind = match &self.current {
            None => UpdateKind::FirstLoad,
            Some(old) if old.schema != snapshot.schema => UpdateKind::SchemaSwitch,
            Some(_) => UpdateKind::Refresh,
        };

        self.previous = match kind {
            UpdateKind::Refresh => self.current.take(),
            UpdateKind::FirstLoad | UpdateKind::SchemaSwitch => None,
        };
        self.current = Some(snapshot);

        kind
    }

    pub fn current(&self) -> Option<&SchemaSnapshot> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&SchemaSnapshot> {
        self.previous.as_ref()
    }

    /// Diff of the pair; empty until a second snapshot of the same schema
    /// has been loaded.
    pub fn diff(&self) -> SchemaDiff {
        match &self.current {
            Some(current) => DiffEngine::diff(self.previous(), current),
            None => SchemaDiff::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::model::{ColumnDescriptor, TableDescriptor};
    use std::collections::BTreeMap;

    fn snapshot(schema: &str, columns: &[&str]) -> SchemaSnapshot {
        let table = TableDescriptor {
            columns: columns.iter().map(|c| ColumnDescriptor::new(*c, "text")).collect(),
            ..Default::default()
        };
        SchemaSnapshot::new(
            Some(schema.to_string()),
            BTreeMap::from([(format!("{}.users", schema), table)]),
        )
    }

    #[test]
    fn test_keeps_single_generation() {
        let mut pair = SnapshotPair::default();

        assert_eq!(pair.update(snapshot("public", &["id"])), UpdateKind::FirstLoad);
        assert!(pair.previous().is_none());

        assert_eq!(pair.update(snapshot("public", &["id", "name"])), UpdateKind::Refresh);
        assert_eq!(pair.update(snapshot("public", &["id", "email"])), UpdateKind::Refresh);

        let previous = pair.previous().unwrap();
        assert!(previous.tables["public.users"].column("name").is_some());
        assert!(pair.current().unwrap().tables["public.users"].column("email").is_some());
    }

    #[test]
    fn test_schema_switch_drops_baseline() {
        let mut pair = SnapshotPair::default();
        pair.update(snapshot("public", &["id"]));

        assert_eq!(pair.update(snapshot("billing", &["id"])), UpdateKind::SchemaSwitch);
        assert!(pair.previous().is_none());
        assert!(pair.diff().is_empty());
    }

    #[test]
    fn test_diff_of_pair() {
        let mut pair = SnapshotPair::default();
        assert!(pair.diff().is_empty());

        pair.update(snapshot("public", &["id", "name"]));
        pair.update(snapshot("public", &["id", "email"]));

        let diff = pair.diff();
        assert!(diff.changed_tables.contains("public.users"));
    }

    #[test]
    fn test_metadata() {
        let s = snapshot("public", &["id"]);
        let meta = SnapshotMetadata::from(&s);
        assert_eq!(meta.table_count, 1);
        assert_eq!(meta.fk_count, 0);
        assert_eq!(meta.checksum, s.checksum);
    }
}
