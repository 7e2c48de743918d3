//! Schema Diff Engine
//!
//! Compares the previous and current snapshot and reports which tables were
//! touched, plus the column names added to or removed from each table.
//! Table-level "touched" status comes from a structural comparison of the
//! whole table; column deltas are computed in the same pass so renderers
//! never have to recompute them.

use crate::snapshot::model::{table_name, SchemaSnapshot, TableDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Type of table-level change, used for summary statistics only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

/// Column names added to / removed from one table between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDelta {
    /// In the current table's column order
    pub added: Vec<String>,
    /// In the previous table's column order
    pub removed: Vec<String>,
}

impl ColumnDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn is_added(&self, column: &str) -> bool {
        self.added.iter().any(|c| c == column)
    }
}

/// Summary statistics for the diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub tables_added: usize,
    pub tables_removed: usize,
    pub tables_modified: usize,
    pub columns_added: usize,
    pub columns_removed: usize,
}

/// Complete diff result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiff {
    /// Table keys whose structure differs (added, removed or modified)
    pub changed_tables: BTreeSet<String>,
    /// Current table key -> column delta; only non-empty deltas are kept
    pub column_deltas: BTreeMap<String, ColumnDelta>,
    pub summary: DiffSummary,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.changed_tables.is_empty() && self.column_deltas.is_empty()
    }
}

/// The diff engine that compares schema snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare two snapshots. No previous snapshot means first load: nothing
    /// to report.
    pub fn diff(previous: Option<&SchemaSnapshot>, current: &SchemaSnapshot) -> SchemaDiff {
        let Some(previous) = previous else {
            return SchemaDiff::default();
        };

        if previous.checksum == current.checksum {
            return SchemaDiff::default();
        }

        let mut summary = DiffSummary::default();
        let mut changed_tables = BTreeSet::new();

        let keys: BTreeSet<&String> = previous.tables.keys().chain(current.tables.keys()).collect();
        for key in keys {
            let change = match (previous.tables.get(key), current.tables.get(key)) {
                (None, Some(_)) => Some(ChangeType::Added),
                (Some(_), None) => Some(ChangeType::Removed),
                (Some(before), Some(after)) if before != after => Some(ChangeType::Modified),
                _ => None,
            };

            if let Some(change) = change {
                match change {
                    ChangeType::Added => summary.tables_added += 1,
                    ChangeType::Removed => summary.tables_removed += 1,
                    ChangeType::Modified => summary.tables_modified += 1,
                }
                changed_tables.insert(key.clone());
            }
        }

        let mut column_deltas = BTreeMap::new();
        for key in current.tables.keys() {
            if let Some(delta) = Self::table_column_delta(key, Some(previous), current) {
                summary.columns_added += delta.added.len();
                summary.columns_removed += delta.removed.len();
                column_deltas.insert(key.clone(), delta);
            }
        }

        tracing::debug!(
            changed = changed_tables.len(),
            added = summary.tables_added,
            removed = summary.tables_removed,
            modified = summary.tables_modified,
            "Computed schema diff"
        );

        SchemaDiff {
            changed_tables,
            column_deltas,
            summary,
        }
    }

    /// Only the set of touched table keys
    pub fn changed_tables(previous: Option<&SchemaSnapshot>, current: &SchemaSnapshot) -> BTreeSet<String> {
        Self::diff(previous, current).changed_tables
    }

    /// Column delta for one table of `current` against its match in
    /// `previous` (matched by key, else by unqualified table name among
    /// previous tables that are gone from `current`).
    ///
    /// `None` when there is no baseline, no matching table (a brand new
    /// table is flagged at table level instead), or nothing changed.
    pub fn table_column_delta(
        key: &str,
        previous: Option<&SchemaSnapshot>,
        current: &SchemaSnapshot,
    ) -> Option<ColumnDelta> {
        let after = current.table(key)?;
        let (_, before) = previous?.matching_table(key, |k| current.tables.contains_key(k))?;
        let delta = Self::column_delta(before, after);
        (!delta.is_empty()).then_some(delta)
    }

    /// Compare column-name sets of two versions of a table
    pub fn column_delta(before: &TableDescriptor, after: &TableDescriptor) -> ColumnDelta {
        let before_names: HashSet<&str> = before.column_names().collect();
        let after_names: HashSet<&str> = after.column_names().collect();

        ColumnDelta {
            added: after
                .column_names()
                .filter(|name| !before_names.contains(name))
                .map(str::to_string)
                .collect(),
            removed: before
                .column_names()
                .filter(|name| !after_names.contains(name))
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Human readable one-line description of a diff, used in logs
pub fn describe(diff: &SchemaDiff) -> String {
    if diff.is_empty() {
        return "no changes".to_string();
    }
    let touched: Vec<&str> = diff.changed_tables.iter().map(|k| table_name(k)).collect();
    format!(
        "{} table(s) changed [{}], +{} / -{} column(s)",
        diff.changed_tables.len(),
        touched.join(", "),
        diff.summary.columns_added,
        diff.summary.columns_removed
    )
}
