//! Diagram render model
//!
//! What the renderer receives: positioned table nodes with change flags,
//! plus the foreign-key edges. Built from the cached graph/layout of the
//! current snapshot and the live highlight state.

use crate::graph::{Edge, Graph, LayoutResult, Position};
use crate::highlight::HighlightSnapshot;
use crate::snapshot::{ColumnDelta, SchemaSnapshot};
use serde::Serialize;
use std::collections::HashSet;

/// Per-column change flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnStatus {
    Unchanged,
    New,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnView {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(rename = "isPK")]
    pub is_pk: bool,
    #[serde(rename = "isFK")]
    pub is_fk: bool,
    pub status: ColumnStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub name: String,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramNode {
    pub id: String,
    pub data: NodeView,
    pub position: Position,
    pub highlighted: bool,
    /// Present only while a highlight window of this table is open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_delta: Option<ColumnDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramView {
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<Edge>,
    pub width: f64,
    pub height: f64,
    /// Foreign keys left out because their referenced table is missing
    pub dangling_edges: usize,
}

/// Graph of the current snapshot together with its layout
#[derive(Debug, Clone, Default)]
pub struct PositionedGraph {
    pub graph: Graph,
    pub layout: LayoutResult,
}

impl DiagramView {
    /// Merge layout and live highlights into the render model.
    ///
    /// `previous` supplies the type of removed columns, which only exist in
    /// the baseline snapshot.
    pub fn compose(
        positioned: &PositionedGraph,
        highlights: &HighlightSnapshot,
        previous: Option<&SchemaSnapshot>,
    ) -> Self {
        let current: HashSet<&str> = positioned.graph.nodes.iter().map(|n| n.id.as_str()).collect();

        let nodes = positioned
            .graph
            .nodes
            .iter()
            .map(|node| {
                let delta = highlights.column_delta(&node.id);

                let mut columns: Vec<ColumnView> = node
                    .data
                    .columns
                    .iter()
                    .map(|col| ColumnView {
                        name: col.name.clone(),
                        data_type: col.data_type.clone(),
                        is_pk: col.is_pk,
                        is_fk: col.is_fk,
                        status: if delta.is_some_and(|d| d.is_added(&col.name)) {
                            ColumnStatus::New
                        } else {
                            ColumnStatus::Unchanged
                        },
                    })
                    .collect();

                if let Some(delta) = delta {
                    let baseline = previous
                        .and_then(|p| p.matching_table(&node.id, |k| current.contains(k)))
                        .map(|(_, t)| t);
                    for name in &delta.removed {
                        let old = baseline.and_then(|t| t.column(name));
                        columns.push(ColumnView {
                            name: name.clone(),
                            data_type: old.map(|c| c.data_type.clone()).unwrap_or_default(),
                            is_pk: baseline.is_some_and(|t| t.is_primary_key(name)),
                            is_fk: baseline.is_some_and(|t| t.is_foreign_key(name)),
                            status: ColumnStatus::Removed,
                        });
                    }
                }

                DiagramNode {
                    id: node.id.clone(),
                    data: NodeView {
                        name: node.data.name.clone(),
                        columns,
                    },
                    position: positioned.layout.position(&node.id).unwrap_or_default(),
                    highlighted: highlights.is_table_highlighted(&node.id),
                    column_delta: delta.cloned(),
                }
            })
            .collect();

        Self {
            nodes,
            edges: positioned.graph.edges.clone(),
            width: positioned.layout.width,
            height: positioned.layout.height,
            dangling_edges: positioned.graph.dangling.len(),
        }
    }

    #[cfg(test)]
    pub fn node(&self, id: &str) -> Option<&DiagramNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, LayoutConfig, LayoutEngine};
    use crate::snapshot::{ColumnDescriptor, TableDescriptor};
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, BTreeSet};

    fn users(columns: &[&str]) -> SchemaSnapshot {
        let table = TableDescriptor {
            columns: columns.iter().map(|c| ColumnDescriptor::new(*c, "text")).collect(),
            primary_keys: BTreeSet::from(["id".to_string()]),
            foreign_keys: vec![],
        };
        SchemaSnapshot::new(None, BTreeMap::from([("public.users".to_string(), table)]))
    }

    fn positioned(snapshot: &SchemaSnapshot) -> PositionedGraph {
        let graph = GraphBuilder::build(snapshot);
        let layout = LayoutEngine::layout(&graph, &LayoutConfig::default());
        PositionedGraph { graph, layout }
    }

    fn column_names(view: &DiagramView) -> Vec<(&str, ColumnStatus)> {
        view.node("public.users")
            .unwrap()
            .data
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.status))
            .collect()
    }

    #[test]
    fn test_active_delta_flags_new_and_keeps_removed() {
        let s1 = users(&["id", "name"]);
        let s2 = users(&["id", "email"]);
        let highlights = HighlightSnapshot {
            tables: BTreeSet::from(["public.users".to_string()]),
            column_deltas: BTreeMap::from([(
                "public.users".to_string(),
                ColumnDelta {
                    added: vec!["email".to_string()],
                    removed: vec!["name".to_string()],
                },
            )]),
            windows: vec![],
        };

        let view = DiagramView::compose(&positioned(&s2), &highlights, Some(&s1));

        assert_eq!(
            column_names(&view),
            vec![
                ("id", ColumnStatus::Unchanged),
                ("email", ColumnStatus::New),
                ("name", ColumnStatus::Removed),
            ]
        );
        let node = view.node("public.users").unwrap();
        assert!(node.highlighted);
        assert_eq!(node.data.columns[2].data_type, "text");
    }

    #[test]
    fn test_expired_window_shows_current_columns_only() {
        let s1 = users(&["id", "name"]);
        let s2 = users(&["id", "email"]);

        let view = DiagramView::compose(&positioned(&s2), &HighlightSnapshot::default(), Some(&s1));

        assert_eq!(
            column_names(&view),
            vec![("id", ColumnStatus::Unchanged), ("email", ColumnStatus::Unchanged)]
        );
        let node = view.node("public.users").unwrap();
        assert!(!node.highlighted);
        assert!(node.column_delta.is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let s = users(&["id"]);
        let view = DiagramView::compose(&positioned(&s), &HighlightSnapshot::default(), None);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["nodes"][0]["data"]["columns"][0]["isPK"], true);
        assert_eq!(json["nodes"][0]["data"]["columns"][0]["status"], "unchanged");
        assert_eq!(json["nodes"][0]["position"]["x"], 0.0);
        assert!(json["nodes"][0].get("columnDelta").is_none());
    }
}
