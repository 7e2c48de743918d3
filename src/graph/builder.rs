//! Graph builder
//!
//! One node per table, one edge per foreign key. Foreign keys pointing at
//! tables missing from the snapshot are kept aside as dangling edges so the
//! layout engine never sees an endpoint without a node.

use crate::graph::{ColumnBadge, Edge, Graph, Node, NodeData};
use crate::snapshot::model::{split_key, table_name, SchemaSnapshot, TableDescriptor};

pub struct GraphBuilder;

impl GraphBuilder {
    pub fn build(snapshot: &SchemaSnapshot) -> Graph {
        let mut graph = Graph::default();

        for (key, table) in &snapshot.tables {
            graph.nodes.push(Node {
                id: key.clone(),
                data: Self::node_data(key, table),
            });

            for (index, fk) in table.foreign_keys.iter().enumerate() {
                let id = format!("{}-{}-{}", key, fk.column, index);
                match Self::resolve_target(snapshot, key, &fk.ref_table) {
                    Some(target) => graph.edges.push(Edge {
                        id,
                        source: key.clone(),
                        target,
                    }),
                    None => {
                        tracing::debug!(
                            "Dangling foreign key {}.{} -> {}",
                            key,
                            fk.column,
                            fk.ref_table
                        );
                        graph.dangling.push(Edge {
                            id,
                            source: key.clone(),
                            target: fk.ref_table.clone(),
                        });
                    }
                }
            }
        }

        graph
    }

    fn node_data(key: &str, table: &TableDescriptor) -> NodeData {
        NodeData {
            name: table_name(key).to_string(),
            columns: table
                .columns
                .iter()
                .map(|col| ColumnBadge {
                    name: col.name.clone(),
                    data_type: col.data_type.clone(),
                    is_pk: table.is_primary_key(&col.name),
                    is_fk: table.is_foreign_key(&col.name),
                })
                .collect(),
        }
    }

    /// Resolve a referenced table to a node id.
    ///
    /// Exact key, then the bare name qualified with the source's schema,
    /// then the only table carrying that bare name.
    fn resolve_target(snapshot: &SchemaSnapshot, source_key: &str, ref_table: &str) -> Option<String> {
        if snapshot.tables.contains_key(ref_table) {
            return Some(ref_table.to_string());
        }

        let (ref_schema, ref_name) = split_key(ref_table);
        if ref_schema.is_none() {
            if let (Some(schema), _) = split_key(source_key) {
                let qualified = format!("{}.{}", schema, ref_name);
                if snapshot.tables.contains_key(&qualified) {
                    return Some(qualified);
                }
            }

            let mut candidates = snapshot.tables.keys().filter(|k| table_name(k) == ref_name);
            if let (Some(only), None) = (candidates.next(), candidates.next()) {
                return Some(only.clone());
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::model::{ColumnDescriptor, ForeignKeyDescriptor};
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, BTreeSet};

    fn table(columns: &[&str], fks: Vec<ForeignKeyDescriptor>) -> TableDescriptor {
        TableDescriptor {
            columns: columns.iter().map(|c| ColumnDescriptor::new(*c, "integer")).collect(),
            primary_keys: BTreeSet::from(["id".to_string()]),
            foreign_keys: fks,
        }
    }

    fn snapshot(tables: Vec<(&str, TableDescriptor)>) -> SchemaSnapshot {
        SchemaSnapshot::new(None, tables.into_iter().map(|(k, t)| (k.to_string(), t)).collect())
    }

    #[test]
    fn test_empty_snapshot() {
        let graph = GraphBuilder::build(&SchemaSnapshot::new(None, BTreeMap::new()));
        assert!(graph.nodes.is_empty());
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_node_and_edge_per_table_and_fk() {
        let s = snapshot(vec![
            ("public.users", table(&["id"], vec![])),
            (
                "public.orders",
                table(
                    &["id", "user_id", "approver_id"],
                    vec![
                        ForeignKeyDescriptor::new("user_id", "public.users", "id"),
                        ForeignKeyDescriptor::new("approver_id", "public.users", "id"),
                    ],
                ),
            ),
        ]);

        let graph = GraphBuilder::build(&s);

        assert_eq!(graph.nodes.len(), 2);
        let ids: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["public.orders-user_id-0", "public.orders-approver_id-1"]);
        assert!(graph.edges.iter().all(|e| e.target == "public.users"));
    }

    #[test]
    fn test_column_badges() {
        let s = snapshot(vec![
            ("public.users", table(&["id"], vec![])),
            (
                "public.orders",
                table(&["id", "user_id"], vec![ForeignKeyDescriptor::new("user_id", "users", "id")]),
            ),
        ]);

        let graph = GraphBuilder::build(&s);
        let orders = graph.nodes.iter().find(|n| n.id == "public.orders").unwrap();

        assert_eq!(orders.data.name, "orders");
        assert!(orders.data.columns[0].is_pk);
        assert!(!orders.data.columns[0].is_fk);
        assert!(orders.data.columns[1].is_fk);
    }

    #[test]
    fn test_dangling_foreign_key_is_set_aside() {
        let s = snapshot(vec![(
            "public.orders",
            table(&["id", "user_id"], vec![ForeignKeyDescriptor::new("user_id", "public.users", "id")]),
        )]);

        let graph = GraphBuilder::build(&s);

        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.iter().all(|e| e.target != "public.users"));
        assert_eq!(graph.dangling.len(), 1);
        assert_eq!(graph.dangling[0].target, "public.users");
    }

    #[test]
    fn test_bare_reference_prefers_source_schema() {
        let s = snapshot(vec![
            ("app.users", table(&["id"], vec![])),
            ("public.users", table(&["id"], vec![])),
            (
                "public.orders",
                table(&["id", "user_id"], vec![ForeignKeyDescriptor::new("user_id", "users", "id")]),
            ),
        ]);

        let graph = GraphBuilder::build(&s);

        assert_eq!(graph.edges[0].target, "public.users");
    }

    #[test]
    fn test_build_is_deterministic() {
        let s = snapshot(vec![
            ("public.b", table(&["id", "a_id"], vec![ForeignKeyDescriptor::new("a_id", "public.a", "id")])),
            ("public.a", table(&["id"], vec![])),
        ]);

        assert_eq!(GraphBuilder::build(&s), GraphBuilder::build(&s));
        assert_eq!(GraphBuilder::build(&s).nodes[0].id, "public.a");
    }
}
