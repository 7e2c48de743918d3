//! Schema Graph Module
//!
//! Turns a snapshot into a table / foreign-key graph and lays it out:
//! - Graph builder (tables = nodes, foreign keys = edges)
//! - Layered layout engine (ranks, crossing reduction, coordinates)

pub mod builder;
pub mod layout;

pub use builder::GraphBuilder;
pub use layout::{LayoutConfig, LayoutEngine, LayoutResult};

use serde::{Deserialize, Serialize};

/// Table / foreign-key graph of one snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    /// Edges whose endpoints both exist in `nodes`
    pub edges: Vec<Edge>,
    /// Foreign keys whose referenced table is not in the snapshot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dangling: Vec<Edge>,
}

/// One table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Qualified table key
    pub id: String,
    pub data: NodeData,
}

/// Render payload of a table node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Unqualified table name
    pub name: String,
    pub columns: Vec<ColumnBadge>,
}

/// Column annotated with key membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBadge {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(rename = "isPK")]
    pub is_pk: bool,
    #[serde(rename = "isFK")]
    pub is_fk: bool,
}

/// One foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// `"<source>-<fkColumn>-<index>"`, stable across rebuilds
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Top-left corner of a node box on the canvas
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}
