//! Schema Snapshot Module
//!
//! Detecting what changed in the database between two loads.
//! This module provides:
//! - Schema snapshots (point-in-time captures)
//! - The snapshot pair (current + one previous generation)
//! - Schema diff engine (changed tables and column deltas)

pub mod diff;
pub mod model;
pub mod store;

pub use diff::{ColumnDelta, DiffEngine, SchemaDiff};
pub use model::{ColumnDescriptor, ForeignKeyDescriptor, SchemaSnapshot, TableDescriptor};
pub use store::{SnapshotMetadata, SnapshotPair, UpdateKind};
