//! Schema Coordinator
//!
//! Owns the snapshot pair and runs every refresh as one transaction:
//! fetch -> update pair -> diff -> graph -> layout -> highlight windows.
//! Only one refresh may be in flight; a second request is rejected.

use crate::diagram::{DiagramView, PositionedGraph};
use crate::error::AppError;
use crate::graph::{GraphBuilder, LayoutConfig, LayoutEngine};
use crate::highlight::{HighlightCoordinator, HighlightSnapshot};
use crate::snapshot::diff::describe;
use crate::snapshot::{SchemaDiff, SchemaSnapshot, SnapshotMetadata, SnapshotPair, UpdateKind};
use crate::source::SchemaSource;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Outcome of one applied snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub snapshot: SnapshotMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<SnapshotMetadata>,
    pub diff: SchemaDiff,
}

/// What changed in the last refresh and what is still highlighted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesView {
    pub last_diff: SchemaDiff,
    pub active: HighlightSnapshot,
}

#[derive(Default)]
struct CoordinatorState {
    pair: SnapshotPair,
    positioned: PositionedGraph,
    last_diff: SchemaDiff,
}

pub struct SchemaCoordinator {
    state: RwLock<CoordinatorState>,
    highlights: HighlightCoordinator,
    layout_config: LayoutConfig,
    in_flight: Mutex<()>,
}

impl SchemaCoordinator {
    pub fn new(layout_config: LayoutConfig, highlight_duration: Duration) -> Self {
        Self {
            state: RwLock::new(CoordinatorState::default()),
            highlights: HighlightCoordinator::new(highlight_duration),
            layout_config,
            in_flight: Mutex::new(()),
        }
    }

    /// Fetch `schema` from `source` and apply it.
    ///
    /// On fetch failure the previous diagram and highlights stay untouched.
    pub async fn refresh_schema<S: SchemaSource>(
        &self,
        source: &S,
        schema: &str,
    ) -> Result<RefreshOutcome, AppError> {
        let _guard = self.begin()?;

        let snapshot = source.fetch_schema(schema).await.map_err(|e| {
            warn!("Refresh of schema {} failed, keeping previous state: {}", schema, e);
            e
        })?;

        Ok(self.apply(snapshot).await)
    }

    /// Apply a snapshot produced outside the service
    pub async fn ingest(&self, snapshot: SchemaSnapshot) -> Result<RefreshOutcome, AppError> {
        let _guard = self.begin()?;
        Ok(self.apply(snapshot).await)
    }

    fn begin(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, AppError> {
        self.in_flight
            .try_lock()
            .map_err(|_| AppError::Conflict("A schema refresh is already in progress".to_string()))
    }

    async fn apply(&self, snapshot: SchemaSnapshot) -> RefreshOutcome {
        let graph = GraphBuilder::build(&snapshot);
        let layout = LayoutEngine::layout(&graph, &self.layout_config);
        let metadata = SnapshotMetadata::from(&snapshot);

        let mut state = self.state.write().await;
        let kind = state.pair.update(snapshot);
        let diff = state.pair.diff();

        match kind {
            // Nothing to diff against; windows of the old schema just close
            UpdateKind::SchemaSwitch => self.highlights.clear().await,
            UpdateKind::FirstLoad | UpdateKind::Refresh => self.highlights.open(&diff).await,
        }

        state.positioned = PositionedGraph { graph, layout };
        state.last_diff = diff.clone();

        let previous = state.pair.previous().map(SnapshotMetadata::from);

        info!(
            "Applied snapshot ({:?}) of schema {}: {} tables, {}",
            kind,
            metadata.schema.as_deref().unwrap_or("<unnamed>"),
            metadata.table_count,
            describe(&diff)
        );

        RefreshOutcome {
            snapshot: metadata,
            previous,
            diff,
        }
    }

    /// Render model of the current snapshot; empty before the first load
    pub async fn diagram(&self) -> DiagramView {
        let state = self.state.read().await;
        if state.pair.current().is_none() {
            return DiagramView::default();
        }
        let highlights = self.highlights.snapshot().await;
        DiagramView::compose(&state.positioned, &highlights, state.pair.previous())
    }

    pub async fn changes(&self) -> ChangesView {
        let state = self.state.read().await;
        ChangesView {
            last_diff: state.last_diff.clone(),
            active: self.highlights.snapshot().await,
        }
    }

    pub async fn current_metadata(&self) -> Option<SnapshotMetadata> {
        self.state.read().await.pair.current().map(SnapshotMetadata::from)
    }

    #[cfg(test)]
    pub async fn current_schema(&self) -> Option<String> {
        self.state
            .read()
            .await
            .pair
            .current()
            .and_then(|s| s.schema.clone())
    }
}
