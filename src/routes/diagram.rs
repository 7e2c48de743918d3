//! Diagram routes
//!
//! Read-only views over the coordinator: the positioned diagram, the last
//! diff with its open highlight windows, and the current snapshot.

use crate::coordinator::ChangesView;
use crate::diagram::DiagramView;
use crate::error::{ApiResult, AppError};
use crate::snapshot::SnapshotMetadata;
use crate::state::SharedState;
use axum::{extract::State, Json};

/// Positioned diagram with highlight flags; empty before the first snapshot
pub async fn get_diagram(State(state): State<SharedState>) -> Json<DiagramView> {
    Json(state.coordinator.diagram().await)
}

pub async fn get_changes(State(state): State<SharedState>) -> Json<ChangesView> {
    Json(state.coordinator.changes().await)
}

pub async fn get_snapshot(State(state): State<SharedState>) -> ApiResult<Json<SnapshotMetadata>> {
    state
        .coordinator
        .current_metadata()
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No snapshot has been loaded yet".to_string()))
}
