//! Schema refresh routes
//!
//! Introspection-driven refreshes, pushed snapshots and executed-statement
//! notifications. All three funnel into the coordinator's single refresh.

use crate::coordinator::RefreshOutcome;
use crate::ddl;
use crate::error::{ApiResult, AppError};
use crate::snapshot::{SchemaSnapshot, TableDescriptor};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

// ==================== Request/Response Types ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

#[derive(Debug, Deserialize)]
pub struct IngestQuery {
    pub schema: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatementRequest {
    pub sql: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    pub success: bool,
    pub refreshed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RefreshOutcome>,
}

// ==================== Handlers ====================

/// Introspect `schema` and apply it
pub async fn refresh_schema(
    State(state): State<SharedState>,
    Path(schema): Path<String>,
) -> ApiResult<Json<RefreshResponse>> {
    let outcome = refresh(&state, &schema).await?;

    Ok(Json(RefreshResponse {
        success: true,
        message: format!("Schema {} refreshed", schema),
        outcome,
    }))
}

/// Apply a snapshot pushed by a client: a map of table key to descriptor
pub async fn ingest_snapshot(
    State(state): State<SharedState>,
    Query(query): Query<IngestQuery>,
    Json(tables): Json<BTreeMap<String, TableDescriptor>>,
) -> ApiResult<Json<RefreshResponse>> {
    let snapshot = SchemaSnapshot::new(query.schema, tables);
    let outcome = state.coordinator.ingest(snapshot).await?;

    Ok(Json(RefreshResponse {
        success: true,
        message: format!("Snapshot with {} tables applied", outcome.snapshot.table_count),
        outcome,
    }))
}

/// Report a statement executed against `schema`; DDL touching it triggers
/// a refresh
pub async fn report_statement(
    State(state): State<SharedState>,
    Path(schema): Path<String>,
    Json(req): Json<StatementRequest>,
) -> ApiResult<Json<StatementResponse>> {
    if req.sql.trim().is_empty() {
        return Err(AppError::BadRequest("sql must not be empty".to_string()));
    }

    if !ddl::touches_schema(&req.sql, &schema) {
        debug!("Statement does not change schema {}, skipping refresh", schema);
        return Ok(Json(StatementResponse {
            success: true,
            refreshed: false,
            outcome: None,
        }));
    }

    let objects: Vec<String> = ddl::affected_objects(&req.sql)
        .into_iter()
        .map(|o| o.table)
        .collect();
    info!(
        "DDL on schema {} touched [{}], refreshing",
        schema,
        objects.join(", ")
    );

    let outcome = refresh(&state, &schema).await?;
    Ok(Json(StatementResponse {
        success: true,
        refreshed: true,
        outcome: Some(outcome),
    }))
}

async fn refresh(state: &SharedState, schema: &str) -> ApiResult<RefreshOutcome> {
    let source = state.source.as_ref().ok_or_else(|| {
        AppError::NotConnected("No database configured; set DATABASE_URL or push snapshots".to_string())
    })?;
    state.coordinator.refresh_schema(source, schema).await
}
