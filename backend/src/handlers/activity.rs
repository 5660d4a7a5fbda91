//! Activity log handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::activity::ActivityLogEntry;
use crate::services::ActivityService;
use crate::AppState;

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// Changes recorded against one record
pub async fn get_subject_activity(
    State(state): State<AppState>,
    Path((subject_type, subject_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Vec<ActivityLogEntry>>> {
    let service = ActivityService::new(state.db);
    let entries = service.list_for_subject(&subject_type, subject_id).await?;
    Ok(Json(entries))
}

/// Latest entries of a log
pub async fn get_recent_activity(
    State(state): State<AppState>,
    Path(log_name): Path<String>,
    Query(query): Query<RecentQuery>,
) -> AppResult<Json<Vec<ActivityLogEntry>>> {
    let service = ActivityService::new(state.db);
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let entries = service.list_recent(&log_name, limit).await?;
    Ok(Json(entries))
}
