//! HTTP handlers for crop and crop task endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Crop, CropStageHistory, CropStageTransition, NewCrop};
use crate::services::crop::{AdvanceInput, BulkAdvanceInput, CropFilter, CropView, ResetInput, TimelineStage};
use crate::services::crop_tasks::CropTask;
use crate::services::{CropService, CropTaskService};
use crate::AppState;

fn crop_service(state: AppState) -> CropService {
    CropService::new(state.db, &state.config.crops)
}

/// Plant a tray
pub async fn plant_crop(State(state): State<AppState>, Json(input): Json<NewCrop>) -> AppResult<Json<Crop>> {
    let crop = crop_service(state).plant(input).await?;
    Ok(Json(crop))
}

/// Plant many trays at once
pub async fn plant_crops_bulk(
    State(state): State<AppState>,
    Json(inputs): Json<Vec<NewCrop>>,
) -> AppResult<Json<Vec<Crop>>> {
    let crops = crop_service(state).create_crops_bulk(inputs).await?;
    Ok(Json(crops))
}

pub async fn list_crops(
    State(state): State<AppState>,
    Query(filter): Query<CropFilter>,
) -> AppResult<Json<Vec<Crop>>> {
    let crops = crop_service(state).list(filter).await?;
    Ok(Json(crops))
}

/// Get a crop with its timing
pub async fn get_crop(State(state): State<AppState>, Path(crop_id): Path<Uuid>) -> AppResult<Json<CropView>> {
    let crop = crop_service(state).get(crop_id).await?;
    Ok(Json(crop))
}

pub async fn get_crop_history(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> AppResult<Json<Vec<CropStageHistory>>> {
    let history = crop_service(state).history(crop_id).await?;
    Ok(Json(history))
}

pub async fn get_crop_timeline(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> AppResult<Json<Vec<TimelineStage>>> {
    let timeline = crop_service(state).timeline(crop_id).await?;
    Ok(Json(timeline))
}

/// Move a crop forward
pub async fn advance_crop(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
    input: Option<Json<AdvanceInput>>,
) -> AppResult<Json<Crop>> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let crop = crop_service(state).advance(crop_id, input).await?;
    Ok(Json(crop))
}

/// Move a crop back to an earlier stage
pub async fn reset_crop(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
    Json(input): Json<ResetInput>,
) -> AppResult<Json<Crop>> {
    let crop = crop_service(state).reset(crop_id, input).await?;
    Ok(Json(crop))
}

pub async fn suspend_crop_watering(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> AppResult<Json<Crop>> {
    let crop = crop_service(state).suspend_watering(crop_id).await?;
    Ok(Json(crop))
}

pub async fn resume_crop_watering(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> AppResult<Json<Crop>> {
    let crop = crop_service(state).resume_watering(crop_id).await?;
    Ok(Json(crop))
}

/// Advance many crops; failures are reported per crop
pub async fn bulk_advance_crops(
    State(state): State<AppState>,
    Json(input): Json<BulkAdvanceInput>,
) -> AppResult<Json<CropStageTransition>> {
    let transition = crop_service(state).bulk_advance(input).await?;
    Ok(Json(transition))
}

/// Tasks for a crop
pub async fn get_crop_tasks(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> AppResult<Json<Vec<CropTask>>> {
    let service = CropTaskService::new(state.db);
    let tasks = service.list_for_crop(crop_id).await?;
    Ok(Json(tasks))
}

/// Pending tasks that are due now
pub async fn list_due_tasks(State(state): State<AppState>) -> AppResult<Json<Vec<CropTask>>> {
    let service = CropTaskService::new(state.db);
    let tasks = service.list_due(Utc::now()).await?;
    Ok(Json(tasks))
}

pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<CropTask>> {
    let service = CropTaskService::new(state.db);
    let task = service.complete(task_id).await?;
    Ok(Json(task))
}
