//! HTTP handlers for crop plan endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{CropPlan, NewCropPlan};
use crate::services::crop_plan::{CropPlanFilter, CropPlanView, GeneratedCrops};
use crate::services::CropPlanService;
use crate::AppState;

fn plan_service(state: AppState) -> CropPlanService {
    CropPlanService::new(state.db, &state.config.crops)
}

/// Draft a crop plan
pub async fn create_crop_plan(
    State(state): State<AppState>,
    Json(input): Json<NewCropPlan>,
) -> AppResult<Json<CropPlan>> {
    let plan = plan_service(state).create(input).await?;
    Ok(Json(plan))
}

pub async fn list_crop_plans(
    State(state): State<AppState>,
    Query(filter): Query<CropPlanFilter>,
) -> AppResult<Json<Vec<CropPlanView>>> {
    let plans = plan_service(state).list(filter).await?;
    Ok(Json(plans))
}

pub async fn get_crop_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> AppResult<Json<CropPlanView>> {
    let plan = plan_service(state).get(plan_id).await?;
    Ok(Json(plan))
}

pub async fn approve_crop_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> AppResult<Json<CropPlan>> {
    let plan = plan_service(state).approve(plan_id).await?;
    Ok(Json(plan))
}

pub async fn cancel_crop_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> AppResult<Json<CropPlan>> {
    let plan = plan_service(state).cancel(plan_id).await?;
    Ok(Json(plan))
}

/// Sow the trays of an approved plan
pub async fn generate_plan_crops(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> AppResult<Json<GeneratedCrops>> {
    let generated = plan_service(state).generate_crops(plan_id).await?;
    Ok(Json(generated))
}
