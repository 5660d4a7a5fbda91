//! HTTP handlers for reservation endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::InventoryReservation;
use crate::services::reservation::{CleanupResult, ReservationService};
use crate::AppState;

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> AppResult<Json<InventoryReservation>> {
    let service = ReservationService::new(state.db);
    let reservation = service.get(reservation_id).await?;
    Ok(Json(reservation))
}

pub async fn confirm_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> AppResult<Json<InventoryReservation>> {
    let service = ReservationService::new(state.db);
    let reservation = service.confirm(reservation_id).await?;
    Ok(Json(reservation))
}

/// Ship the reserved stock
pub async fn fulfill_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> AppResult<Json<InventoryReservation>> {
    let service = ReservationService::new(state.db);
    let reservation = service.fulfill(reservation_id).await?;
    Ok(Json(reservation))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> AppResult<Json<InventoryReservation>> {
    let service = ReservationService::new(state.db);
    let reservation = service.cancel(reservation_id).await?;
    Ok(Json(reservation))
}

/// Cancel every reservation past its expiry
pub async fn cleanup_expired_reservations(State(state): State<AppState>) -> AppResult<Json<CleanupResult>> {
    let service = ReservationService::new(state.db);
    let result = service.cleanup_expired(Utc::now()).await?;
    Ok(Json(result))
}
