//! HTTP handlers for order endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use shared::{PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{InventoryReservation, NewOrder};
use crate::services::order::{OrderFilter, OrderView, PaymentInput, TransitionInput, TransitionResult};
use crate::services::{OrderService, ReservationService};
use crate::AppState;

pub async fn create_order(State(state): State<AppState>, Json(input): Json<NewOrder>) -> AppResult<Json<OrderView>> {
    let service = OrderService::new(state.db);
    let order = service.create(input).await?;
    Ok(Json(order))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<OrderView>>> {
    let service = OrderService::new(state.db);
    let orders = service.list(filter, &page).await?;
    Ok(Json(orders))
}

pub async fn get_order(State(state): State<AppState>, Path(order_id): Path<Uuid>) -> AppResult<Json<OrderView>> {
    let service = OrderService::new(state.db);
    let order = service.get(order_id).await?;
    Ok(Json(order))
}

/// Move an order to a new status
pub async fn transition_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<TransitionInput>,
) -> AppResult<Json<TransitionResult>> {
    let service = OrderService::new(state.db);
    let result = service.transition_status(order_id, input).await?;
    Ok(Json(result))
}

pub async fn update_order_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<PaymentInput>,
) -> AppResult<Json<OrderView>> {
    let service = OrderService::new(state.db);
    let order = service.update_payment_status(order_id, input).await?;
    Ok(Json(order))
}

/// Reservations held for an order
pub async fn get_order_reservations(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Vec<InventoryReservation>>> {
    let service = ReservationService::new(state.db);
    let reservations = service.list_for_order(order_id).await?;
    Ok(Json(reservations))
}
