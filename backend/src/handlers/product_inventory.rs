//! HTTP handlers for product and batch inventory endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{InventoryReservation, InventoryTransaction, NewProduct, NewProductInventory, Product, ProductInventory};
use crate::services::product_inventory::{
    BatchChange, ExpirySweep, ProductInventoryService, ProductStock, ReleaseInput, ReserveInput,
    ReserveOrderItemInput, StockMovementInput,
};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ExpireBatchesInput {
    pub as_of: Option<NaiveDate>,
}

/// Create a product
pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<NewProduct>,
) -> AppResult<Json<Product>> {
    let service = ProductInventoryService::new(state.db);
    let product = service
        .create_product(input, state.config.inventory.default_low_stock_threshold)
        .await?;
    Ok(Json(product))
}

/// List active products
pub async fn list_products(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    let service = ProductInventoryService::new(state.db);
    let products = service.list_products().await?;
    Ok(Json(products))
}

/// Get a product with its batches
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ProductStock>> {
    let service = ProductInventoryService::new(state.db);
    let product = service.get_product(product_id).await?;
    Ok(Json(product))
}

/// Recompute a product's totals from its batches
pub async fn refresh_product_totals(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    let service = ProductInventoryService::new(state.db);
    let product = service.refresh_product_totals(product_id).await?;
    Ok(Json(product))
}

/// Hold stock for an order item across batches
pub async fn reserve_order_item(
    State(state): State<AppState>,
    Json(input): Json<ReserveOrderItemInput>,
) -> AppResult<Json<Vec<InventoryReservation>>> {
    let service = ProductInventoryService::new(state.db);
    let reservations = service
        .reserve_for_order_item(input, state.config.inventory.reservation_ttl_hours)
        .await?;
    Ok(Json(reservations))
}

/// Create a batch
pub async fn create_batch(
    State(state): State<AppState>,
    Json(input): Json<NewProductInventory>,
) -> AppResult<Json<BatchChange>> {
    let service = ProductInventoryService::new(state.db);
    let change = service.create_batch(input).await?;
    Ok(Json(change))
}

/// Get a batch
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<ProductInventory>> {
    let service = ProductInventoryService::new(state.db);
    let batch = service.get_batch(batch_id).await?;
    Ok(Json(batch))
}

/// Ledger entries for a batch
pub async fn get_batch_transactions(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<Vec<InventoryTransaction>>> {
    let service = ProductInventoryService::new(state.db);
    let transactions = service.batch_transactions(batch_id).await?;
    Ok(Json(transactions))
}

/// Add stock to a batch
pub async fn add_batch_stock(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<StockMovementInput>,
) -> AppResult<Json<BatchChange>> {
    let service = ProductInventoryService::new(state.db);
    let change = service.add_stock(batch_id, input).await?;
    Ok(Json(change))
}

/// Remove stock from a batch
pub async fn remove_batch_stock(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<StockMovementInput>,
) -> AppResult<Json<BatchChange>> {
    let service = ProductInventoryService::new(state.db);
    let change = service.remove_stock(batch_id, input).await?;
    Ok(Json(change))
}

/// Hold stock on one batch
pub async fn reserve_batch_stock(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<ReserveInput>,
) -> AppResult<Json<InventoryReservation>> {
    let service = ProductInventoryService::new(state.db);
    let reservation = service
        .reserve(batch_id, input, state.config.inventory.reservation_ttl_hours)
        .await?;
    Ok(Json(reservation))
}

/// Drop part of a batch's hold
pub async fn release_batch_stock(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<ReleaseInput>,
) -> AppResult<Json<BatchChange>> {
    let service = ProductInventoryService::new(state.db);
    let change = service.release(batch_id, input).await?;
    Ok(Json(change))
}

/// Delete an empty batch
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = ProductInventoryService::new(state.db);
    service.delete_batch(batch_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mark batches past their expiration date as expired
pub async fn expire_batches(
    State(state): State<AppState>,
    Json(input): Json<ExpireBatchesInput>,
) -> AppResult<Json<ExpirySweep>> {
    let service = ProductInventoryService::new(state.db);
    let today = input.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let sweep = service.expire_batches(today).await?;
    Ok(Json(sweep))
}
