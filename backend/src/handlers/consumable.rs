//! HTTP handlers for consumable stock endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Consumable, ConsumableTransaction, NewConsumable};
use crate::services::consumable::{
    AddStockInput, AddStockResult, AdjustmentInput, ConsumableFilter, ConsumableService, ConsumableStock,
    DeductInput, LedgerCheck, StockChange, TransferInput, TransferResult, WriteOffInput,
};
use crate::AppState;

/// Receive a new consumable
pub async fn create_consumable(
    State(state): State<AppState>,
    Json(input): Json<NewConsumable>,
) -> AppResult<Json<Consumable>> {
    let service = ConsumableService::new(state.db);
    let consumable = service.create(input).await?;
    Ok(Json(consumable))
}

/// List consumables
pub async fn list_consumables(
    State(state): State<AppState>,
    Query(filter): Query<ConsumableFilter>,
) -> AppResult<Json<Vec<ConsumableStock>>> {
    let service = ConsumableService::new(state.db);
    let consumables = service.list(filter).await?;
    Ok(Json(consumables))
}

/// Get a consumable with its current stock
pub async fn get_consumable(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
) -> AppResult<Json<ConsumableStock>> {
    let service = ConsumableService::new(state.db);
    let consumable = service.get(consumable_id).await?;
    Ok(Json(consumable))
}

/// Ledger entries for a consumable
pub async fn get_consumable_transactions(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
) -> AppResult<Json<Vec<ConsumableTransaction>>> {
    let service = ConsumableService::new(state.db);
    let transactions = service.transactions(consumable_id).await?;
    Ok(Json(transactions))
}

/// Take stock out
pub async fn deduct_stock(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
    Json(input): Json<DeductInput>,
) -> AppResult<Json<StockChange>> {
    let service = ConsumableService::new(state.db);
    let change = service.deduct(consumable_id, input).await?;
    Ok(Json(change))
}

/// Receive more stock
pub async fn add_stock(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
    Json(input): Json<AddStockInput>,
) -> AppResult<Json<AddStockResult>> {
    let service = ConsumableService::new(state.db);
    let result = service.add_stock(consumable_id, input).await?;
    Ok(Json(result))
}

/// Correct the stock after a count
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
    Json(input): Json<AdjustmentInput>,
) -> AppResult<Json<StockChange>> {
    let service = ConsumableService::new(state.db);
    let change = service.adjust(consumable_id, input).await?;
    Ok(Json(change))
}

/// Write off wasted or expired stock
pub async fn write_off_stock(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
    Json(input): Json<WriteOffInput>,
) -> AppResult<Json<StockChange>> {
    let service = ConsumableService::new(state.db);
    let change = service.write_off(consumable_id, input).await?;
    Ok(Json(change))
}

/// Move stock to another consumable
pub async fn transfer_stock(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
    Json(input): Json<TransferInput>,
) -> AppResult<Json<TransferResult>> {
    let service = ConsumableService::new(state.db);
    let result = service.transfer(consumable_id, input).await?;
    Ok(Json(result))
}

/// Compare stored stock with a replay of the ledger
pub async fn verify_consumable_ledger(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
) -> AppResult<Json<LedgerCheck>> {
    let service = ConsumableService::new(state.db);
    let check = service.verify(consumable_id).await?;
    Ok(Json(check))
}

/// Retire a consumable
pub async fn deactivate_consumable(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
) -> AppResult<Json<Consumable>> {
    let service = ConsumableService::new(state.db);
    let consumable = service.deactivate(consumable_id).await?;
    Ok(Json(consumable))
}
