//! Lookup table handlers

use axum::{extract::Path, Json};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::models::{
    BatchStatus, ConsumableType, ConsumableUnit, CropPlanStatus, CropStage, InventoryReservationStatus, Lookup,
    OrderStatus, PaymentStatus, StockStatus, UnifiedOrderStatus,
};

/// One row of a lookup table
#[derive(Debug, Serialize)]
pub struct LookupEntry {
    pub code: &'static str,
    pub name: &'static str,
    pub color: &'static str,
    pub sort_order: i32,
}

/// Lookup kinds served under `/lookups/:kind`
pub const LOOKUP_KINDS: [&str; 10] = [
    "order_status",
    "payment_status",
    "unified_order_status",
    "consumable_type",
    "consumable_unit",
    "reservation_status",
    "crop_stage",
    "crop_plan_status",
    "stock_status",
    "batch_status",
];

fn entries<L: Lookup>() -> Vec<LookupEntry> {
    L::all()
        .iter()
        .map(|item| LookupEntry {
            code: item.code(),
            name: item.name(),
            color: item.color(),
            sort_order: item.sort_order(),
        })
        .collect()
}

pub fn lookup_entries(kind: &str) -> Option<Vec<LookupEntry>> {
    let entries = match kind {
        "order_status" => entries::<OrderStatus>(),
        "payment_status" => entries::<PaymentStatus>(),
        "unified_order_status" => entries::<UnifiedOrderStatus>(),
        "consumable_type" => entries::<ConsumableType>(),
        "consumable_unit" => entries::<ConsumableUnit>(),
        "reservation_status" => entries::<InventoryReservationStatus>(),
        "crop_stage" => entries::<CropStage>(),
        "crop_plan_status" => entries::<CropPlanStatus>(),
        "stock_status" => entries::<StockStatus>(),
        "batch_status" => entries::<BatchStatus>(),
        _ => return None,
    };
    Some(entries)
}

/// Available lookup kinds
pub async fn list_lookup_kinds() -> Json<Vec<&'static str>> {
    Json(LOOKUP_KINDS.to_vec())
}

/// Entries of one lookup table, in sort order
pub async fn get_lookup(Path(kind): Path<String>) -> AppResult<Json<Vec<LookupEntry>>> {
    lookup_entries(&kind)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Lookup '{}'", kind)))
}
