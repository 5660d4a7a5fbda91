//! Reporting service for stock reports and data export
//! Provides consumable restock, product stock and crop stage reports

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Consumable, ConsumableType, Lookup};
use crate::services::consumable::{ConsumableFilter, ConsumableService};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// One line of the consumable stock report
#[derive(Debug, Serialize)]
pub struct ConsumableStockReport {
    pub consumable_id: Uuid,
    pub name: String,
    pub consumable_type: String,
    pub lot_no: Option<String>,
    pub unit: String,
    pub current_stock: Decimal,
    pub restock_threshold: Decimal,
    pub needs_restock: bool,
    pub suggested_reorder: Option<Decimal>,
}

impl From<&Consumable> for ConsumableStockReport {
    fn from(c: &Consumable) -> Self {
        Self {
            consumable_id: c.id,
            name: c.name.clone(),
            consumable_type: c.consumable_type.code().to_string(),
            lot_no: c.lot_no.clone(),
            unit: c.quantity_unit.code().to_string(),
            current_stock: c.current_stock(),
            restock_threshold: c.restock_threshold,
            needs_restock: c.needs_restock(),
            suggested_reorder: c.restock_suggestion(),
        }
    }
}

/// Product stock report entry
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ProductStockReport {
    pub product_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub stock_status: String,
    pub total_stock: Decimal,
    pub reserved_stock: Decimal,
    pub available_stock: Decimal,
    pub active_batches: i64,
    pub stock_value: Decimal,
}

/// Trays per crop stage
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CropStageSummary {
    pub stage: String,
    pub trays: i64,
    pub watering_suspended: i64,
}

/// Dashboard metrics
#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub growing_trays: i64,
    pub consumables_needing_restock: usize,
    pub products_low_or_out: i64,
    pub active_reservations: i64,
    pub overdue_crop_plans: i64,
    pub due_crop_tasks: i64,
}

/// Report filter parameters
#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub consumable_type: Option<ConsumableType>,
    #[serde(default)]
    pub restock_only: bool,
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Consumable stock with restock suggestions
    pub async fn get_consumable_stock_report(&self, filter: &ReportFilter) -> AppResult<Vec<ConsumableStockReport>> {
        let consumables = ConsumableService::new(self.db.clone())
            .list(ConsumableFilter {
                consumable_type: filter.consumable_type,
                needs_restock: filter.restock_only.then_some(true),
                include_inactive: None,
            })
            .await?;

        Ok(consumables
            .iter()
            .map(|stock| ConsumableStockReport::from(&stock.consumable))
            .collect())
    }

    /// Product totals with batch counts and stock value
    pub async fn get_product_stock_report(&self) -> AppResult<Vec<ProductStockReport>> {
        let reports = sqlx::query_as::<_, ProductStockReport>(
            r#"
            SELECT
                p.id as product_id,
                p.name,
                p.sku,
                p.stock_status,
                p.total_stock,
                p.reserved_stock,
                GREATEST(p.total_stock - p.reserved_stock, 0) as available_stock,
                COUNT(pi.id) as active_batches,
                COALESCE(SUM(pi.quantity * pi.cost_per_unit), 0) as stock_value
            FROM products p
            LEFT JOIN product_inventories pi ON pi.product_id = p.id AND pi.status = 'active'
            WHERE p.is_active
            GROUP BY p.id, p.name, p.sku, p.stock_status, p.total_stock, p.reserved_stock
            ORDER BY p.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(reports)
    }

    /// Tray counts per stage
    pub async fn get_crop_stage_summary(&self) -> AppResult<Vec<CropStageSummary>> {
        let summary = sqlx::query_as::<_, CropStageSummary>(
            r#"
            SELECT
                current_stage as stage,
                COUNT(*) as trays,
                COUNT(*) FILTER (WHERE watering_suspended_at IS NOT NULL) as watering_suspended
            FROM crops
            GROUP BY current_stage
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut summary = summary;
        summary.sort_by_key(|row| {
            crate::models::CropStage::from_code(&row.stage)
                .map(|s| s.sort_order())
                .unwrap_or(i32::MAX)
        });
        Ok(summary)
    }

    /// Get dashboard metrics
    pub async fn get_dashboard_metrics(&self) -> AppResult<DashboardMetrics> {
        let growing_trays: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crops WHERE current_stage <> 'harvested'")
            .fetch_one(&self.db)
            .await?;

        let consumables_needing_restock = self
            .get_consumable_stock_report(&ReportFilter {
                consumable_type: None,
                restock_only: true,
            })
            .await?
            .len();

        let products_low_or_out: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE is_active AND stock_status IN ('low_stock', 'out_of_stock')",
        )
        .fetch_one(&self.db)
        .await?;

        let active_reservations: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM inventory_reservations WHERE status IN ('pending', 'confirmed')",
        )
        .fetch_one(&self.db)
        .await?;

        let overdue_crop_plans: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crop_plans WHERE status IN ('draft', 'approved') AND plant_by_date < CURRENT_DATE",
        )
        .fetch_one(&self.db)
        .await?;

        let due_crop_tasks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM crop_tasks WHERE status = 'pending' AND due_at <= NOW()")
                .fetch_one(&self.db)
                .await?;

        Ok(DashboardMetrics {
            growing_trays,
            consumables_needing_restock,
            products_low_or_out,
            active_reservations,
            overdue_crop_plans,
            due_crop_tasks,
        })
    }

    /// Export report data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let csv_data = String::from_utf8(
            wtr.into_inner()
                .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?,
        )
        .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))?;
        Ok(csv_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_to_csv_writes_header_and_rows() {
        let rows = vec![
            CropStageSummary {
                stage: "germination".to_string(),
                trays: 12,
                watering_suspended: 0,
            },
            CropStageSummary {
                stage: "light".to_string(),
                trays: 30,
                watering_suspended: 4,
            },
        ];
        let csv = ReportingService::export_to_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "stage,trays,watering_suspended");
        assert_eq!(lines[1], "germination,12,0");
        assert_eq!(lines[2], "light,30,4");
    }

    #[test]
    fn test_empty_export_is_empty() {
        let rows: Vec<CropStageSummary> = Vec::new();
        assert_eq!(ReportingService::export_to_csv(&rows).unwrap(), "");
    }
}
