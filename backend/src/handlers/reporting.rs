//! Reporting handlers for stock reports and data export

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::ConsumableType;
use crate::services::reporting::{DashboardMetrics, ReportFilter, ReportingService};
use crate::AppState;

#[derive(Deserialize)]
pub struct ReportQuery {
    pub consumable_type: Option<ConsumableType>,
    #[serde(default)]
    pub restock_only: bool,
    pub format: Option<String>, // "json" or "csv"
}

#[derive(Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

/// JSON by default, a CSV attachment when asked for
fn render<T: Serialize>(data: Vec<T>, format: Option<&str>, filename: &str) -> AppResult<Response> {
    if format == Some("csv") {
        let csv = ReportingService::export_to_csv(&data)?;
        let disposition = format!("attachment; filename=\"{}.csv\"", filename);
        Ok((
            [(header::CONTENT_TYPE, "text/csv".to_string()), (header::CONTENT_DISPOSITION, disposition)],
            csv,
        )
            .into_response())
    } else {
        Ok(Json(data).into_response())
    }
}

/// Get dashboard metrics
pub async fn get_dashboard(State(state): State<AppState>) -> AppResult<Json<DashboardMetrics>> {
    let service = ReportingService::new(state.db.clone());
    let metrics = service.get_dashboard_metrics().await?;
    Ok(Json(metrics))
}

/// Get consumable stock report
pub async fn get_consumable_stock_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    let service = ReportingService::new(state.db.clone());

    let filter = ReportFilter {
        consumable_type: query.consumable_type,
        restock_only: query.restock_only,
    };

    let data = service.get_consumable_stock_report(&filter).await?;
    render(data, query.format.as_deref(), "consumable_stock")
}

/// Get product stock report
pub async fn get_product_stock_report(
    State(state): State<AppState>,
    Query(query): Query<FormatQuery>,
) -> AppResult<Response> {
    let service = ReportingService::new(state.db.clone());
    let data = service.get_product_stock_report().await?;
    render(data, query.format.as_deref(), "product_stock")
}

/// Get tray counts per crop stage
pub async fn get_crop_stage_report(
    State(state): State<AppState>,
    Query(query): Query<FormatQuery>,
) -> AppResult<Response> {
    let service = ReportingService::new(state.db.clone());
    let data = service.get_crop_stage_summary().await?;
    render(data, query.format.as_deref(), "crop_stages")
}
