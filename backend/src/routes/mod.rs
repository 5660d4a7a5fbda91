//! Route definitions for the Microgreens Farm Operations API

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/lookups", lookup_routes())
        .nest("/consumables", consumable_routes())
        .nest("/products", product_routes())
        .nest("/batches", batch_routes())
        .nest("/reservations", reservation_routes())
        .nest("/recipes", recipe_routes())
        .nest("/crops", crop_routes())
        .nest("/crop-tasks", crop_task_routes())
        .nest("/crop-plans", crop_plan_routes())
        .nest("/orders", order_routes())
        .nest("/reports", report_routes())
        .nest("/activity", activity_routes())
}

/// Lookup tables
fn lookup_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_lookup_kinds))
        .route("/:kind", get(handlers::get_lookup))
}

/// Consumable stock and ledger
fn consumable_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_consumables).post(handlers::create_consumable),
        )
        .route(
            "/:consumable_id",
            get(handlers::get_consumable).delete(handlers::deactivate_consumable),
        )
        .route("/:consumable_id/transactions", get(handlers::get_consumable_transactions))
        .route("/:consumable_id/deduct", post(handlers::deduct_stock))
        .route("/:consumable_id/add", post(handlers::add_stock))
        .route("/:consumable_id/adjust", post(handlers::adjust_stock))
        .route("/:consumable_id/write-off", post(handlers::write_off_stock))
        .route("/:consumable_id/transfer", post(handlers::transfer_stock))
        .route("/:consumable_id/verify", get(handlers::verify_consumable_ledger))
}

/// Products and their totals
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_products).post(handlers::create_product))
        .route("/reserve", post(handlers::reserve_order_item))
        .route("/:product_id", get(handlers::get_product))
        .route("/:product_id/refresh", post(handlers::refresh_product_totals))
}

/// Product batches and the batch ledger
fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_batch))
        .route("/expire", post(handlers::expire_batches))
        .route(
            "/:batch_id",
            get(handlers::get_batch).delete(handlers::delete_batch),
        )
        .route("/:batch_id/transactions", get(handlers::get_batch_transactions))
        .route("/:batch_id/add", post(handlers::add_batch_stock))
        .route("/:batch_id/remove", post(handlers::remove_batch_stock))
        .route("/:batch_id/reserve", post(handlers::reserve_batch_stock))
        .route("/:batch_id/release", post(handlers::release_batch_stock))
}

/// Reservation lifecycle
fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route("/cleanup", post(handlers::cleanup_expired_reservations))
        .route("/:reservation_id", get(handlers::get_reservation))
        .route("/:reservation_id/confirm", post(handlers::confirm_reservation))
        .route("/:reservation_id/fulfill", post(handlers::fulfill_reservation))
        .route("/:reservation_id/cancel", post(handlers::cancel_reservation))
}

fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_recipes).post(handlers::create_recipe))
        .route("/:recipe_id", get(handlers::get_recipe))
        .route("/:recipe_id/active", put(handlers::set_recipe_active))
}

/// Crop trays and stage moves
fn crop_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_crops).post(handlers::plant_crop))
        .route("/bulk", post(handlers::plant_crops_bulk))
        .route("/bulk-advance", post(handlers::bulk_advance_crops))
        .route("/:crop_id", get(handlers::get_crop))
        .route("/:crop_id/history", get(handlers::get_crop_history))
        .route("/:crop_id/timeline", get(handlers::get_crop_timeline))
        .route("/:crop_id/tasks", get(handlers::get_crop_tasks))
        .route("/:crop_id/advance", post(handlers::advance_crop))
        .route("/:crop_id/reset", post(handlers::reset_crop))
        .route("/:crop_id/suspend-watering", post(handlers::suspend_crop_watering))
        .route("/:crop_id/resume-watering", post(handlers::resume_crop_watering))
}

fn crop_task_routes() -> Router<AppState> {
    Router::new()
        .route("/due", get(handlers::list_due_tasks))
        .route("/:task_id/complete", post(handlers::complete_task))
}

fn crop_plan_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_crop_plans).post(handlers::create_crop_plan))
        .route("/:plan_id", get(handlers::get_crop_plan))
        .route("/:plan_id/approve", post(handlers::approve_crop_plan))
        .route("/:plan_id/cancel", post(handlers::cancel_crop_plan))
        .route("/:plan_id/generate", post(handlers::generate_plan_crops))
}

fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/status", put(handlers::transition_order_status))
        .route("/:order_id/payment", put(handlers::update_order_payment))
        .route("/:order_id/reservations", get(handlers::get_order_reservations))
}

/// Reports with optional CSV export
fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/consumables", get(handlers::get_consumable_stock_report))
        .route("/products", get(handlers::get_product_stock_report))
        .route("/crop-stages", get(handlers::get_crop_stage_report))
}

fn activity_routes() -> Router<AppState> {
    Router::new()
        .route("/logs/:log_name", get(handlers::get_recent_activity))
        .route("/:subject_type/:subject_id", get(handlers::get_subject_activity))
}
