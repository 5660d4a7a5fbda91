//! Order service: unified status and payment status

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use shared::{PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{decode, Lookup, NewOrder, Order, PaymentStatus, UnifiedOrderStatus};
use crate::services::activity::{self, Activity};
use crate::services::reservation::release_for_order;

/// Order service for order status tracking
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
}

const ORDER_COLUMNS: &str =
    "id, customer_name, delivery_date, unified_status, payment_status, notes, created_at, updated_at";

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    customer_name: String,
    delivery_date: Option<NaiveDate>,
    unified_status: String,
    payment_status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> AppResult<Self> {
        Ok(Order {
            id: row.id,
            customer_name: row.customer_name,
            delivery_date: row.delivery_date,
            unified_status: decode(&row.unified_status)?,
            payment_status: decode(&row.payment_status)?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<UnifiedOrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionInput {
    pub status: UnifiedOrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct PaymentInput {
    pub payment_status: PaymentStatus,
}

/// Order with the statuses it may move to next
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub stage: &'static str,
    pub is_editable: bool,
    pub valid_transitions: Vec<UnifiedOrderStatus>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            stage: order.unified_status.stage().as_str(),
            is_editable: order.is_editable(),
            valid_transitions: order.unified_status.valid_targets(),
            order,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionResult {
    pub order: OrderView,
    pub previous_status: UnifiedOrderStatus,
    pub released_reservations: usize,
}

async fn lock_order(conn: &mut PgConnection, id: Uuid) -> AppResult<Order> {
    let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

    row.try_into()
}

async fn save_order(conn: &mut PgConnection, order: &Order) -> AppResult<()> {
    sqlx::query("UPDATE orders SET unified_status = $2, payment_status = $3, updated_at = $4 WHERE id = $1")
        .bind(order.id)
        .bind(order.unified_status.code())
        .bind(order.payment_status.code())
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewOrder) -> AppResult<OrderView> {
        let order = Order::open(input, Utc::now())?;

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_name, delivery_date, unified_status, payment_status, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id)
        .bind(&order.customer_name)
        .bind(order.delivery_date)
        .bind(order.unified_status.code())
        .bind(order.payment_status.code())
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;
        activity::record(&mut *tx, Activity::new("orders", "order", order.id, "created").created(&order)?).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, customer = %order.customer_name, "order created");
        Ok(order.into())
    }

    pub async fn get(&self, id: Uuid) -> AppResult<OrderView> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        Ok(Order::try_from(row)?.into())
    }

    pub async fn list(&self, filter: OrderFilter, page: &Pagination) -> AppResult<PaginatedResponse<OrderView>> {
        let status = filter.status.map(|s| s.code());
        let payment_status = filter.payment_status.map(|s| s.code());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE ($1::text IS NULL OR unified_status = $1)
              AND ($2::text IS NULL OR payment_status = $2)
            "#,
        )
        .bind(status)
        .bind(payment_status)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::text IS NULL OR unified_status = $1)
              AND ($2::text IS NULL OR payment_status = $2)
            ORDER BY delivery_date NULLS LAST, created_at
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(status)
        .bind(payment_status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        let orders = rows
            .into_iter()
            .map(|row| Order::try_from(row).map(OrderView::from))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(PaginatedResponse::new(orders, page, total.unsigned_abs()))
    }

    /// Move an order to a new unified status.
    ///
    /// Cancelling releases the order's active reservations in the same
    /// transaction.
    pub async fn transition_status(&self, id: Uuid, input: TransitionInput) -> AppResult<TransitionResult> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let before = lock_order(&mut *tx, id).await?;
        let mut order = before.clone();
        let previous_status = order.transition_to(input.status, now)?;

        let released_reservations = if order.unified_status == UnifiedOrderStatus::Cancelled {
            release_for_order(&mut *tx, order.id, now).await?
        } else {
            0
        };

        save_order(&mut *tx, &order).await?;
        activity::record(
            &mut *tx,
            Activity::new("orders", "order", order.id, "status_changed")
                .description(format!(
                    "{} -> {}",
                    previous_status.code(),
                    order.unified_status.code()
                ))
                .changes(&before, &order)?,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            from = previous_status.code(),
            to = order.unified_status.code(),
            released_reservations,
            "order status changed"
        );
        Ok(TransitionResult {
            order: order.into(),
            previous_status,
            released_reservations,
        })
    }

    pub async fn update_payment_status(&self, id: Uuid, input: PaymentInput) -> AppResult<OrderView> {
        let mut tx = self.db.begin().await?;
        let before = lock_order(&mut *tx, id).await?;
        let mut order = before.clone();
        order.set_payment_status(input.payment_status, Utc::now())?;

        save_order(&mut *tx, &order).await?;
        activity::record(
            &mut *tx,
            Activity::new("orders", "order", order.id, "payment_updated").changes(&before, &order)?,
        )
        .await?;
        tx.commit().await?;

        if order.payment_status.requires_attention() {
            tracing::warn!(
                order_id = %order.id,
                payment_status = order.payment_status.code(),
                "order payment needs attention"
            );
        }
        Ok(order.into())
    }
}
