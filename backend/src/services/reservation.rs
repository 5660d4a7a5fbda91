//! Reservation lifecycle: confirm, fulfil, cancel and the expiry sweep

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{decode, InventoryReservation, Lookup, TransactionReference};
use crate::services::activity::{self, Activity};
use crate::services::product_inventory::{lock_batch_with_product, persist_batch_change, update_product_totals};

/// Reservation service for holds placed against product batches
#[derive(Clone)]
pub struct ReservationService {
    db: PgPool,
}

const RESERVATION_COLUMNS: &str = "id, product_inventory_id, product_id, order_id, order_item_id, quantity, \
     status, expires_at, confirmed_at, fulfilled_at, cancelled_at, created_at, updated_at";

/// Database row for a reservation
#[derive(Debug, FromRow)]
struct ReservationRow {
    id: Uuid,
    product_inventory_id: Uuid,
    product_id: Uuid,
    order_id: Uuid,
    order_item_id: Uuid,
    quantity: Decimal,
    status: String,
    expires_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    fulfilled_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for InventoryReservation {
    type Error = AppError;

    fn try_from(row: ReservationRow) -> AppResult<Self> {
        Ok(InventoryReservation {
            id: row.id,
            product_inventory_id: row.product_inventory_id,
            product_id: row.product_id,
            order_id: row.order_id,
            order_item_id: row.order_item_id,
            quantity: row.quantity,
            status: decode(&row.status)?,
            expires_at: row.expires_at,
            confirmed_at: row.confirmed_at,
            fulfilled_at: row.fulfilled_at,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResult {
    pub cancelled: usize,
    pub failed: Vec<Uuid>,
}

pub(crate) async fn insert_reservation(conn: &mut PgConnection, reservation: &InventoryReservation) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_reservations (
            id, product_inventory_id, product_id, order_id, order_item_id, quantity, status,
            expires_at, confirmed_at, fulfilled_at, cancelled_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(reservation.id)
    .bind(reservation.product_inventory_id)
    .bind(reservation.product_id)
    .bind(reservation.order_id)
    .bind(reservation.order_item_id)
    .bind(reservation.quantity)
    .bind(reservation.status.code())
    .bind(reservation.expires_at)
    .bind(reservation.confirmed_at)
    .bind(reservation.fulfilled_at)
    .bind(reservation.cancelled_at)
    .bind(reservation.created_at)
    .bind(reservation.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            AppError::NotFound("Order".to_string())
        }
        other => other.into(),
    })?;
    Ok(())
}

async fn fetch_reservation(conn: &mut PgConnection, id: Uuid, for_update: bool) -> AppResult<InventoryReservation> {
    let lock = if for_update { "FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, ReservationRow>(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations WHERE id = $1 {lock}"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Reservation".to_string()))?;

    row.try_into()
}

async fn save_reservation(conn: &mut PgConnection, reservation: &InventoryReservation) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE inventory_reservations
        SET status = $2, confirmed_at = $3, fulfilled_at = $4, cancelled_at = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(reservation.id)
    .bind(reservation.status.code())
    .bind(reservation.confirmed_at)
    .bind(reservation.fulfilled_at)
    .bind(reservation.cancelled_at)
    .bind(reservation.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

enum Settlement {
    Fulfill,
    Cancel,
}

/// Fulfil or cancel a reservation against its batch.
///
/// Locks product, batch and then the reservation row.
async fn settle_in(
    conn: &mut PgConnection,
    id: Uuid,
    settlement: Settlement,
    now: DateTime<Utc>,
) -> AppResult<InventoryReservation> {
    let batch_id = fetch_reservation(conn, id, false).await?.product_inventory_id;
    let (mut product, before) = lock_batch_with_product(conn, batch_id).await?;
    let mut reservation = fetch_reservation(conn, id, true).await?;
    let previous = reservation.clone();
    let mut batch = before.clone();

    let (movement, event, notes) = match settlement {
        Settlement::Fulfill => (reservation.fulfill(&mut batch, now)?, "fulfilled", "Reservation fulfilled"),
        Settlement::Cancel => (reservation.cancel(&mut batch, now)?, "cancelled", "Reservation cancelled"),
    };

    save_reservation(conn, &reservation).await?;
    persist_batch_change(
        conn,
        &before,
        &mut batch,
        movement,
        Some(TransactionReference::Reservation(reservation.id)),
        Some(notes.to_string()),
        now,
    )
    .await?;
    activity::record(
        conn,
        Activity::new("inventory", "inventory_reservation", reservation.id, event).changes(&previous, &reservation)?,
    )
    .await?;
    update_product_totals(conn, &mut product).await?;

    tracing::info!(
        reservation_id = %reservation.id,
        batch_id = %batch_id,
        quantity = %reservation.quantity,
        event,
        "reservation settled"
    );
    Ok(reservation)
}

pub(crate) async fn cancel_in(conn: &mut PgConnection, id: Uuid, now: DateTime<Utc>) -> AppResult<InventoryReservation> {
    settle_in(conn, id, Settlement::Cancel, now).await
}

/// Cancel every active reservation of an order; returns how many were released
pub(crate) async fn release_for_order(conn: &mut PgConnection, order_id: Uuid, now: DateTime<Utc>) -> AppResult<usize> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM inventory_reservations
        WHERE order_id = $1 AND status IN ('pending', 'confirmed')
        ORDER BY product_id, product_inventory_id, id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    for id in &ids {
        cancel_in(conn, *id, now).await?;
    }
    Ok(ids.len())
}

impl ReservationService {
    /// Create a new ReservationService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<InventoryReservation> {
        let mut conn = self.db.acquire().await?;
        fetch_reservation(&mut conn, id, false).await
    }

    /// Reservations placed for an order, oldest first
    pub async fn list_for_order(&self, order_id: Uuid) -> AppResult<Vec<InventoryReservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations WHERE order_id = $1 ORDER BY created_at, id"
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(InventoryReservation::try_from).collect()
    }

    pub async fn confirm(&self, id: Uuid) -> AppResult<InventoryReservation> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let mut reservation = fetch_reservation(&mut *tx, id, true).await?;
        let previous = reservation.clone();

        if reservation.is_expired(now) {
            return Err(AppError::InvalidStateTransition(format!(
                "reservation {} expired at {}",
                reservation.id, reservation.expires_at
            )));
        }
        reservation.confirm(now)?;

        save_reservation(&mut *tx, &reservation).await?;
        activity::record(
            &mut *tx,
            Activity::new("inventory", "inventory_reservation", reservation.id, "confirmed")
                .changes(&previous, &reservation)?,
        )
        .await?;
        tx.commit().await?;

        Ok(reservation)
    }

    /// Ship a pending or confirmed reservation
    pub async fn fulfill(&self, id: Uuid) -> AppResult<InventoryReservation> {
        let mut tx = self.db.begin().await?;
        let reservation = settle_in(&mut *tx, id, Settlement::Fulfill, Utc::now()).await?;
        tx.commit().await?;
        Ok(reservation)
    }

    pub async fn cancel(&self, id: Uuid) -> AppResult<InventoryReservation> {
        let mut tx = self.db.begin().await?;
        let reservation = cancel_in(&mut *tx, id, Utc::now()).await?;
        tx.commit().await?;
        Ok(reservation)
    }

    /// Cancel active reservations whose expiry has passed.
    ///
    /// Each reservation is cancelled in its own transaction so one failure
    /// does not hold back the rest.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> AppResult<CleanupResult> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM inventory_reservations
            WHERE status IN ('pending', 'confirmed') AND expires_at < $1
            ORDER BY expires_at, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        let mut result = CleanupResult {
            cancelled: 0,
            failed: Vec::new(),
        };

        for id in ids {
            let mut tx = self.db.begin().await?;
            match cancel_in(&mut *tx, id, now).await {
                Ok(_) => {
                    tx.commit().await?;
                    result.cancelled += 1;
                }
                Err(e) => {
                    tracing::warn!(reservation_id = %id, error = %e, "failed to cancel expired reservation");
                    result.failed.push(id);
                }
            }
        }

        tracing::info!(cancelled = result.cancelled, failed = result.failed.len(), "expired reservations swept");
        Ok(result)
    }
}
