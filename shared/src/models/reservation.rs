//! Inventory reservations: holds against a batch for an order item

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lookup::InventoryReservationStatus;
use super::product_inventory::{allocate_fifo, BatchMovement, ProductInventory};
use crate::error::{DomainError, DomainResult};

pub const DEFAULT_RESERVATION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservation {
    pub id: Uuid,
    pub product_inventory_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub quantity: Decimal,
    pub status: InventoryReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Default expiry for a reservation made at `now`
pub fn default_expiry(now: DateTime<Utc>, ttl_hours: i64) -> DateTime<Utc> {
    now + Duration::hours(ttl_hours)
}

/// Reserve on `batch` and build the pending reservation in one step
pub fn reserve_stock(
    batch: &mut ProductInventory,
    quantity: Decimal,
    order_id: Uuid,
    order_item_id: Uuid,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DomainResult<(InventoryReservation, BatchMovement)> {
    if expires_at <= now {
        return Err(DomainError::validation("expires_at", "Expiry must be in the future"));
    }
    let movement = batch.reserve(quantity)?;
    let reservation = InventoryReservation {
        id: Uuid::new_v4(),
        product_inventory_id: batch.id,
        product_id: batch.product_id,
        order_id,
        order_item_id,
        quantity,
        status: InventoryReservationStatus::Pending,
        expires_at,
        confirmed_at: None,
        fulfilled_at: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
    };
    Ok((reservation, movement))
}

/// One batch's share of an order item reservation
#[derive(Debug, Clone)]
pub struct OrderItemHold {
    /// The batch as it was before the hold
    pub before: ProductInventory,
    pub batch: ProductInventory,
    pub reservation: InventoryReservation,
    pub movement: BatchMovement,
}

/// Hold `quantity` for an order item across a product's batches, earliest
/// expiry first. Either every allocation is held or an error is returned.
pub fn reserve_order_item(
    batches: &[ProductInventory],
    quantity: Decimal,
    order_id: Uuid,
    order_item_id: Uuid,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DomainResult<Vec<OrderItemHold>> {
    let allocations = allocate_fifo(batches, quantity, now.date_naive())?;

    allocations
        .into_iter()
        .map(|allocation| {
            let before = batches
                .iter()
                .find(|b| b.id == allocation.product_inventory_id)
                .cloned()
                .ok_or_else(|| DomainError::validation("product_inventory_id", "allocated batch is missing"))?;
            let mut batch = before.clone();
            let (reservation, movement) =
                reserve_stock(&mut batch, allocation.quantity, order_id, order_item_id, expires_at, now)?;
            Ok(OrderItemHold {
                before,
                batch,
                reservation,
                movement,
            })
        })
        .collect()
}

impl InventoryReservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at < now
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != InventoryReservationStatus::Pending {
            return Err(self.transition_error("confirm"));
        }
        self.status = InventoryReservationStatus::Confirmed;
        self.confirmed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Ship the reservation; the batch loses the quantity from both on-hand
    /// and reserved.
    pub fn fulfill(&mut self, batch: &mut ProductInventory, now: DateTime<Utc>) -> DomainResult<BatchMovement> {
        if !self.is_active() {
            return Err(self.transition_error("fulfill"));
        }
        self.ensure_batch(batch)?;
        let movement = batch.fulfill_reserved(self.quantity)?;
        self.status = InventoryReservationStatus::Fulfilled;
        self.fulfilled_at = Some(now);
        self.updated_at = now;
        Ok(movement)
    }

    /// Cancel an active reservation and give its quantity back to the batch
    pub fn cancel(&mut self, batch: &mut ProductInventory, now: DateTime<Utc>) -> DomainResult<BatchMovement> {
        if !self.is_active() {
            return Err(self.transition_error("cancel"));
        }
        self.ensure_batch(batch)?;
        let movement = batch.release(self.quantity)?;
        self.status = InventoryReservationStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(movement)
    }

    fn ensure_batch(&self, batch: &ProductInventory) -> DomainResult<()> {
        if batch.id != self.product_inventory_id {
            return Err(DomainError::validation(
                "product_inventory_id",
                format!("reservation {} does not hold batch {}", self.id, batch.id),
            ));
        }
        Ok(())
    }

    fn transition_error(&self, action: &str) -> DomainError {
        DomainError::InvalidStateTransition(format!(
            "cannot {action} reservation {} in status {}",
            self.id,
            super::lookup::Lookup::code(&self.status)
        ))
    }
}

/// Reservations that a sweep at `now` must cancel
pub fn expired_reservations(reservations: &[InventoryReservation], now: DateTime<Utc>) -> Vec<Uuid> {
    reservations
        .iter()
        .filter(|r| r.is_expired(now))
        .map(|r| r.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product_inventory::{InventoryTransactionType, NewProductInventory};

    fn batch(quantity: i64) -> ProductInventory {
        ProductInventory::create(
            NewProductInventory {
                product_id: Uuid::new_v4(),
                price_variation_id: None,
                batch_number: "RAD-7".to_string(),
                lot_number: None,
                quantity: Decimal::from(quantity),
                cost_per_unit: None,
                expiration_date: None,
                production_date: None,
                location: None,
            },
            Utc::now(),
        )
        .unwrap()
        .0
    }

    fn reserve(b: &mut ProductInventory, quantity: i64) -> InventoryReservation {
        let now = Utc::now();
        reserve_stock(
            b,
            Decimal::from(quantity),
            Uuid::new_v4(),
            Uuid::new_v4(),
            default_expiry(now, DEFAULT_RESERVATION_TTL_HOURS),
            now,
        )
        .unwrap()
        .0
    }

    #[test]
    fn test_reserve_creates_pending_reservation() {
        let mut b = batch(50);
        let reservation = reserve(&mut b, 20);
        assert_eq!(reservation.status, InventoryReservationStatus::Pending);
        assert_eq!(b.reserved_quantity, Decimal::from(20));
        assert!(reservation.expires_at > reservation.created_at + Duration::hours(23));
    }

    #[test]
    fn test_confirm_then_fulfill() {
        let mut b = batch(50);
        let mut reservation = reserve(&mut b, 20);
        reservation.confirm(Utc::now()).unwrap();

        let movement = reservation.fulfill(&mut b, Utc::now()).unwrap();
        assert_eq!(movement.transaction_type, InventoryTransactionType::Sale);
        assert_eq!(movement.quantity, Decimal::from(-20));
        assert_eq!(b.quantity, Decimal::from(30));
        assert_eq!(b.reserved_quantity, Decimal::ZERO);
        assert_eq!(reservation.status, InventoryReservationStatus::Fulfilled);
    }

    #[test]
    fn test_fulfilled_is_final() {
        let mut b = batch(10);
        let mut reservation = reserve(&mut b, 5);
        reservation.fulfill(&mut b, Utc::now()).unwrap();

        assert!(reservation.cancel(&mut b, Utc::now()).is_err());
        assert!(reservation.fulfill(&mut b, Utc::now()).is_err());
        assert!(reservation.confirm(Utc::now()).is_err());
        assert_eq!(b.quantity, Decimal::from(5));
    }

    #[test]
    fn test_cancel_releases_hold() {
        let mut b = batch(10);
        let mut reservation = reserve(&mut b, 6);
        let movement = reservation.cancel(&mut b, Utc::now()).unwrap();
        assert_eq!(movement.transaction_type, InventoryTransactionType::Release);
        assert_eq!(b.reserved_quantity, Decimal::ZERO);
        assert_eq!(b.quantity, Decimal::from(10));
        assert!(reservation.cancel(&mut b, Utc::now()).is_err());
    }

    #[test]
    fn test_confirm_twice_fails() {
        let mut b = batch(10);
        let mut reservation = reserve(&mut b, 1);
        reservation.confirm(Utc::now()).unwrap();
        assert!(reservation.confirm(Utc::now()).is_err());
    }

    #[test]
    fn test_wrong_batch_rejected() {
        let mut b = batch(10);
        let mut other = batch(10);
        let mut reservation = reserve(&mut b, 1);
        assert!(reservation.fulfill(&mut other, Utc::now()).is_err());
        assert!(reservation.is_active());
    }

    #[test]
    fn test_expired_sweep_selection() {
        let mut b = batch(10);
        let mut stale = reserve(&mut b, 1);
        stale.expires_at = Utc::now() - Duration::minutes(5);
        let fresh = reserve(&mut b, 1);
        let mut done = reserve(&mut b, 1);
        done.expires_at = Utc::now() - Duration::minutes(5);
        done.fulfill(&mut b, Utc::now()).unwrap();

        let expired = expired_reservations(&[stale.clone(), fresh, done], Utc::now());
        assert_eq!(expired, vec![stale.id]);
    }

    #[test]
    fn test_past_expiry_rejected() {
        let mut b = batch(10);
        let now = Utc::now();
        let result = reserve_stock(
            &mut b,
            Decimal::ONE,
            Uuid::new_v4(),
            Uuid::new_v4(),
            now - Duration::hours(1),
            now,
        );
        assert!(result.is_err());
        assert_eq!(b.reserved_quantity, Decimal::ZERO);
    }
}
