//! Finished product batches and their stock ledger

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lookup::{BatchStatus, StockStatus};
use super::reference::TransactionReference;
use crate::error::{DomainError, DomainResult};
use crate::validation::{normalize_lot_number, validate_batch_number, validate_positive_quantity};

/// A sellable product; stock figures are aggregates of its batches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub reorder_threshold: Decimal,
    pub total_stock: Decimal,
    pub reserved_stock: Decimal,
    pub stock_status: StockStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub reorder_threshold: Option<Decimal>,
}

impl Product {
    /// A new product starts with no batches and is out of stock
    pub fn create(input: NewProduct, default_threshold: Decimal, now: DateTime<Utc>) -> DomainResult<Self> {
        crate::validation::validate_name("name", &input.name)?;
        let reorder_threshold = input.reorder_threshold.unwrap_or(default_threshold);
        crate::validation::validate_non_negative("reorder_threshold", reorder_threshold)?;

        Ok(Product {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            sku: input
                .sku
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty()),
            reorder_threshold,
            total_stock: Decimal::ZERO,
            reserved_stock: Decimal::ZERO,
            stock_status: StockStatus::OutOfStock,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn available_stock(&self) -> Decimal {
        (self.total_stock - self.reserved_stock).max(Decimal::ZERO)
    }

    /// Copy recomputed batch totals onto the product
    pub fn apply_summary(&mut self, summary: &ProductStockSummary, now: DateTime<Utc>) {
        self.total_stock = summary.total_stock;
        self.reserved_stock = summary.reserved_stock;
        self.stock_status = summary.stock_status;
        self.updated_at = now;
    }
}

/// A lot/batch of finished product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInventory {
    pub id: Uuid,
    pub product_id: Uuid,
    pub price_variation_id: Option<Uuid>,
    pub batch_number: String,
    pub lot_number: Option<String>,
    pub quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub cost_per_unit: Decimal,
    pub expiration_date: Option<NaiveDate>,
    pub production_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub status: BatchStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a batch
#[derive(Debug, Clone, Deserialize)]
pub struct NewProductInventory {
    pub product_id: Uuid,
    pub price_variation_id: Option<Uuid>,
    pub batch_number: String,
    pub lot_number: Option<String>,
    pub quantity: Decimal,
    pub cost_per_unit: Option<Decimal>,
    pub expiration_date: Option<NaiveDate>,
    pub production_date: Option<NaiveDate>,
    pub location: Option<String>,
}

/// Kinds of product ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryTransactionType {
    Production,
    Purchase,
    Sale,
    Return,
    Adjustment,
    Damage,
    Expiration,
    Transfer,
    Reservation,
    Release,
}

impl InventoryTransactionType {
    pub const ALL: [InventoryTransactionType; 10] = [
        InventoryTransactionType::Production,
        InventoryTransactionType::Purchase,
        InventoryTransactionType::Sale,
        InventoryTransactionType::Return,
        InventoryTransactionType::Adjustment,
        InventoryTransactionType::Damage,
        InventoryTransactionType::Expiration,
        InventoryTransactionType::Transfer,
        InventoryTransactionType::Reservation,
        InventoryTransactionType::Release,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryTransactionType::Production => "production",
            InventoryTransactionType::Purchase => "purchase",
            InventoryTransactionType::Sale => "sale",
            InventoryTransactionType::Return => "return",
            InventoryTransactionType::Adjustment => "adjustment",
            InventoryTransactionType::Damage => "damage",
            InventoryTransactionType::Expiration => "expiration",
            InventoryTransactionType::Transfer => "transfer",
            InventoryTransactionType::Reservation => "reservation",
            InventoryTransactionType::Release => "release",
        }
    }

    /// Reservation and release entries record holds, not on-hand movement
    pub fn affects_on_hand(&self) -> bool {
        !matches!(
            self,
            InventoryTransactionType::Reservation | InventoryTransactionType::Release
        )
    }

    /// Types accepted by `add_stock`
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            InventoryTransactionType::Production
                | InventoryTransactionType::Purchase
                | InventoryTransactionType::Return
                | InventoryTransactionType::Adjustment
                | InventoryTransactionType::Transfer
        )
    }

    /// Types accepted by `remove_stock`
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            InventoryTransactionType::Sale
                | InventoryTransactionType::Damage
                | InventoryTransactionType::Expiration
                | InventoryTransactionType::Adjustment
                | InventoryTransactionType::Transfer
        )
    }
}

impl std::str::FromStr for InventoryTransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::UnknownCode {
                kind: "inventory_transaction_type",
                code: s.to_string(),
            })
    }
}

/// A persisted product ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub product_inventory_id: Uuid,
    pub product_id: Uuid,
    pub transaction_type: InventoryTransactionType,
    pub quantity: Decimal,
    pub balance_after: Decimal,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub reference: Option<TransactionReference>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A batch movement produced by a stock operation, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMovement {
    pub transaction_type: InventoryTransactionType,
    /// Signed for on-hand movements; the held amount for reservation/release
    pub quantity: Decimal,
    /// On-hand quantity of the batch after the movement
    pub balance_after: Decimal,
    pub unit_cost: Option<Decimal>,
}

impl BatchMovement {
    pub fn total_cost(&self) -> Option<Decimal> {
        self.unit_cost.map(|cost| cost * self.quantity.abs())
    }

    pub fn into_transaction(
        self,
        batch: &ProductInventory,
        reference: Option<TransactionReference>,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> InventoryTransaction {
        InventoryTransaction {
            id: Uuid::new_v4(),
            product_inventory_id: batch.id,
            product_id: batch.product_id,
            transaction_type: self.transaction_type,
            quantity: self.quantity,
            balance_after: self.balance_after,
            total_cost: self.total_cost(),
            unit_cost: self.unit_cost,
            reference,
            notes,
            created_at,
        }
    }
}

impl ProductInventory {
    /// Build a batch from input; the opening quantity is returned as a production movement
    pub fn create(input: NewProductInventory, now: DateTime<Utc>) -> DomainResult<(Self, Option<BatchMovement>)> {
        validate_batch_number(&input.batch_number)?;
        crate::validation::validate_non_negative("quantity", input.quantity)?;
        let cost_per_unit = input.cost_per_unit.unwrap_or(Decimal::ZERO);
        crate::validation::validate_non_negative("cost_per_unit", cost_per_unit)?;

        let mut batch = ProductInventory {
            id: Uuid::new_v4(),
            product_id: input.product_id,
            price_variation_id: input.price_variation_id,
            batch_number: input.batch_number.trim().to_uppercase(),
            lot_number: normalize_lot_number(input.lot_number.as_deref()),
            quantity: Decimal::ZERO,
            reserved_quantity: Decimal::ZERO,
            cost_per_unit,
            expiration_date: input.expiration_date,
            production_date: input.production_date,
            location: input.location,
            status: BatchStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let opening = if input.quantity > Decimal::ZERO {
            Some(batch.add_stock(input.quantity, InventoryTransactionType::Production, Some(cost_per_unit))?)
        } else {
            None
        };

        Ok((batch, opening))
    }

    /// Create a batch that must open with stock, checked before anything is built
    pub fn open(input: NewProductInventory, now: DateTime<Utc>) -> DomainResult<(Self, BatchMovement)> {
        validate_positive_quantity("quantity", input.quantity)?;
        let (batch, opening) = Self::create(input, now)?;
        let movement =
            opening.ok_or_else(|| DomainError::invalid_quantity("quantity", "must be greater than zero"))?;
        Ok((batch, movement))
    }

    /// Quantity not held by a reservation
    pub fn available_quantity(&self) -> Decimal {
        (self.quantity - self.reserved_quantity).max(Decimal::ZERO)
    }

    pub fn is_active(&self) -> bool {
        self.status == BatchStatus::Active
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiration_date.map(|d| d < today).unwrap_or(false)
    }

    pub fn value(&self) -> Decimal {
        self.quantity * self.cost_per_unit
    }

    pub fn add_stock(
        &mut self,
        quantity: Decimal,
        transaction_type: InventoryTransactionType,
        unit_cost: Option<Decimal>,
    ) -> DomainResult<BatchMovement> {
        validate_positive_quantity("quantity", quantity)?;
        self.ensure_not_deleted()?;
        if !transaction_type.is_inbound() {
            return Err(DomainError::validation(
                "transaction_type",
                format!("{} cannot add stock", transaction_type.as_str()),
            ));
        }

        self.quantity += quantity;
        if self.status == BatchStatus::Depleted {
            self.status = BatchStatus::Active;
        }
        self.version += 1;

        Ok(BatchMovement {
            transaction_type,
            quantity,
            balance_after: self.quantity,
            unit_cost: unit_cost.or(Some(self.cost_per_unit)),
        })
    }

    /// Take unreserved stock out of the batch
    pub fn remove_stock(
        &mut self,
        quantity: Decimal,
        transaction_type: InventoryTransactionType,
    ) -> DomainResult<BatchMovement> {
        validate_positive_quantity("quantity", quantity)?;
        if !transaction_type.is_outbound() {
            return Err(DomainError::validation(
                "transaction_type",
                format!("{} cannot remove stock", transaction_type.as_str()),
            ));
        }
        self.ensure_available(quantity)?;

        self.quantity -= quantity;
        self.mark_depleted_if_empty();
        self.version += 1;

        Ok(BatchMovement {
            transaction_type,
            quantity: -quantity,
            balance_after: self.quantity,
            unit_cost: Some(self.cost_per_unit),
        })
    }

    /// Put a hold on available stock
    pub fn reserve(&mut self, quantity: Decimal) -> DomainResult<BatchMovement> {
        validate_positive_quantity("quantity", quantity)?;
        if !self.is_active() {
            return Err(DomainError::InvalidStateTransition(format!(
                "batch {} is {} and cannot be reserved",
                self.batch_number, self.status
            )));
        }
        self.ensure_available(quantity)?;

        self.reserved_quantity += quantity;
        self.version += 1;

        Ok(BatchMovement {
            transaction_type: InventoryTransactionType::Reservation,
            quantity,
            balance_after: self.quantity,
            unit_cost: None,
        })
    }

    /// Drop a hold; the reserved quantity never goes below zero
    pub fn release(&mut self, quantity: Decimal) -> DomainResult<BatchMovement> {
        validate_positive_quantity("quantity", quantity)?;
        let released = quantity.min(self.reserved_quantity);
        self.reserved_quantity -= released;
        self.version += 1;

        Ok(BatchMovement {
            transaction_type: InventoryTransactionType::Release,
            quantity: released,
            balance_after: self.quantity,
            unit_cost: None,
        })
    }

    /// Ship a held quantity: both on-hand and reserved drop by `quantity`
    pub fn fulfill_reserved(&mut self, quantity: Decimal) -> DomainResult<BatchMovement> {
        validate_positive_quantity("quantity", quantity)?;
        if quantity > self.reserved_quantity || quantity > self.quantity {
            return Err(DomainError::InsufficientStock {
                requested: quantity,
                available: self.reserved_quantity.min(self.quantity),
            });
        }

        self.reserved_quantity -= quantity;
        self.quantity -= quantity;
        self.mark_depleted_if_empty();
        self.version += 1;

        Ok(BatchMovement {
            transaction_type: InventoryTransactionType::Sale,
            quantity: -quantity,
            balance_after: self.quantity,
            unit_cost: Some(self.cost_per_unit),
        })
    }

    /// Write off whatever is left of an expired batch
    pub fn expire(&mut self) -> DomainResult<Option<BatchMovement>> {
        self.ensure_not_deleted()?;
        if self.reserved_quantity > Decimal::ZERO {
            return Err(DomainError::InvalidStateTransition(format!(
                "batch {} still has {} reserved",
                self.batch_number, self.reserved_quantity
            )));
        }
        let remaining = self.quantity;
        self.status = BatchStatus::Expired;
        self.version += 1;
        if remaining.is_zero() {
            return Ok(None);
        }
        self.quantity = Decimal::ZERO;
        Ok(Some(BatchMovement {
            transaction_type: InventoryTransactionType::Expiration,
            quantity: -remaining,
            balance_after: Decimal::ZERO,
            unit_cost: Some(self.cost_per_unit),
        }))
    }

    /// Batches holding stock or reservations cannot be deleted
    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if !self.quantity.is_zero() || !self.reserved_quantity.is_zero() {
            return Err(DomainError::NonEmptyBatch {
                batch_number: self.batch_number.clone(),
                quantity: self.quantity,
                reserved: self.reserved_quantity,
            });
        }
        Ok(())
    }

    /// Retire an empty batch. The row stays so its ledger and reservation
    /// history keep pointing at it.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_deleted()?;
        self.ensure_deletable()?;
        self.status = BatchStatus::Deleted;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.status == BatchStatus::Deleted
    }

    fn ensure_not_deleted(&self) -> DomainResult<()> {
        if self.is_deleted() {
            return Err(DomainError::InvalidStateTransition(format!(
                "batch {} has been deleted",
                self.batch_number
            )));
        }
        Ok(())
    }

    fn ensure_available(&self, quantity: Decimal) -> DomainResult<()> {
        let available = self.available_quantity();
        if quantity > available {
            return Err(DomainError::InsufficientStock {
                requested: quantity,
                available,
            });
        }
        Ok(())
    }

    fn mark_depleted_if_empty(&mut self) {
        if self.quantity.is_zero() && self.status == BatchStatus::Active {
            self.status = BatchStatus::Depleted;
        }
    }
}

/// Product level totals derived from batches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductStockSummary {
    pub total_stock: Decimal,
    pub reserved_stock: Decimal,
    pub available_stock: Decimal,
    pub stock_status: StockStatus,
    pub active_batches: usize,
}

impl ProductStockSummary {
    /// Recompute totals over the active batches of one product
    pub fn from_batches<'a, I>(batches: I, reorder_threshold: Decimal) -> Self
    where
        I: IntoIterator<Item = &'a ProductInventory>,
    {
        let mut total_stock = Decimal::ZERO;
        let mut reserved_stock = Decimal::ZERO;
        let mut active_batches = 0;

        for batch in batches.into_iter().filter(|b| b.is_active()) {
            total_stock += batch.quantity;
            reserved_stock += batch.reserved_quantity;
            active_batches += 1;
        }

        let available_stock = (total_stock - reserved_stock).max(Decimal::ZERO);
        Self {
            total_stock,
            reserved_stock,
            available_stock,
            stock_status: stock_status_for(available_stock, reorder_threshold),
            active_batches,
        }
    }
}

pub fn stock_status_for(available: Decimal, reorder_threshold: Decimal) -> StockStatus {
    if available <= Decimal::ZERO {
        StockStatus::OutOfStock
    } else if available <= reorder_threshold {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}

/// Portion of a request taken from one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub product_inventory_id: Uuid,
    pub quantity: Decimal,
}

/// Spread `quantity` over batches, earliest expiration first.
///
/// Batches without an expiration date go last, ties fall back to production
/// date and then creation time. Expired and inactive batches are skipped.
pub fn allocate_fifo(
    batches: &[ProductInventory],
    quantity: Decimal,
    today: NaiveDate,
) -> DomainResult<Vec<Allocation>> {
    validate_positive_quantity("quantity", quantity)?;

    let mut candidates: Vec<&ProductInventory> = batches
        .iter()
        .filter(|b| b.is_active() && !b.is_expired(today) && b.available_quantity() > Decimal::ZERO)
        .collect();

    candidates.sort_by(|a, b| {
        let key = |batch: &ProductInventory| {
            (
                batch.expiration_date.is_none(),
                batch.expiration_date,
                batch.production_date.is_none(),
                batch.production_date,
                batch.created_at,
            )
        };
        key(a).cmp(&key(b))
    });

    let available: Decimal = candidates.iter().map(|b| b.available_quantity()).sum();
    if available < quantity {
        return Err(DomainError::InsufficientStock {
            requested: quantity,
            available,
        });
    }

    let mut remaining = quantity;
    let mut allocations = Vec::new();
    for batch in candidates {
        if remaining.is_zero() {
            break;
        }
        let take = batch.available_quantity().min(remaining);
        allocations.push(Allocation {
            product_inventory_id: batch.id,
            quantity: take,
        });
        remaining -= take;
    }

    Ok(allocations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn batch(quantity: i64) -> ProductInventory {
        let (batch, _) = ProductInventory::create(
            NewProductInventory {
                product_id: Uuid::new_v4(),
                price_variation_id: None,
                batch_number: "sun-001".to_string(),
                lot_number: None,
                quantity: Decimal::from(quantity),
                cost_per_unit: Some(Decimal::new(250, 2)),
                expiration_date: None,
                production_date: None,
                location: None,
            },
            Utc::now(),
        )
        .unwrap();
        batch
    }

    #[test]
    fn test_create_uppercases_batch_number() {
        assert_eq!(batch(1).batch_number, "SUN-001");
    }

    #[test]
    fn test_transaction_type_parses_stored_codes() {
        for t in InventoryTransactionType::ALL {
            assert_eq!(t.as_str().parse::<InventoryTransactionType>(), Ok(t));
        }
        assert_eq!(
            "gift".parse::<InventoryTransactionType>(),
            Err(DomainError::UnknownCode {
                kind: "inventory_transaction_type",
                code: "gift".to_string(),
            })
        );
    }

    #[test]
    fn test_product_applies_summary() {
        let mut product = Product::create(
            NewProduct {
                name: "Sunflower Shoots 100g".to_string(),
                sku: Some(" sun-100 ".to_string()),
                reorder_threshold: None,
            },
            Decimal::from(10),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(product.sku.as_deref(), Some("SUN-100"));
        assert_eq!(product.stock_status, StockStatus::OutOfStock);

        let mut b = batch(25);
        b.reserve(Decimal::from(20)).unwrap();
        let summary = ProductStockSummary::from_batches([&b], product.reorder_threshold);
        product.apply_summary(&summary, Utc::now());
        assert_eq!(product.total_stock, Decimal::from(25));
        assert_eq!(product.available_stock(), Decimal::from(5));
        assert_eq!(product.stock_status, StockStatus::LowStock);
    }

    #[test]
    fn test_reserve_scenario() {
        let mut b = batch(50);
        let movement = b.reserve(Decimal::from(20)).unwrap();
        assert_eq!(b.reserved_quantity, Decimal::from(20));
        assert_eq!(b.available_quantity(), Decimal::from(30));
        assert_eq!(movement.transaction_type, InventoryTransactionType::Reservation);
        assert_eq!(movement.quantity, Decimal::from(20));
        assert_eq!(movement.balance_after, Decimal::from(50));
    }

    #[test]
    fn test_over_reserve_leaves_state_unchanged() {
        let mut b = batch(50);
        b.reserve(Decimal::from(40)).unwrap();
        let before = (b.quantity, b.reserved_quantity, b.version);
        assert!(b.reserve(Decimal::from(11)).is_err());
        assert_eq!((b.quantity, b.reserved_quantity, b.version), before);
    }

    #[test]
    fn test_remove_respects_reservations() {
        let mut b = batch(50);
        b.reserve(Decimal::from(45)).unwrap();
        assert!(b.remove_stock(Decimal::from(6), InventoryTransactionType::Damage).is_err());
        let movement = b.remove_stock(Decimal::from(5), InventoryTransactionType::Damage).unwrap();
        assert_eq!(movement.quantity, Decimal::from(-5));
        assert_eq!(b.quantity, Decimal::from(45));
    }

    #[test]
    fn test_remove_rejects_inbound_type() {
        let mut b = batch(5);
        assert!(b.remove_stock(Decimal::ONE, InventoryTransactionType::Production).is_err());
    }

    #[test]
    fn test_release_floors_at_zero() {
        let mut b = batch(10);
        b.reserve(Decimal::from(3)).unwrap();
        let movement = b.release(Decimal::from(5)).unwrap();
        assert_eq!(movement.quantity, Decimal::from(3));
        assert_eq!(b.reserved_quantity, Decimal::ZERO);
    }

    #[test]
    fn test_depleted_and_reactivated() {
        let mut b = batch(2);
        b.remove_stock(Decimal::from(2), InventoryTransactionType::Sale).unwrap();
        assert_eq!(b.status, BatchStatus::Depleted);
        b.add_stock(Decimal::ONE, InventoryTransactionType::Return, None).unwrap();
        assert_eq!(b.status, BatchStatus::Active);
    }

    #[test]
    fn test_ensure_deletable() {
        let mut b = batch(3);
        assert!(matches!(b.ensure_deletable(), Err(DomainError::NonEmptyBatch { .. })));
        b.remove_stock(Decimal::from(3), InventoryTransactionType::Adjustment).unwrap();
        assert!(b.ensure_deletable().is_ok());
    }

    #[test]
    fn test_expire_writes_off_remaining() {
        let mut b = batch(4);
        let movement = b.expire().unwrap().unwrap();
        assert_eq!(movement.quantity, Decimal::from(-4));
        assert_eq!(b.status, BatchStatus::Expired);
    }

    #[test]
    fn test_summary_ignores_inactive_batches() {
        let mut a = batch(30);
        a.reserve(Decimal::from(10)).unwrap();
        let mut b = batch(5);
        b.status = BatchStatus::Damaged;

        let summary = ProductStockSummary::from_batches([&a, &b], Decimal::from(25));
        assert_eq!(summary.total_stock, Decimal::from(30));
        assert_eq!(summary.reserved_stock, Decimal::from(10));
        assert_eq!(summary.available_stock, Decimal::from(20));
        assert_eq!(summary.stock_status, StockStatus::LowStock);
        assert_eq!(summary.active_batches, 1);
    }

    #[test]
    fn test_stock_status_for() {
        assert_eq!(stock_status_for(Decimal::ZERO, Decimal::from(5)), StockStatus::OutOfStock);
        assert_eq!(stock_status_for(Decimal::from(5), Decimal::from(5)), StockStatus::LowStock);
        assert_eq!(stock_status_for(Decimal::from(6), Decimal::from(5)), StockStatus::InStock);
    }

    #[test]
    fn test_allocate_fifo_prefers_earliest_expiration() {
        let today = Utc::now().date_naive();
        let mut late = batch(10);
        late.expiration_date = Some(today + Duration::days(10));
        let mut soon = batch(10);
        soon.expiration_date = Some(today + Duration::days(2));
        let undated = batch(10);

        let batches = vec![undated.clone(), late.clone(), soon.clone()];
        let allocations = allocate_fifo(&batches, Decimal::from(15), today).unwrap();
        assert_eq!(
            allocations,
            vec![
                Allocation { product_inventory_id: soon.id, quantity: Decimal::from(10) },
                Allocation { product_inventory_id: late.id, quantity: Decimal::from(5) },
            ]
        );
    }

    #[test]
    fn test_allocate_fifo_skips_expired() {
        let today = Utc::now().date_naive();
        let mut expired = batch(10);
        expired.expiration_date = Some(today - Duration::days(1));
        let fresh = batch(4);

        let err = allocate_fifo(&[expired, fresh], Decimal::from(5), today).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                requested: Decimal::from(5),
                available: Decimal::from(4),
            }
        );
    }
}
