//! Consumable stock and its transaction ledger
//!
//! Every consumable owns an append-only ledger that opens with an `initial`
//! entry. The `initial_stock`, `consumed_quantity` and `total_quantity` fields
//! are a materialized view of that ledger, updated by the same call that
//! produces each entry, so both ways of reading stock always agree.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lookup::{ConsumableType, Lookup};
use super::reference::TransactionReference;
use super::units::{convert, format_quantity, ConsumableUnit, UnitDimension};
use crate::error::{DomainError, DomainResult};
use crate::validation::{normalize_lot_number, validate_positive_quantity};

/// A stock-keeping unit of seed, soil, packaging or other supplies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumable {
    pub id: Uuid,
    pub name: String,
    pub consumable_type: ConsumableType,
    pub supplier_id: Option<Uuid>,
    pub quantity_unit: ConsumableUnit,
    pub initial_stock: Decimal,
    pub consumed_quantity: Decimal,
    /// Running balance; for seeds this is the figure operators work from
    pub total_quantity: Decimal,
    pub restock_threshold: Decimal,
    pub restock_quantity: Decimal,
    pub cost_per_unit: Option<Decimal>,
    pub lot_no: Option<String>,
    pub is_active: bool,
    /// Bumped on every ledger append
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for receiving a new consumable
#[derive(Debug, Clone, Deserialize)]
pub struct NewConsumable {
    pub name: String,
    pub consumable_type: ConsumableType,
    pub supplier_id: Option<Uuid>,
    pub quantity_unit: ConsumableUnit,
    pub initial_stock: Decimal,
    pub restock_threshold: Option<Decimal>,
    pub restock_quantity: Option<Decimal>,
    pub cost_per_unit: Option<Decimal>,
    pub lot_no: Option<String>,
}

/// Kinds of consumable ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumableTransactionType {
    Initial,
    Consumption,
    Addition,
    Adjustment,
    Waste,
    Expiration,
    TransferIn,
    TransferOut,
}

impl ConsumableTransactionType {
    pub const ALL: [ConsumableTransactionType; 8] = [
        ConsumableTransactionType::Initial,
        ConsumableTransactionType::Consumption,
        ConsumableTransactionType::Addition,
        ConsumableTransactionType::Adjustment,
        ConsumableTransactionType::Waste,
        ConsumableTransactionType::Expiration,
        ConsumableTransactionType::TransferIn,
        ConsumableTransactionType::TransferOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumableTransactionType::Initial => "initial",
            ConsumableTransactionType::Consumption => "consumption",
            ConsumableTransactionType::Addition => "addition",
            ConsumableTransactionType::Adjustment => "adjustment",
            ConsumableTransactionType::Waste => "waste",
            ConsumableTransactionType::Expiration => "expiration",
            ConsumableTransactionType::TransferIn => "transfer_in",
            ConsumableTransactionType::TransferOut => "transfer_out",
        }
    }

    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            ConsumableTransactionType::Consumption
                | ConsumableTransactionType::Waste
                | ConsumableTransactionType::Expiration
                | ConsumableTransactionType::TransferOut
        )
    }

    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            ConsumableTransactionType::Initial
                | ConsumableTransactionType::Addition
                | ConsumableTransactionType::TransferIn
        )
    }

    /// Outbound entries are negative, inbound positive, adjustments any non-zero
    pub fn validate_sign(&self, quantity: Decimal) -> DomainResult<()> {
        let ok = if self.is_outbound() {
            quantity < Decimal::ZERO
        } else if self.is_inbound() {
            quantity > Decimal::ZERO
        } else {
            !quantity.is_zero()
        };

        if ok {
            Ok(())
        } else {
            Err(DomainError::invalid_quantity(
                "quantity",
                format!("{quantity} has the wrong sign for a {} entry", self.as_str()),
            ))
        }
    }
}

impl std::str::FromStr for ConsumableTransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::UnknownCode {
                kind: "consumable_transaction_type",
                code: s.to_string(),
            })
    }
}

/// A persisted ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumableTransaction {
    pub id: Uuid,
    pub consumable_id: Uuid,
    pub transaction_type: ConsumableTransactionType,
    /// Signed: negative for stock leaving, positive for stock arriving
    pub quantity: Decimal,
    pub balance_after: Decimal,
    pub unit: ConsumableUnit,
    pub reference: Option<TransactionReference>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A ledger entry produced by a stock operation, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub transaction_type: ConsumableTransactionType,
    pub quantity: Decimal,
    pub balance_after: Decimal,
    pub unit: ConsumableUnit,
    pub reference: Option<TransactionReference>,
    pub notes: Option<String>,
}

impl LedgerEntry {
    pub fn into_transaction(self, consumable_id: Uuid, created_at: DateTime<Utc>) -> ConsumableTransaction {
        ConsumableTransaction {
            id: Uuid::new_v4(),
            consumable_id,
            transaction_type: self.transaction_type,
            quantity: self.quantity,
            balance_after: self.balance_after,
            unit: self.unit,
            reference: self.reference,
            notes: self.notes,
            created_at,
        }
    }
}

/// Outcome of [`Consumable::add`]
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// Stock merged into this record
    Merged(LedgerEntry),
    /// The lot number differs; the caller must receive a separate lot record
    NewLotRequired { lot_no: String },
}

impl AddOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, AddOutcome::Merged(_))
    }
}

/// Outcome of [`Consumable::seed_draw`], amounts in the seed's own unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedDraw {
    Deduct(Decimal),
    /// Not enough seed on hand; planting goes ahead without a deduction
    Short { required: Decimal, available: Decimal },
    /// Rounds to nothing in the seed's unit
    Nothing,
}

impl Consumable {
    /// Build a consumable from receipt input, with its opening ledger entry
    pub fn receive(input: NewConsumable, now: DateTime<Utc>) -> DomainResult<(Self, Option<LedgerEntry>)> {
        crate::validation::validate_name("name", &input.name)?;
        crate::validation::validate_non_negative("initial_stock", input.initial_stock)?;
        let restock_threshold = input.restock_threshold.unwrap_or(Decimal::ZERO);
        let restock_quantity = input.restock_quantity.unwrap_or(Decimal::ZERO);
        crate::validation::validate_non_negative("restock_threshold", restock_threshold)?;
        crate::validation::validate_non_negative("restock_quantity", restock_quantity)?;

        let mut consumable = Consumable {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            consumable_type: input.consumable_type,
            supplier_id: input.supplier_id,
            quantity_unit: input.quantity_unit,
            initial_stock: Decimal::ZERO,
            consumed_quantity: Decimal::ZERO,
            total_quantity: Decimal::ZERO,
            restock_threshold,
            restock_quantity,
            cost_per_unit: input.cost_per_unit,
            lot_no: normalize_lot_number(input.lot_no.as_deref()),
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let opening = if input.initial_stock > Decimal::ZERO {
            Some(consumable.apply(
                ConsumableTransactionType::Initial,
                input.initial_stock,
                None,
                Some("Opening balance".to_string()),
            )?)
        } else {
            None
        };

        Ok((consumable, opening))
    }

    /// Set the lot number, normalized to uppercase
    pub fn set_lot_no(&mut self, lot_no: Option<&str>) {
        self.lot_no = normalize_lot_number(lot_no);
    }

    pub fn is_seed(&self) -> bool {
        self.consumable_type.is_seed()
    }

    /// Stock on hand in `quantity_unit`
    pub fn current_stock(&self) -> Decimal {
        if self.is_seed() {
            self.total_quantity
        } else {
            (self.initial_stock - self.consumed_quantity).max(Decimal::ZERO)
        }
    }

    pub fn needs_restock(&self) -> bool {
        self.current_stock() <= self.restock_threshold
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.current_stock() <= Decimal::ZERO
    }

    /// Quantity to reorder when below threshold
    pub fn restock_suggestion(&self) -> Option<Decimal> {
        if !self.needs_restock() {
            return None;
        }
        let shortfall = self.restock_threshold - self.current_stock();
        Some(self.restock_quantity.max(shortfall))
    }

    pub fn formatted_stock(&self) -> String {
        format_quantity(self.current_stock(), self.quantity_unit)
    }

    /// Convert an amount given in `unit` into this consumable's unit.
    ///
    /// Seeds are always counted in their own unit and skip conversion.
    pub fn to_stock_unit(&self, amount: Decimal, unit: Option<ConsumableUnit>) -> DomainResult<Decimal> {
        match unit {
            Some(unit) if !self.is_seed() => convert(amount, unit, self.quantity_unit),
            _ => Ok(amount),
        }
    }

    /// A recipe's seed must be a seed consumable weighed in some weight unit
    pub fn ensure_recipe_seed(&self) -> DomainResult<()> {
        if !self.is_seed() {
            return Err(DomainError::validation(
                "seed_consumable_id",
                format!("{} is not a seed consumable", self.name),
            ));
        }
        if self.quantity_unit.dimension() != UnitDimension::Weight {
            return Err(DomainError::validation(
                "seed_consumable_id",
                format!("{} must be stocked by weight, not {}", self.name, self.quantity_unit.code()),
            ));
        }
        Ok(())
    }

    /// How much of this seed planting `grams` needs, in `quantity_unit`.
    ///
    /// Recipe densities are grams, so this converts even though manual seed
    /// deductions do not. Seed counted in a non-weight unit cannot be drawn.
    pub fn seed_draw(&self, grams: Decimal) -> DomainResult<SeedDraw> {
        self.ensure_recipe_seed()?;
        let required = convert(grams, ConsumableUnit::Grams, self.quantity_unit)?;
        let available = self.current_stock();
        if required <= Decimal::ZERO {
            return Ok(SeedDraw::Nothing);
        }
        if required > available {
            return Ok(SeedDraw::Short { required, available });
        }
        Ok(SeedDraw::Deduct(required))
    }

    /// Remove stock, converting from `unit` when given
    pub fn deduct(&mut self, amount: Decimal, unit: Option<ConsumableUnit>) -> DomainResult<LedgerEntry> {
        validate_positive_quantity("amount", amount)?;
        let amount = self.to_stock_unit(amount, unit)?;
        self.record_consumption(amount, None, None)
    }

    /// Receive more stock into this lot.
    ///
    /// A lot number that differs from the current lot is not merged.
    pub fn add(
        &mut self,
        amount: Decimal,
        unit: Option<ConsumableUnit>,
        lot_no: Option<&str>,
    ) -> DomainResult<AddOutcome> {
        validate_positive_quantity("amount", amount)?;
        if let Some(lot_no) = normalize_lot_number(lot_no) {
            if self.lot_no.as_deref() != Some(lot_no.as_str()) {
                return Ok(AddOutcome::NewLotRequired { lot_no });
            }
        }
        let amount = self.to_stock_unit(amount, unit)?;
        let entry = self.record_addition(amount, None, None)?;
        Ok(AddOutcome::Merged(entry))
    }

    pub fn record_consumption(
        &mut self,
        amount: Decimal,
        reference: Option<TransactionReference>,
        notes: Option<String>,
    ) -> DomainResult<LedgerEntry> {
        validate_positive_quantity("amount", amount)?;
        self.apply(ConsumableTransactionType::Consumption, -amount, reference, notes)
    }

    pub fn record_addition(
        &mut self,
        amount: Decimal,
        reference: Option<TransactionReference>,
        notes: Option<String>,
    ) -> DomainResult<LedgerEntry> {
        validate_positive_quantity("amount", amount)?;
        self.apply(ConsumableTransactionType::Addition, amount, reference, notes)
    }

    pub fn record_waste(&mut self, amount: Decimal, notes: Option<String>) -> DomainResult<LedgerEntry> {
        validate_positive_quantity("amount", amount)?;
        self.apply(ConsumableTransactionType::Waste, -amount, None, notes)
    }

    pub fn record_expiration(&mut self, amount: Decimal, notes: Option<String>) -> DomainResult<LedgerEntry> {
        validate_positive_quantity("amount", amount)?;
        self.apply(ConsumableTransactionType::Expiration, -amount, None, notes)
    }

    /// Signed correction after a stock count
    pub fn record_adjustment(&mut self, delta: Decimal, reason: String) -> DomainResult<LedgerEntry> {
        self.apply(ConsumableTransactionType::Adjustment, delta, None, Some(reason))
    }

    pub fn record_transfer_out(
        &mut self,
        amount: Decimal,
        reference: Option<TransactionReference>,
        notes: Option<String>,
    ) -> DomainResult<LedgerEntry> {
        validate_positive_quantity("amount", amount)?;
        self.apply(ConsumableTransactionType::TransferOut, -amount, reference, notes)
    }

    pub fn record_transfer_in(
        &mut self,
        amount: Decimal,
        reference: Option<TransactionReference>,
        notes: Option<String>,
    ) -> DomainResult<LedgerEntry> {
        validate_positive_quantity("amount", amount)?;
        self.apply(ConsumableTransactionType::TransferIn, amount, reference, notes)
    }

    /// Append one signed entry and refresh the materialized fields.
    ///
    /// Nothing changes when the entry is rejected.
    fn apply(
        &mut self,
        transaction_type: ConsumableTransactionType,
        quantity: Decimal,
        reference: Option<TransactionReference>,
        notes: Option<String>,
    ) -> DomainResult<LedgerEntry> {
        transaction_type.validate_sign(quantity)?;

        let available = self.current_stock();
        if quantity < Decimal::ZERO && -quantity > available {
            return Err(DomainError::InsufficientStock {
                requested: -quantity,
                available,
            });
        }

        if quantity > Decimal::ZERO {
            self.initial_stock += quantity;
        } else {
            self.consumed_quantity += -quantity;
        }
        self.total_quantity = available + quantity;
        self.version += 1;

        Ok(LedgerEntry {
            transaction_type,
            quantity,
            balance_after: self.total_quantity,
            unit: self.quantity_unit,
            reference,
            notes,
        })
    }
}

/// Balance implied by a ledger, floored at zero
pub fn current_stock_from_transactions<'a, I>(quantities: I) -> Decimal
where
    I: IntoIterator<Item = &'a Decimal>,
{
    quantities
        .into_iter()
        .fold(Decimal::ZERO, |acc, q| acc + q)
        .max(Decimal::ZERO)
}

/// Replay a ledger and check every `balance_after` snapshot
pub fn verify_ledger(transactions: &[ConsumableTransaction]) -> DomainResult<Decimal> {
    let mut balance = Decimal::ZERO;
    for tx in transactions {
        tx.transaction_type.validate_sign(tx.quantity)?;
        balance += tx.quantity;
        if balance != tx.balance_after {
            return Err(DomainError::validation(
                "balance_after",
                format!(
                    "ledger entry {} records {} but replay gives {}",
                    tx.id, tx.balance_after, balance
                ),
            ));
        }
    }
    Ok(balance)
}

/// Display label for a consumable type and unit pair, e.g. `"Seed (g)"`
pub fn type_label(consumable_type: ConsumableType, unit: ConsumableUnit) -> String {
    format!("{} ({})", consumable_type.name(), unit.code())
}
