//! Product inventory service: batches, their ledger and product totals
//!
//! Lock order is always product row first, then batch rows. Product totals
//! are recomputed inside the same transaction while the product row is held.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    decode, decode_reference, default_expiry, reference_columns, reserve_order_item, reserve_stock, BatchMovement,
    InventoryReservation, InventoryTransaction, InventoryTransactionType, Lookup, NewProduct,
    NewProductInventory, OrderItemHold, Product, ProductInventory, ProductStockSummary, TransactionReference,
};
use crate::services::activity::{self, Activity};
use crate::services::reservation::insert_reservation;

/// Product inventory service for batches, stock movements and holds
#[derive(Clone)]
pub struct ProductInventoryService {
    db: PgPool,
}

const PRODUCT_COLUMNS: &str =
    "id, name, sku, reorder_threshold, total_stock, reserved_stock, stock_status, is_active, created_at, updated_at";

const BATCH_COLUMNS: &str = "id, product_id, price_variation_id, batch_number, lot_number, quantity, \
     reserved_quantity, cost_per_unit, expiration_date, production_date, location, status, version, \
     created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, product_inventory_id, product_id, transaction_type, quantity, \
     balance_after, unit_cost, total_cost, reference_type, reference_id, notes, created_at";

/// Database row for a product
#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    sku: Option<String>,
    reorder_threshold: Decimal,
    total_stock: Decimal,
    reserved_stock: Decimal,
    stock_status: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> AppResult<Self> {
        Ok(Product {
            id: row.id,
            name: row.name,
            sku: row.sku,
            reorder_threshold: row.reorder_threshold,
            total_stock: row.total_stock,
            reserved_stock: row.reserved_stock,
            stock_status: decode(&row.stock_status)?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for a batch
#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    product_id: Uuid,
    price_variation_id: Option<Uuid>,
    batch_number: String,
    lot_number: Option<String>,
    quantity: Decimal,
    reserved_quantity: Decimal,
    cost_per_unit: Decimal,
    expiration_date: Option<NaiveDate>,
    production_date: Option<NaiveDate>,
    location: Option<String>,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for ProductInventory {
    type Error = AppError;

    fn try_from(row: BatchRow) -> AppResult<Self> {
        Ok(ProductInventory {
            id: row.id,
            product_id: row.product_id,
            price_variation_id: row.price_variation_id,
            batch_number: row.batch_number,
            lot_number: row.lot_number,
            quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
            cost_per_unit: row.cost_per_unit,
            expiration_date: row.expiration_date,
            production_date: row.production_date,
            location: row.location,
            status: decode(&row.status)?,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for a batch ledger entry
#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    product_inventory_id: Uuid,
    product_id: Uuid,
    transaction_type: String,
    quantity: Decimal,
    balance_after: Decimal,
    unit_cost: Option<Decimal>,
    total_cost: Option<Decimal>,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for InventoryTransaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> AppResult<Self> {
        let transaction_type = row.transaction_type.parse::<InventoryTransactionType>().map_err(|_| {
            AppError::Internal(format!("stored transaction type '{}' is not recognised", row.transaction_type))
        })?;
        Ok(InventoryTransaction {
            id: row.id,
            product_inventory_id: row.product_inventory_id,
            product_id: row.product_id,
            transaction_type,
            quantity: row.quantity,
            balance_after: row.balance_after,
            unit_cost: row.unit_cost,
            total_cost: row.total_cost,
            reference: decode_reference(row.reference_type.as_deref(), row.reference_id)?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

/// Input for an on-hand stock movement
#[derive(Debug, Deserialize)]
pub struct StockMovementInput {
    pub quantity: Decimal,
    pub transaction_type: InventoryTransactionType,
    pub unit_cost: Option<Decimal>,
    pub reference: Option<TransactionReference>,
    pub notes: Option<String>,
}

/// Input for holding stock on one batch
#[derive(Debug, Deserialize)]
pub struct ReserveInput {
    pub quantity: Decimal,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input for holding stock for an order item across batches
#[derive(Debug, Deserialize)]
pub struct ReserveOrderItemInput {
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub quantity: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input for dropping a hold on a batch directly
#[derive(Debug, Deserialize)]
pub struct ReleaseInput {
    pub quantity: Decimal,
    pub reason: Option<String>,
}

/// A batch after a movement, with its ledger entry
#[derive(Debug, Clone, Serialize)]
pub struct BatchChange {
    pub batch: ProductInventory,
    pub transaction: InventoryTransaction,
    pub product: Product,
}

/// Product with its batches and derived availability
#[derive(Debug, Clone, Serialize)]
pub struct ProductStock {
    #[serde(flatten)]
    pub product: Product,
    pub available_stock: Decimal,
    pub batches: Vec<ProductInventory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpirySweep {
    pub expired: usize,
    pub skipped: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// Connection level helpers shared with other services
// ---------------------------------------------------------------------------

pub(crate) async fn lock_product(conn: &mut PgConnection, id: Uuid) -> AppResult<Product> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

    row.try_into()
}

pub(crate) async fn lock_batch(conn: &mut PgConnection, id: Uuid) -> AppResult<ProductInventory> {
    let row = sqlx::query_as::<_, BatchRow>(&format!(
        "SELECT {BATCH_COLUMNS} FROM product_inventories WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Product inventory batch".to_string()))?;

    row.try_into()
}

/// Lock the owning product and then the batch
pub(crate) async fn lock_batch_with_product(
    conn: &mut PgConnection,
    batch_id: Uuid,
) -> AppResult<(Product, ProductInventory)> {
    let product_id = sqlx::query_scalar::<_, Uuid>("SELECT product_id FROM product_inventories WHERE id = $1")
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Product inventory batch".to_string()))?;

    let product = lock_product(conn, product_id).await?;
    let batch = lock_batch(conn, batch_id).await?;
    Ok((product, batch))
}

async fn insert_batch(conn: &mut PgConnection, batch: &ProductInventory) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO product_inventories (
            id, product_id, price_variation_id, batch_number, lot_number, quantity, reserved_quantity,
            cost_per_unit, expiration_date, production_date, location, status, version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(batch.id)
    .bind(batch.product_id)
    .bind(batch.price_variation_id)
    .bind(&batch.batch_number)
    .bind(&batch.lot_number)
    .bind(batch.quantity)
    .bind(batch.reserved_quantity)
    .bind(batch.cost_per_unit)
    .bind(batch.expiration_date)
    .bind(batch.production_date)
    .bind(&batch.location)
    .bind(batch.status.code())
    .bind(batch.version)
    .bind(batch.created_at)
    .bind(batch.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::Conflict {
            resource: "batch_number".to_string(),
            message: format!("Batch {} already exists for this product", batch.batch_number),
        },
        other => other.into(),
    })?;
    Ok(())
}

/// Write quantities and status; `expected_version` is the version read under lock
pub(crate) async fn save_batch(
    conn: &mut PgConnection,
    batch: &ProductInventory,
    expected_version: i64,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE product_inventories
        SET quantity = $2, reserved_quantity = $3, status = $4, version = $5, updated_at = $6
        WHERE id = $1 AND version = $7
        "#,
    )
    .bind(batch.id)
    .bind(batch.quantity)
    .bind(batch.reserved_quantity)
    .bind(batch.status.code())
    .bind(batch.version)
    .bind(batch.updated_at)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict {
            resource: "product_inventory".to_string(),
            message: format!("Batch {} was modified concurrently", batch.batch_number),
        });
    }
    Ok(())
}

pub(crate) async fn insert_movement(
    conn: &mut PgConnection,
    batch: &ProductInventory,
    movement: BatchMovement,
    reference: Option<TransactionReference>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<InventoryTransaction> {
    let transaction = movement.into_transaction(batch, reference, notes, now);
    let (reference_type, reference_id) = reference_columns(transaction.reference.as_ref());

    sqlx::query(
        r#"
        INSERT INTO inventory_transactions (
            id, product_inventory_id, product_id, transaction_type, quantity, balance_after,
            unit_cost, total_cost, reference_type, reference_id, notes, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(transaction.id)
    .bind(transaction.product_inventory_id)
    .bind(transaction.product_id)
    .bind(transaction.transaction_type.as_str())
    .bind(transaction.quantity)
    .bind(transaction.balance_after)
    .bind(transaction.unit_cost)
    .bind(transaction.total_cost)
    .bind(reference_type)
    .bind(reference_id)
    .bind(&transaction.notes)
    .bind(transaction.created_at)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        batch_id = %batch.id,
        transaction_type = transaction.transaction_type.as_str(),
        quantity = %transaction.quantity,
        balance_after = %transaction.balance_after,
        "inventory ledger entry appended"
    );
    Ok(transaction)
}

/// Persist a batch change with its ledger entry and activity record
pub(crate) async fn persist_batch_change(
    conn: &mut PgConnection,
    before: &ProductInventory,
    batch: &mut ProductInventory,
    movement: BatchMovement,
    reference: Option<TransactionReference>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<InventoryTransaction> {
    batch.updated_at = now;
    save_batch(conn, batch, before.version).await?;
    let transaction = insert_movement(conn, batch, movement, reference, notes, now).await?;

    let activity = Activity::new("inventory", "product_inventory", batch.id, "updated")
        .description(format!(
            "{} {} on batch {}",
            transaction.transaction_type.as_str(),
            transaction.quantity,
            batch.batch_number
        ))
        .changes(before, &*batch)?;
    activity::record(conn, activity).await?;

    Ok(transaction)
}

/// Recompute product totals over its active batches.
///
/// The caller must already hold the product row lock.
pub(crate) async fn update_product_totals(conn: &mut PgConnection, product: &mut Product) -> AppResult<()> {
    let batches = batches_for_product(conn, product.id, false).await?;
    let summary = ProductStockSummary::from_batches(&batches, product.reorder_threshold);
    let previous_status = product.stock_status;
    product.apply_summary(&summary, Utc::now());

    sqlx::query(
        r#"
        UPDATE products
        SET total_stock = $2, reserved_stock = $3, stock_status = $4, updated_at = $5
        WHERE id = $1
        "#,
    )
    .bind(product.id)
    .bind(product.total_stock)
    .bind(product.reserved_stock)
    .bind(product.stock_status.code())
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await?;

    if previous_status != product.stock_status {
        tracing::info!(
            product_id = %product.id,
            from = previous_status.code(),
            to = product.stock_status.code(),
            "product stock status changed"
        );
    }
    Ok(())
}

async fn batches_for_product(
    conn: &mut PgConnection,
    product_id: Uuid,
    for_update: bool,
) -> AppResult<Vec<ProductInventory>> {
    let lock = if for_update { "FOR UPDATE" } else { "" };
    let rows = sqlx::query_as::<_, BatchRow>(&format!(
        "SELECT {BATCH_COLUMNS} FROM product_inventories WHERE product_id = $1 AND status <> 'deleted' ORDER BY created_at, id {lock}"
    ))
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(ProductInventory::try_from).collect()
}

impl ProductInventoryService {
    /// Create a new ProductInventoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    pub async fn create_product(&self, input: NewProduct, default_threshold: Decimal) -> AppResult<Product> {
        let product = Product::create(input, default_threshold, Utc::now())?;

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, sku, reorder_threshold, total_stock, reserved_stock, stock_status,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.reorder_threshold)
        .bind(product.total_stock)
        .bind(product.reserved_stock)
        .bind(product.stock_status.code())
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::Conflict {
                resource: "sku".to_string(),
                message: "A product with this SKU already exists".to_string(),
            },
            other => other.into(),
        })?;
        activity::record(
            &mut *tx,
            Activity::new("inventory", "product", product.id, "created").created(&product)?,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, name = %product.name, "product created");
        Ok(product)
    }

    /// Get a product with its batches
    pub async fn get_product(&self, id: Uuid) -> AppResult<ProductStock> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        let product = Product::try_from(row)?;

        let mut conn = self.db.acquire().await?;
        let batches = batches_for_product(&mut conn, id, false).await?;

        Ok(ProductStock {
            available_stock: product.available_stock(),
            product,
            batches,
        })
    }

    pub async fn list_products(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active ORDER BY name"
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Recompute a product's totals from its batches
    pub async fn refresh_product_totals(&self, product_id: Uuid) -> AppResult<Product> {
        let mut tx = self.db.begin().await?;
        let mut product = lock_product(&mut *tx, product_id).await?;
        update_product_totals(&mut *tx, &mut product).await?;
        tx.commit().await?;
        Ok(product)
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    /// Create a batch; its opening quantity is logged as production
    pub async fn create_batch(&self, input: NewProductInventory) -> AppResult<BatchChange> {
        let now = Utc::now();
        let (batch, movement) = ProductInventory::open(input, now)?;

        let mut tx = self.db.begin().await?;
        let mut product = lock_product(&mut *tx, batch.product_id).await?;
        insert_batch(&mut *tx, &batch).await?;
        let transaction = insert_movement(
            &mut *tx,
            &batch,
            movement,
            None,
            Some("Opening quantity".to_string()),
            now,
        )
        .await?;
        activity::record(
            &mut *tx,
            Activity::new("inventory", "product_inventory", batch.id, "created").created(&batch)?,
        )
        .await?;
        update_product_totals(&mut *tx, &mut product).await?;
        tx.commit().await?;

        tracing::info!(
            batch_id = %batch.id,
            product_id = %batch.product_id,
            batch_number = %batch.batch_number,
            quantity = %batch.quantity,
            "product batch created"
        );
        Ok(BatchChange {
            batch,
            transaction,
            product,
        })
    }

    pub async fn get_batch(&self, id: Uuid) -> AppResult<ProductInventory> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM product_inventories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product inventory batch".to_string()))?;

        row.try_into()
    }

    /// Ledger entries for a batch, oldest first
    pub async fn batch_transactions(&self, batch_id: Uuid) -> AppResult<Vec<InventoryTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM inventory_transactions WHERE product_inventory_id = $1 ORDER BY created_at, id"
        ))
        .bind(batch_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(InventoryTransaction::try_from).collect()
    }

    pub async fn add_stock(&self, batch_id: Uuid, input: StockMovementInput) -> AppResult<BatchChange> {
        self.move_stock(batch_id, input, |batch, input| {
            batch.add_stock(input.quantity, input.transaction_type, input.unit_cost)
        })
        .await
    }

    pub async fn remove_stock(&self, batch_id: Uuid, input: StockMovementInput) -> AppResult<BatchChange> {
        self.move_stock(batch_id, input, |batch, input| {
            batch.remove_stock(input.quantity, input.transaction_type)
        })
        .await
    }

    async fn move_stock<F>(&self, batch_id: Uuid, input: StockMovementInput, apply: F) -> AppResult<BatchChange>
    where
        F: FnOnce(&mut ProductInventory, &StockMovementInput) -> shared::DomainResult<BatchMovement>,
    {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let (mut product, before) = lock_batch_with_product(&mut *tx, batch_id).await?;
        let mut batch = before.clone();

        let movement = apply(&mut batch, &input)?;
        let transaction =
            persist_batch_change(&mut *tx, &before, &mut batch, movement, input.reference, input.notes, now).await?;
        update_product_totals(&mut *tx, &mut product).await?;
        tx.commit().await?;

        Ok(BatchChange {
            batch,
            transaction,
            product,
        })
    }

    /// Hold stock on a single batch for an order item
    pub async fn reserve(
        &self,
        batch_id: Uuid,
        input: ReserveInput,
        ttl_hours: i64,
    ) -> AppResult<InventoryReservation> {
        let now = Utc::now();
        let expires_at = input.expires_at.unwrap_or_else(|| default_expiry(now, ttl_hours));

        let mut tx = self.db.begin().await?;
        let (mut product, before) = lock_batch_with_product(&mut *tx, batch_id).await?;
        let mut batch = before.clone();

        let (reservation, movement) =
            reserve_stock(&mut batch, input.quantity, input.order_id, input.order_item_id, expires_at, now)?;
        insert_reservation(&mut *tx, &reservation).await?;
        persist_batch_change(
            &mut *tx,
            &before,
            &mut batch,
            movement,
            Some(TransactionReference::Reservation(reservation.id)),
            None,
            now,
        )
        .await?;
        update_product_totals(&mut *tx, &mut product).await?;
        tx.commit().await?;

        tracing::info!(
            reservation_id = %reservation.id,
            batch_id = %batch_id,
            quantity = %reservation.quantity,
            "stock reserved"
        );
        Ok(reservation)
    }

    /// Hold stock for an order item across batches, earliest expiry first.
    ///
    /// All holds are taken or none are.
    pub async fn reserve_for_order_item(
        &self,
        input: ReserveOrderItemInput,
        ttl_hours: i64,
    ) -> AppResult<Vec<InventoryReservation>> {
        let now = Utc::now();
        let expires_at = input.expires_at.unwrap_or_else(|| default_expiry(now, ttl_hours));

        let mut tx = self.db.begin().await?;
        let mut product = lock_product(&mut *tx, input.product_id).await?;
        let batches = batches_for_product(&mut *tx, input.product_id, true).await?;
        let holds = reserve_order_item(
            &batches,
            input.quantity,
            input.order_id,
            input.order_item_id,
            expires_at,
            now,
        )?;

        let mut reservations = Vec::with_capacity(holds.len());
        for hold in holds {
            let OrderItemHold {
                before,
                mut batch,
                reservation,
                movement,
            } = hold;
            insert_reservation(&mut *tx, &reservation).await?;
            persist_batch_change(
                &mut *tx,
                &before,
                &mut batch,
                movement,
                Some(TransactionReference::Reservation(reservation.id)),
                Some(format!("Order item {}", input.order_item_id)),
                now,
            )
            .await?;
            reservations.push(reservation);
        }

        update_product_totals(&mut *tx, &mut product).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %input.order_id,
            order_item_id = %input.order_item_id,
            batches = reservations.len(),
            quantity = %input.quantity,
            "order item reserved"
        );
        Ok(reservations)
    }

    /// Drop part of a batch's hold directly, floored at zero
    pub async fn release(&self, batch_id: Uuid, input: ReleaseInput) -> AppResult<BatchChange> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let (mut product, before) = lock_batch_with_product(&mut *tx, batch_id).await?;
        let mut batch = before.clone();

        let movement = batch.release(input.quantity)?;
        let transaction =
            persist_batch_change(&mut *tx, &before, &mut batch, movement, None, input.reason, now).await?;
        update_product_totals(&mut *tx, &mut product).await?;
        tx.commit().await?;

        Ok(BatchChange {
            batch,
            transaction,
            product,
        })
    }

    /// Delete an empty batch.
    ///
    /// The batch is marked deleted rather than removed so its ledger and the
    /// reservations that drew from it stay intact.
    pub async fn delete_batch(&self, batch_id: Uuid) -> AppResult<ProductInventory> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let (mut product, before) = lock_batch_with_product(&mut *tx, batch_id).await?;
        before.ensure_deletable()?;

        let active_holds = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM inventory_reservations WHERE product_inventory_id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(batch_id)
        .fetch_one(&mut *tx)
        .await?;
        if active_holds > 0 {
            return Err(AppError::Conflict {
                resource: before.batch_number.clone(),
                message: format!("Batch {} still has active reservations", before.batch_number),
            });
        }

        let mut batch = before.clone();
        batch.mark_deleted(now)?;
        save_batch(&mut *tx, &batch, before.version).await?;
        activity::record(
            &mut *tx,
            Activity::new("inventory", "product_inventory", batch_id, "deleted").changes(&before, &batch)?,
        )
        .await?;
        update_product_totals(&mut *tx, &mut product).await?;
        tx.commit().await?;

        tracing::info!(batch_id = %batch_id, batch_number = %batch.batch_number, "product batch deleted");
        Ok(batch)
    }

    /// Mark active batches past their expiration date as expired.
    ///
    /// Each batch is handled in its own transaction; batches still holding
    /// reservations are skipped.
    pub async fn expire_batches(&self, today: NaiveDate) -> AppResult<ExpirySweep> {
        let candidates = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM product_inventories WHERE status = 'active' AND expiration_date < $1",
        )
        .bind(today)
        .fetch_all(&self.db)
        .await?;

        let mut sweep = ExpirySweep {
            expired: 0,
            skipped: Vec::new(),
        };

        for batch_id in candidates {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;
            let (mut product, before) = lock_batch_with_product(&mut *tx, batch_id).await?;
            if !before.is_active() || !before.is_expired(today) {
                continue;
            }
            let mut batch = before.clone();

            match batch.expire() {
                Ok(Some(movement)) => {
                    persist_batch_change(
                        &mut *tx,
                        &before,
                        &mut batch,
                        movement,
                        None,
                        Some("Expired".to_string()),
                        now,
                    )
                    .await?;
                }
                Ok(None) => {
                    batch.updated_at = now;
                    save_batch(&mut *tx, &batch, before.version).await?;
                }
                Err(e) => {
                    tracing::warn!(batch_id = %batch_id, error = %e, "expired batch still reserved, skipping");
                    sweep.skipped.push(batch_id);
                    continue;
                }
            }
            update_product_totals(&mut *tx, &mut product).await?;
            tx.commit().await?;
            sweep.expired += 1;
        }

        if sweep.expired > 0 {
            tracing::info!(expired = sweep.expired, "expired product batches");
        }
        Ok(sweep)
    }
}
