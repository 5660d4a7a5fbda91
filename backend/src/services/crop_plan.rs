//! Crop plan service: drafting, approval and crop generation

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::config::CropsConfig;
use crate::error::{AppError, AppResult};
use crate::models::{decode, Crop, CropPlan, CropPlanStatus, CropStage, Lookup, NewCrop, NewCropPlan};
use crate::services::activity::{self, Activity};
use crate::services::crop::{insert_crops, CropService};
use crate::services::crop_events::CropEvent;
use crate::services::recipe;

/// Crop plan service for working back from deliveries to sowing
#[derive(Clone)]
pub struct CropPlanService {
    db: PgPool,
    crops: CropService,
}

const PLAN_COLUMNS: &str = "id, order_id, recipe_id, status, trays_needed, grams_needed, plant_by_date, \
     expected_harvest_date, delivery_date, notes, approved_at, completed_at, created_at, updated_at";

#[derive(Debug, FromRow)]
struct CropPlanRow {
    id: Uuid,
    order_id: Option<Uuid>,
    recipe_id: Uuid,
    status: String,
    trays_needed: i32,
    grams_needed: Decimal,
    plant_by_date: NaiveDate,
    expected_harvest_date: NaiveDate,
    delivery_date: NaiveDate,
    notes: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CropPlanRow> for CropPlan {
    type Error = AppError;

    fn try_from(row: CropPlanRow) -> AppResult<Self> {
        Ok(CropPlan {
            id: row.id,
            order_id: row.order_id,
            recipe_id: row.recipe_id,
            status: decode(&row.status)?,
            trays_needed: row.trays_needed,
            grams_needed: row.grams_needed,
            plant_by_date: row.plant_by_date,
            expected_harvest_date: row.expected_harvest_date,
            delivery_date: row.delivery_date,
            notes: row.notes,
            approved_at: row.approved_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CropPlanFilter {
    pub status: Option<CropPlanStatus>,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CropPlanView {
    #[serde(flatten)]
    pub plan: CropPlan,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedCrops {
    pub plan: CropPlan,
    pub crops: Vec<Crop>,
}

async fn lock_plan(conn: &mut PgConnection, id: Uuid) -> AppResult<CropPlan> {
    let row = sqlx::query_as::<_, CropPlanRow>(&format!(
        "SELECT {PLAN_COLUMNS} FROM crop_plans WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Crop plan".to_string()))?;

    row.try_into()
}

async fn save_status(conn: &mut PgConnection, plan: &CropPlan) -> AppResult<()> {
    sqlx::query(
        "UPDATE crop_plans SET status = $2, approved_at = $3, completed_at = $4, updated_at = $5 WHERE id = $1",
    )
    .bind(plan.id)
    .bind(plan.status.code())
    .bind(plan.approved_at)
    .bind(plan.completed_at)
    .bind(plan.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Tray labels for a plan: first 8 hex digits of the plan id and a sequence
fn tray_number(plan: &CropPlan, n: i32) -> String {
    let short = plan.id.simple().to_string();
    format!("{}-{:03}", &short[..8].to_uppercase(), n)
}

impl CropPlanService {
    /// Create a new CropPlanService instance
    pub fn new(db: PgPool, config: &CropsConfig) -> Self {
        Self {
            crops: CropService::new(db.clone(), config),
            db,
        }
    }

    pub async fn create(&self, input: NewCropPlan) -> AppResult<CropPlan> {
        let mut tx = self.db.begin().await?;
        let recipe = recipe::fetch_recipe(&mut *tx, input.recipe_id).await?;
        let plan = CropPlan::draft(input, &recipe, Utc::now())?;

        sqlx::query(
            r#"
            INSERT INTO crop_plans (
                id, order_id, recipe_id, status, trays_needed, grams_needed, plant_by_date,
                expected_harvest_date, delivery_date, notes, approved_at, completed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(plan.id)
        .bind(plan.order_id)
        .bind(plan.recipe_id)
        .bind(plan.status.code())
        .bind(plan.trays_needed)
        .bind(plan.grams_needed)
        .bind(plan.plant_by_date)
        .bind(plan.expected_harvest_date)
        .bind(plan.delivery_date)
        .bind(&plan.notes)
        .bind(plan.approved_at)
        .bind(plan.completed_at)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => AppError::NotFound("Order".to_string()),
            other => other.into(),
        })?;
        activity::record(&mut *tx, Activity::new("crops", "crop_plan", plan.id, "created").created(&plan)?).await?;
        tx.commit().await?;

        tracing::info!(
            plan_id = %plan.id,
            trays = plan.trays_needed,
            plant_by = %plan.plant_by_date,
            "crop plan drafted"
        );
        Ok(plan)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<CropPlanView> {
        let row = sqlx::query_as::<_, CropPlanRow>(&format!("SELECT {PLAN_COLUMNS} FROM crop_plans WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Crop plan".to_string()))?;
        let plan = CropPlan::try_from(row)?;

        Ok(CropPlanView {
            is_overdue: plan.is_overdue(Utc::now().date_naive()),
            plan,
        })
    }

    pub async fn list(&self, filter: CropPlanFilter) -> AppResult<Vec<CropPlanView>> {
        let rows = sqlx::query_as::<_, CropPlanRow>(&format!(
            r#"
            SELECT {PLAN_COLUMNS} FROM crop_plans
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR order_id = $2)
            ORDER BY plant_by_date, created_at
            "#
        ))
        .bind(filter.status.map(|s| s.code()))
        .bind(filter.order_id)
        .fetch_all(&self.db)
        .await?;

        let today = Utc::now().date_naive();
        rows.into_iter()
            .map(|row| {
                let plan = CropPlan::try_from(row)?;
                Ok(CropPlanView {
                    is_overdue: plan.is_overdue(today),
                    plan,
                })
            })
            .collect()
    }

    pub async fn approve(&self, id: Uuid) -> AppResult<CropPlan> {
        self.change_status(id, "approved", |plan, now| plan.approve(now)).await
    }

    pub async fn cancel(&self, id: Uuid) -> AppResult<CropPlan> {
        self.change_status(id, "cancelled", |plan, now| plan.cancel(now)).await
    }

    async fn change_status<F>(&self, id: Uuid, event: &'static str, apply: F) -> AppResult<CropPlan>
    where
        F: FnOnce(&mut CropPlan, DateTime<Utc>) -> shared::DomainResult<()>,
    {
        let mut tx = self.db.begin().await?;
        let before = lock_plan(&mut *tx, id).await?;
        let mut plan = before.clone();
        apply(&mut plan, Utc::now())?;

        save_status(&mut *tx, &plan).await?;
        activity::record(
            &mut *tx,
            Activity::new("crops", "crop_plan", plan.id, event).changes(&before, &plan)?,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(plan_id = %plan.id, status = plan.status.code(), "crop plan status changed");
        Ok(plan)
    }

    /// Sow every tray of an approved plan.
    ///
    /// The plan passes through generating and ends completed in the same
    /// transaction as the crop inserts.
    pub async fn generate_crops(&self, id: Uuid) -> AppResult<GeneratedCrops> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let before = lock_plan(&mut *tx, id).await?;
        let mut plan = before.clone();
        plan.start_generation(now)?;
        save_status(&mut *tx, &plan).await?;

        let recipe = recipe::fetch_recipe(&mut *tx, plan.recipe_id).await?;
        let mut crops = Vec::with_capacity(usize::try_from(plan.trays_needed).unwrap_or_default());
        for n in 1..=plan.trays_needed {
            let input = NewCrop {
                recipe_id: recipe.id,
                order_id: plan.order_id,
                crop_plan_id: Some(plan.id),
                tray_number: tray_number(&plan, n),
                start_stage: (!recipe.skips_stage(CropStage::Soaking)).then_some(CropStage::Soaking),
                soaking_at: None,
                planting_at: None,
                notes: None,
            };
            crops.push(Crop::plant(input, &recipe, now)?);
        }
        insert_crops(&mut *tx, &crops).await?;

        plan.complete(now)?;
        save_status(&mut *tx, &plan).await?;
        activity::record(
            &mut *tx,
            Activity::new("crops", "crop_plan", plan.id, "crops_generated")
                .description(format!("{} trays sown", crops.len()))
                .changes(&before, &plan)?,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(plan_id = %plan.id, trays = crops.len(), "crop plan generated crops");
        self.crops
            .events()
            .dispatch(CropEvent::BatchCreated {
                crops: crops.clone(),
                crop_plan_id: Some(plan.id),
            })
            .await;

        Ok(GeneratedCrops { plan, crops })
    }
}
