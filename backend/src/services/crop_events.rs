//! Side effects that follow planting
//!
//! Handlers run after the planting transaction commits. A failing handler is
//! logged and never undoes the planting.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::CropsConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Crop, Lookup, SeedDraw, TransactionReference};
use crate::services::consumable::{consume_in, lock_consumable};
use crate::services::{crop_tasks, recipe};

/// Something that happened to crops
#[derive(Debug, Clone)]
pub enum CropEvent {
    Created(Crop),
    /// Many crops planted together, e.g. from a crop plan
    BatchCreated {
        crops: Vec<Crop>,
        crop_plan_id: Option<Uuid>,
    },
}

impl CropEvent {
    pub fn crops(&self) -> &[Crop] {
        match self {
            CropEvent::Created(crop) => std::slice::from_ref(crop),
            CropEvent::BatchCreated { crops, .. } => crops,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CropEvent::Created(_) => "crop_created",
            CropEvent::BatchCreated { .. } => "crops_batch_created",
        }
    }
}

/// Draws seed from the recipe's seed consumable for newly planted trays
#[derive(Clone)]
pub struct SeedDeductionHandler {
    db: PgPool,
}

impl SeedDeductionHandler {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// One deduction per recipe; a recipe short on seed is skipped
    pub async fn handle(&self, event: &CropEvent) -> AppResult<SeedDeductionOutcome> {
        let mut trays_by_recipe: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
        for crop in event.crops() {
            trays_by_recipe.entry(crop.recipe_id).or_default().push(crop.id);
        }

        let recipe_ids: Vec<Uuid> = trays_by_recipe.keys().copied().collect();
        let mut conn = self.db.acquire().await?;
        let recipes = recipe::fetch_recipes(&mut conn, &recipe_ids).await?;
        drop(conn);

        let mut outcome = SeedDeductionOutcome::default();
        for (recipe_id, crop_ids) in trays_by_recipe {
            let Some(recipe) = recipes.get(&recipe_id) else {
                tracing::warn!(recipe_id = %recipe_id, "recipe missing for planted crops");
                outcome.skipped.push(recipe_id);
                continue;
            };
            let Some(seed_id) = recipe.seed_consumable_id else {
                continue;
            };

            let trays = u32::try_from(crop_ids.len()).unwrap_or(u32::MAX);
            let amount = recipe.seed_required_for(trays);
            if amount <= Decimal::ZERO {
                continue;
            }

            let reference = match (event, crop_ids.as_slice()) {
                (
                    CropEvent::BatchCreated {
                        crop_plan_id: Some(plan_id),
                        ..
                    },
                    _,
                ) => Some(TransactionReference::CropPlan(*plan_id)),
                (_, [crop_id]) => Some(TransactionReference::Crop(*crop_id)),
                _ => None,
            };
            let notes = format!("Seed for {} tray(s) of {}", trays, recipe.name);

            let mut tx = self.db.begin().await?;
            let seed = lock_consumable(&mut *tx, seed_id).await?;
            let draw = match seed.seed_draw(amount) {
                Ok(SeedDraw::Deduct(draw)) => draw,
                Ok(SeedDraw::Short { required, available }) => {
                    tracing::warn!(
                        recipe_id = %recipe_id,
                        seed_id = %seed_id,
                        required = %required,
                        available = %available,
                        unit = seed.quantity_unit.code(),
                        "not enough seed in stock, skipping deduction"
                    );
                    outcome.skipped.push(recipe_id);
                    continue;
                }
                Ok(SeedDraw::Nothing) => continue,
                Err(e) => {
                    tracing::warn!(recipe_id = %recipe_id, seed_id = %seed_id, error = %e, "seed cannot be drawn");
                    outcome.skipped.push(recipe_id);
                    continue;
                }
            };

            consume_in(&mut *tx, seed_id, draw, None, reference, Some(notes)).await?;
            tx.commit().await?;
            outcome.deducted.push((seed_id, draw));
        }
        Ok(outcome)
    }
}

#[derive(Debug, Default)]
pub struct SeedDeductionOutcome {
    /// Seed consumable and amount drawn, in that consumable's unit
    pub deducted: Vec<(Uuid, Decimal)>,
    /// Recipes whose seed was not drawn
    pub skipped: Vec<Uuid>,
}

/// Queues stage-advance tasks for newly planted trays
#[derive(Clone)]
pub struct TaskScheduleHandler {
    db: PgPool,
}

impl TaskScheduleHandler {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn handle(&self, event: &CropEvent) -> AppResult<usize> {
        let crops = event.crops();
        let recipe_ids: Vec<Uuid> = crops.iter().map(|c| c.recipe_id).collect();

        let mut tx = self.db.begin().await?;
        let recipes = recipe::fetch_recipes(&mut *tx, &recipe_ids).await?;
        let mut scheduled = 0;
        for crop in crops {
            let recipe = recipes
                .get(&crop.recipe_id)
                .ok_or_else(|| AppError::NotFound("Recipe".to_string()))?;
            scheduled += crop_tasks::schedule(&mut *tx, &crop.plan_stage_tasks(recipe)).await?;
        }
        tx.commit().await?;
        Ok(scheduled)
    }
}

/// Runs every crop event handler in turn
#[derive(Clone)]
pub struct CropEventDispatcher {
    seed: SeedDeductionHandler,
    tasks: Option<TaskScheduleHandler>,
}

impl CropEventDispatcher {
    pub fn new(db: PgPool, config: &CropsConfig) -> Self {
        Self {
            seed: SeedDeductionHandler::new(db.clone()),
            tasks: config.schedule_tasks.then(|| TaskScheduleHandler::new(db)),
        }
    }

    pub async fn dispatch(&self, event: CropEvent) {
        let name = event.name();
        let crops = event.crops().len();

        match self.seed.handle(&event).await {
            Ok(outcome) => tracing::debug!(
                event = name,
                crops,
                deducted = outcome.deducted.len(),
                skipped = outcome.skipped.len(),
                "seed deduction handled"
            ),
            Err(e) => tracing::warn!(event = name, error = %e, "seed deduction failed"),
        }

        if let Some(tasks) = &self.tasks {
            match tasks.handle(&event).await {
                Ok(scheduled) => tracing::debug!(event = name, scheduled, "stage tasks scheduled"),
                Err(e) => tracing::warn!(event = name, error = %e, "stage task scheduling failed"),
            }
        }
    }
}
