//! Crop service: planting and the stage lifecycle
//!
//! Every stage move locks the crop row, validates the new timestamps in the
//! model, then writes the crop, its stage history and the task queue changes
//! in one transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::config::CropsConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    decode, decode_opt, Crop, CropStage, CropStageHistory, CropStageTransition, Lookup, NewCrop, Recipe,
    StageChange,
};
use crate::services::activity::{self, Activity};
use crate::services::crop_events::{CropEvent, CropEventDispatcher};
use crate::services::{crop_tasks, recipe};

/// Crop service for trays and their stages
#[derive(Clone)]
pub struct CropService {
    db: PgPool,
    events: CropEventDispatcher,
    schedule_tasks: bool,
}

const CROP_COLUMNS: &str = "id, recipe_id, order_id, crop_plan_id, tray_number, current_stage, soaking_at, \
     planting_at, germination_at, blackout_at, light_at, harvested_at, watering_suspended_at, notes, \
     created_at, updated_at";

#[derive(Debug, FromRow)]
struct CropRow {
    id: Uuid,
    recipe_id: Uuid,
    order_id: Option<Uuid>,
    crop_plan_id: Option<Uuid>,
    tray_number: String,
    current_stage: String,
    soaking_at: Option<DateTime<Utc>>,
    planting_at: Option<DateTime<Utc>>,
    germination_at: Option<DateTime<Utc>>,
    blackout_at: Option<DateTime<Utc>>,
    light_at: Option<DateTime<Utc>>,
    harvested_at: Option<DateTime<Utc>>,
    watering_suspended_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CropRow> for Crop {
    type Error = AppError;

    fn try_from(row: CropRow) -> AppResult<Self> {
        Ok(Crop {
            id: row.id,
            recipe_id: row.recipe_id,
            order_id: row.order_id,
            crop_plan_id: row.crop_plan_id,
            tray_number: row.tray_number,
            current_stage: decode(&row.current_stage)?,
            soaking_at: row.soaking_at,
            planting_at: row.planting_at,
            germination_at: row.germination_at,
            blackout_at: row.blackout_at,
            light_at: row.light_at,
            harvested_at: row.harvested_at,
            watering_suspended_at: row.watering_suspended_at,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: Uuid,
    crop_id: Uuid,
    from_stage: Option<String>,
    to_stage: String,
    transitioned_at: DateTime<Utc>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for CropStageHistory {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> AppResult<Self> {
        Ok(CropStageHistory {
            id: row.id,
            crop_id: row.crop_id,
            from_stage: decode_opt(row.from_stage.as_deref())?,
            to_stage: decode(&row.to_stage)?,
            transitioned_at: row.transitioned_at,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CropFilter {
    pub stage: Option<CropStage>,
    pub recipe_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub crop_plan_id: Option<Uuid>,
    #[serde(default)]
    pub include_harvested: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdvanceInput {
    /// Advance through intermediate stages up to this one
    pub target_stage: Option<CropStage>,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ResetInput {
    pub stage: CropStage,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkAdvanceInput {
    pub crop_ids: Vec<Uuid>,
    pub target_stage: Option<CropStage>,
    pub at: Option<DateTime<Utc>>,
}

/// Crop with its derived timing
#[derive(Debug, Clone, Serialize)]
pub struct CropView {
    #[serde(flatten)]
    pub crop: Crop,
    pub recipe_name: String,
    pub stage_age: Option<String>,
    pub time_to_next_stage: Option<String>,
    pub next_stage_due_at: Option<DateTime<Utc>>,
    pub expected_harvest_at: Option<DateTime<Utc>>,
}

impl CropView {
    fn build(crop: Crop, recipe: &Recipe, now: DateTime<Utc>) -> Self {
        Self {
            recipe_name: recipe.name.clone(),
            stage_age: crop.stage_age(now),
            time_to_next_stage: crop.time_to_next_stage(recipe, now),
            next_stage_due_at: crop.next_stage_due_at(recipe),
            expected_harvest_at: crop.expected_harvest_at(recipe),
            crop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineState {
    Completed,
    Current,
    Upcoming,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineStage {
    pub stage: CropStage,
    pub state: TimelineState,
    pub at: Option<DateTime<Utc>>,
}

/// Every stage of a crop with when it happened or is expected
pub fn crop_timeline(crop: &Crop, recipe: &Recipe) -> Vec<TimelineStage> {
    let planned: Vec<_> = crop.plan_stage_tasks(recipe);

    CropStage::all()
        .iter()
        .copied()
        .map(|stage| {
            let (state, at) = if recipe.skips_stage(stage) && crop.stage_timestamp(stage).is_none() {
                (TimelineState::Skipped, None)
            } else if stage == crop.current_stage {
                (TimelineState::Current, crop.stage_entered_at())
            } else if stage.is_before(crop.current_stage) {
                (TimelineState::Completed, crop.stage_timestamp(stage))
            } else {
                let due = planned.iter().find(|t| t.target_stage == stage).map(|t| t.due_at);
                (TimelineState::Upcoming, due)
            };
            TimelineStage { stage, state, at }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Connection level helpers
// ---------------------------------------------------------------------------

async fn lock_crop(conn: &mut PgConnection, id: Uuid) -> AppResult<Crop> {
    let row = sqlx::query_as::<_, CropRow>(&format!("SELECT {CROP_COLUMNS} FROM crops WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Crop".to_string()))?;

    row.try_into()
}

async fn insert_history(conn: &mut PgConnection, entry: &CropStageHistory) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO crop_stage_history (id, crop_id, from_stage, to_stage, transitioned_at, reason, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(entry.crop_id)
    .bind(entry.from_stage.map(|s| s.code()))
    .bind(entry.to_stage.code())
    .bind(entry.transitioned_at)
    .bind(&entry.reason)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert planted crops with their first history entry
pub(crate) async fn insert_crops(conn: &mut PgConnection, crops: &[Crop]) -> AppResult<()> {
    for crop in crops {
        crop.validate_timestamp_sequence()?;
        sqlx::query(
            r#"
            INSERT INTO crops (
                id, recipe_id, order_id, crop_plan_id, tray_number, current_stage, soaking_at,
                planting_at, germination_at, blackout_at, light_at, harvested_at,
                watering_suspended_at, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(crop.id)
        .bind(crop.recipe_id)
        .bind(crop.order_id)
        .bind(crop.crop_plan_id)
        .bind(&crop.tray_number)
        .bind(crop.current_stage.code())
        .bind(crop.soaking_at)
        .bind(crop.planting_at)
        .bind(crop.germination_at)
        .bind(crop.blackout_at)
        .bind(crop.light_at)
        .bind(crop.harvested_at)
        .bind(crop.watering_suspended_at)
        .bind(&crop.notes)
        .bind(crop.created_at)
        .bind(crop.updated_at)
        .execute(&mut *conn)
        .await?;

        insert_history(conn, &CropStageHistory::planted(crop)).await?;
        activity::record(conn, Activity::new("crops", "crop", crop.id, "created").created(crop)?).await?;
    }

    tracing::debug!(count = crops.len(), "crops inserted");
    Ok(())
}

async fn save_crop(conn: &mut PgConnection, crop: &Crop) -> AppResult<()> {
    crop.validate_timestamp_sequence()?;
    sqlx::query(
        r#"
        UPDATE crops
        SET current_stage = $2, soaking_at = $3, planting_at = $4, germination_at = $5, blackout_at = $6,
            light_at = $7, harvested_at = $8, watering_suspended_at = $9, updated_at = $10
        WHERE id = $1
        "#,
    )
    .bind(crop.id)
    .bind(crop.current_stage.code())
    .bind(crop.soaking_at)
    .bind(crop.planting_at)
    .bind(crop.germination_at)
    .bind(crop.blackout_at)
    .bind(crop.light_at)
    .bind(crop.harvested_at)
    .bind(crop.watering_suspended_at)
    .bind(crop.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Persist a crop after stage moves, with history and task bookkeeping
async fn persist_stage_changes(
    conn: &mut PgConnection,
    before: &Crop,
    crop: &Crop,
    changes: &[StageChange],
) -> AppResult<()> {
    save_crop(conn, crop).await?;
    for change in changes {
        insert_history(conn, &CropStageHistory::from_change(change)).await?;
    }

    let reached: Vec<CropStage> = changes.iter().map(|c| c.to_stage).collect();
    crop_tasks::complete_through_stage(conn, crop.id, &reached, crop.updated_at).await?;

    activity::record(
        conn,
        Activity::new("crops", "crop", crop.id, "stage_changed")
            .description(format!(
                "{} moved from {} to {}",
                crop.tray_number,
                before.current_stage.code(),
                crop.current_stage.code()
            ))
            .changes(before, crop)?,
    )
    .await?;
    Ok(())
}

async fn advance_in(
    conn: &mut PgConnection,
    crop_id: Uuid,
    target: Option<CropStage>,
    at: DateTime<Utc>,
) -> AppResult<Crop> {
    let before = lock_crop(conn, crop_id).await?;
    let recipe = recipe::fetch_recipe(conn, before.recipe_id).await?;
    let mut crop = before.clone();

    let changes = match target {
        Some(stage) => crop.advance_to_stage(stage, &recipe, at)?,
        None => vec![crop.advance_stage(&recipe, at)?],
    };
    persist_stage_changes(conn, &before, &crop, &changes).await?;

    tracing::info!(
        crop_id = %crop.id,
        tray = %crop.tray_number,
        from = before.current_stage.code(),
        to = crop.current_stage.code(),
        "crop advanced"
    );
    Ok(crop)
}

impl CropService {
    /// Create a new CropService instance
    pub fn new(db: PgPool, config: &CropsConfig) -> Self {
        Self {
            events: CropEventDispatcher::new(db.clone(), config),
            schedule_tasks: config.schedule_tasks,
            db,
        }
    }

    /// Plant one tray
    pub async fn plant(&self, input: NewCrop) -> AppResult<Crop> {
        let mut tx = self.db.begin().await?;
        let recipe = recipe::fetch_recipe(&mut *tx, input.recipe_id).await?;
        let crop = Crop::plant(input, &recipe, Utc::now())?;
        insert_crops(&mut *tx, std::slice::from_ref(&crop)).await?;
        tx.commit().await?;

        tracing::info!(crop_id = %crop.id, tray = %crop.tray_number, recipe = %recipe.name, "crop planted");
        self.events.dispatch(CropEvent::Created(crop.clone())).await;
        Ok(crop)
    }

    /// Plant many trays in one transaction; handlers see a single batch event
    pub async fn create_crops_bulk(&self, inputs: Vec<NewCrop>) -> AppResult<Vec<Crop>> {
        if inputs.is_empty() {
            return Err(AppError::validation("crops", "At least one crop is required"));
        }
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let mut recipe_ids: Vec<Uuid> = inputs.iter().map(|i| i.recipe_id).collect();
        recipe_ids.sort();
        recipe_ids.dedup();
        let recipes = recipe::fetch_recipes(&mut *tx, &recipe_ids).await?;

        let mut crops = Vec::with_capacity(inputs.len());
        for input in inputs {
            let recipe = recipes
                .get(&input.recipe_id)
                .ok_or_else(|| AppError::NotFound("Recipe".to_string()))?;
            crops.push(Crop::plant(input, recipe, now)?);
        }
        insert_crops(&mut *tx, &crops).await?;
        tx.commit().await?;

        tracing::info!(count = crops.len(), "crops planted in bulk");
        self.events
            .dispatch(CropEvent::BatchCreated {
                crops: crops.clone(),
                crop_plan_id: None,
            })
            .await;
        Ok(crops)
    }

    pub(crate) fn events(&self) -> &CropEventDispatcher {
        &self.events
    }

    pub async fn get(&self, id: Uuid) -> AppResult<CropView> {
        let row = sqlx::query_as::<_, CropRow>(&format!("SELECT {CROP_COLUMNS} FROM crops WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Crop".to_string()))?;
        let crop = Crop::try_from(row)?;

        let mut conn = self.db.acquire().await?;
        let recipe = recipe::fetch_recipe(&mut conn, crop.recipe_id).await?;
        Ok(CropView::build(crop, &recipe, Utc::now()))
    }

    pub async fn list(&self, filter: CropFilter) -> AppResult<Vec<Crop>> {
        let rows = sqlx::query_as::<_, CropRow>(&format!(
            r#"
            SELECT {CROP_COLUMNS} FROM crops
            WHERE ($1::text IS NULL OR current_stage = $1)
              AND ($2::uuid IS NULL OR recipe_id = $2)
              AND ($3::uuid IS NULL OR order_id = $3)
              AND ($4::uuid IS NULL OR crop_plan_id = $4)
              AND ($5 OR current_stage <> 'harvested')
            ORDER BY created_at, tray_number
            "#
        ))
        .bind(filter.stage.map(|s| s.code()))
        .bind(filter.recipe_id)
        .bind(filter.order_id)
        .bind(filter.crop_plan_id)
        .bind(filter.include_harvested || filter.stage == Some(CropStage::Harvested))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Crop::try_from).collect()
    }

    /// Stage history for a crop, oldest first
    pub async fn history(&self, crop_id: Uuid) -> AppResult<Vec<CropStageHistory>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, crop_id, from_stage, to_stage, transitioned_at, reason, created_at
            FROM crop_stage_history
            WHERE crop_id = $1
            ORDER BY transitioned_at, created_at
            "#,
        )
        .bind(crop_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(CropStageHistory::try_from).collect()
    }

    pub async fn timeline(&self, crop_id: Uuid) -> AppResult<Vec<TimelineStage>> {
        let view = self.get(crop_id).await?;
        let mut conn = self.db.acquire().await?;
        let recipe = recipe::fetch_recipe(&mut conn, view.crop.recipe_id).await?;
        Ok(crop_timeline(&view.crop, &recipe))
    }

    pub async fn advance(&self, id: Uuid, input: AdvanceInput) -> AppResult<Crop> {
        let at = input.at.unwrap_or_else(Utc::now);
        let mut tx = self.db.begin().await?;
        let crop = advance_in(&mut *tx, id, input.target_stage, at).await?;
        tx.commit().await?;
        Ok(crop)
    }

    /// Move a crop back to an earlier stage and re-plan its tasks
    pub async fn reset(&self, id: Uuid, input: ResetInput) -> AppResult<Crop> {
        let at = Utc::now();
        let mut tx = self.db.begin().await?;
        let before = lock_crop(&mut *tx, id).await?;
        let recipe = recipe::fetch_recipe(&mut *tx, before.recipe_id).await?;
        let mut crop = before.clone();

        let change = crop.reset_to_stage(input.stage, &recipe, at, input.reason)?;
        save_crop(&mut *tx, &crop).await?;
        insert_history(&mut *tx, &CropStageHistory::from_change(&change)).await?;

        crop_tasks::cancel_pending(&mut *tx, crop.id, at).await?;
        if self.schedule_tasks {
            crop_tasks::schedule(&mut *tx, &crop.plan_stage_tasks(&recipe)).await?;
        }
        activity::record(
            &mut *tx,
            Activity::new("crops", "crop", crop.id, "stage_reset").changes(&before, &crop)?,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            crop_id = %crop.id,
            from = before.current_stage.code(),
            to = crop.current_stage.code(),
            "crop reset"
        );
        Ok(crop)
    }

    pub async fn suspend_watering(&self, id: Uuid) -> AppResult<Crop> {
        self.update_watering(id, true).await
    }

    pub async fn resume_watering(&self, id: Uuid) -> AppResult<Crop> {
        self.update_watering(id, false).await
    }

    async fn update_watering(&self, id: Uuid, suspend: bool) -> AppResult<Crop> {
        let at = Utc::now();
        let mut tx = self.db.begin().await?;
        let before = lock_crop(&mut *tx, id).await?;
        let mut crop = before.clone();

        if suspend {
            crop.suspend_watering(at)?;
        } else {
            crop.resume_watering(at)?;
        }
        save_crop(&mut *tx, &crop).await?;
        activity::record(
            &mut *tx,
            Activity::new(
                "crops",
                "crop",
                crop.id,
                if suspend { "watering_suspended" } else { "watering_resumed" },
            )
            .changes(&before, &crop)?,
        )
        .await?;
        tx.commit().await?;

        Ok(crop)
    }

    /// Advance many crops; each crop runs in its own savepoint so failures
    /// only roll back that crop.
    pub async fn bulk_advance(&self, input: BulkAdvanceInput) -> AppResult<CropStageTransition> {
        if input.crop_ids.is_empty() {
            return Err(AppError::validation("crop_ids", "At least one crop is required"));
        }
        let at = input.at.unwrap_or_else(Utc::now);
        let mut crop_ids = input.crop_ids;
        crop_ids.sort();
        crop_ids.dedup();

        let mut transition = CropStageTransition::new(input.target_stage, crop_ids.len(), at);
        let mut tx = self.db.begin().await?;

        for crop_id in &crop_ids {
            let mut savepoint = (&mut *tx).begin().await?;
            match advance_in(&mut *savepoint, *crop_id, input.target_stage, at).await {
                Ok(_) => {
                    savepoint.commit().await?;
                    transition.record_success();
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    tracing::warn!(crop_id = %crop_id, error = %e, "crop could not be advanced");
                    transition.record_failure(*crop_id, e.to_string());
                }
            }
        }

        let failed_crops = serde_json::to_value(&transition.failed_crops)
            .map_err(|e| AppError::Internal(format!("failed crops could not be serialized: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO crop_stage_transitions (
                id, target_stage, requested_count, succeeded_count, failed_count, failed_crops, transitioned_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transition.id)
        .bind(transition.target_stage.map(|s| s.code()))
        .bind(transition.requested_count)
        .bind(transition.succeeded_count)
        .bind(transition.failed_count)
        .bind(failed_crops)
        .bind(transition.transitioned_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(
            transition_id = %transition.id,
            succeeded = transition.succeeded_count,
            failed = transition.failed_count,
            "bulk stage transition finished"
        );
        Ok(transition)
    }
}
