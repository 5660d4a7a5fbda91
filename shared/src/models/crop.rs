//! Crop trays and their stage lifecycle
//!
//! A crop moves soaking → germination → blackout → light → harvested. Soaking
//! and blackout are skipped when the recipe gives them no time. Stage
//! timestamps must never run backwards; every mutation is applied to a copy
//! and validated before it replaces the original.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lookup::{CropStage, Lookup};
use super::recipe::Recipe;
use crate::error::{DomainError, DomainResult};
use crate::validation::validate_tray_number;

/// One physical tray of microgreens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crop {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub order_id: Option<Uuid>,
    pub crop_plan_id: Option<Uuid>,
    pub tray_number: String,
    pub current_stage: CropStage,
    pub soaking_at: Option<DateTime<Utc>>,
    pub planting_at: Option<DateTime<Utc>>,
    pub germination_at: Option<DateTime<Utc>>,
    pub blackout_at: Option<DateTime<Utc>>,
    pub light_at: Option<DateTime<Utc>>,
    pub harvested_at: Option<DateTime<Utc>>,
    pub watering_suspended_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for planting a tray
#[derive(Debug, Clone, Deserialize)]
pub struct NewCrop {
    pub recipe_id: Uuid,
    pub order_id: Option<Uuid>,
    pub crop_plan_id: Option<Uuid>,
    pub tray_number: String,
    /// Soaking or germination; defaults to germination
    pub start_stage: Option<CropStage>,
    pub soaking_at: Option<DateTime<Utc>>,
    pub planting_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// A single stage move, recorded in the stage history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageChange {
    pub crop_id: Uuid,
    pub from_stage: CropStage,
    pub to_stage: CropStage,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropStageHistory {
    pub id: Uuid,
    pub crop_id: Uuid,
    pub from_stage: Option<CropStage>,
    pub to_stage: CropStage,
    pub transitioned_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CropStageHistory {
    pub fn from_change(change: &StageChange) -> Self {
        Self {
            id: Uuid::new_v4(),
            crop_id: change.crop_id,
            from_stage: Some(change.from_stage),
            to_stage: change.to_stage,
            transitioned_at: change.at,
            reason: change.reason.clone(),
            created_at: change.at,
        }
    }

    /// Entry for a freshly planted crop
    pub fn planted(crop: &Crop) -> Self {
        let at = crop.stage_entered_at().unwrap_or(crop.created_at);
        Self {
            id: Uuid::new_v4(),
            crop_id: crop.id,
            from_stage: None,
            to_stage: crop.current_stage,
            transitioned_at: at,
            reason: Some("planted".to_string()),
            created_at: at,
        }
    }
}

/// A crop that could not be moved during a bulk transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCrop {
    pub crop_id: Uuid,
    pub reason: String,
}

/// Outcome of moving many crops at once; partial failure is allowed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropStageTransition {
    pub id: Uuid,
    /// `None` means "advance each crop to its next stage"
    pub target_stage: Option<CropStage>,
    pub requested_count: i32,
    pub succeeded_count: i32,
    pub failed_count: i32,
    pub failed_crops: Vec<FailedCrop>,
    pub transitioned_at: DateTime<Utc>,
}

impl CropStageTransition {
    pub fn new(target_stage: Option<CropStage>, requested_count: usize, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_stage,
            requested_count: i32::try_from(requested_count).unwrap_or(i32::MAX),
            succeeded_count: 0,
            failed_count: 0,
            failed_crops: Vec::new(),
            transitioned_at: at,
        }
    }

    pub fn record_success(&mut self) {
        self.succeeded_count += 1;
    }

    pub fn record_failure(&mut self, crop_id: Uuid, reason: impl Into<String>) {
        self.failed_count += 1;
        self.failed_crops.push(FailedCrop {
            crop_id,
            reason: reason.into(),
        });
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed_count == 0 && self.succeeded_count == self.requested_count
    }
}

/// A background task the scheduler should run for a crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub crop_id: Uuid,
    pub task_type: String,
    pub target_stage: CropStage,
    pub due_at: DateTime<Utc>,
}

impl Crop {
    /// Plant a tray.
    ///
    /// Germination crops get `germination_at = planting_at` when unset.
    pub fn plant(input: NewCrop, recipe: &Recipe, now: DateTime<Utc>) -> DomainResult<Self> {
        validate_tray_number(&input.tray_number)?;
        if input.recipe_id != recipe.id {
            return Err(DomainError::validation("recipe_id", "Recipe does not match the crop input"));
        }
        recipe.ensure_plantable()?;

        let start_stage = input.start_stage.unwrap_or(CropStage::Germination);
        let mut crop = Crop {
            id: Uuid::new_v4(),
            recipe_id: recipe.id,
            order_id: input.order_id,
            crop_plan_id: input.crop_plan_id,
            tray_number: input.tray_number.trim().to_string(),
            current_stage: start_stage,
            soaking_at: input.soaking_at,
            planting_at: input.planting_at,
            germination_at: None,
            blackout_at: None,
            light_at: None,
            harvested_at: None,
            watering_suspended_at: None,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };

        match start_stage {
            CropStage::Soaking => {
                if recipe.skips_stage(CropStage::Soaking) {
                    return Err(DomainError::InvalidStateTransition(format!(
                        "recipe {} has no soaking stage",
                        recipe.name
                    )));
                }
                crop.soaking_at = Some(input.soaking_at.unwrap_or(now));
                crop.planting_at = None;
            }
            CropStage::Germination => {
                let planted = input.planting_at.unwrap_or(now);
                crop.planting_at = Some(planted);
                crop.germination_at = Some(planted);
            }
            other => {
                return Err(DomainError::InvalidStateTransition(format!(
                    "new crops start in soaking or germination, not {}",
                    other.code()
                )));
            }
        }

        crop.validate_timestamp_sequence()?;
        Ok(crop)
    }

    /// Stage timestamps in lifecycle order, with their column names
    pub fn timestamps(&self) -> [(&'static str, Option<DateTime<Utc>>); 6] {
        [
            ("soaking_at", self.soaking_at),
            ("planting_at", self.planting_at),
            ("germination_at", self.germination_at),
            ("blackout_at", self.blackout_at),
            ("light_at", self.light_at),
            ("harvested_at", self.harvested_at),
        ]
    }

    /// Timestamps must be non-decreasing; unset ones are skipped
    pub fn validate_timestamp_sequence(&self) -> DomainResult<()> {
        let mut previous: Option<(&'static str, DateTime<Utc>)> = None;
        for (field, value) in self.timestamps() {
            let Some(value) = value else { continue };
            if let Some((earlier_field, earlier)) = previous {
                if value < earlier {
                    return Err(DomainError::ChronologyViolation {
                        earlier: earlier_field,
                        later: field,
                    });
                }
            }
            previous = Some((field, value));
        }
        Ok(())
    }

    pub fn stage_timestamp(&self, stage: CropStage) -> Option<DateTime<Utc>> {
        match stage {
            CropStage::Soaking => self.soaking_at,
            CropStage::Germination => self.germination_at,
            CropStage::Blackout => self.blackout_at,
            CropStage::Light => self.light_at,
            CropStage::Harvested => self.harvested_at,
        }
    }

    fn set_stage_timestamp(&mut self, stage: CropStage, value: Option<DateTime<Utc>>) {
        match stage {
            CropStage::Soaking => self.soaking_at = value,
            CropStage::Germination => self.germination_at = value,
            CropStage::Blackout => self.blackout_at = value,
            CropStage::Light => self.light_at = value,
            CropStage::Harvested => self.harvested_at = value,
        }
    }

    pub fn is_harvested(&self) -> bool {
        self.current_stage.is_final_stage()
    }

    pub fn is_watering_suspended(&self) -> bool {
        self.watering_suspended_at.is_some()
    }

    /// Next stage the recipe actually uses
    pub fn next_viable_stage(&self, recipe: &Recipe) -> Option<CropStage> {
        CropStage::all()
            .iter()
            .copied()
            .filter(|stage| self.current_stage.is_before(*stage))
            .find(|stage| !recipe.skips_stage(*stage))
    }

    /// Move to the next viable stage at `at`
    pub fn advance_stage(&mut self, recipe: &Recipe, at: DateTime<Utc>) -> DomainResult<StageChange> {
        if self.is_harvested() {
            return Err(DomainError::FinalStage(self.current_stage.code().to_string()));
        }
        let next = self
            .next_viable_stage(recipe)
            .ok_or_else(|| DomainError::FinalStage(self.current_stage.code().to_string()))?;

        let mut updated = self.clone();
        if next == CropStage::Germination && updated.planting_at.is_none() {
            updated.planting_at = Some(at);
        }
        updated.set_stage_timestamp(next, Some(at));
        updated.current_stage = next;
        updated.updated_at = at;
        updated.validate_timestamp_sequence()?;

        let change = StageChange {
            crop_id: self.id,
            from_stage: self.current_stage,
            to_stage: next,
            at,
            reason: None,
        };
        *self = updated;
        Ok(change)
    }

    /// Advance through viable stages until `target` is reached
    pub fn advance_to_stage(
        &mut self,
        target: CropStage,
        recipe: &Recipe,
        at: DateTime<Utc>,
    ) -> DomainResult<Vec<StageChange>> {
        if !self.current_stage.is_before(target) {
            return Err(DomainError::InvalidStateTransition(format!(
                "crop {} is already at {} and cannot advance to {}",
                self.tray_number,
                self.current_stage.code(),
                target.code()
            )));
        }
        if recipe.skips_stage(target) {
            return Err(DomainError::InvalidStateTransition(format!(
                "recipe {} skips the {} stage",
                recipe.name,
                target.code()
            )));
        }

        let mut working = self.clone();
        let mut changes = Vec::new();
        while working.current_stage != target {
            changes.push(working.advance_stage(recipe, at)?);
        }
        *self = working;
        Ok(changes)
    }

    /// Move back to an earlier stage, clearing every later timestamp
    pub fn reset_to_stage(
        &mut self,
        target: CropStage,
        recipe: &Recipe,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> DomainResult<StageChange> {
        if !target.is_before(self.current_stage) {
            return Err(DomainError::InvalidStateTransition(format!(
                "cannot reset crop {} from {} to {}",
                self.tray_number,
                self.current_stage.code(),
                target.code()
            )));
        }
        if recipe.skips_stage(target) {
            return Err(DomainError::InvalidStateTransition(format!(
                "recipe {} skips the {} stage",
                recipe.name,
                target.code()
            )));
        }

        let mut updated = self.clone();
        for stage in CropStage::all().iter().filter(|s| target.is_before(**s)) {
            updated.set_stage_timestamp(*stage, None);
        }
        if target == CropStage::Soaking {
            updated.planting_at = None;
        }
        if updated.stage_timestamp(target).is_none() {
            updated.set_stage_timestamp(target, Some(at));
        }
        if target.is_before(CropStage::Light) {
            updated.watering_suspended_at = None;
        }
        updated.current_stage = target;
        updated.updated_at = at;
        updated.validate_timestamp_sequence()?;

        let change = StageChange {
            crop_id: self.id,
            from_stage: self.current_stage,
            to_stage: target,
            at,
            reason,
        };
        *self = updated;
        Ok(change)
    }

    pub fn suspend_watering(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.is_harvested() {
            return Err(DomainError::InvalidStateTransition(
                "harvested crops are not watered".to_string(),
            ));
        }
        if self.is_watering_suspended() {
            return Err(DomainError::InvalidStateTransition(format!(
                "watering already suspended for crop {}",
                self.tray_number
            )));
        }
        self.watering_suspended_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn resume_watering(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_watering_suspended() {
            return Err(DomainError::InvalidStateTransition(format!(
                "watering is not suspended for crop {}",
                self.tray_number
            )));
        }
        self.watering_suspended_at = None;
        self.updated_at = at;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Time calculations
    // ------------------------------------------------------------------

    /// When the crop entered its current stage
    pub fn stage_entered_at(&self) -> Option<DateTime<Utc>> {
        match self.current_stage {
            CropStage::Germination => self.germination_at.or(self.planting_at),
            stage => self.stage_timestamp(stage),
        }
    }

    /// When the current stage is due to end
    pub fn next_stage_due_at(&self, recipe: &Recipe) -> Option<DateTime<Utc>> {
        if self.is_harvested() {
            return None;
        }
        self.stage_entered_at()
            .map(|entered| entered + recipe.stage_duration(self.current_stage))
    }

    /// Projected harvest time from the current stage onwards
    pub fn expected_harvest_at(&self, recipe: &Recipe) -> Option<DateTime<Utc>> {
        if let Some(harvested) = self.harvested_at {
            return Some(harvested);
        }
        let entered = self.stage_entered_at()?;
        let remaining = CropStage::all()
            .iter()
            .filter(|s| !s.is_before(self.current_stage) && !s.is_final_stage())
            .filter(|s| !recipe.skips_stage(**s))
            .fold(Duration::zero(), |acc, s| acc + recipe.stage_duration(*s));
        Some(entered + remaining)
    }

    /// e.g. `"1d 4h"`, or `"overdue 3h"` when the stage has run long
    pub fn time_to_next_stage(&self, recipe: &Recipe, now: DateTime<Utc>) -> Option<String> {
        let due = self.next_stage_due_at(recipe)?;
        let remaining = due - now;
        if remaining < Duration::zero() {
            Some(format!("overdue {}", format_duration(-remaining)))
        } else {
            Some(format_duration(remaining))
        }
    }

    /// Time spent in the current stage
    pub fn stage_age(&self, now: DateTime<Utc>) -> Option<String> {
        self.stage_entered_at()
            .map(|entered| format_duration((now - entered).max(Duration::zero())))
    }

    /// Stage advance tasks from the current stage to harvest
    pub fn plan_stage_tasks(&self, recipe: &Recipe) -> Vec<PlannedTask> {
        let Some(mut due) = self.stage_entered_at() else {
            return Vec::new();
        };

        let mut tasks = Vec::new();
        let mut leaving = self.current_stage;
        for stage in CropStage::all()
            .iter()
            .copied()
            .filter(|s| self.current_stage.is_before(*s) && !recipe.skips_stage(*s))
        {
            due += recipe.stage_duration(leaving);
            tasks.push(PlannedTask {
                crop_id: self.id,
                task_type: format!("advance_to_{}", stage.code()),
                target_stage: stage,
                due_at: due,
            });
            leaving = stage;
        }
        tasks
    }
}

/// Compact duration display: `"2d 5h"`, `"5h 30m"`, `"12m"`
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes().max(0);
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
