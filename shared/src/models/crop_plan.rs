//! Crop plans: how many trays to sow, and when, to meet a delivery

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lookup::{CropPlanStatus, Lookup};
use super::recipe::Recipe;
use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropPlan {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub recipe_id: Uuid,
    pub status: CropPlanStatus,
    pub trays_needed: i32,
    pub grams_needed: Decimal,
    pub plant_by_date: NaiveDate,
    pub expected_harvest_date: NaiveDate,
    pub delivery_date: NaiveDate,
    pub notes: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCropPlan {
    pub order_id: Option<Uuid>,
    pub recipe_id: Uuid,
    /// Either trays or a gram target must be given
    pub trays_needed: Option<i32>,
    pub grams_target: Option<Decimal>,
    pub delivery_date: NaiveDate,
    pub notes: Option<String>,
}

/// Trays needed to yield `grams`, rounded up
pub fn trays_for_grams(grams: Decimal, expected_yield_per_tray: Decimal) -> DomainResult<i32> {
    if expected_yield_per_tray <= Decimal::ZERO {
        return Err(DomainError::validation(
            "expected_yield_grams",
            "Recipe has no expected yield per tray",
        ));
    }
    if grams <= Decimal::ZERO {
        return Err(DomainError::invalid_quantity("grams_target", "Target must be positive"));
    }
    let trays = (grams / expected_yield_per_tray).ceil();
    trays
        .to_i32()
        .ok_or_else(|| DomainError::invalid_quantity("grams_target", "Target is too large"))
}

impl CropPlan {
    /// Draft a plan working back from the delivery date
    pub fn draft(input: NewCropPlan, recipe: &Recipe, now: DateTime<Utc>) -> DomainResult<Self> {
        if input.recipe_id != recipe.id {
            return Err(DomainError::validation("recipe_id", "Recipe does not match the plan input"));
        }

        let trays_needed = match (input.trays_needed, input.grams_target) {
            (Some(trays), _) => trays,
            (None, Some(grams)) => {
                trays_for_grams(grams, recipe.expected_yield_grams.unwrap_or(Decimal::ZERO))?
            }
            (None, None) => {
                return Err(DomainError::validation(
                    "trays_needed",
                    "Either trays_needed or grams_target is required",
                ));
            }
        };
        if trays_needed <= 0 {
            return Err(DomainError::invalid_quantity("trays_needed", "Must plan at least one tray"));
        }

        let grow_days = recipe.total_days_rounded_up();
        let plant_by_date = input.delivery_date - Duration::days(grow_days);
        let expected_harvest_date = (plant_by_date.and_time(NaiveTime::MIN) + recipe.total_duration()).date();

        Ok(CropPlan {
            id: Uuid::new_v4(),
            order_id: input.order_id,
            recipe_id: recipe.id,
            status: CropPlanStatus::Draft,
            trays_needed,
            grams_needed: recipe.seed_required_for(trays_needed.unsigned_abs()),
            plant_by_date,
            expected_harvest_date,
            delivery_date: input.delivery_date,
            notes: input.notes,
            approved_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn can_be_approved(&self) -> bool {
        self.status == CropPlanStatus::Draft
    }

    pub fn can_generate_crops(&self) -> bool {
        self.status == CropPlanStatus::Approved
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_final() && self.status != CropPlanStatus::Generating && self.plant_by_date < today
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.can_be_approved() {
            return Err(self.transition_error(CropPlanStatus::Approved));
        }
        self.status = CropPlanStatus::Approved;
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn start_generation(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.can_generate_crops() {
            return Err(self.transition_error(CropPlanStatus::Generating));
        }
        self.status = CropPlanStatus::Generating;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != CropPlanStatus::Generating {
            return Err(self.transition_error(CropPlanStatus::Completed));
        }
        self.status = CropPlanStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status.is_final() {
            return Err(self.transition_error(CropPlanStatus::Cancelled));
        }
        self.status = CropPlanStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    fn transition_error(&self, to: CropPlanStatus) -> DomainError {
        DomainError::InvalidStateTransition(format!(
            "crop plan {} cannot move from {} to {}",
            self.id,
            self.status.code(),
            to.code()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::recipe::NewRecipe;

    fn sunflower() -> Recipe {
        Recipe::create(
            NewRecipe {
                name: "Sunflower".to_string(),
                seed_consumable_id: None,
                seed_density_grams_per_tray: Decimal::from(200),
                seed_soak_hours: 8,
                germination_days: Decimal::from(2),
                blackout_days: Decimal::from(2),
                light_days: Decimal::from(5),
                expected_yield_grams: Some(Decimal::from(400)),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn draft(recipe: &Recipe) -> CropPlan {
        CropPlan::draft(
            NewCropPlan {
                order_id: None,
                recipe_id: recipe.id,
                trays_needed: Some(3),
                grams_target: None,
                delivery_date: NaiveDate::from_ymd_opt(2026, 5, 20).unwrap(),
                notes: None,
            },
            recipe,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_draft_planning_math() {
        let recipe = sunflower();
        let plan = draft(&recipe);
        // 8h soak + 9 days grow rounds up to 10 days
        assert_eq!(plan.plant_by_date, NaiveDate::from_ymd_opt(2026, 5, 10).unwrap());
        assert_eq!(plan.grams_needed, Decimal::from(600));
        assert_eq!(plan.status, CropPlanStatus::Draft);
        assert_eq!(plan.expected_harvest_date, NaiveDate::from_ymd_opt(2026, 5, 19).unwrap());
    }

    #[test]
    fn test_trays_from_grams_round_up() {
        assert_eq!(trays_for_grams(Decimal::from(1000), Decimal::from(400)).unwrap(), 3);
        assert_eq!(trays_for_grams(Decimal::from(800), Decimal::from(400)).unwrap(), 2);
        assert!(trays_for_grams(Decimal::from(800), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_draft_requires_trays_or_grams() {
        let recipe = sunflower();
        let result = CropPlan::draft(
            NewCropPlan {
                order_id: None,
                recipe_id: recipe.id,
                trays_needed: None,
                grams_target: None,
                delivery_date: NaiveDate::from_ymd_opt(2026, 5, 20).unwrap(),
                notes: None,
            },
            &recipe,
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_double_approve_fails() {
        let recipe = sunflower();
        let mut plan = draft(&recipe);
        plan.approve(Utc::now()).unwrap();
        assert!(plan.can_generate_crops());
        assert!(matches!(
            plan.approve(Utc::now()),
            Err(DomainError::InvalidStateTransition(_))
        ));
        assert_eq!(plan.status, CropPlanStatus::Approved);
    }

    #[test]
    fn test_full_lifecycle() {
        let recipe = sunflower();
        let mut plan = draft(&recipe);
        assert!(plan.start_generation(Utc::now()).is_err());
        plan.approve(Utc::now()).unwrap();
        plan.start_generation(Utc::now()).unwrap();
        plan.complete(Utc::now()).unwrap();
        assert!(plan.completed_at.is_some());
        assert!(plan.cancel(Utc::now()).is_err());
    }

    #[test]
    fn test_cancel_from_draft() {
        let recipe = sunflower();
        let mut plan = draft(&recipe);
        plan.cancel(Utc::now()).unwrap();
        assert!(!plan.can_be_approved());
    }
}
