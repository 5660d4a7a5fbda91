//! Grow recipes

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lookup::CropStage;
use crate::error::{DomainError, DomainResult};
use crate::validation::{validate_grow_days, validate_name, validate_non_negative};

/// How a variety is grown: seed, density and time per stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,
    pub name: String,
    /// Seed consumable drawn from when trays are planted
    pub seed_consumable_id: Option<Uuid>,
    pub seed_density_grams_per_tray: Decimal,
    pub seed_soak_hours: i32,
    pub germination_days: Decimal,
    pub blackout_days: Decimal,
    pub light_days: Decimal,
    pub expected_yield_grams: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRecipe {
    pub name: String,
    pub seed_consumable_id: Option<Uuid>,
    pub seed_density_grams_per_tray: Decimal,
    #[serde(default)]
    pub seed_soak_hours: i32,
    pub germination_days: Decimal,
    #[serde(default)]
    pub blackout_days: Decimal,
    pub light_days: Decimal,
    pub expected_yield_grams: Option<Decimal>,
}

impl Recipe {
    pub fn create(input: NewRecipe, now: DateTime<Utc>) -> DomainResult<Self> {
        validate_name("name", &input.name)?;
        validate_non_negative("seed_density_grams_per_tray", input.seed_density_grams_per_tray)?;
        validate_non_negative("seed_soak_hours", Decimal::from(input.seed_soak_hours))?;
        validate_grow_days("germination_days", input.germination_days)?;
        validate_grow_days("blackout_days", input.blackout_days)?;
        validate_grow_days("light_days", input.light_days)?;
        if let Some(expected) = input.expected_yield_grams {
            validate_non_negative("expected_yield_grams", expected)?;
        }

        Ok(Recipe {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            seed_consumable_id: input.seed_consumable_id,
            seed_density_grams_per_tray: input.seed_density_grams_per_tray,
            seed_soak_hours: input.seed_soak_hours,
            germination_days: input.germination_days,
            blackout_days: input.blackout_days,
            light_days: input.light_days,
            expected_yield_grams: input.expected_yield_grams,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Only active recipes can be sown
    pub fn ensure_plantable(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::validation(
                "recipe_id",
                format!("Recipe {} is not active", self.name),
            ));
        }
        Ok(())
    }

    /// Soaking and blackout can be switched off by a zero duration
    pub fn skips_stage(&self, stage: CropStage) -> bool {
        match stage {
            CropStage::Soaking => self.seed_soak_hours <= 0,
            CropStage::Blackout => self.blackout_days.is_zero(),
            _ => false,
        }
    }

    /// Time a crop spends in `stage`
    pub fn stage_duration(&self, stage: CropStage) -> Duration {
        match stage {
            CropStage::Soaking => Duration::hours(i64::from(self.seed_soak_hours.max(0))),
            CropStage::Germination => days_to_duration(self.germination_days),
            CropStage::Blackout => days_to_duration(self.blackout_days),
            CropStage::Light => days_to_duration(self.light_days),
            CropStage::Harvested => Duration::zero(),
        }
    }

    /// Planting to harvest
    pub fn grow_duration(&self) -> Duration {
        self.stage_duration(CropStage::Germination)
            + self.stage_duration(CropStage::Blackout)
            + self.stage_duration(CropStage::Light)
    }

    /// Soak start to harvest
    pub fn total_duration(&self) -> Duration {
        self.stage_duration(CropStage::Soaking) + self.grow_duration()
    }

    /// Whole days from soak start to harvest, rounded up
    pub fn total_days_rounded_up(&self) -> i64 {
        let total = self.total_duration();
        let days = total.num_days();
        if total > Duration::days(days) {
            days + 1
        } else {
            days
        }
    }

    /// Grams of seed needed for `trays`
    pub fn seed_required_for(&self, trays: u32) -> Decimal {
        self.seed_density_grams_per_tray * Decimal::from(trays)
    }
}

/// Fractional days to a whole number of minutes
pub fn days_to_duration(days: Decimal) -> Duration {
    let minutes = (days * Decimal::from(24 * 60)).round().to_i64().unwrap_or(0);
    Duration::minutes(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pea_recipe() -> Recipe {
        Recipe::create(
            NewRecipe {
                name: "Pea Shoots".to_string(),
                seed_consumable_id: None,
                seed_density_grams_per_tray: Decimal::from(250),
                seed_soak_hours: 12,
                germination_days: Decimal::from(2),
                blackout_days: Decimal::from(3),
                light_days: Decimal::new(45, 1),
                expected_yield_grams: Some(Decimal::from(450)),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_stage_durations() {
        let recipe = pea_recipe();
        assert_eq!(recipe.stage_duration(CropStage::Soaking), Duration::hours(12));
        assert_eq!(recipe.stage_duration(CropStage::Light), Duration::hours(108));
        assert_eq!(recipe.grow_duration(), Duration::hours(48 + 72 + 108));
    }

    #[test]
    fn test_total_days_rounded_up() {
        // 12h + 2d + 3d + 4.5d = 10 days exactly
        assert_eq!(pea_recipe().total_days_rounded_up(), 10);

        let mut recipe = pea_recipe();
        recipe.seed_soak_hours = 13;
        assert_eq!(recipe.total_days_rounded_up(), 11);
    }

    #[test]
    fn test_inactive_recipe_is_not_plantable() {
        let mut recipe = pea_recipe();
        assert!(recipe.ensure_plantable().is_ok());
        recipe.is_active = false;
        assert!(matches!(recipe.ensure_plantable(), Err(DomainError::Validation { .. })));
    }

    #[test]
    fn test_skips_stage() {
        let mut recipe = pea_recipe();
        assert!(!recipe.skips_stage(CropStage::Blackout));
        recipe.blackout_days = Decimal::ZERO;
        recipe.seed_soak_hours = 0;
        assert!(recipe.skips_stage(CropStage::Blackout));
        assert!(recipe.skips_stage(CropStage::Soaking));
        assert!(!recipe.skips_stage(CropStage::Light));
    }

    #[test]
    fn test_seed_required() {
        assert_eq!(pea_recipe().seed_required_for(4), Decimal::from(1000));
    }

    #[test]
    fn test_rejects_long_grow() {
        let result = Recipe::create(
            NewRecipe {
                name: "Wheatgrass".to_string(),
                seed_consumable_id: None,
                seed_density_grams_per_tray: Decimal::from(300),
                seed_soak_hours: 8,
                germination_days: Decimal::from(2),
                blackout_days: Decimal::ZERO,
                light_days: Decimal::from(120),
                expected_yield_grams: None,
            },
            Utc::now(),
        );
        assert!(result.is_err());
    }
}
