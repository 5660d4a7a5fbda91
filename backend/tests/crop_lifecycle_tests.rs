//! Crop lifecycle tests
//!
//! Tests for tray stage tracking including:
//! - Property 9: Stage Timestamps Stay In Order
//! - Property 10: Skipped Stages Are Never Entered
//! - Property 11: Reset Clears Later Stages

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{format_duration, Crop, CropStage, DomainError, Lookup, NewCrop, NewRecipe, Recipe};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn planted_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 7, 0, 0).unwrap()
}

fn recipe(soak_hours: i32, blackout_days: &str) -> Recipe {
    Recipe::create(
        NewRecipe {
            name: "Pea Shoots".to_string(),
            seed_consumable_id: Some(Uuid::new_v4()),
            seed_density_grams_per_tray: dec("250"),
            seed_soak_hours: soak_hours,
            germination_days: dec("3"),
            blackout_days: dec(blackout_days),
            light_days: dec("5"),
            expected_yield_grams: Some(dec("400")),
        },
        planted_at(),
    )
    .unwrap()
}

fn plant(recipe: &Recipe, start_stage: Option<CropStage>) -> Crop {
    Crop::plant(
        NewCrop {
            recipe_id: recipe.id,
            order_id: None,
            crop_plan_id: None,
            tray_number: "T-101".to_string(),
            start_stage,
            soaking_at: None,
            planting_at: Some(planted_at()),
            notes: None,
        },
        recipe,
        planted_at(),
    )
    .unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Germination crops get their germination time from planting
    #[test]
    fn test_plant_in_germination() {
        let recipe = recipe(0, "2");
        let crop = plant(&recipe, None);

        assert_eq!(crop.current_stage, CropStage::Germination);
        assert_eq!(crop.germination_at, Some(planted_at()));
        assert_eq!(crop.planting_at, Some(planted_at()));
    }

    /// Soaking start is refused for recipes without a soak
    #[test]
    fn test_plant_soaking_without_soak_time() {
        let recipe = recipe(0, "2");
        let result = Crop::plant(
            NewCrop {
                recipe_id: recipe.id,
                order_id: None,
                crop_plan_id: None,
                tray_number: "T-102".to_string(),
                start_stage: Some(CropStage::Soaking),
                soaking_at: None,
                planting_at: None,
                notes: None,
            },
            &recipe,
            planted_at(),
        );
        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
    }

    /// Soaking crops pick up their planting time on the first advance
    #[test]
    fn test_soaking_to_germination_sets_planting() {
        let recipe = recipe(12, "2");
        let mut crop = Crop::plant(
            NewCrop {
                recipe_id: recipe.id,
                order_id: None,
                crop_plan_id: None,
                tray_number: "T-103".to_string(),
                start_stage: Some(CropStage::Soaking),
                soaking_at: Some(planted_at()),
                planting_at: None,
                notes: None,
            },
            &recipe,
            planted_at(),
        )
        .unwrap();
        assert_eq!(crop.planting_at, None);

        let at = planted_at() + Duration::hours(12);
        let change = crop.advance_stage(&recipe, at).unwrap();
        assert_eq!(change.from_stage, CropStage::Soaking);
        assert_eq!(change.to_stage, CropStage::Germination);
        assert_eq!(crop.planting_at, Some(at));
    }

    /// Zero-day blackout goes straight from germination to light
    #[test]
    fn test_blackout_skipped() {
        let recipe = recipe(0, "0");
        let mut crop = plant(&recipe, None);

        let change = crop.advance_stage(&recipe, planted_at() + Duration::days(3)).unwrap();
        assert_eq!(change.to_stage, CropStage::Light);
        assert_eq!(crop.blackout_at, None);
    }

    /// Harvested crops cannot advance
    #[test]
    fn test_harvested_is_final() {
        let recipe = recipe(0, "2");
        let mut crop = plant(&recipe, None);
        crop.advance_to_stage(CropStage::Harvested, &recipe, planted_at() + Duration::days(10))
            .unwrap();

        let err = crop.advance_stage(&recipe, planted_at() + Duration::days(11)).unwrap_err();
        assert_eq!(err, DomainError::FinalStage("harvested".to_string()));
        assert!(crop.suspend_watering(planted_at() + Duration::days(11)).is_err());
    }

    /// Advancing to a time before planting is refused and nothing changes
    #[test]
    fn test_advance_before_planting_rejected() {
        let recipe = recipe(0, "2");
        let mut crop = plant(&recipe, None);

        let err = crop.advance_stage(&recipe, planted_at() - Duration::hours(1)).unwrap_err();
        assert!(matches!(err, DomainError::ChronologyViolation { .. }));
        assert_eq!(crop.current_stage, CropStage::Germination);
        assert_eq!(crop.blackout_at, None);
    }

    /// Advancing to a skipped stage is refused
    #[test]
    fn test_advance_to_skipped_stage_rejected() {
        let recipe = recipe(0, "0");
        let mut crop = plant(&recipe, None);

        let result = crop.advance_to_stage(CropStage::Blackout, &recipe, planted_at() + Duration::days(3));
        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
    }

    /// Reset to germination clears blackout and light
    #[test]
    fn test_reset_clears_later_timestamps() {
        let recipe = recipe(0, "2");
        let mut crop = plant(&recipe, None);
        crop.advance_to_stage(CropStage::Light, &recipe, planted_at() + Duration::days(5))
            .unwrap();
        crop.suspend_watering(planted_at() + Duration::days(6)).unwrap();

        let change = crop
            .reset_to_stage(
                CropStage::Germination,
                &recipe,
                planted_at() + Duration::days(7),
                Some("mould".to_string()),
            )
            .unwrap();
        assert_eq!(change.reason.as_deref(), Some("mould"));
        assert_eq!(crop.current_stage, CropStage::Germination);
        assert_eq!(crop.germination_at, Some(planted_at()));
        assert_eq!(crop.blackout_at, None);
        assert_eq!(crop.light_at, None);
        assert!(!crop.is_watering_suspended());
    }

    /// Reset only goes backwards
    #[test]
    fn test_reset_forward_rejected() {
        let recipe = recipe(0, "2");
        let mut crop = plant(&recipe, None);
        let result = crop.reset_to_stage(CropStage::Light, &recipe, planted_at(), None);
        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
    }

    /// A recipe without blackout cannot be reset into blackout
    #[test]
    fn test_reset_into_skipped_stage_rejected() {
        let recipe = recipe(0, "0");
        let mut crop = plant(&recipe, None);
        crop.advance_to_stage(CropStage::Light, &recipe, planted_at() + Duration::days(4))
            .unwrap();

        let result = crop.reset_to_stage(CropStage::Blackout, &recipe, planted_at() + Duration::days(5), None);
        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
        assert_eq!(crop.current_stage, CropStage::Light);
        assert_eq!(crop.blackout_at, None);

        crop.reset_to_stage(CropStage::Germination, &recipe, planted_at() + Duration::days(5), None)
            .unwrap();
        assert_eq!(crop.current_stage, CropStage::Germination);
    }

    /// Generated and hand-planted trays both refuse a retired recipe
    #[test]
    fn test_inactive_recipe_cannot_be_planted() {
        let mut recipe = recipe(0, "2");
        recipe.is_active = false;
        let result = Crop::plant(
            NewCrop {
                recipe_id: recipe.id,
                order_id: None,
                crop_plan_id: Some(Uuid::new_v4()),
                tray_number: "PLAN-01".to_string(),
                start_stage: None,
                soaking_at: None,
                planting_at: Some(planted_at()),
                notes: None,
            },
            &recipe,
            planted_at(),
        );
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    /// Watering can only be suspended once
    #[test]
    fn test_watering_toggle() {
        let recipe = recipe(0, "2");
        let mut crop = plant(&recipe, None);

        assert!(crop.resume_watering(planted_at()).is_err());
        crop.suspend_watering(planted_at()).unwrap();
        assert!(crop.suspend_watering(planted_at()).is_err());
        crop.resume_watering(planted_at()).unwrap();
    }

    /// Due times and harvest projection follow the recipe
    #[test]
    fn test_stage_timing() {
        let recipe = recipe(0, "2");
        let crop = plant(&recipe, None);

        assert_eq!(crop.next_stage_due_at(&recipe), Some(planted_at() + Duration::days(3)));
        assert_eq!(crop.expected_harvest_at(&recipe), Some(planted_at() + Duration::days(10)));
        assert_eq!(
            crop.time_to_next_stage(&recipe, planted_at() + Duration::hours(30)),
            Some("1d 18h".to_string())
        );
        assert_eq!(
            crop.time_to_next_stage(&recipe, planted_at() + Duration::days(4)),
            Some("overdue 1d 0h".to_string())
        );
        assert_eq!(crop.stage_age(planted_at() + Duration::minutes(90)), Some("1h 30m".to_string()));
    }

    /// One advance task per remaining stage
    #[test]
    fn test_plan_stage_tasks() {
        let recipe = recipe(0, "2");
        let crop = plant(&recipe, None);

        let tasks = crop.plan_stage_tasks(&recipe);
        let planned: Vec<(&str, DateTime<Utc>)> = tasks
            .iter()
            .map(|t| (t.task_type.as_str(), t.due_at))
            .collect();
        assert_eq!(
            planned,
            vec![
                ("advance_to_blackout", planted_at() + Duration::days(3)),
                ("advance_to_light", planted_at() + Duration::days(5)),
                ("advance_to_harvested", planted_at() + Duration::days(10)),
            ]
        );
    }

    /// Compact duration formatting
    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::hours(53)), "2d 5h");
        assert_eq!(format_duration(Duration::minutes(330)), "5h 30m");
        assert_eq!(format_duration(Duration::minutes(12)), "12m");
        assert_eq!(format_duration(Duration::minutes(-5)), "0m");
    }

    /// Fractional days round to whole minutes
    #[test]
    fn test_recipe_durations() {
        let recipe = recipe(8, "1.5");
        assert_eq!(recipe.stage_duration(CropStage::Blackout), Duration::hours(36));
        assert_eq!(recipe.grow_duration(), Duration::hours(228));
        assert_eq!(recipe.total_days_rounded_up(), 10);
        assert_eq!(recipe.seed_required_for(4), dec("1000"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for generating gaps between stage moves (0 to 72 hours)
    fn gap_strategy() -> impl Strategy<Value = Duration> {
        (0i64..=72 * 60).prop_map(Duration::minutes)
    }

    fn stage_strategy() -> impl Strategy<Value = CropStage> {
        prop::sample::select(CropStage::all().to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property 9: Stage Timestamps Stay In Order
        #[test]
        fn prop_timestamps_stay_in_order(
            soak_hours in 0i32..24,
            blackout_days in 0i64..4,
            gaps in prop::collection::vec(gap_strategy(), 1..6),
        ) {
            let recipe = recipe(soak_hours, &blackout_days.to_string());
            let start = if recipe.skips_stage(CropStage::Soaking) { None } else { Some(CropStage::Soaking) };
            let mut crop = plant(&recipe, start);

            let mut at = planted_at();
            for gap in gaps {
                at += gap;
                if crop.advance_stage(&recipe, at).is_err() {
                    break;
                }
                prop_assert!(crop.validate_timestamp_sequence().is_ok());
            }
        }

        /// Property 10: Skipped Stages Are Never Entered
        #[test]
        fn prop_skipped_stages_never_entered(
            soak_hours in 0i32..24,
            blackout_days in 0i64..4,
        ) {
            let recipe = recipe(soak_hours, &blackout_days.to_string());
            let mut crop = plant(&recipe, None);

            let changes = crop
                .advance_to_stage(CropStage::Harvested, &recipe, planted_at() + Duration::days(12))
                .unwrap();

            for change in &changes {
                prop_assert!(!recipe.skips_stage(change.to_stage));
            }
            let expected = if recipe.skips_stage(CropStage::Blackout) { 2 } else { 3 };
            prop_assert_eq!(changes.len(), expected);
            prop_assert_eq!(crop.blackout_at.is_some(), !recipe.skips_stage(CropStage::Blackout));
        }

        /// Property 11: Reset Clears Later Stages
        #[test]
        fn prop_reset_clears_later_stages(
            target in stage_strategy(),
        ) {
            let recipe = recipe(12, "2");
            let mut crop = plant(&recipe, Some(CropStage::Soaking));
            crop.advance_to_stage(CropStage::Harvested, &recipe, planted_at() + Duration::days(11))
                .unwrap();

            let result = crop.reset_to_stage(target, &recipe, planted_at() + Duration::days(12), None);
            if target == CropStage::Harvested {
                prop_assert!(result.is_err());
            } else {
                prop_assert!(result.is_ok());
                prop_assert_eq!(crop.current_stage, target);
                for stage in CropStage::all().iter().filter(|s| target.is_before(**s)) {
                    prop_assert_eq!(crop.stage_timestamp(*stage), None);
                }
                prop_assert!(crop.stage_timestamp(target).is_some());
                prop_assert!(crop.validate_timestamp_sequence().is_ok());
            }
        }
    }
}
