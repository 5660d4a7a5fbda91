//! Crop plan tests
//!
//! Tests for production planning including:
//! - Property 12: Tray Count Covers The Gram Target
//! - Property 13: Plant-By Date Leaves Time To Grow

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{trays_for_grams, CropPlan, CropPlanStatus, DomainError, NewCropPlan, NewRecipe, Recipe};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

fn delivery() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()
}

fn recipe(expected_yield: Option<&str>) -> Recipe {
    Recipe::create(
        NewRecipe {
            name: "Radish Daikon".to_string(),
            seed_consumable_id: None,
            seed_density_grams_per_tray: dec("30"),
            seed_soak_hours: 8,
            germination_days: dec("3"),
            blackout_days: dec("2"),
            light_days: dec("5"),
            expected_yield_grams: expected_yield.map(dec),
        },
        now(),
    )
    .unwrap()
}

fn draft(recipe: &Recipe, trays: Option<i32>, grams: Option<Decimal>) -> Result<CropPlan, DomainError> {
    CropPlan::draft(
        NewCropPlan {
            order_id: Some(Uuid::new_v4()),
            recipe_id: recipe.id,
            trays_needed: trays,
            grams_target: grams,
            delivery_date: delivery(),
            notes: None,
        },
        recipe,
        now(),
    )
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Soak plus ten grow days rounds up to eleven days before delivery
    #[test]
    fn test_plan_dates() {
        let recipe = recipe(Some("400"));
        let plan = draft(&recipe, Some(4), None).unwrap();

        assert_eq!(plan.status, CropPlanStatus::Draft);
        assert_eq!(plan.plant_by_date, NaiveDate::from_ymd_opt(2024, 6, 9).unwrap());
        assert_eq!(plan.expected_harvest_date, NaiveDate::from_ymd_opt(2024, 6, 19).unwrap());
        assert_eq!(plan.grams_needed, dec("120"));
    }

    /// Gram targets round up to whole trays
    #[test]
    fn test_trays_from_grams() {
        let recipe = recipe(Some("400"));
        let plan = draft(&recipe, None, Some(dec("1000"))).unwrap();
        assert_eq!(plan.trays_needed, 3);

        assert_eq!(trays_for_grams(dec("800"), dec("400")).unwrap(), 2);
        assert_eq!(trays_for_grams(dec("800.01"), dec("400")).unwrap(), 3);
    }

    /// A gram target needs a recipe yield
    #[test]
    fn test_grams_without_yield_rejected() {
        let recipe = recipe(None);
        let result = draft(&recipe, None, Some(dec("500")));
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    /// Either trays or grams must be given, and trays must be positive
    #[test]
    fn test_missing_or_zero_trays_rejected() {
        let recipe = recipe(Some("400"));
        assert!(draft(&recipe, None, None).is_err());
        assert!(matches!(
            draft(&recipe, Some(0), None),
            Err(DomainError::InvalidQuantity { .. })
        ));
    }

    /// Approving twice fails the second time
    #[test]
    fn test_double_approve() {
        let recipe = recipe(Some("400"));
        let mut plan = draft(&recipe, Some(2), None).unwrap();

        plan.approve(now()).unwrap();
        assert_eq!(plan.approved_at, Some(now()));

        let err = plan.approve(now() + Duration::minutes(1)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition(_)));
        assert_eq!(plan.approved_at, Some(now()));
    }

    /// Draft, approved, generating, completed
    #[test]
    fn test_generation_lifecycle() {
        let recipe = recipe(Some("400"));
        let mut plan = draft(&recipe, Some(2), None).unwrap();

        assert!(!plan.can_generate_crops());
        assert!(plan.start_generation(now()).is_err());

        plan.approve(now()).unwrap();
        plan.start_generation(now()).unwrap();
        assert!(!plan.is_overdue(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()));

        plan.complete(now()).unwrap();
        assert_eq!(plan.status, CropPlanStatus::Completed);
        assert!(plan.completed_at.is_some());
        assert!(plan.cancel(now()).is_err());
    }

    /// Open plans past their plant-by date are overdue
    #[test]
    fn test_overdue() {
        let recipe = recipe(Some("400"));
        let mut plan = draft(&recipe, Some(2), None).unwrap();

        assert!(!plan.is_overdue(plan.plant_by_date));
        assert!(plan.is_overdue(plan.plant_by_date + Duration::days(1)));

        plan.cancel(now()).unwrap();
        assert!(!plan.is_overdue(plan.plant_by_date + Duration::days(1)));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for generating gram targets (1g to 50kg)
    fn grams_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=50_000i64).prop_map(Decimal::from)
    }

    /// Strategy for generating per-tray yields (50g to 800g, 0.5g steps)
    fn yield_strategy() -> impl Strategy<Value = Decimal> {
        (100i64..=1600i64).prop_map(|n| Decimal::new(n * 5, 1))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property 12: Tray Count Covers The Gram Target
        /// trays * yield >= grams, and one tray fewer would not
        #[test]
        fn prop_trays_cover_target(
            grams in grams_strategy(),
            per_tray in yield_strategy(),
        ) {
            let trays = Decimal::from(trays_for_grams(grams, per_tray).unwrap());

            prop_assert!(trays * per_tray >= grams);
            prop_assert!((trays - Decimal::ONE) * per_tray < grams);
        }

        /// Property 13: Plant-By Date Leaves Time To Grow
        #[test]
        fn prop_plant_by_leaves_grow_time(
            soak_hours in 0i32..24,
            germination in 1i64..6,
            blackout in 0i64..6,
            light in 1i64..12,
        ) {
            let recipe = Recipe::create(
                NewRecipe {
                    name: "Broccoli".to_string(),
                    seed_consumable_id: None,
                    seed_density_grams_per_tray: dec("20"),
                    seed_soak_hours: soak_hours,
                    germination_days: Decimal::from(germination),
                    blackout_days: Decimal::from(blackout),
                    light_days: Decimal::from(light),
                    expected_yield_grams: None,
                },
                now(),
            )
            .unwrap();
            let plan = draft(&recipe, Some(1), None).unwrap();

            let start = plan.plant_by_date.and_hms_opt(0, 0, 0).unwrap();
            prop_assert!(start + recipe.total_duration() <= delivery().and_hms_opt(0, 0, 0).unwrap());
            prop_assert!(plan.expected_harvest_date <= plan.delivery_date);
            prop_assert_eq!(
                plan.delivery_date - plan.plant_by_date,
                Duration::days(recipe.total_days_rounded_up())
            );
        }
    }
}
