//! Consumable ledger tests
//!
//! Tests for consumable stock tracking including:
//! - Property 1: Ledger Balance Accuracy
//! - Property 2: Materialized Stock Matches Ledger
//! - Property 3: Rejected Movements Leave Stock Unchanged
//! - Property 4: Restock Flagging Correctness
//! - Property 17: Seed Draws Convert Recipe Grams

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    current_stock_from_transactions, verify_ledger, AddOutcome, Consumable, ConsumableTransaction,
    ConsumableTransactionType, ConsumableType, ConsumableUnit, DomainError, NewConsumable, SeedDraw,
    TransactionReference,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

fn receive(consumable_type: ConsumableType, unit: ConsumableUnit, stock: &str) -> (Consumable, Vec<ConsumableTransaction>) {
    let (consumable, opening) = Consumable::receive(
        NewConsumable {
            name: "Sunflower Black Oil".to_string(),
            consumable_type,
            supplier_id: None,
            quantity_unit: unit,
            initial_stock: dec(stock),
            restock_threshold: Some(dec("10")),
            restock_quantity: Some(dec("50")),
            cost_per_unit: None,
            lot_no: Some(" sf-2024-a ".to_string()),
        },
        now(),
    )
    .unwrap();
    let ledger = opening
        .into_iter()
        .map(|entry| entry.into_transaction(consumable.id, now()))
        .collect();
    (consumable, ledger)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Receiving stock writes one opening entry
    #[test]
    fn test_receive_writes_opening_entry() {
        let (consumable, ledger) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "100");

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].transaction_type, ConsumableTransactionType::Initial);
        assert_eq!(ledger[0].balance_after, dec("100"));
        assert_eq!(consumable.current_stock(), dec("100"));
    }

    /// Receiving nothing writes no ledger entry
    #[test]
    fn test_receive_empty_has_no_opening_entry() {
        let (consumable, ledger) = receive(ConsumableType::Packaging, ConsumableUnit::Units, "0");

        assert!(ledger.is_empty());
        assert!(consumable.is_out_of_stock());
    }

    /// Lot numbers are stored trimmed and uppercase
    #[test]
    fn test_lot_number_normalized() {
        let (mut consumable, _) = receive(ConsumableType::Seed, ConsumableUnit::Grams, "500");
        assert_eq!(consumable.lot_no.as_deref(), Some("SF-2024-A"));

        consumable.set_lot_no(Some("   "));
        assert_eq!(consumable.lot_no, None);
    }

    /// Deduct 30 of 100 then try 80: the second is refused and nothing moves
    #[test]
    fn test_overdraw_rejected() {
        let (mut consumable, _) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "100");

        let entry = consumable.deduct(dec("30"), None).unwrap();
        assert_eq!(entry.quantity, dec("-30"));
        assert_eq!(entry.balance_after, dec("70"));

        let version = consumable.version;
        let err = consumable.deduct(dec("80"), None).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                requested: dec("80"),
                available: dec("70"),
            }
        );
        assert_eq!(consumable.current_stock(), dec("70"));
        assert_eq!(consumable.consumed_quantity, dec("30"));
        assert_eq!(consumable.version, version);
    }

    /// Non-seed deductions are converted into the stock unit
    #[test]
    fn test_deduct_converts_units() {
        let (mut consumable, _) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "10");

        let entry = consumable.deduct(dec("500"), Some(ConsumableUnit::Grams)).unwrap();
        assert_eq!(entry.quantity, dec("-0.5"));
        assert_eq!(consumable.current_stock(), dec("9.5"));
    }

    /// Seeds are counted in their own unit whatever unit is given
    #[test]
    fn test_seed_skips_conversion() {
        let (mut consumable, _) = receive(ConsumableType::Seed, ConsumableUnit::Grams, "1000");

        let entry = consumable.deduct(dec("2"), Some(ConsumableUnit::Kilograms)).unwrap();
        assert_eq!(entry.quantity, dec("-2"));
        assert_eq!(consumable.current_stock(), dec("998"));
    }

    /// Mixing weight and volume is refused
    #[test]
    fn test_incompatible_units_rejected() {
        let (mut consumable, _) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "10");

        let err = consumable.deduct(dec("1"), Some(ConsumableUnit::Liters)).unwrap_err();
        assert!(matches!(err, DomainError::IncompatibleUnits { .. }));
        assert_eq!(consumable.current_stock(), dec("10"));
    }

    /// A different lot is not merged into the record
    #[test]
    fn test_add_with_new_lot_requires_new_record() {
        let (mut consumable, _) = receive(ConsumableType::Seed, ConsumableUnit::Grams, "100");

        let outcome = consumable.add(dec("50"), None, Some("sf-2024-b")).unwrap();
        assert_eq!(
            outcome,
            AddOutcome::NewLotRequired {
                lot_no: "SF-2024-B".to_string()
            }
        );
        assert_eq!(consumable.current_stock(), dec("100"));

        let outcome = consumable.add(dec("50"), None, Some("SF-2024-A")).unwrap();
        assert!(outcome.is_merged());
        assert_eq!(consumable.current_stock(), dec("150"));
    }

    /// Restock suggestion covers at least the shortfall
    #[test]
    fn test_restock_suggestion() {
        let (mut consumable, _) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "100");
        assert_eq!(consumable.restock_suggestion(), None);

        consumable.deduct(dec("95"), None).unwrap();
        assert!(consumable.needs_restock());
        assert_eq!(consumable.restock_suggestion(), Some(dec("50")));
    }

    /// Consumption keeps its order reference
    #[test]
    fn test_consumption_keeps_reference() {
        let (mut consumable, _) = receive(ConsumableType::Seed, ConsumableUnit::Grams, "100");
        let crop_id = Uuid::new_v4();

        let entry = consumable
            .record_consumption(dec("25"), Some(TransactionReference::Crop(crop_id)), None)
            .unwrap();
        assert_eq!(entry.reference, Some(TransactionReference::Crop(crop_id)));
        assert_eq!(entry.transaction_type, ConsumableTransactionType::Consumption);
    }

    /// Adjustments may go either way but never to zero
    #[test]
    fn test_adjustment_sign() {
        let (mut consumable, _) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "20");

        consumable.record_adjustment(dec("-2.5"), "count".to_string()).unwrap();
        consumable.record_adjustment(dec("1"), "recount".to_string()).unwrap();
        assert_eq!(consumable.current_stock(), dec("18.5"));

        let err = consumable.record_adjustment(Decimal::ZERO, "noop".to_string()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity { .. }));
    }

    /// A tampered snapshot is caught on replay
    #[test]
    fn test_verify_ledger_detects_tampering() {
        let (mut consumable, mut ledger) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "40");
        let entry = consumable.deduct(dec("15"), None).unwrap();
        ledger.push(entry.into_transaction(consumable.id, now()));

        assert_eq!(verify_ledger(&ledger).unwrap(), dec("25"));

        ledger[1].balance_after = dec("30");
        assert!(matches!(
            verify_ledger(&ledger).unwrap_err(),
            DomainError::Validation { .. }
        ));
    }

    /// Ledger balance is floored at zero
    #[test]
    fn test_balance_from_transactions_floor() {
        let quantities = [dec("10"), dec("-25")];
        assert_eq!(current_stock_from_transactions(&quantities), Decimal::ZERO);
    }

    /// Planting 30 g from seed stocked in kilograms draws 0.03 kg
    #[test]
    fn test_seed_draw_converts_recipe_grams() {
        let (mut seed, _) = receive(ConsumableType::Seed, ConsumableUnit::Kilograms, "50");

        let draw = seed.seed_draw(dec("30")).unwrap();
        assert_eq!(draw, SeedDraw::Deduct(dec("0.03")));

        if let SeedDraw::Deduct(amount) = draw {
            seed.record_consumption(amount, None, None).unwrap();
        }
        assert_eq!(seed.current_stock(), dec("49.97"));
    }

    /// 5 kg covers a 30 g recipe; 20 g of stock does not
    #[test]
    fn test_seed_draw_short_compares_in_stock_unit() {
        let (seed, _) = receive(ConsumableType::Seed, ConsumableUnit::Kilograms, "5");
        assert_eq!(seed.seed_draw(dec("30")).unwrap(), SeedDraw::Deduct(dec("0.03")));

        let (seed, _) = receive(ConsumableType::Seed, ConsumableUnit::Grams, "20");
        assert_eq!(
            seed.seed_draw(dec("30")).unwrap(),
            SeedDraw::Short {
                required: dec("30"),
                available: dec("20"),
            }
        );
    }

    /// Seed counted by the packet cannot back a recipe
    #[test]
    fn test_seed_draw_requires_weight_unit() {
        let (packets, _) = receive(ConsumableType::Seed, ConsumableUnit::Units, "40");
        assert!(matches!(packets.seed_draw(dec("30")), Err(DomainError::Validation { .. })));
        assert!(packets.ensure_recipe_seed().is_err());

        let (soil, _) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "40");
        assert!(matches!(soil.seed_draw(dec("30")), Err(DomainError::Validation { .. })));

        let (seed, _) = receive(ConsumableType::Seed, ConsumableUnit::Pounds, "2");
        assert!(seed.ensure_recipe_seed().is_ok());
    }

    /// Amounts too small for the stored scale draw nothing
    #[test]
    fn test_seed_draw_negligible() {
        let (seed, _) = receive(ConsumableType::Seed, ConsumableUnit::Kilograms, "5");
        assert_eq!(seed.seed_draw(dec("0.01")).unwrap(), SeedDraw::Nothing);
    }

    /// Transaction type codes round trip
    #[test]
    fn test_transaction_type_codes() {
        for t in ConsumableTransactionType::ALL {
            assert_eq!(t.as_str().parse::<ConsumableTransactionType>(), Ok(t));
            assert!(!(t.is_inbound() && t.is_outbound()));
        }
        assert!(matches!(
            "restock".parse::<ConsumableTransactionType>(),
            Err(DomainError::UnknownCode { .. })
        ));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for generating movement amounts (0.1 to 100.0)
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=1000i64).prop_map(|n| Decimal::new(n, 1))
    }

    /// Strategy for generating a movement: true for stock in
    fn movement_strategy() -> impl Strategy<Value = (bool, Decimal)> {
        (any::<bool>(), quantity_strategy())
    }

    fn consumable_type_strategy() -> impl Strategy<Value = ConsumableType> {
        prop_oneof![
            Just(ConsumableType::Seed),
            Just(ConsumableType::Soil),
            Just(ConsumableType::Packaging),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property 1: Ledger Balance Accuracy
        /// Every balance_after equals the running sum of signed quantities
        #[test]
        fn prop_ledger_balance_accuracy(
            consumable_type in consumable_type_strategy(),
            movements in prop::collection::vec(movement_strategy(), 1..30),
        ) {
            let (mut consumable, mut ledger) = receive(consumable_type, ConsumableUnit::Grams, "50");

            for (inbound, amount) in movements {
                let result = if inbound {
                    consumable.record_addition(amount, None, None)
                } else {
                    consumable.record_consumption(amount, None, None)
                };
                if let Ok(entry) = result {
                    ledger.push(entry.into_transaction(consumable.id, now()));
                }
            }

            let replayed = verify_ledger(&ledger);
            prop_assert!(replayed.is_ok());
            let quantities: Vec<Decimal> = ledger.iter().map(|t| t.quantity).collect();
            prop_assert_eq!(current_stock_from_transactions(&quantities), consumable.current_stock());
        }

        /// Property 2: Materialized Stock Matches Ledger
        /// For non-seeds, initial_stock - consumed_quantity = total_quantity
        #[test]
        fn prop_materialized_stock_identity(
            movements in prop::collection::vec(movement_strategy(), 1..30),
        ) {
            let (mut consumable, _) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "25");

            for (inbound, amount) in movements {
                let _ = if inbound {
                    consumable.record_transfer_in(amount, None, None)
                } else {
                    consumable.record_waste(amount, None)
                };
                prop_assert_eq!(consumable.initial_stock - consumable.consumed_quantity, consumable.total_quantity);
                prop_assert!(consumable.current_stock() >= Decimal::ZERO);
            }
        }

        /// Property 3: Rejected Movements Leave Stock Unchanged
        #[test]
        fn prop_overdraw_leaves_state_unchanged(
            stock in quantity_strategy(),
            extra in quantity_strategy(),
        ) {
            let (mut consumable, _) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, &stock.to_string());
            let before = (consumable.initial_stock, consumable.consumed_quantity, consumable.total_quantity, consumable.version);

            let result = consumable.record_consumption(stock + extra, None, None);

            let is_insufficient = matches!(result, Err(DomainError::InsufficientStock { .. }));
            prop_assert!(is_insufficient);
            prop_assert_eq!(
                (consumable.initial_stock, consumable.consumed_quantity, consumable.total_quantity, consumable.version),
                before
            );
        }

        /// Property 4: Restock Flagging Correctness
        /// Flagged exactly when stock is at or below the threshold
        #[test]
        fn prop_restock_flagging(
            consumed in quantity_strategy(),
        ) {
            let (mut consumable, _) = receive(ConsumableType::Soil, ConsumableUnit::Kilograms, "100");
            consumable.deduct(consumed, None).unwrap();

            let expected = consumable.current_stock() <= consumable.restock_threshold;
            prop_assert_eq!(consumable.needs_restock(), expected);
            prop_assert_eq!(consumable.restock_suggestion().is_some(), expected);
        }

        /// Property 17: Seed Draws Convert Recipe Grams
        /// The draw equals the grams in the seed's unit, and is short exactly
        /// when that exceeds stock
        #[test]
        fn prop_seed_draw_converts_grams(
            stock_kg in quantity_strategy(),
            grams in (1i64..=200_000i64).prop_map(Decimal::from),
        ) {
            let (seed, _) = receive(ConsumableType::Seed, ConsumableUnit::Kilograms, &stock_kg.to_string());
            let required = grams / Decimal::from(1000);

            match seed.seed_draw(grams).unwrap() {
                SeedDraw::Deduct(amount) => {
                    prop_assert_eq!(amount, required);
                    prop_assert!(amount <= seed.current_stock());
                }
                SeedDraw::Short { required: short, available } => {
                    prop_assert_eq!(short, required);
                    prop_assert_eq!(available, seed.current_stock());
                    prop_assert!(short > available);
                }
                SeedDraw::Nothing => prop_assert!(false, "whole grams always draw something"),
            }
        }
    }
}
