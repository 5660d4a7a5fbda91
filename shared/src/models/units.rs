//! Units of measure for consumables and the fixed conversion table

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::lookup::{lookup_table, Lookup};
use crate::error::{DomainError, DomainResult};

lookup_table! {
    /// Unit a consumable is counted in
    pub enum ConsumableUnit ("unit") {
        Grams => ("g", "Grams", "gray", 1),
        Kilograms => ("kg", "Kilograms", "gray", 2),
        Ounces => ("oz", "Ounces", "gray", 3),
        Pounds => ("lb", "Pounds", "gray", 4),
        Milliliters => ("ml", "Milliliters", "gray", 5),
        Liters => ("l", "Liters", "gray", 6),
        Units => ("unit", "Units", "gray", 7),
    }
}

/// Physical dimension of a unit; conversion only happens within one dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitDimension {
    Weight,
    Volume,
    Count,
}

impl ConsumableUnit {
    pub fn dimension(&self) -> UnitDimension {
        match self {
            ConsumableUnit::Grams
            | ConsumableUnit::Kilograms
            | ConsumableUnit::Ounces
            | ConsumableUnit::Pounds => UnitDimension::Weight,
            ConsumableUnit::Milliliters | ConsumableUnit::Liters => UnitDimension::Volume,
            ConsumableUnit::Units => UnitDimension::Count,
        }
    }

    /// How many base units (g, ml, unit) one of this unit holds
    pub fn base_factor(&self) -> Decimal {
        match self {
            ConsumableUnit::Grams => Decimal::ONE,
            ConsumableUnit::Kilograms => Decimal::from(1000),
            ConsumableUnit::Ounces => Decimal::new(283_495, 4),
            ConsumableUnit::Pounds => Decimal::new(453_592, 3),
            ConsumableUnit::Milliliters => Decimal::ONE,
            ConsumableUnit::Liters => Decimal::from(1000),
            ConsumableUnit::Units => Decimal::ONE,
        }
    }
}

/// Decimal places every stored quantity carries (`NUMERIC(14, 4)`)
pub const QUANTITY_SCALE: u32 = 4;

/// Convert `amount` from one unit to another.
///
/// Results are rounded to [`QUANTITY_SCALE`] places so the ledger sums exactly
/// what is stored; converting a unit to itself returns the amount untouched.
pub fn convert(amount: Decimal, from: ConsumableUnit, to: ConsumableUnit) -> DomainResult<Decimal> {
    if from == to {
        return Ok(amount);
    }
    if from.dimension() != to.dimension() {
        return Err(DomainError::IncompatibleUnits {
            from: from.code().to_string(),
            to: to.code().to_string(),
        });
    }

    let converted = amount * from.base_factor() / to.base_factor();
    Ok(converted.round_dp(QUANTITY_SCALE).normalize())
}

/// Format a quantity for display, e.g. `"1.5 kg"`
pub fn format_quantity(amount: Decimal, unit: ConsumableUnit) -> String {
    format!("{} {}", amount.round_dp(2).normalize(), unit.code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_kilograms_to_grams() {
        let grams = convert(dec("1.5"), ConsumableUnit::Kilograms, ConsumableUnit::Grams).unwrap();
        assert_eq!(grams, dec("1500"));
    }

    #[test]
    fn test_grams_to_kilograms() {
        let kg = convert(dec("250"), ConsumableUnit::Grams, ConsumableUnit::Kilograms).unwrap();
        assert_eq!(kg, dec("0.25"));
    }

    #[test]
    fn test_pounds_and_ounces() {
        let grams = convert(Decimal::ONE, ConsumableUnit::Pounds, ConsumableUnit::Grams).unwrap();
        assert_eq!(grams, dec("453.592"));

        let ounces = convert(Decimal::ONE, ConsumableUnit::Pounds, ConsumableUnit::Ounces).unwrap();
        assert!(ounces > dec("15.99") && ounces < dec("16.01"));
    }

    #[test]
    fn test_volume_conversion() {
        let ml = convert(dec("2"), ConsumableUnit::Liters, ConsumableUnit::Milliliters).unwrap();
        assert_eq!(ml, dec("2000"));
    }

    #[test]
    fn test_incompatible_dimensions() {
        let err = convert(Decimal::ONE, ConsumableUnit::Liters, ConsumableUnit::Grams).unwrap_err();
        assert_eq!(
            err,
            DomainError::IncompatibleUnits {
                from: "l".to_string(),
                to: "g".to_string()
            }
        );
    }

    #[test]
    fn test_conversion_rounds_to_stored_scale() {
        let kg = convert(dec("1.23456"), ConsumableUnit::Grams, ConsumableUnit::Kilograms).unwrap();
        assert_eq!(kg, dec("0.0012"));
        assert!(kg.scale() <= QUANTITY_SCALE);

        let ounces = convert(dec("100"), ConsumableUnit::Grams, ConsumableUnit::Ounces).unwrap();
        assert_eq!(ounces, dec("3.5274"));
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(dec("70.000"), ConsumableUnit::Grams), "70 g");
        assert_eq!(format_quantity(dec("1.256"), ConsumableUnit::Kilograms), "1.26 kg");
    }
}
