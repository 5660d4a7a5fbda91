//! Validation utilities for farm operations input

use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};
use crate::models::QUANTITY_SCALE;

// ============================================================================
// Identifiers
// ============================================================================

/// Normalize a lot number: trimmed and uppercased, blank becomes `None`
pub fn normalize_lot_number(lot_no: Option<&str>) -> Option<String> {
    lot_no
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
}

/// Validate batch number format (1-50 chars, alphanumeric plus `-` and `_`)
pub fn validate_batch_number(batch_number: &str) -> DomainResult<()> {
    let trimmed = batch_number.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("batch_number", "Batch number is required"));
    }
    if trimmed.len() > 50 {
        return Err(DomainError::validation(
            "batch_number",
            "Batch number must be at most 50 characters",
        ));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DomainError::validation(
            "batch_number",
            "Batch number may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

/// Validate a tray label
pub fn validate_tray_number(tray_number: &str) -> DomainResult<()> {
    if tray_number.trim().is_empty() {
        return Err(DomainError::validation("tray_number", "Tray number is required"));
    }
    if tray_number.len() > 32 {
        return Err(DomainError::validation(
            "tray_number",
            "Tray number must be at most 32 characters",
        ));
    }
    Ok(())
}

/// Validate a required display name
pub fn validate_name(field: &str, name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation(field, "Name is required"));
    }
    if name.len() > 255 {
        return Err(DomainError::validation(field, "Name must be at most 255 characters"));
    }
    Ok(())
}

// ============================================================================
// Quantities
// ============================================================================

/// Quantities moved in or out of stock must be strictly positive
pub fn validate_positive_quantity(field: &str, quantity: Decimal) -> DomainResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::invalid_quantity(field, "must be greater than zero"));
    }
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err(DomainError::invalid_quantity(
            field,
            format!("must have at most {} decimal places", QUANTITY_SCALE),
        ));
    }
    Ok(())
}

/// Thresholds and costs may be zero but never negative
pub fn validate_non_negative(field: &str, value: Decimal) -> DomainResult<()> {
    if value < Decimal::ZERO {
        return Err(DomainError::invalid_quantity(field, "must not be negative"));
    }
    Ok(())
}

/// Grow durations are expressed in days and capped at a season
pub fn validate_grow_days(field: &str, days: Decimal) -> DomainResult<()> {
    validate_non_negative(field, days)?;
    if days > Decimal::from(90) {
        return Err(DomainError::invalid_quantity(field, "must be at most 90 days"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Identifier Tests
    // ========================================================================

    #[test]
    fn test_normalize_lot_number_uppercases() {
        assert_eq!(normalize_lot_number(Some("abc123")), Some("ABC123".to_string()));
    }

    #[test]
    fn test_normalize_lot_number_trims() {
        assert_eq!(normalize_lot_number(Some("  lot-7 ")), Some("LOT-7".to_string()));
    }

    #[test]
    fn test_normalize_lot_number_blank() {
        assert_eq!(normalize_lot_number(Some("   ")), None);
        assert_eq!(normalize_lot_number(None), None);
    }

    #[test]
    fn test_validate_batch_number() {
        assert!(validate_batch_number("PEA-2026-001").is_ok());
        assert!(validate_batch_number("").is_err());
        assert!(validate_batch_number("bad batch").is_err());
        assert!(validate_batch_number(&"X".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_tray_number() {
        assert!(validate_tray_number("T-14").is_ok());
        assert!(validate_tray_number(" ").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Sunflower Shoots").is_ok());
        assert!(validate_name("name", "").is_err());
    }

    // ========================================================================
    // Quantity Tests
    // ========================================================================

    #[test]
    fn test_validate_positive_quantity() {
        assert!(validate_positive_quantity("quantity", Decimal::ONE).is_ok());
        assert!(validate_positive_quantity("quantity", Decimal::ZERO).is_err());
        assert!(validate_positive_quantity("quantity", Decimal::NEGATIVE_ONE).is_err());
    }

    #[test]
    fn test_quantity_scale_limited_to_storage() {
        assert!(validate_positive_quantity("quantity", Decimal::new(12_345, 4)).is_ok());
        assert!(validate_positive_quantity("quantity", Decimal::new(1_234_500, 6)).is_ok());
        assert!(validate_positive_quantity("quantity", Decimal::new(123_456, 5)).is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative("restock_threshold", Decimal::ZERO).is_ok());
        assert!(validate_non_negative("restock_threshold", Decimal::NEGATIVE_ONE).is_err());
    }

    #[test]
    fn test_validate_grow_days() {
        assert!(validate_grow_days("light_days", Decimal::from(7)).is_ok());
        assert!(validate_grow_days("light_days", Decimal::from(91)).is_err());
    }
}
