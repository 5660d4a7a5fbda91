//! What a ledger entry was caused by

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Owning entity of a stock transaction.
///
/// Stored as a `(reference_type, reference_id)` column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum TransactionReference {
    Order(Uuid),
    OrderItem(Uuid),
    Crop(Uuid),
    CropPlan(Uuid),
    Reservation(Uuid),
    /// Entered by hand, no owning record
    Manual,
}

impl TransactionReference {
    pub fn kind(&self) -> &'static str {
        match self {
            TransactionReference::Order(_) => "order",
            TransactionReference::OrderItem(_) => "order_item",
            TransactionReference::Crop(_) => "crop",
            TransactionReference::CropPlan(_) => "crop_plan",
            TransactionReference::Reservation(_) => "reservation",
            TransactionReference::Manual => "manual",
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            TransactionReference::Order(id)
            | TransactionReference::OrderItem(id)
            | TransactionReference::Crop(id)
            | TransactionReference::CropPlan(id)
            | TransactionReference::Reservation(id) => Some(*id),
            TransactionReference::Manual => None,
        }
    }

    /// Rebuild a reference from its stored columns
    pub fn from_parts(kind: Option<&str>, id: Option<Uuid>) -> DomainResult<Option<Self>> {
        let Some(kind) = kind else {
            return Ok(None);
        };

        let missing_id = || DomainError::validation("reference_id", format!("{kind} reference requires an id"));

        let reference = match kind {
            "order" => TransactionReference::Order(id.ok_or_else(missing_id)?),
            "order_item" => TransactionReference::OrderItem(id.ok_or_else(missing_id)?),
            "crop" => TransactionReference::Crop(id.ok_or_else(missing_id)?),
            "crop_plan" => TransactionReference::CropPlan(id.ok_or_else(missing_id)?),
            "reservation" => TransactionReference::Reservation(id.ok_or_else(missing_id)?),
            "manual" => TransactionReference::Manual,
            other => {
                return Err(DomainError::UnknownCode {
                    kind: "reference type",
                    code: other.to_string(),
                })
            }
        };

        Ok(Some(reference))
    }
}

/// Split an optional reference into its column pair
pub fn reference_columns(reference: Option<&TransactionReference>) -> (Option<&'static str>, Option<Uuid>) {
    match reference {
        Some(r) => (Some(r.kind()), r.id()),
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_round_trip() {
        let id = Uuid::new_v4();
        let reference = TransactionReference::Crop(id);
        let (kind, ref_id) = reference_columns(Some(&reference));
        assert_eq!(kind, Some("crop"));
        assert_eq!(
            TransactionReference::from_parts(kind, ref_id).unwrap(),
            Some(reference)
        );
    }

    #[test]
    fn test_manual_has_no_id() {
        assert_eq!(TransactionReference::Manual.id(), None);
        assert_eq!(
            TransactionReference::from_parts(Some("manual"), None).unwrap(),
            Some(TransactionReference::Manual)
        );
    }

    #[test]
    fn test_missing_id_rejected() {
        assert!(TransactionReference::from_parts(Some("order"), None).is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = TransactionReference::from_parts(Some("invoice"), Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, DomainError::UnknownCode { .. }));
    }

    #[test]
    fn test_no_reference() {
        assert_eq!(TransactionReference::from_parts(None, None).unwrap(), None);
    }
}
