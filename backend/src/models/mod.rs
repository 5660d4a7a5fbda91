//! Database models for the farm operations server
//!
//! Re-exports models from the shared crate and adds the helpers rows use to
//! turn stored codes back into typed values

pub use shared::models::*;

use crate::error::{AppError, AppResult};

/// Decode a lookup code read from the database
pub fn decode<L: Lookup>(code: &str) -> AppResult<L> {
    L::from_code(code).ok_or_else(|| {
        AppError::Internal(format!("stored {} code '{}' is not recognised", L::KIND, code))
    })
}

/// Decode an optional lookup code
pub fn decode_opt<L: Lookup>(code: Option<&str>) -> AppResult<Option<L>> {
    code.map(decode::<L>).transpose()
}

/// Rebuild a reference from its `(reference_type, reference_id)` columns
pub fn decode_reference(
    reference_type: Option<&str>,
    reference_id: Option<uuid::Uuid>,
) -> AppResult<Option<TransactionReference>> {
    TransactionReference::from_parts(reference_type, reference_id)
        .map_err(|e| AppError::Internal(format!("stored transaction reference is invalid: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_and_unknown_codes() {
        assert_eq!(decode::<CropStage>("blackout").unwrap(), CropStage::Blackout);
        assert!(matches!(decode::<CropStage>("sprouting"), Err(AppError::Internal(_))));
        assert_eq!(decode_opt::<StockStatus>(None).unwrap(), None);
    }

    #[test]
    fn test_decode_reference() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            decode_reference(Some("crop"), Some(id)).unwrap(),
            Some(TransactionReference::Crop(id))
        );
        assert_eq!(decode_reference(None, None).unwrap(), None);
    }
}
