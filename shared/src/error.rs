//! Domain errors raised by the pure models

use rust_decimal::Decimal;
use thiserror::Error;

/// Violations of a domain invariant
///
/// These are raised before any state is changed, so a failed operation always
/// leaves the model as it was.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid quantity for {field}: {message}")]
    InvalidQuantity { field: String, message: String },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("{later} must not be before {earlier}")]
    ChronologyViolation {
        earlier: &'static str,
        later: &'static str,
    },

    #[error("Cannot delete batch {batch_number}: it still holds {quantity} units ({reserved} reserved)")]
    NonEmptyBatch {
        batch_number: String,
        quantity: Decimal,
        reserved: Decimal,
    },

    #[error("Cannot convert between {from} and {to}")]
    IncompatibleUnits { from: String, to: String },

    #[error("Unknown {kind} code: {code}")]
    UnknownCode { kind: &'static str, code: String },

    #[error("Crop is already in its final stage ({0})")]
    FinalStage(String),

    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },
}

impl DomainError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_quantity(field: &str, message: impl Into<String>) -> Self {
        DomainError::InvalidQuantity {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
