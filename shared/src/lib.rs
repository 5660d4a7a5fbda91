//! Shared types and models for the microgreens farm operations platform
//!
//! Ledger arithmetic, stock reservations, crop stage rules and reference
//! tables live here so they can be exercised without a database.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::{DomainError, DomainResult};
pub use models::*;
pub use types::*;
pub use validation::*;
