//! Reading Validation
//!
//! Rejects malformed or out-of-domain sensor readings before they reach storage.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{ValidatedReading, ValidationConfig, Validator};
