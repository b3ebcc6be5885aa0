//! SQL validation.

pub mod validator;

pub use validator::{SqlValidator, validate_identifier};
