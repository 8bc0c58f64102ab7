//! Capitalization table: typed claim classes and their structural validation.

pub mod schema;
pub mod validation;

pub use schema::{COLUMN_COUNT, COLUMNS, COMMON_ROW, ClaimClass, ClaimsTable};
pub use validation::{ValidationError, is_valid, validate};
