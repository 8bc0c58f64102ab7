//! JSON payload helpers for run configurations and valuation reports.
//!
//! # Examples
//! ```rust
//! use capval::captable::{ClaimClass, ClaimsTable};
//! use capval::core::{from_json, to_json_pretty};
//!
//! let table = ClaimsTable::new(vec![ClaimClass::common(1_000.0)]);
//! let json = to_json_pretty(&table).expect("json serialization");
//! let decoded: ClaimsTable = from_json(&json).expect("json deserialization");
//! assert_eq!(decoded, table);
//! ```

use serde::de::DeserializeOwned;

/// Serialize a value to pretty JSON.
pub fn to_json_pretty<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Deserialize a value from JSON.
pub fn from_json<T: DeserializeOwned>(payload: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(payload)
}
