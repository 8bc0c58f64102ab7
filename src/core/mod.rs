//! Core error taxonomy and serialization helpers shared by every stage of the
//! valuation pipeline.

pub mod serialization;

pub use serialization::{from_json, to_json_pretty};

use crate::captable::ValidationError;

/// Errors surfaced by the valuation and calibration stages.
///
/// Internal stages propagate these with `?`; [`crate::valuation::run_valuation`]
/// converts every variant into a status-false report at the public boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ValuationError {
    /// Caller-supplied scalar input is out of domain (non-finite, non-positive target, ...).
    InvalidInput(String),
    /// Claims table violates a structural invariant.
    Schema(ValidationError),
    /// Degenerate numeric state (zero-width ramp, non-positive equity value, non-finite output).
    NumericalError(String),
    /// The optimizer could not produce a usable parameter vector.
    ConvergenceFailure(String),
}

impl std::fmt::Display for ValuationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Schema(err) => write!(f, "claims table validation failed: {err}"),
            Self::NumericalError(msg) => write!(f, "numerical error: {msg}"),
            Self::ConvergenceFailure(msg) => write!(f, "convergence failure: {msg}"),
        }
    }
}

impl std::error::Error for ValuationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for ValuationError {
    fn from(err: ValidationError) -> Self {
        Self::Schema(err)
    }
}

/// Returns `Ok(value)` when `value` is finite, otherwise a `NumericalError` naming `what`.
#[inline]
pub fn ensure_finite(value: f64, what: &str) -> Result<f64, ValuationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValuationError::NumericalError(format!(
            "{what} is not finite ({value})"
        )))
    }
}
