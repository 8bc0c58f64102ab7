//! capval values the classes of equity-like claims on a private company (common stock,
//! time-vesting options, performance awards) from a capitalization table and either an
//! observed stock price or an observed aggregate equity value.
//!
//! A run simulates the terminal value of the common stock under a single-factor lognormal
//! model, applies each class's vesting rule to its option payoff, discounts to today, and
//! calibrates the two latent parameters (current common value and its volatility) so that
//! the simulated outputs reproduce the observed price/value and equity volatility.
//!
//! Numerical considerations:
//! - every objective evaluation reuses one seeded normal sample, so the calibration surface
//!   is deterministic and a rerun with the same seed is bit-identical;
//! - horizons at or below 0.01 years are floored to `1e-5` (immediate exit), where the
//!   diffusion term vanishes and the model degenerates to a liquidation split;
//! - log-volatility inputs (current equity value, simulated equity values) are guarded and
//!   reported as errors instead of flowing NaN into the result.
//!
//! # Feature Flags
//! - `parallel`: runs independent valuations of a batch on the Rayon pool.
//!
//! # Quick Start
//! Value a cap table with common stock and an option pool:
//! ```rust
//! use capval::captable::{ClaimClass, ClaimsTable};
//! use capval::valuation::{ValuationInputs, run_valuation};
//!
//! let table = ClaimsTable::new(vec![
//!     ClaimClass::common(10_000.0),
//!     ClaimClass::time_option(1_500.0, 8.0),
//!     ClaimClass::ramp(500.0, 0.0, 9.0, 15.0),
//! ]);
//! let report = run_valuation(
//!     &table,
//!     &ValuationInputs {
//!         target_stock_price: 10.0,
//!         target_volatility: 0.45,
//!         target_equity_value: 0.0,
//!         risk_free_rate: 0.05,
//!         horizon: 5.0,
//!         sample_size: 5_000,
//!         seed: 42,
//!     },
//! );
//! assert!(report.status, "{}", report.message);
//! assert!(report.dilution > 0.0 && report.dilution < 1.0);
//! ```
//!
//! Validate a table before running anything:
//! ```rust
//! use capval::captable::{ClaimClass, ClaimsTable, ValidationError, validate};
//!
//! let table = ClaimsTable::new(vec![ClaimClass::time_option(100.0, 5.0)]);
//! assert!(matches!(validate(&table), Err(ValidationError::CommonRow(_))));
//! ```

pub mod calibration;
pub mod captable;
pub mod config;
pub mod core;
pub mod mc;
pub mod pricing;
pub mod valuation;

/// Common imports for ergonomic usage.
pub mod prelude {
    pub use crate::calibration::{CalibrationTarget, EquityCalibrator, Minimizer};
    pub use crate::captable::{ClaimClass, ClaimsTable, ValidationError, validate};
    pub use crate::config::RunConfig;
    pub use crate::core::ValuationError;
    pub use crate::mc::NormalSample;
    pub use crate::valuation::{ValuationInputs, ValuationReport, run_valuation};
}
