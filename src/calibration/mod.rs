//! Calibration of latent `(s0, vol)` to observed price/value and volatility targets.
//!
//! This module provides:
//! - box constraints, convergence metadata, and warning flags,
//! - a projected Levenberg-Marquardt solver behind the [`Minimizer`] trait,
//!   plus a [`MultiStart`] restart policy,
//! - the equity calibrator with its tagged [`CalibrationTarget`],
//! - serde-compatible diagnostics for persistence and audit.

pub mod core;
pub mod diagnostics;
pub mod equity;
pub mod optimizers;

pub use self::core::{BoxConstraints, CalibrationWarningFlag, ConvergenceInfo, TerminationReason};
pub use diagnostics::warning_flags;
pub use equity::{
    CalibrationDiagnostics, CalibrationOutcome, CalibrationTarget, EquityCalibrator,
    SPOT_BOUNDS, VOL_BOUNDS, calibrate, residuals,
};
pub use optimizers::{
    LevenbergMarquardt, LmOptions, Minimizer, MultiStart, OptimisationResult,
    levenberg_marquardt,
};
