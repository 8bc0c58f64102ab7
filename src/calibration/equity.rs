//! Calibration of the latent common-stock value and volatility `(s0, vol)`.
//!
//! The objective is a sum of two squared relative errors:
//! - implied equity volatility against the target volatility, and
//! - either the common fair value against a target stock price, or the
//!   current aggregate equity value against a target equity value.
//!
//! Which second term is active is fixed by the [`CalibrationTarget`] variant.
//! Every evaluation reuses the run's fixed normal sample, so the objective is
//! deterministic in `(s0, vol)`.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::calibration::core::{
    BoxConstraints, CalibrationWarningFlag, TerminationReason, finite_metric,
    matrix_condition_number, sanitize_convergence,
};
use crate::calibration::diagnostics::warning_flags;
use crate::calibration::optimizers::{LevenbergMarquardt, LmOptions, Minimizer};
use crate::captable::{COMMON_ROW, ClaimsTable};
use crate::core::ValuationError;
use crate::mc::NormalSample;
use crate::valuation::{Aggregate, ValuationModel};

/// Search interval for the current common-stock value.
pub const SPOT_BOUNDS: (f64, f64) = (0.01, 10_000.0);
/// Search interval for the common-stock volatility.
pub const VOL_BOUNDS: (f64, f64) = (0.05, 1.0);

const PENALTY_RESIDUAL: f64 = 1e6;

/// Observed quantity the price/value term of the objective is matched to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CalibrationTarget {
    /// Current price of one common share.
    StockPrice(f64),
    /// Current aggregate equity value of all classes.
    AggregateEquityValue(f64),
}

impl CalibrationTarget {
    /// Selects the input mode: a positive `equity_value` wins, otherwise the stock price is used.
    pub fn from_inputs(stock_price: f64, equity_value: f64) -> Result<Self, ValuationError> {
        let target = if equity_value > 0.0 {
            Self::AggregateEquityValue(equity_value)
        } else {
            Self::StockPrice(stock_price)
        };
        let value = target.value();
        if !(value.is_finite() && value > 0.0) {
            return Err(ValuationError::InvalidInput(format!(
                "target stock price or equity value must be finite and > 0, found {value}"
            )));
        }
        Ok(target)
    }

    #[inline]
    pub fn value(self) -> f64 {
        match self {
            Self::StockPrice(v) | Self::AggregateEquityValue(v) => v,
        }
    }

    /// Model counterpart of the target.
    #[inline]
    pub fn model_value(self, aggregate: &Aggregate) -> f64 {
        match self {
            Self::StockPrice(_) => aggregate.common_fair_value,
            Self::AggregateEquityValue(_) => aggregate.tev0,
        }
    }

    /// Starting common value: the price itself, or equity value per common share.
    pub fn initial_spot(self, common_shares: f64) -> Result<f64, ValuationError> {
        match self {
            Self::StockPrice(p) => Ok(p),
            Self::AggregateEquityValue(v) => {
                if common_shares > 0.0 {
                    Ok(v / common_shares)
                } else {
                    Err(ValuationError::InvalidInput(
                        "equity-value calibration requires a positive common share count"
                            .to_string(),
                    ))
                }
            }
        }
    }
}

/// Solver diagnostics of one calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDiagnostics {
    pub solver: String,
    pub iterations: usize,
    pub function_evaluations: usize,
    pub success: bool,
    pub status: TerminationReason,
    pub message: String,
    pub final_objective: f64,
    /// `[s0, vol]` the search started from.
    pub initial_guess: Vec<f64>,
    /// `[s0, vol]` the search accepted.
    pub optimal_values: Vec<f64>,
    pub condition_number: f64,
    /// Evaluations that hit a numerical guard and were penalised.
    pub penalised_evaluations: usize,
    pub warnings: Vec<CalibrationWarningFlag>,
}

/// Accepted parameters and how the search got there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    pub s0: f64,
    pub vol: f64,
    pub diagnostics: CalibrationDiagnostics,
}

/// Bounded `(s0, vol)` calibrator over a pluggable [`Minimizer`].
#[derive(Debug, Clone)]
pub struct EquityCalibrator<M = LevenbergMarquardt> {
    pub minimizer: M,
    pub bounds: BoxConstraints,
}

impl Default for EquityCalibrator<LevenbergMarquardt> {
    fn default() -> Self {
        Self::with_minimizer(LevenbergMarquardt::new(LmOptions::default()))
    }
}

impl<M: Minimizer> EquityCalibrator<M> {
    pub fn with_minimizer(minimizer: M) -> Self {
        Self {
            minimizer,
            bounds: BoxConstraints {
                lower: vec![SPOT_BOUNDS.0, VOL_BOUNDS.0],
                upper: vec![SPOT_BOUNDS.1, VOL_BOUNDS.1],
            },
        }
    }

    pub fn calibrate(
        &self,
        model: &ValuationModel<'_>,
        target: CalibrationTarget,
        target_vol: f64,
    ) -> Result<CalibrationOutcome, ValuationError> {
        if !(target_vol.is_finite() && target_vol > 0.0) {
            return Err(ValuationError::InvalidInput(format!(
                "target volatility must be finite and > 0, found {target_vol}"
            )));
        }

        let common_shares = model
            .table()
            .classes
            .get(COMMON_ROW)
            .map(|c| c.shares)
            .ok_or_else(|| ValuationError::InvalidInput("claims table is empty".to_string()))?;
        let initial = self
            .bounds
            .clamp(&[target.initial_spot(common_shares)?, target_vol]);

        tracing::debug!(
            solver = self.minimizer.name(),
            ?target,
            target_vol,
            s0_guess = initial[0],
            vol_guess = initial[1],
            "starting equity calibration"
        );

        let penalised = Cell::new(0usize);
        let opt = self.minimizer.minimize(&initial, &self.bounds, |x| {
            residuals(model, target, target_vol, x).unwrap_or_else(|err| {
                penalised.set(penalised.get() + 1);
                tracing::trace!(s0 = x[0], vol = x[1], %err, "penalising trial parameters");
                vec![PENALTY_RESIDUAL; 2]
            })
        })?;

        if opt.x.len() != 2 || opt.x.iter().any(|v| !v.is_finite()) {
            return Err(ValuationError::ConvergenceFailure(format!(
                "{} returned an unusable parameter vector {:?}",
                self.minimizer.name(),
                opt.x
            )));
        }

        if opt.residuals.iter().all(|r| *r == PENALTY_RESIDUAL) {
            return Err(ValuationError::ConvergenceFailure(format!(
                "no trial parameters produced a finite valuation ({} penalised evaluations)",
                penalised.get()
            )));
        }

        // A single draw has zero dispersion, so the volatility term is stuck at -1.
        let fit_objective = if model.draws() == 1 {
            opt.residuals.get(1).map_or(opt.objective, |r| r * r)
        } else {
            opt.objective
        };

        let condition_number = finite_metric(matrix_condition_number(&opt.jacobian));
        let convergence = sanitize_convergence(opt.convergence);
        let warnings = warning_flags(
            &convergence,
            condition_number,
            fit_objective,
            Some(&self.bounds),
            Some(&opt.x),
        );

        if convergence.converged {
            tracing::info!(
                iterations = convergence.iterations,
                evaluations = convergence.objective_evaluations,
                objective = opt.objective,
                s0 = opt.x[0],
                vol = opt.x[1],
                "equity calibration converged"
            );
        } else {
            tracing::warn!(
                reason = %convergence.reason,
                iterations = convergence.iterations,
                objective = opt.objective,
                "equity calibration did not converge; keeping best parameters"
            );
        }

        Ok(CalibrationOutcome {
            s0: opt.x[0],
            vol: opt.x[1],
            diagnostics: CalibrationDiagnostics {
                solver: self.minimizer.name().to_string(),
                iterations: convergence.iterations,
                function_evaluations: convergence.objective_evaluations,
                success: convergence.converged,
                status: convergence.reason,
                message: convergence.reason.message().to_string(),
                final_objective: opt.objective,
                initial_guess: initial,
                optimal_values: opt.x,
                condition_number,
                penalised_evaluations: penalised.get(),
                warnings,
            },
        })
    }
}

/// Relative-error residuals `[voleq / target_vol - 1, model / target - 1]` at `x = [s0, vol]`.
pub fn residuals(
    model: &ValuationModel<'_>,
    target: CalibrationTarget,
    target_vol: f64,
    x: &[f64],
) -> Result<Vec<f64>, ValuationError> {
    let aggregate = model.evaluate(x[0], x[1])?;
    Ok(vec![
        aggregate.voleq / target_vol - 1.0,
        target.model_value(&aggregate) / target.value() - 1.0,
    ])
}

/// Calibrates `(s0, vol)` for `table` with the default Levenberg-Marquardt calibrator.
///
/// `horizon` is used as given; floor immediate exits with [`crate::mc::effective_horizon`].
pub fn calibrate(
    table: &ClaimsTable,
    target: CalibrationTarget,
    target_vol: f64,
    rate: f64,
    horizon: f64,
    sample: &NormalSample,
) -> Result<CalibrationOutcome, ValuationError> {
    let model = ValuationModel::new(table, sample, rate, horizon)?;
    EquityCalibrator::default().calibrate(&model, target, target_vol)
}
