//! Module `valuation::report`.
//!
//! The engine boundary: validates the table, builds the seeded sample,
//! calibrates `(s0, vol)`, re-runs the accepted parameters with full output,
//! and assembles a [`ValuationReport`]. Failures at any stage come back as a
//! status-false report carrying the error text; nothing panics or returns
//! `Err` across this boundary.

use nalgebra::DMatrix;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::calibration::core::matrix_to_rows;
use crate::calibration::{
    CalibrationDiagnostics, CalibrationTarget, EquityCalibrator, LevenbergMarquardt, Minimizer,
};
use crate::captable::{ClaimsTable, validate};
use crate::core::ValuationError;
use crate::mc::{NormalSample, effective_horizon, is_immediate_exit};
use crate::valuation::aggregate::{Aggregate, log_return_volatility};
use crate::valuation::model::ValuationModel;

/// Scalar inputs of one valuation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationInputs {
    /// Observed common-stock price; ignored when `target_equity_value > 0`.
    pub target_stock_price: f64,
    /// Observed equity volatility (annualized).
    pub target_volatility: f64,
    /// Observed aggregate equity value; zero selects stock-price mode.
    pub target_equity_value: f64,
    pub risk_free_rate: f64,
    /// Years to exit; `<= 0.01` is treated as an immediate exit.
    pub horizon: f64,
    pub sample_size: usize,
    pub seed: u64,
}

impl ValuationInputs {
    pub fn validate(&self) -> Result<(), ValuationError> {
        for (name, value) in [
            ("target_stock_price", self.target_stock_price),
            ("target_volatility", self.target_volatility),
            ("target_equity_value", self.target_equity_value),
            ("risk_free_rate", self.risk_free_rate),
            ("horizon", self.horizon),
        ] {
            if !value.is_finite() {
                return Err(ValuationError::InvalidInput(format!(
                    "{name} must be finite, found {value}"
                )));
            }
        }
        if self.sample_size == 0 {
            return Err(ValuationError::InvalidInput(
                "sample_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn target(&self) -> Result<CalibrationTarget, ValuationError> {
        CalibrationTarget::from_inputs(self.target_stock_price, self.target_equity_value)
    }
}

/// Post-calibration cross-checks `[c1, c2, c3]`.
///
/// - `discount`: `1 / mean(TEV_T / tev0)`, the discount factor implied by the sample,
///   equal to `exp(-r T)` when valuation and discounting are consistent.
/// - `volatility`: `std(ln(TEV_T / tev0)) / sqrt(T)` recomputed from the final sample.
/// - `calibration`: fitted common volatility over the target volatility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct ConsistencyCheck {
    pub discount: f64,
    pub volatility: f64,
    pub calibration: f64,
}

impl ConsistencyCheck {
    pub fn compute(aggregate: &Aggregate, horizon: f64, fitted_vol: f64, target_vol: f64) -> Self {
        let mean_ratio = aggregate
            .sim_tev
            .iter()
            .map(|v| v / aggregate.tev0)
            .collect::<Vec<f64>>()
            .mean();
        Self {
            discount: 1.0 / mean_ratio,
            volatility: log_return_volatility(&aggregate.sim_tev, aggregate.tev0, horizon),
            calibration: fitted_vol / target_vol,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.discount.is_finite() && self.volatility.is_finite() && self.calibration.is_finite()
    }
}

impl From<[f64; 3]> for ConsistencyCheck {
    fn from(v: [f64; 3]) -> Self {
        Self {
            discount: v[0],
            volatility: v[1],
            calibration: v[2],
        }
    }
}

impl From<ConsistencyCheck> for [f64; 3] {
    fn from(c: ConsistencyCheck) -> Self {
        [c.discount, c.volatility, c.calibration]
    }
}

/// Final result record of one valuation run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValuationReport {
    pub status: bool,
    pub message: String,
    pub labels: Vec<String>,
    pub fair_value_per_share: Vec<f64>,
    pub strikes: Vec<f64>,
    pub is_time: Vec<bool>,
    pub is_cliff: Vec<bool>,
    /// Share of aggregate equity value held by common stock.
    pub dilution: f64,
    /// Current aggregate equity value.
    pub tev0: f64,
    /// Implied equity volatility.
    pub voleq: f64,
    /// Fitted common-stock volatility.
    pub volcm: f64,
    /// Fitted current common-stock value.
    pub s0: f64,
    pub check: Option<ConsistencyCheck>,
    pub iterations: usize,
    pub num_of_class: usize,
    /// Horizon actually simulated (after the immediate-exit floor).
    pub horizon: f64,
    pub immediate_exit: bool,
    pub calibration: Option<CalibrationDiagnostics>,
    #[serde(skip)]
    pub payoff_per_share: Option<DMatrix<f64>>,
    #[serde(skip)]
    pub vest_array: Option<DMatrix<f64>>,
    #[serde(skip)]
    pub sim_tev: Vec<f64>,
}

impl ValuationReport {
    /// Status-false record carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Vested payoff matrix as row vectors (one per draw), when retained.
    pub fn payoff_rows(&self) -> Option<Vec<Vec<f64>>> {
        self.payoff_per_share.as_ref().map(matrix_to_rows)
    }

    /// Vested-fraction matrix as row vectors (one per draw), when retained.
    pub fn vesting_rows(&self) -> Option<Vec<Vec<f64>>> {
        self.vest_array.as_ref().map(matrix_to_rows)
    }

    /// Plain-text summary of the run.
    pub fn summary(&self) -> String {
        if !self.status {
            return format!("Calculation error: {}", self.message);
        }

        let mut out = format!(
            "{} classes of equity instruments; total equity value {:.2}; dilution {:.2}%\n",
            self.num_of_class,
            self.tev0,
            self.dilution * 100.0
        );
        if self.immediate_exit {
            out.push_str("Immediate exit: liquidation analysis at the current value\n");
        } else {
            out.push_str(&format!(
                "Equity volatility {:.2}%, common stock volatility {:.2}%\n",
                self.voleq * 100.0,
                self.volcm * 100.0
            ));
        }

        out.push_str(&format!(
            "{:<16} {:>12} {:>22} {:>18}\n",
            "Class", "Strike", "Vesting", "Fair value/share"
        ));
        for i in 0..self.fair_value_per_share.len() {
            let vesting = match (self.is_time.get(i), self.is_cliff.get(i)) {
                (Some(true), _) => "time-based",
                (_, Some(true)) => "perf-based (cliff)",
                _ => "perf-based",
            };
            let label = self
                .labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Class {}", i + 1));
            out.push_str(&format!(
                "{:<16} {:>12.2} {:>22} {:>18.4}\n",
                label,
                self.strikes.get(i).copied().unwrap_or(f64::NAN),
                vesting,
                self.fair_value_per_share[i]
            ));
        }

        if let Some(check) = &self.check {
            out.push_str(&format!(
                "Discount factor check {:.2}% after {} iterations\n",
                check.discount * 100.0,
                self.iterations
            ));
        }
        out
    }
}

/// Runs the full pipeline with the default Levenberg-Marquardt calibrator.
///
/// # Examples
/// ```rust
/// use capval::captable::{ClaimClass, ClaimsTable};
/// use capval::valuation::{ValuationInputs, run_valuation};
///
/// let table = ClaimsTable::new(vec![
///     ClaimClass::common(10_000.0),
///     ClaimClass::time_option(2_000.0, 50.0),
/// ]);
/// let inputs = ValuationInputs {
///     target_stock_price: 40.0,
///     target_volatility: 0.45,
///     target_equity_value: 0.0,
///     risk_free_rate: 0.05,
///     horizon: 3.0,
///     sample_size: 4_000,
///     seed: 42,
/// };
/// let report = run_valuation(&table, &inputs);
/// assert!(report.status, "{}", report.message);
/// assert!((report.fair_value_per_share[0] - 40.0).abs() < 0.1);
/// ```
pub fn run_valuation(table: &ClaimsTable, inputs: &ValuationInputs) -> ValuationReport {
    run_valuation_with(table, inputs, &EquityCalibrator::<LevenbergMarquardt>::default())
}

/// Runs the full pipeline with a caller-chosen calibrator.
pub fn run_valuation_with<M: Minimizer>(
    table: &ClaimsTable,
    inputs: &ValuationInputs,
    calibrator: &EquityCalibrator<M>,
) -> ValuationReport {
    match try_run_valuation(table, inputs, calibrator) {
        Ok(report) => report,
        Err(err) => {
            tracing::warn!(%err, "valuation failed");
            ValuationReport::failure(err.to_string())
        }
    }
}

/// Fallible form of [`run_valuation_with`].
pub fn try_run_valuation<M: Minimizer>(
    table: &ClaimsTable,
    inputs: &ValuationInputs,
    calibrator: &EquityCalibrator<M>,
) -> Result<ValuationReport, ValuationError> {
    validate(table)?;
    inputs.validate()?;
    let target = inputs.target()?;

    let immediate_exit = is_immediate_exit(inputs.horizon);
    let horizon = effective_horizon(inputs.horizon);
    tracing::debug!(
        classes = table.len(),
        sample_size = inputs.sample_size,
        seed = inputs.seed,
        horizon,
        immediate_exit,
        "starting valuation"
    );

    let sample = NormalSample::from_seed(inputs.sample_size, inputs.seed)?;
    let model = ValuationModel::new(table, &sample, inputs.risk_free_rate, horizon)?;
    let outcome = calibrator.calibrate(&model, target, inputs.target_volatility)?;

    let detail = model.evaluate_full(outcome.s0, outcome.vol)?;
    let check = ConsistencyCheck::compute(
        &detail.aggregate,
        horizon,
        outcome.vol,
        inputs.target_volatility,
    );
    if !check.is_finite() {
        return Err(ValuationError::NumericalError(format!(
            "consistency check is not finite: {:?}",
            <[f64; 3]>::from(check)
        )));
    }

    tracing::debug!(
        tev0 = detail.aggregate.tev0,
        dilution = detail.dilution,
        discount_check = check.discount,
        "final valuation assembled"
    );

    let message = if model.draws() == 1 {
        "valuation completed; a single draw carries no dispersion, so only the price \
         target is fitted and equity volatility is reported as zero"
    } else {
        "valuation completed"
    };

    let aggregate = detail.aggregate;
    Ok(ValuationReport {
        status: true,
        message: message.to_string(),
        labels: table.labels(),
        fair_value_per_share: aggregate.fair_value_per_share,
        strikes: detail.strikes,
        is_time: detail.is_time,
        is_cliff: detail.is_cliff,
        dilution: detail.dilution,
        tev0: aggregate.tev0,
        voleq: aggregate.voleq,
        volcm: outcome.vol,
        s0: outcome.s0,
        check: Some(check),
        iterations: outcome.diagnostics.iterations,
        num_of_class: detail.num_of_class,
        horizon,
        immediate_exit,
        calibration: Some(outcome.diagnostics),
        payoff_per_share: Some(detail.payoff),
        vest_array: Some(detail.vesting),
        sim_tev: aggregate.sim_tev,
    })
}

/// Runs independent valuations; each job owns its table, inputs, and seed.
pub fn run_valuation_batch(jobs: &[(ClaimsTable, ValuationInputs)]) -> Vec<ValuationReport> {
    #[cfg(feature = "parallel")]
    {
        jobs.par_iter()
            .map(|(table, inputs)| run_valuation(table, inputs))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        jobs.iter()
            .map(|(table, inputs)| run_valuation(table, inputs))
            .collect()
    }
}
