//! Module `valuation::aggregate`.
//!
//! Converts per-share vested payoffs into discounted fair values, the current
//! aggregate equity value `tev0`, and the implied equity volatility
//! `std(ln(TEV_T / tev0)) / sqrt(T)` across draws.
//!
//! Numerical considerations: the log-return volatility is undefined when
//! `tev0` or any simulated aggregate is non-positive; both cases are reported
//! as [`ValuationError::NumericalError`] instead of flowing NaN downstream.

use nalgebra::{DMatrix, DVector};
use statrs::statistics::Statistics;

use crate::captable::{COMMON_ROW, ClaimsTable};
use crate::core::{ValuationError, ensure_finite};
use crate::pricing::PayoffMatrix;

/// Scalar valuation outputs used inside the calibration loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Discounted mean vested payoff per share, per class.
    pub fair_value_per_share: Vec<f64>,
    /// Fair value of one common share (class 0).
    pub common_fair_value: f64,
    /// Current aggregate equity value.
    pub tev0: f64,
    /// Implied annualized equity volatility.
    pub voleq: f64,
    /// Simulated terminal aggregate equity value per draw.
    pub sim_tev: Vec<f64>,
}

/// Full-output valuation, built once for the accepted calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationDetail {
    pub aggregate: Aggregate,
    /// Vested payoff per share, `nsim x classes`.
    pub payoff: DMatrix<f64>,
    /// Vested fraction, `nsim x classes`.
    pub vesting: DMatrix<f64>,
    /// Share of `tev0` held by common stock.
    pub dilution: f64,
    pub num_of_class: usize,
    pub strikes: Vec<f64>,
    pub is_time: Vec<bool>,
    pub is_cliff: Vec<bool>,
}

/// Aggregates vested payoffs into discounted values and implied volatility.
pub fn aggregate(
    payoffs: &PayoffMatrix,
    shares: &[f64],
    rate: f64,
    horizon: f64,
) -> Result<Aggregate, ValuationError> {
    let payoff = &payoffs.payoff;
    if shares.len() != payoff.ncols() {
        return Err(ValuationError::InvalidInput(format!(
            "share vector has {} entries for {} classes",
            shares.len(),
            payoff.ncols()
        )));
    }
    if payoff.nrows() == 0 || payoff.ncols() == 0 {
        return Err(ValuationError::InvalidInput(
            "payoff matrix is empty".to_string(),
        ));
    }
    if horizon <= 0.0 {
        return Err(ValuationError::InvalidInput(format!(
            "horizon must be > 0, found {horizon}"
        )));
    }

    let discount = (-rate * horizon).exp();
    let draws = payoff.nrows() as f64;
    let fair_value_per_share: Vec<f64> = payoff
        .column_iter()
        .map(|col| col.sum() / draws * discount)
        .collect();

    let tev0 = ensure_finite(
        fair_value_per_share
            .iter()
            .zip(shares)
            .map(|(fv, n)| fv * n)
            .sum::<f64>(),
        "current aggregate equity value",
    )?;
    if tev0 <= 0.0 {
        return Err(ValuationError::NumericalError(format!(
            "current aggregate equity value must be > 0, found {tev0}"
        )));
    }

    let sim_tev: Vec<f64> = (payoff * DVector::from_column_slice(shares))
        .iter()
        .copied()
        .collect();
    let non_positive = sim_tev.iter().filter(|v| !(**v > 0.0)).count();
    if non_positive > 0 {
        return Err(ValuationError::NumericalError(format!(
            "simulated aggregate equity value is non-positive in {non_positive} of {} draws",
            sim_tev.len()
        )));
    }

    let voleq = ensure_finite(
        log_return_volatility(&sim_tev, tev0, horizon),
        "implied equity volatility",
    )?;

    Ok(Aggregate {
        common_fair_value: fair_value_per_share[COMMON_ROW],
        fair_value_per_share,
        tev0,
        voleq,
        sim_tev,
    })
}

/// Full-output aggregation: scalar outputs plus matrices and class metadata.
pub fn aggregate_detail(
    payoffs: PayoffMatrix,
    table: &ClaimsTable,
    rate: f64,
    horizon: f64,
) -> Result<ValuationDetail, ValuationError> {
    let shares = table.shares();
    let aggregate = aggregate(&payoffs, &shares, rate, horizon)?;
    let dilution = aggregate.common_fair_value * shares[COMMON_ROW] / aggregate.tev0;

    let PayoffMatrix { payoff, vesting } = payoffs;
    let vesting =
        vesting.unwrap_or_else(|| DMatrix::from_element(payoff.nrows(), payoff.ncols(), 1.0));

    Ok(ValuationDetail {
        aggregate,
        payoff,
        vesting,
        dilution,
        num_of_class: table.len(),
        strikes: table.strikes(),
        is_time: table.classes.iter().map(|c| c.is_time).collect(),
        is_cliff: table.classes.iter().map(|c| c.is_cliff).collect(),
    })
}

/// Annualized population standard deviation of `ln(sim / base)`.
pub fn log_return_volatility(sim: &[f64], base: f64, horizon: f64) -> f64 {
    sim.iter()
        .map(|v| (v / base).ln())
        .collect::<Vec<f64>>()
        .population_std_dev()
        / horizon.sqrt()
}
