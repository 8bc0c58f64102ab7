//! Trial-parameter pipeline: simulate terminal values, apply vesting, aggregate.

use crate::captable::ClaimsTable;
use crate::core::ValuationError;
use crate::mc::{NormalSample, simulate_terminal};
use crate::pricing::PayoffEngine;
use crate::valuation::aggregate::{Aggregate, ValuationDetail, aggregate, aggregate_detail};

/// One run's fixed inputs; evaluated repeatedly at trial `(s0, vol)`.
#[derive(Debug, Clone)]
pub struct ValuationModel<'a> {
    table: &'a ClaimsTable,
    engine: PayoffEngine,
    shares: Vec<f64>,
    sample: &'a NormalSample,
    rate: f64,
    horizon: f64,
}

impl<'a> ValuationModel<'a> {
    /// `horizon` must already be floored for the immediate-exit regime.
    pub fn new(
        table: &'a ClaimsTable,
        sample: &'a NormalSample,
        rate: f64,
        horizon: f64,
    ) -> Result<Self, ValuationError> {
        if !(horizon > 0.0 && horizon.is_finite()) {
            return Err(ValuationError::InvalidInput(format!(
                "horizon must be finite and > 0, found {horizon}"
            )));
        }
        if !rate.is_finite() {
            return Err(ValuationError::InvalidInput(format!(
                "risk-free rate must be finite, found {rate}"
            )));
        }
        Ok(Self {
            engine: PayoffEngine::new(table)?,
            shares: table.shares(),
            table,
            sample,
            rate,
            horizon,
        })
    }

    pub fn table(&self) -> &ClaimsTable {
        self.table
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Number of normal draws every evaluation reuses.
    pub fn draws(&self) -> usize {
        self.sample.len()
    }

    /// Inner-loop evaluation: scalar outputs only.
    pub fn evaluate(&self, s0: f64, vol: f64) -> Result<Aggregate, ValuationError> {
        let terminal = simulate_terminal(s0, vol, self.rate, self.horizon, self.sample);
        let payoffs = self.engine.evaluate(&terminal, false);
        aggregate(&payoffs, &self.shares, self.rate, self.horizon)
    }

    /// Full-output evaluation used once for the accepted parameters.
    pub fn evaluate_full(&self, s0: f64, vol: f64) -> Result<ValuationDetail, ValuationError> {
        let terminal = simulate_terminal(s0, vol, self.rate, self.horizon, self.sample);
        let payoffs = self.engine.evaluate(&terminal, true);
        aggregate_detail(payoffs, self.table, self.rate, self.horizon)
    }
}
