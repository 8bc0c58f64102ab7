//! Run configuration.
//!
//! A [`RunConfig`] is the JSON document a caller hands to the CLI: the
//! observed targets, market inputs, and the claims table either as the
//! loader's numeric matrix or as typed classes. It owns the caller-side
//! policies the engine itself does not impose: the default sample size (a
//! single draw for an immediate exit), the default seed, and the row/column
//! ceilings applied before the table reaches the engine.

use serde::{Deserialize, Serialize};

use crate::captable::{ClaimClass, ClaimsTable};
use crate::core::ValuationError;
use crate::mc::is_immediate_exit;
use crate::valuation::ValuationInputs;

/// Draws used when the horizon is long enough to simulate.
pub const DEFAULT_SAMPLE_SIZE: usize = 20_000;
pub const DEFAULT_SEED: u64 = 42;
/// Maximum number of claim classes accepted from a caller.
pub const MAX_ROWS: usize = 50;
/// Maximum loader columns, including the `class` label column.
pub const MAX_COLUMNS: usize = 10;
/// Longest horizon accepted, in years.
pub const MAX_HORIZON: f64 = 10.0;

/// Which observed quantity the price/value calibration term matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    StockPrice,
    EquityValue,
}

/// Claims table as supplied in a config document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableSource {
    /// Loader matrix: one row per class, 8 numeric columns starting at `shares`,
    /// with optional per-row labels.
    Matrix {
        matrix: Vec<Vec<f64>>,
        #[serde(default)]
        labels: Vec<String>,
    },
    Classes { classes: Vec<ClaimClass> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub input_mode: InputMode,
    #[serde(default)]
    pub stock_price: f64,
    /// Aggregate equity value in currency units (not thousands).
    #[serde(default)]
    pub equity_value: f64,
    pub equity_volatility: f64,
    pub time_to_exit: f64,
    pub risk_free_rate: f64,
    #[serde(default)]
    pub sample_size: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(flatten)]
    pub table: TableSource,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// Caller policy: full sample unless the exit is immediate, then one draw.
pub fn default_sample_size(time_to_exit: f64) -> usize {
    if is_immediate_exit(time_to_exit) {
        1
    } else {
        DEFAULT_SAMPLE_SIZE
    }
}

impl RunConfig {
    pub fn from_json(json: &str) -> Result<Self, ValuationError> {
        crate::core::from_json(json).map_err(|err| {
            ValuationError::InvalidInput(format!("invalid run configuration: {err}"))
        })
    }

    /// Input checks a form would enforce before the engine runs.
    pub fn validate(&self) -> Result<(), ValuationError> {
        for (name, value) in [
            ("stock_price", self.stock_price),
            ("equity_value", self.equity_value),
            ("equity_volatility", self.equity_volatility),
            ("time_to_exit", self.time_to_exit),
            ("risk_free_rate", self.risk_free_rate),
        ] {
            if !value.is_finite() {
                return Err(ValuationError::InvalidInput(format!(
                    "{name} must be a finite number, found {value}"
                )));
            }
        }
        if !(self.time_to_exit > 0.0 && self.time_to_exit <= MAX_HORIZON) {
            return Err(ValuationError::InvalidInput(format!(
                "time_to_exit must be in (0, {MAX_HORIZON}], found {}",
                self.time_to_exit
            )));
        }
        if self.sample_size == Some(0) {
            return Err(ValuationError::InvalidInput(
                "sample_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
            .unwrap_or_else(|| default_sample_size(self.time_to_exit))
    }

    /// Claims table after the row/column ceilings.
    pub fn claims_table(&self) -> Result<ClaimsTable, ValuationError> {
        let table = match &self.table {
            TableSource::Matrix { matrix, labels } => {
                // the loader's label column counts against the ceiling
                if let Some(row) = matrix.iter().position(|r| r.len() + 1 > MAX_COLUMNS) {
                    return Err(ValuationError::InvalidInput(format!(
                        "row {row} exceeds the maximum of {MAX_COLUMNS} columns"
                    )));
                }
                ClaimsTable::from_matrix(matrix)?.with_labels(labels.as_slice())
            }
            TableSource::Classes { classes } => ClaimsTable::new(classes.clone()),
        };
        if table.len() > MAX_ROWS {
            return Err(ValuationError::InvalidInput(format!(
                "claims table has {} rows, the maximum is {MAX_ROWS}",
                table.len()
            )));
        }
        Ok(table)
    }

    /// Engine inputs; the inactive target is zeroed according to `input_mode`.
    pub fn to_inputs(&self) -> ValuationInputs {
        let (target_stock_price, target_equity_value) = match self.input_mode {
            InputMode::StockPrice => (self.stock_price, 0.0),
            InputMode::EquityValue => (0.0, self.equity_value),
        };
        ValuationInputs {
            target_stock_price,
            target_volatility: self.equity_volatility,
            target_equity_value,
            risk_free_rate: self.risk_free_rate,
            horizon: self.time_to_exit,
            sample_size: self.sample_size(),
            seed: self.seed,
        }
    }
}
