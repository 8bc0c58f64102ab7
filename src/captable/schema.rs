//! Claims-table schema: one row per claim class, fixed column layout.
//!
//! The tabular loader hands the engine a numeric matrix whose columns start at
//! `shares` in the order given by [`COLUMNS`]. [`ClaimsTable::from_matrix`]
//! converts that matrix into typed rows; structural invariants are checked
//! separately by [`crate::captable::validate`].

use serde::{Deserialize, Serialize};

use crate::captable::validation::ValidationError;

/// Numeric column layout of the loader matrix, starting at the `shares` column.
pub const COLUMNS: [&str; 8] = [
    "shares", "strike", "vstart", "vend", "is_time", "v_cnt", "groups", "is_cliff",
];

/// Number of numeric columns per row.
pub const COLUMN_COUNT: usize = COLUMNS.len();

/// Row index of the common-stock class.
pub const COMMON_ROW: usize = 0;

/// One claim class (common stock, an option grant, a performance award).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimClass {
    /// Display label from the loader's `class` column; never used in computation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Share count (or weight) of the class.
    pub shares: f64,
    /// Exercise price per share, zero for common stock.
    pub strike: f64,
    /// Lower vesting boundary in terminal common-value units.
    pub vstart: f64,
    /// Upper vesting boundary; zero for single-threshold performance vesting.
    pub vend: f64,
    /// Vests by elapsed time only (always fully vested at the terminal point).
    pub is_time: bool,
    /// Vesting checkpoint count: 0 for time vesting, 1 or 2 for performance vesting.
    pub v_cnt: u32,
    /// Opaque grouping tag, passed through.
    #[serde(default)]
    pub groups: f64,
    /// Three-tier step vesting instead of a linear ramp.
    #[serde(default)]
    pub is_cliff: bool,
}

impl ClaimClass {
    fn base(shares: f64, strike: f64) -> Self {
        Self {
            label: None,
            shares,
            strike,
            vstart: 0.0,
            vend: 0.0,
            is_time: true,
            v_cnt: 0,
            groups: 0.0,
            is_cliff: false,
        }
    }

    /// Common stock row: zero strike, time vested.
    pub fn common(shares: f64) -> Self {
        Self::base(shares, 0.0)
    }

    /// Time-vesting option (fully vested at the terminal point).
    pub fn time_option(shares: f64, strike: f64) -> Self {
        Self::base(shares, strike)
    }

    /// Performance award that vests entirely once terminal value reaches `level`.
    pub fn threshold(shares: f64, strike: f64, level: f64) -> Self {
        Self {
            vstart: level,
            is_time: false,
            v_cnt: 1,
            ..Self::base(shares, strike)
        }
    }

    /// Performance award vesting linearly between `start` and `end`.
    pub fn ramp(shares: f64, strike: f64, start: f64, end: f64) -> Self {
        Self {
            vstart: start,
            vend: end,
            is_time: false,
            v_cnt: 2,
            ..Self::base(shares, strike)
        }
    }

    /// Performance award vesting in thirds at `start`, the midpoint, and `end`.
    pub fn cliff(shares: f64, strike: f64, start: f64, end: f64) -> Self {
        Self {
            is_cliff: true,
            ..Self::ramp(shares, strike, start, end)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_group(mut self, groups: f64) -> Self {
        self.groups = groups;
        self
    }

    /// Numeric fields paired with their column names, in [`COLUMNS`] order.
    pub fn numeric_fields(&self) -> [(&'static str, f64); COLUMN_COUNT] {
        [
            ("shares", self.shares),
            ("strike", self.strike),
            ("vstart", self.vstart),
            ("vend", self.vend),
            ("is_time", flag_value(self.is_time)),
            ("v_cnt", f64::from(self.v_cnt)),
            ("groups", self.groups),
            ("is_cliff", flag_value(self.is_cliff)),
        ]
    }

    /// Parses one loader row (columns in [`COLUMNS`] order).
    ///
    /// Negative cells in the typed numeric columns are kept so that validation
    /// reports them; cells that cannot be represented at all (negative or
    /// non-integral counts, flags other than 0/1) are rejected here.
    pub fn from_row(row: usize, values: &[f64]) -> Result<Self, ValidationError> {
        if values.len() != COLUMN_COUNT {
            return Err(ValidationError::Malformed {
                row,
                reason: format!(
                    "expected {COLUMN_COUNT} numeric columns starting at `shares`, found {}",
                    values.len()
                ),
            });
        }

        Ok(Self {
            label: None,
            shares: values[0],
            strike: values[1],
            vstart: values[2],
            vend: values[3],
            is_time: parse_flag(row, "is_time", values[4])?,
            v_cnt: parse_count(row, "v_cnt", values[5])?,
            groups: values[6],
            is_cliff: parse_flag(row, "is_cliff", values[7])?,
        })
    }
}

#[inline]
fn flag_value(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

fn parse_flag(row: usize, field: &'static str, value: f64) -> Result<bool, ValidationError> {
    if value < 0.0 {
        return Err(ValidationError::NegativeField { row, field });
    }
    if value == 0.0 {
        Ok(false)
    } else if value == 1.0 {
        Ok(true)
    } else {
        Err(ValidationError::Malformed {
            row,
            reason: format!("`{field}` must be 0 or 1, found {value}"),
        })
    }
}

fn parse_count(row: usize, field: &'static str, value: f64) -> Result<u32, ValidationError> {
    if value < 0.0 {
        return Err(ValidationError::NegativeField { row, field });
    }
    if !value.is_finite() || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(ValidationError::Malformed {
            row,
            reason: format!("`{field}` must be a non-negative integer, found {value}"),
        });
    }
    Ok(value as u32)
}

/// Ordered claims table; row 0 is the common-stock class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimsTable {
    pub classes: Vec<ClaimClass>,
}

impl ClaimsTable {
    pub fn new(classes: Vec<ClaimClass>) -> Self {
        Self { classes }
    }

    /// Builds a table from the loader matrix (one inner vector per row).
    ///
    /// # Examples
    /// ```rust
    /// use capval::captable::ClaimsTable;
    ///
    /// let table = ClaimsTable::from_matrix(&[
    ///     vec![1_000.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
    ///     vec![100.0, 5.0, 8.0, 12.0, 0.0, 2.0, 1.0, 1.0],
    /// ])
    /// .expect("well-formed matrix");
    /// assert_eq!(table.len(), 2);
    /// assert!(table.classes[1].is_cliff);
    /// ```
    pub fn from_matrix(rows: &[Vec<f64>]) -> Result<Self, ValidationError> {
        rows.iter()
            .enumerate()
            .map(|(i, row)| ClaimClass::from_row(i, row))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    /// Attaches loader labels row by row; extra labels are ignored.
    pub fn with_labels<S: AsRef<str>>(mut self, labels: &[S]) -> Self {
        for (class, label) in self.classes.iter_mut().zip(labels) {
            class.label = Some(label.as_ref().to_string());
        }
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn common(&self) -> Option<&ClaimClass> {
        self.classes.get(COMMON_ROW)
    }

    pub fn shares(&self) -> Vec<f64> {
        self.classes.iter().map(|c| c.shares).collect()
    }

    pub fn strikes(&self) -> Vec<f64> {
        self.classes.iter().map(|c| c.strike).collect()
    }

    /// Labels per row, falling back to `Class {n}` (1-based) when the loader gave none.
    pub fn labels(&self) -> Vec<String> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                c.label
                    .clone()
                    .unwrap_or_else(|| format!("Class {}", i + 1))
            })
            .collect()
    }
}
