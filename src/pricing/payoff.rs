//! Module `pricing::payoff`.
//!
//! Per-draw, per-class vested payoff: `max(S_T - K, 0) * vested_fraction(S_T)`.
//! Matrices are `nsim x classes` (rows are simulation draws).

use nalgebra::DMatrix;

use crate::captable::ClaimsTable;
use crate::core::ValuationError;
use crate::pricing::vesting::VestingRule;

/// Vested payoffs, with the vested-fraction matrix kept on request.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoffMatrix {
    /// Vested payoff per share, `nsim x classes`.
    pub payoff: DMatrix<f64>,
    /// Vested fraction per draw and class, present only for full-output runs.
    pub vesting: Option<DMatrix<f64>>,
}

impl PayoffMatrix {
    #[inline]
    pub fn draws(&self) -> usize {
        self.payoff.nrows()
    }

    #[inline]
    pub fn classes(&self) -> usize {
        self.payoff.ncols()
    }
}

/// Strikes and vesting rules of a claims table, resolved once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoffEngine {
    strikes: Vec<f64>,
    rules: Vec<VestingRule>,
}

impl PayoffEngine {
    /// Resolves vesting rules for a validated table.
    pub fn new(table: &ClaimsTable) -> Result<Self, ValuationError> {
        let rules = table
            .classes
            .iter()
            .enumerate()
            .map(|(row, class)| VestingRule::from_class(row, class))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            strikes: table.strikes(),
            rules,
        })
    }

    #[inline]
    pub fn classes(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[VestingRule] {
        &self.rules
    }

    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }

    /// Vested payoff per share for every terminal value and class.
    pub fn evaluate(&self, terminal: &[f64], keep_vesting: bool) -> PayoffMatrix {
        let nsim = terminal.len();
        let ncls = self.classes();

        if !keep_vesting {
            let payoff = DMatrix::from_fn(nsim, ncls, |i, j| {
                let s = terminal[i];
                (s - self.strikes[j]).max(0.0) * self.rules[j].fraction(s)
            });
            return PayoffMatrix {
                payoff,
                vesting: None,
            };
        }

        let vesting =
            DMatrix::from_fn(nsim, ncls, |i, j| self.rules[j].fraction(terminal[i]));
        let payoff = DMatrix::from_fn(nsim, ncls, |i, j| {
            (terminal[i] - self.strikes[j]).max(0.0) * vesting[(i, j)]
        });
        PayoffMatrix {
            payoff,
            vesting: Some(vesting),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captable::ClaimClass;

    fn table() -> ClaimsTable {
        ClaimsTable::new(vec![
            ClaimClass::common(1_000.0),
            ClaimClass::time_option(100.0, 5.0),
            ClaimClass::threshold(100.0, 0.0, 8.0),
            ClaimClass::ramp(100.0, 2.0, 6.0, 10.0),
            ClaimClass::cliff(100.0, 2.0, 6.0, 10.0),
        ])
    }

    #[test]
    fn payoff_is_intrinsic_times_vested_fraction() {
        let engine = PayoffEngine::new(&table()).unwrap();
        let out = engine.evaluate(&[4.0, 8.0, 12.0], true);
        let p = &out.payoff;

        assert_eq!((out.draws(), out.classes()), (3, 5));

        assert_eq!(p[(0, 0)], 4.0);
        assert_eq!(p[(0, 1)], 0.0);
        assert_eq!(p[(0, 2)], 0.0);
        assert_eq!(p[(0, 3)], 0.0);
        assert_eq!(p[(0, 4)], 0.0);

        assert_eq!(p[(1, 1)], 3.0);
        assert_eq!(p[(1, 2)], 8.0);
        assert_eq!(p[(1, 3)], 6.0 * 0.5);
        assert!((p[(1, 4)] - 6.0 * 2.0 / 3.0).abs() < 1e-12);

        assert_eq!(p[(2, 3)], 10.0);
        assert_eq!(p[(2, 4)], 10.0);

        let v = out.vesting.expect("vesting kept");
        assert_eq!(v[(1, 3)], 0.5);
        assert_eq!(v[(0, 0)], 1.0);
    }

    #[test]
    fn vesting_matrix_dropped_on_inner_loop_evaluation() {
        let engine = PayoffEngine::new(&table()).unwrap();
        let terminal = [4.0, 6.5, 8.0, 9.0, 12.0];
        let inner = engine.evaluate(&terminal, false);
        let full = engine.evaluate(&terminal, true);

        assert!(inner.vesting.is_none());
        assert!(full.vesting.is_some());
        assert_eq!(inner.payoff, full.payoff);
    }

    #[test]
    fn payoffs_are_non_negative() {
        let engine = PayoffEngine::new(&table()).unwrap();
        let terminal: Vec<f64> = (0..200).map(|i| i as f64 * 0.1).collect();
        let out = engine.evaluate(&terminal, false);
        assert!(out.payoff.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn zero_width_ramp_fails_engine_construction() {
        let table = ClaimsTable::new(vec![
            ClaimClass::common(1.0),
            ClaimClass::ramp(1.0, 0.0, 3.0, 3.0),
        ]);
        assert!(matches!(
            PayoffEngine::new(&table),
            Err(ValuationError::NumericalError(_))
        ));
    }
}
