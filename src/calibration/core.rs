//! Calibration core abstractions: box bounds, termination metadata, warning flags.
//!
//! References:
//! - Nocedal and Wright, *Numerical Optimization* (2nd ed.), Ch. 10.
//! - More (1978), Levenberg-Marquardt implementation and convergence behavior.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::core::ValuationError;

/// Box constraints `lower <= x <= upper` used by all optimizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxConstraints {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl BoxConstraints {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, ValuationError> {
        if lower.is_empty() || lower.len() != upper.len() {
            return Err(ValuationError::InvalidInput(
                "constraints require same non-zero lower/upper dimensions".to_string(),
            ));
        }
        for i in 0..lower.len() {
            if !lower[i].is_finite() || !upper[i].is_finite() || lower[i] > upper[i] {
                return Err(ValuationError::InvalidInput(format!(
                    "invalid bound at index {i}: [{}, {}]",
                    lower[i], upper[i]
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, v)| v.clamp(self.lower[i], self.upper[i]))
            .collect()
    }

    pub fn hits_boundary(&self, x: &[f64], eps: f64) -> bool {
        x.iter().enumerate().any(|(i, &v)| {
            (v - self.lower[i]).abs() <= eps.max(1e-12)
                || (self.upper[i] - v).abs() <= eps.max(1e-12)
        })
    }
}

/// Optimizer termination reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    GradientTolerance,
    StepTolerance,
    ObjectiveTolerance,
    Stagnation,
    MaxIterations,
    NumericalFailure,
}

impl TerminationReason {
    /// Human-readable cause of termination.
    pub fn message(self) -> &'static str {
        match self {
            Self::GradientTolerance => "gradient norm below tolerance",
            Self::StepTolerance => "step size below tolerance",
            Self::ObjectiveTolerance => "objective below tolerance",
            Self::Stagnation => "too many consecutive rejected steps",
            Self::MaxIterations => "iteration limit reached",
            Self::NumericalFailure => "non-finite gradient encountered",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Convergence metadata for optimization runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceInfo {
    pub iterations: usize,
    pub objective_evaluations: usize,
    pub gradient_norm: f64,
    pub step_norm: f64,
    pub converged: bool,
    pub reason: TerminationReason,
}

/// High-level warning flags derived from fit/convergence diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationWarningFlag {
    IllConditioned,
    HitBoundary,
    PoorFit,
    NonConvergent,
}

/// Condition number `kappa = sigma_max / sigma_min` from SVD singular values.
pub fn matrix_condition_number(jacobian: &DMatrix<f64>) -> f64 {
    if jacobian.nrows() == 0 || jacobian.ncols() == 0 {
        return 1.0;
    }

    let svd = jacobian.clone().svd(false, false);
    let mut sigma_max: f64 = 0.0;
    let mut sigma_min = f64::INFINITY;

    for s in svd.singular_values.iter() {
        sigma_max = sigma_max.max(*s);
        if *s > 1e-14 {
            sigma_min = sigma_min.min(*s);
        }
    }

    if sigma_min.is_finite() && sigma_min > 0.0 {
        sigma_max / sigma_min
    } else {
        f64::INFINITY
    }
}

/// Converts a dense matrix into nested row vectors.
pub fn matrix_to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

#[inline]
pub fn finite_metric(x: f64) -> f64 {
    if x.is_finite() { x } else { f64::MAX }
}

pub fn sanitize_convergence(mut c: ConvergenceInfo) -> ConvergenceInfo {
    c.gradient_norm = finite_metric(c.gradient_norm);
    c.step_norm = finite_metric(c.step_norm);
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_or_mismatched_bounds() {
        assert!(BoxConstraints::new(vec![1.0], vec![0.0]).is_err());
        assert!(BoxConstraints::new(vec![0.0, 0.0], vec![1.0]).is_err());
        assert!(BoxConstraints::new(Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn clamp_and_boundary_detection() {
        let b = BoxConstraints::new(vec![0.01, 0.05], vec![10_000.0, 1.0]).unwrap();
        assert_eq!(b.clamp(&[-5.0, 2.0]), vec![0.01, 1.0]);
        assert!(b.hits_boundary(&[50.0, 1.0], 1e-9));
        assert!(!b.hits_boundary(&[50.0, 0.4], 1e-9));
    }

    #[test]
    fn condition_number_of_diagonal_matrix() {
        let j = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 0.5]);
        assert!((matrix_condition_number(&j) - 8.0).abs() < 1e-10);
    }

    #[test]
    fn matrix_rows_preserve_layout() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(
            matrix_to_rows(&m),
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
        );
    }
}
