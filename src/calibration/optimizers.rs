//! Bounded least-squares solvers for the `(s0, vol)` calibration.
//!
//! The calibrator fits two relative-error residuals in two box-constrained
//! parameters whose scales differ by orders of magnitude (a share value in
//! `[0.01, 1e4]` against a volatility in `[0.05, 1]`). [`levenberg_marquardt`]
//! is a projected Levenberg-Marquardt iteration for that shape:
//! - the damped normal equations use Marquardt scaling `J'J + lambda diag(J'J)`,
//!   so `lambda` is unit-free;
//! - `lambda` follows the gain ratio of actual to predicted reduction (Nielsen);
//! - a coordinate sitting on a bound with an outward descent direction is
//!   frozen in the step and excluded from the gradient test, so a fit that
//!   ends on a bound still terminates as stationary;
//! - a short step only counts as convergence once damping is back in the
//!   Gauss-Newton regime. Under heavy damping a short step says nothing
//!   about the fit.
//!
//! [`MultiStart`] layers a restart policy over any [`Minimizer`].
//!
//! References:
//! - Levenberg (1944), Marquardt (1963).
//! - Nielsen, *Damping Parameter in Marquardt's Method*, IMM-REP-1999-05.
//! - Madsen, Nielsen and Tingleff, *Methods for Non-Linear Least Squares Problems* (2004), Sec. 3.2.

use nalgebra::{DMatrix, DVector};

use crate::calibration::core::{BoxConstraints, ConvergenceInfo, TerminationReason};
use crate::core::ValuationError;

/// Damping at or below which a short step is read as a converged Gauss-Newton step.
const GAUSS_NEWTON_DAMPING: f64 = 1e-2;
/// Floor for a diagonal entry of the Marquardt scaling.
const MIN_SCALE: f64 = 1e-12;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;

/// Shared optimization payload used by all solvers.
#[derive(Debug, Clone)]
pub struct OptimisationResult {
    pub x: Vec<f64>,
    /// Sum of squared residuals at `x`.
    pub objective: f64,
    pub residuals: Vec<f64>,
    /// Forward-difference Jacobian at `x`.
    pub jacobian: DMatrix<f64>,
    pub convergence: ConvergenceInfo,
}

/// Capability: minimize a residual vector over a box from an initial guess.
pub trait Minimizer {
    fn name(&self) -> &'static str;

    fn minimize<F>(
        &self,
        initial: &[f64],
        bounds: &BoxConstraints,
        residual_fn: F,
    ) -> Result<OptimisationResult, ValuationError>
    where
        F: FnMut(&[f64]) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Starting damping, relative to the diagonal of `J'J`.
    pub initial_damping: f64,
    /// Infinity norm of the projected gradient `J'r` treated as stationary.
    pub gradient_tolerance: f64,
    /// Relative step length `|dx| / (|x| + tol)` treated as stationary.
    pub step_tolerance: f64,
    /// Sum of squared residuals treated as an exact fit.
    pub objective_tolerance: f64,
    /// Relative finite-difference step for the Jacobian.
    pub relative_step: f64,
    /// Consecutive rejected steps before the search gives up.
    pub max_rejections: usize,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            initial_damping: 1e-3,
            gradient_tolerance: 1e-10,
            step_tolerance: 1e-10,
            objective_tolerance: 1e-14,
            relative_step: 1e-4,
            max_rejections: 16,
        }
    }
}

fn residual_vector(values: Vec<f64>, expected: usize) -> Result<DVector<f64>, ValuationError> {
    if values.len() != expected {
        return Err(ValuationError::InvalidInput(format!(
            "residual function returned {} values, expected {expected}",
            values.len()
        )));
    }
    Ok(DVector::from_vec(values))
}

/// Forward-difference Jacobian; each coordinate steps toward the interior of the box.
fn forward_jacobian<F>(
    x: &[f64],
    residuals: &DVector<f64>,
    bounds: &BoxConstraints,
    relative_step: f64,
    residual_fn: &mut F,
    evaluations: &mut usize,
) -> Result<DMatrix<f64>, ValuationError>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let mut jacobian = DMatrix::zeros(residuals.len(), x.len());
    let mut shifted = x.to_vec();

    for c in 0..x.len() {
        let mut h = relative_step * x[c].abs().max(1e-3);
        if x[c] + h > bounds.upper[c] {
            h = -h;
        }
        if x[c] + h < bounds.lower[c] {
            // box narrower than the difference step: leave the column at zero
            continue;
        }

        shifted[c] = x[c] + h;
        let bumped = residual_vector(residual_fn(&shifted), residuals.len())?;
        *evaluations += 1;
        shifted[c] = x[c];

        jacobian.set_column(c, &((bumped - residuals) / h));
    }

    Ok(jacobian)
}

/// Coordinates on a bound whose descent direction `-g` points out of the box.
fn pinned_coordinates(x: &[f64], gradient: &DVector<f64>, bounds: &BoxConstraints) -> Vec<bool> {
    x.iter()
        .enumerate()
        .map(|(i, &xi)| {
            let tol = 1e-12 * (1.0 + xi.abs());
            (xi <= bounds.lower[i] + tol && gradient[i] > 0.0)
                || (xi >= bounds.upper[i] - tol && gradient[i] < 0.0)
        })
        .collect()
}

/// Solves `(J'J + lambda diag(J'J)) dx = -g` with pinned coordinates held fixed.
fn damped_step(
    jacobian: &DMatrix<f64>,
    gradient: &DVector<f64>,
    pinned: &[bool],
    lambda: f64,
) -> Option<DVector<f64>> {
    let mut normal = jacobian.transpose() * jacobian;
    let mut rhs = gradient.map(|g| -g);

    for i in 0..normal.nrows() {
        if pinned[i] {
            normal.row_mut(i).fill(0.0);
            normal.column_mut(i).fill(0.0);
            normal[(i, i)] = 1.0;
            rhs[i] = 0.0;
        } else {
            let scale = normal[(i, i)].max(MIN_SCALE);
            normal[(i, i)] += lambda * scale;
        }
    }

    normal.cholesky().map(|factor| factor.solve(&rhs))
}

/// Projected Levenberg-Marquardt on `sum r_i(x)^2` over `bounds`.
pub fn levenberg_marquardt<F>(
    initial: &[f64],
    bounds: &BoxConstraints,
    options: LmOptions,
    mut residual_fn: F,
) -> Result<OptimisationResult, ValuationError>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let n = bounds.dimension();
    if initial.len() != n {
        return Err(ValuationError::InvalidInput(format!(
            "initial guess has {} parameters, bounds have {n}",
            initial.len()
        )));
    }

    let mut x = bounds.clamp(initial);
    let mut evaluations = 1usize;
    let first = residual_fn(&x);
    if first.is_empty() {
        return Err(ValuationError::InvalidInput(
            "residual function returned no values".to_string(),
        ));
    }
    let m = first.len();
    let mut residuals = DVector::from_vec(first);
    let mut objective = residuals.norm_squared();
    if !objective.is_finite() {
        return Err(ValuationError::ConvergenceFailure(
            "objective is not finite at the initial guess".to_string(),
        ));
    }

    let mut jacobian = forward_jacobian(
        &x,
        &residuals,
        bounds,
        options.relative_step,
        &mut residual_fn,
        &mut evaluations,
    )?;

    let mut lambda = options.initial_damping.max(MIN_DAMPING);
    let mut growth = 2.0;
    let mut rejections = 0usize;
    let mut iterations = 0usize;
    let mut gradient_norm = f64::INFINITY;
    let mut step_norm = f64::INFINITY;
    let mut reason = TerminationReason::MaxIterations;
    let mut converged = objective <= options.objective_tolerance;
    if converged {
        reason = TerminationReason::ObjectiveTolerance;
    }

    while !converged && iterations < options.max_iterations {
        iterations += 1;

        let gradient = jacobian.transpose() * &residuals;
        let pinned = pinned_coordinates(&x, &gradient, bounds);
        gradient_norm = gradient
            .iter()
            .zip(&pinned)
            .filter(|(_, p)| !**p)
            .fold(0.0_f64, |acc, (g, _)| acc.max(g.abs()));
        if !gradient_norm.is_finite() {
            reason = TerminationReason::NumericalFailure;
            break;
        }
        if gradient_norm <= options.gradient_tolerance {
            converged = true;
            reason = TerminationReason::GradientTolerance;
            break;
        }

        let accepted = match damped_step(&jacobian, &gradient, &pinned, lambda) {
            Some(step) => {
                let moved: Vec<f64> = x.iter().zip(step.iter()).map(|(a, d)| a + d).collect();
                let candidate = bounds.clamp(&moved);
                let taken =
                    DVector::from_iterator(n, candidate.iter().zip(&x).map(|(c, a)| c - a));
                step_norm = taken.norm();

                let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
                if step_norm <= options.step_tolerance * (x_norm + options.step_tolerance)
                    && lambda <= GAUSS_NEWTON_DAMPING
                {
                    converged = true;
                    reason = TerminationReason::StepTolerance;
                    break;
                }

                let trial = residual_vector(residual_fn(&candidate), m)?;
                evaluations += 1;
                let trial_objective = trial.norm_squared();
                let predicted = objective - (&residuals + &jacobian * &taken).norm_squared();
                let actual = objective - trial_objective;

                if trial_objective.is_finite() && actual > 0.0 && predicted > 0.0 {
                    let gain = actual / predicted;
                    lambda *= (1.0_f64 / 3.0).max(1.0 - (2.0 * gain - 1.0).powi(3));
                    lambda = lambda.max(MIN_DAMPING);
                    x = candidate;
                    residuals = trial;
                    objective = trial_objective;
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if accepted {
            growth = 2.0;
            rejections = 0;
            if objective <= options.objective_tolerance {
                converged = true;
                reason = TerminationReason::ObjectiveTolerance;
                break;
            }
            jacobian = forward_jacobian(
                &x,
                &residuals,
                bounds,
                options.relative_step,
                &mut residual_fn,
                &mut evaluations,
            )?;
        } else {
            lambda = (lambda * growth).min(MAX_DAMPING);
            growth *= 2.0;
            rejections += 1;
            if rejections >= options.max_rejections {
                reason = TerminationReason::Stagnation;
                break;
            }
        }
    }

    if iterations > 0 && reason == TerminationReason::ObjectiveTolerance {
        // the Jacobian is stale after the final accepted step
        jacobian = forward_jacobian(
            &x,
            &residuals,
            bounds,
            options.relative_step,
            &mut residual_fn,
            &mut evaluations,
        )?;
    }

    Ok(OptimisationResult {
        x,
        objective,
        residuals: residuals.iter().copied().collect(),
        jacobian,
        convergence: ConvergenceInfo {
            iterations,
            objective_evaluations: evaluations,
            gradient_norm,
            step_norm,
            converged,
            reason,
        },
    })
}

/// Projected Levenberg-Marquardt behind the [`Minimizer`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardt {
    pub options: LmOptions,
}

impl LevenbergMarquardt {
    pub fn new(options: LmOptions) -> Self {
        Self { options }
    }
}

impl Minimizer for LevenbergMarquardt {
    fn name(&self) -> &'static str {
        "levenberg_marquardt"
    }

    fn minimize<F>(
        &self,
        initial: &[f64],
        bounds: &BoxConstraints,
        residual_fn: F,
    ) -> Result<OptimisationResult, ValuationError>
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        levenberg_marquardt(initial, bounds, self.options, residual_fn)
    }
}

/// Restart policy: reruns `inner` from scaled starting points when the first
/// run does not converge, keeping the lowest objective found.
#[derive(Debug, Clone)]
pub struct MultiStart<M> {
    pub inner: M,
    /// Per-restart multipliers applied elementwise to the initial guess.
    pub start_scales: Vec<f64>,
}

impl<M: Minimizer> MultiStart<M> {
    pub fn new(inner: M, start_scales: Vec<f64>) -> Self {
        Self {
            inner,
            start_scales,
        }
    }
}

impl<M: Minimizer> Minimizer for MultiStart<M> {
    fn name(&self) -> &'static str {
        "multi_start"
    }

    fn minimize<F>(
        &self,
        initial: &[f64],
        bounds: &BoxConstraints,
        mut residual_fn: F,
    ) -> Result<OptimisationResult, ValuationError>
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        let mut best = self.inner.minimize(initial, bounds, &mut residual_fn)?;
        let mut iterations = best.convergence.iterations;
        let mut evals = best.convergence.objective_evaluations;

        for &scale in &self.start_scales {
            if best.convergence.converged {
                break;
            }
            let start: Vec<f64> = initial.iter().map(|x| x * scale).collect();
            let start = bounds.clamp(&start);
            tracing::debug!(
                solver = self.inner.name(),
                scale,
                "restarting calibration from scaled initial guess"
            );

            let candidate = self.inner.minimize(&start, bounds, &mut residual_fn)?;
            iterations += candidate.convergence.iterations;
            evals += candidate.convergence.objective_evaluations;
            if candidate.objective < best.objective
                || (candidate.convergence.converged && !best.convergence.converged)
            {
                best = candidate;
            }
        }

        best.convergence.iterations = iterations;
        best.convergence.objective_evaluations = evals;
        Ok(best)
    }
}
