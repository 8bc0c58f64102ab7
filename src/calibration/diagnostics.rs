//! Calibration diagnostics and warning synthesis.

use crate::calibration::core::{BoxConstraints, CalibrationWarningFlag, ConvergenceInfo};

/// Objective level above which a calibration is flagged as a poor fit.
pub const POOR_FIT_OBJECTIVE: f64 = 1e-4;

pub fn warning_flags(
    convergence: &ConvergenceInfo,
    condition_number: f64,
    objective: f64,
    bounds: Option<&BoxConstraints>,
    params: Option<&[f64]>,
) -> Vec<CalibrationWarningFlag> {
    let mut out = Vec::new();

    if !convergence.converged {
        out.push(CalibrationWarningFlag::NonConvergent);
    }

    if !condition_number.is_finite() || condition_number > 1e8 {
        out.push(CalibrationWarningFlag::IllConditioned);
    }

    if !objective.is_finite() || objective > POOR_FIT_OBJECTIVE {
        out.push(CalibrationWarningFlag::PoorFit);
    }

    if let (Some(b), Some(x)) = (bounds, params)
        && b.hits_boundary(x, 1e-6)
    {
        out.push(CalibrationWarningFlag::HitBoundary);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::core::TerminationReason;

    fn convergence(converged: bool) -> ConvergenceInfo {
        ConvergenceInfo {
            iterations: 5,
            objective_evaluations: 20,
            gradient_norm: 1e-9,
            step_norm: 1e-9,
            converged,
            reason: if converged {
                TerminationReason::GradientTolerance
            } else {
                TerminationReason::MaxIterations
            },
        }
    }

    #[test]
    fn clean_fit_has_no_flags() {
        let b = BoxConstraints::new(vec![0.01, 0.05], vec![10_000.0, 1.0]).unwrap();
        let flags = warning_flags(&convergence(true), 12.0, 1e-12, Some(&b), Some(&[10.0, 0.3]));
        assert!(flags.is_empty());
    }

    #[test]
    fn flags_each_failure_mode() {
        let b = BoxConstraints::new(vec![0.01, 0.05], vec![10_000.0, 1.0]).unwrap();
        let flags = warning_flags(
            &convergence(false),
            f64::INFINITY,
            0.5,
            Some(&b),
            Some(&[10.0, 1.0]),
        );
        assert_eq!(
            flags,
            vec![
                CalibrationWarningFlag::NonConvergent,
                CalibrationWarningFlag::IllConditioned,
                CalibrationWarningFlag::PoorFit,
                CalibrationWarningFlag::HitBoundary,
            ]
        );
    }
}
