//! Module `pricing::vesting`.
//!
//! Vested fraction of a claim class as a function of the terminal common value.
//! Conditions are evaluated at the single terminal point only; there is no
//! monitoring along a path.
//!
//! | Rule | Fraction at terminal value `s` |
//! |---|---|
//! | time | `1` |
//! | threshold `L` | `1{s >= L}` |
//! | ramp `[a, b]` | `clamp((s - a) / (b - a), 0, 1)` |
//! | cliff `[a, b]` | `(1{s >= a} + 1{s >= (a+b)/2} + 1{s >= b}) / 3` |

use crate::captable::ClaimClass;
use crate::core::ValuationError;

/// Vesting regime of one claim class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VestingRule {
    /// Time vested: fully vested at the evaluation point.
    Time,
    /// Single performance hurdle.
    Threshold { level: f64 },
    /// Linear vesting across `[start, end]`.
    Ramp { start: f64, end: f64 },
    /// One third each at `start`, `mid`, and `end`.
    Cliff { start: f64, mid: f64, end: f64 },
}

impl VestingRule {
    /// Derives the rule for a validated class.
    ///
    /// Zero-width ramps are rejected here so that no NaN fraction can reach
    /// the payoff matrix.
    pub fn from_class(row: usize, class: &ClaimClass) -> Result<Self, ValuationError> {
        if class.is_time {
            return Ok(Self::Time);
        }

        match class.v_cnt {
            1 => Ok(Self::Threshold {
                level: class.vstart,
            }),
            2 if class.is_cliff => Ok(Self::Cliff {
                start: class.vstart,
                mid: 0.5 * (class.vstart + class.vend),
                end: class.vend,
            }),
            2 => {
                let width = class.vend - class.vstart;
                if width == 0.0 {
                    return Err(ValuationError::NumericalError(format!(
                        "row {row}: ramp vesting window has zero width (vstart = vend = {})",
                        class.vstart
                    )));
                }
                if width < 0.0 {
                    return Err(ValuationError::InvalidInput(format!(
                        "row {row}: ramp vesting requires vend > vstart, found [{}, {}]",
                        class.vstart, class.vend
                    )));
                }
                Ok(Self::Ramp {
                    start: class.vstart,
                    end: class.vend,
                })
            }
            n => Err(ValuationError::InvalidInput(format!(
                "row {row}: unsupported performance checkpoint count {n}"
            ))),
        }
    }

    /// Vested fraction at terminal value `terminal`.
    #[inline]
    pub fn fraction(&self, terminal: f64) -> f64 {
        match *self {
            Self::Time => 1.0,
            Self::Threshold { level } => indicator(terminal >= level),
            Self::Ramp { start, end } => ((terminal - start) / (end - start)).clamp(0.0, 1.0),
            Self::Cliff { start, mid, end } => {
                (indicator(terminal >= start) + indicator(terminal >= mid) + indicator(terminal >= end))
                    / 3.0
            }
        }
    }

    #[inline]
    pub fn is_time(&self) -> bool {
        matches!(self, Self::Time)
    }
}

#[inline]
fn indicator(hit: bool) -> f64 {
    if hit { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<f64> {
        (0..=400).map(|i| i as f64 * 0.05).collect()
    }

    #[test]
    fn time_rule_is_always_vested() {
        let rule = VestingRule::from_class(0, &ClaimClass::common(1.0)).unwrap();
        assert!(rule.is_time());
        assert!(grid().iter().all(|&s| rule.fraction(s) == 1.0));
    }

    #[test]
    fn threshold_is_binary_and_inclusive() {
        let rule = VestingRule::from_class(1, &ClaimClass::threshold(1.0, 0.0, 5.0)).unwrap();
        assert_eq!(rule.fraction(4.999), 0.0);
        assert_eq!(rule.fraction(5.0), 1.0);
        assert!(grid().iter().all(|&s| {
            let f = rule.fraction(s);
            f == 0.0 || f == 1.0
        }));
    }

    #[test]
    fn ramp_is_monotone_and_linear_inside_window() {
        let rule = VestingRule::from_class(1, &ClaimClass::ramp(1.0, 0.0, 4.0, 8.0)).unwrap();
        assert_eq!(rule.fraction(2.0), 0.0);
        assert_eq!(rule.fraction(6.0), 0.5);
        assert_eq!(rule.fraction(9.0), 1.0);
        let fractions: Vec<f64> = grid().iter().map(|&s| rule.fraction(s)).collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn cliff_takes_thirds_and_is_monotone() {
        let rule = VestingRule::from_class(1, &ClaimClass::cliff(1.0, 0.0, 4.0, 8.0)).unwrap();
        assert_eq!(rule.fraction(3.9), 0.0);
        assert_eq!(rule.fraction(4.0), 1.0 / 3.0);
        assert_eq!(rule.fraction(6.0), 2.0 / 3.0);
        assert_eq!(rule.fraction(8.0), 1.0);
        assert_eq!(rule.fraction(100.0), 1.0);

        let allowed = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        let fractions: Vec<f64> = grid().iter().map(|&s| rule.fraction(s)).collect();
        assert!(fractions.iter().all(|f| allowed.contains(f)));
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn zero_width_ramp_is_a_numerical_error() {
        let err = VestingRule::from_class(2, &ClaimClass::ramp(1.0, 0.0, 5.0, 5.0)).unwrap_err();
        assert!(matches!(err, ValuationError::NumericalError(_)));
    }

    #[test]
    fn inverted_ramp_is_rejected() {
        let err = VestingRule::from_class(2, &ClaimClass::ramp(1.0, 0.0, 6.0, 5.0)).unwrap_err();
        assert!(matches!(err, ValuationError::InvalidInput(_)));
    }

    #[test]
    fn zero_width_cliff_is_allowed() {
        let rule = VestingRule::from_class(1, &ClaimClass::cliff(1.0, 0.0, 5.0, 5.0)).unwrap();
        assert_eq!(rule.fraction(4.0), 0.0);
        assert_eq!(rule.fraction(5.0), 1.0);
    }
}
