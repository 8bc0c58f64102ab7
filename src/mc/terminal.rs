//! Module `mc::terminal`.
//!
//! Single-factor lognormal terminal values of the common stock,
//! `S_T = S_0 exp((r - sigma^2/2) T + sigma sqrt(T) z)`, driven by a fixed
//! sample of standard normals.
//!
//! The sample is owned by the caller and built from an explicit seed, so the
//! objective seen by the calibrator is a deterministic, smooth function of
//! `(S_0, sigma)` and independent runs never share generator state.
//!
//! References: Glasserman (2004), Ch. 3.2, exact simulation of geometric Brownian motion.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use crate::core::ValuationError;

/// Horizons at or below this many years are treated as an immediate exit.
pub const IMMEDIATE_EXIT_THRESHOLD: f64 = 0.01;

/// Positive horizon substituted for an immediate exit.
pub const IMMEDIATE_EXIT_HORIZON: f64 = 1.0e-5;

/// Returns `true` when `horizon` falls in the immediate-exit regime.
#[inline]
pub fn is_immediate_exit(horizon: f64) -> bool {
    horizon <= IMMEDIATE_EXIT_THRESHOLD
}

/// Floors immediate-exit horizons to [`IMMEDIATE_EXIT_HORIZON`].
#[inline]
pub fn effective_horizon(horizon: f64) -> f64 {
    if is_immediate_exit(horizon) {
        IMMEDIATE_EXIT_HORIZON
    } else {
        horizon
    }
}

/// Fixed sample of independent standard-normal draws.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalSample {
    seed: Option<u64>,
    draws: Vec<f64>,
}

impl NormalSample {
    /// Draws `size` standard normals from a `StdRng` seeded with `seed`.
    pub fn from_seed(size: usize, seed: u64) -> Result<Self, ValuationError> {
        if size == 0 {
            return Err(ValuationError::InvalidInput(
                "sample size must be >= 1".to_string(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let draws: Vec<f64> = (0..size).map(|_| StandardNormal.sample(&mut rng)).collect();
        Ok(Self {
            seed: Some(seed),
            draws,
        })
    }

    /// Wraps caller-supplied draws.
    pub fn from_draws(draws: Vec<f64>) -> Result<Self, ValuationError> {
        if draws.is_empty() {
            return Err(ValuationError::InvalidInput(
                "normal sample must contain at least one draw".to_string(),
            ));
        }
        if draws.iter().any(|z| !z.is_finite()) {
            return Err(ValuationError::InvalidInput(
                "normal sample contains non-finite draws".to_string(),
            ));
        }
        Ok(Self { seed: None, draws })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    #[inline]
    pub fn draws(&self) -> &[f64] {
        &self.draws
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

/// Maps the fixed sample to terminal common values for trial `(s0, vol)`.
///
/// `horizon` is used as given; callers floor it with [`effective_horizon`].
pub fn simulate_terminal(
    s0: f64,
    vol: f64,
    rate: f64,
    horizon: f64,
    sample: &NormalSample,
) -> Vec<f64> {
    let drift = (rate - 0.5 * vol * vol) * horizon;
    let diffusion = vol * horizon.sqrt();
    sample
        .draws()
        .iter()
        .map(|&z| s0 * diffusion.mul_add(z, drift).exp())
        .collect()
}
