//! Claim payoffs under the supported vesting regimes.

pub mod payoff;
pub mod vesting;

pub use payoff::{PayoffEngine, PayoffMatrix};
pub use vesting::VestingRule;
