//! Monte Carlo building blocks: the fixed normal sample and terminal-value map.

pub mod terminal;

pub use terminal::{
    IMMEDIATE_EXIT_HORIZON, IMMEDIATE_EXIT_THRESHOLD, NormalSample, effective_horizon,
    is_immediate_exit, simulate_terminal,
};
