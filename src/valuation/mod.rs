//! Valuation pipeline and result reporting.
//!
//! - [`aggregate`]: discounted fair values, `tev0`, implied equity volatility.
//! - [`model`]: the per-run model evaluated at trial `(s0, vol)`.
//! - [`report`]: the end-to-end [`run_valuation`] boundary and [`ValuationReport`].

pub mod aggregate;
pub mod model;
pub mod report;

pub use aggregate::{Aggregate, ValuationDetail, aggregate, aggregate_detail, log_return_volatility};
pub use model::ValuationModel;
pub use report::{
    ConsistencyCheck, ValuationInputs, ValuationReport, run_valuation, run_valuation_batch,
    run_valuation_with, try_run_valuation,
};
