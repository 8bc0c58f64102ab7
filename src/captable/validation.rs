//! Structural invariants of the claims table.
//!
//! Checks run in a fixed order and stop at the first violated family:
//! 1. every numeric field is non-negative (and finite),
//! 2. row 0 is common stock (`strike == 0`, time vested),
//! 3. time-vesting rows carry no performance window (`vstart == 0`, `v_cnt == 0`),
//! 4. performance rows have `v_cnt == 1 + (vend != 0)`.

use crate::captable::schema::{COMMON_ROW, ClaimsTable};

/// Structured description of the first invariant a table violates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The table has no rows.
    Empty,
    /// A loader row could not be represented (wrong width, non-binary flag, ...).
    Malformed { row: usize, reason: String },
    /// A numeric field is negative or not finite.
    NegativeField { row: usize, field: &'static str },
    /// Row 0 is not a zero-strike, time-vested common row.
    CommonRow(String),
    /// A time-vesting row carries a performance threshold or checkpoint count.
    TimeVestingWindow { row: usize },
    /// A performance row's checkpoint count does not match its window.
    CheckpointCount { row: usize, expected: u32, found: u32 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "claims table is empty"),
            Self::Malformed { row, reason } => write!(f, "row {row} is malformed: {reason}"),
            Self::NegativeField { row, field } => {
                write!(f, "row {row}: `{field}` must be a finite non-negative value")
            }
            Self::CommonRow(msg) => write!(f, "first row must be common stock: {msg}"),
            Self::TimeVestingWindow { row } => write!(
                f,
                "row {row}: time-vesting classes require vstart = 0 and v_cnt = 0"
            ),
            Self::CheckpointCount {
                row,
                expected,
                found,
            } => write!(
                f,
                "row {row}: performance classes require v_cnt = {expected}, found {found}"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates `table`, returning the first violated invariant.
///
/// # Examples
/// ```rust
/// use capval::captable::{ClaimClass, ClaimsTable, validate};
///
/// let table = ClaimsTable::new(vec![
///     ClaimClass::common(1_000.0),
///     ClaimClass::ramp(50.0, 2.0, 10.0, 20.0),
/// ]);
/// assert!(validate(&table).is_ok());
/// ```
pub fn validate(table: &ClaimsTable) -> Result<(), ValidationError> {
    if table.is_empty() {
        return Err(ValidationError::Empty);
    }

    for (row, class) in table.classes.iter().enumerate() {
        if let Some((field, _)) = class
            .numeric_fields()
            .into_iter()
            .find(|(_, v)| !(v.is_finite() && *v >= 0.0))
        {
            return Err(ValidationError::NegativeField { row, field });
        }
    }

    let common = &table.classes[COMMON_ROW];
    if common.strike != 0.0 {
        return Err(ValidationError::CommonRow(format!(
            "strike must be 0, found {}",
            common.strike
        )));
    }
    if !common.is_time {
        return Err(ValidationError::CommonRow(
            "common stock must be time vested".to_string(),
        ));
    }

    if let Some(row) = table
        .classes
        .iter()
        .position(|c| c.is_time && (c.vstart != 0.0 || c.v_cnt != 0))
    {
        return Err(ValidationError::TimeVestingWindow { row });
    }

    for (row, class) in table.classes.iter().enumerate() {
        if class.is_time {
            continue;
        }
        let expected = 1 + u32::from(class.vend != 0.0);
        if class.v_cnt != expected {
            return Err(ValidationError::CheckpointCount {
                row,
                expected,
                found: class.v_cnt,
            });
        }
    }

    Ok(())
}

/// Boolean form of [`validate`].
#[inline]
pub fn is_valid(table: &ClaimsTable) -> bool {
    validate(table).is_ok()
}
