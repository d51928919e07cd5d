//! # Economy Formulas
//!
//! Pure functions of a level. No state, no I/O, no floating point.
//!
//! | Formula | Definition |
//! |---------|------------|
//! | `level_cost(n)` | `((n - 1) * 10)^2` |
//! | `level_reward(n)` | `((n - 1) * 5)^2` |
//! | `hourly_rate(n)` | `n * 5` |
//!
//! Since `10 = 2 * 5`, `level_cost(n) == 4 * level_reward(n)` for every level.
//!
//! All intermediate values are widened to `u128` and every step is checked.
//! A result that does not fit is reported as [`EconomyError::Overflow`], never
//! wrapped.

use crate::error::{EconomyError, EconomyResult};
use crate::types::{Amount, Level};

/// Per-level step of the cost formula.
pub const COST_STEP: Amount = 10;

/// Per-level step of the reward formula.
pub const REWARD_STEP: Amount = 5;

/// Tokens per hour for each level the player holds.
pub const RATE_PER_LEVEL: Amount = 5;

/// `((level - 1) * step)^2`, checked.
#[inline]
fn quadratic(level: Level, step: Amount) -> EconomyResult<Amount> {
    let steps = level.checked_sub(1).ok_or(EconomyError::Overflow)?;
    Amount::from(steps)
        .checked_mul(step)
        .and_then(|base| base.checked_pow(2))
        .ok_or(EconomyError::Overflow)
}

/// Tokens required to reach `level`.
///
/// Level 0 is not a level; asking for it underflows and returns `Overflow`.
#[inline]
pub fn level_cost(level: Level) -> EconomyResult<Amount> {
    quadratic(level, COST_STEP)
}

/// Tokens granted upon reaching `level`.
#[inline]
pub fn level_reward(level: Level) -> EconomyResult<Amount> {
    quadratic(level, REWARD_STEP)
}

/// Tokens claimable per full hour at the player's *current* level.
#[inline]
pub fn hourly_rate(current_level: Level) -> EconomyResult<Amount> {
    Amount::from(current_level)
        .checked_mul(RATE_PER_LEVEL)
        .ok_or(EconomyError::Overflow)
}

/// Payout for a claim after `elapsed` seconds.
///
/// `floor(elapsed * hourly_rate(current_level) / interval)`. Partial hours
/// accrue pro rata; the remainder below one token is dropped.
pub fn claim_reward(elapsed: u64, current_level: Level, interval: u64) -> EconomyResult<Amount> {
    if interval == 0 {
        return Err(EconomyError::InvalidConfig(
            "claim interval must be non-zero".to_string(),
        ));
    }
    let accrued = Amount::from(elapsed)
        .checked_mul(hourly_rate(current_level)?)
        .ok_or(EconomyError::Overflow)?;
    Ok(accrued / Amount::from(interval))
}
