//! # Economy Error Types
//!
//! All errors that can occur in the progression economy.
//!
//! Every variant is a precondition or arithmetic failure: the call that
//! produced it left no observable state change behind.

use thiserror::Error;

use crate::types::{Amount, Identity};

/// Errors that can occur in the progression economy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// The identity has no player record.
    #[error("player not found: {0}")]
    PlayerNotFound(Identity),

    /// `create_player` was called for an identity that already has a record.
    #[error("player already exists: {0}")]
    PlayerAlreadyExists(Identity),

    /// Not enough time has passed since the last claim.
    #[error("claim too early: {elapsed}s elapsed, {required}s required")]
    ClaimTooEarly {
        /// Seconds elapsed since the last claim.
        elapsed: u64,
        /// Minimum seconds between claims.
        required: u64,
    },

    /// The player's balance does not cover the next level's cost.
    #[error("cannot afford level up: need {required}, have {available}")]
    CantAffordLevelUp {
        /// Cost of the next level.
        required: Amount,
        /// Current balance.
        available: Amount,
    },

    /// The ledger could not satisfy a burn.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount the burn asked for.
        requested: Amount,
        /// Balance at the time of the burn.
        available: Amount,
    },

    /// A mutating call re-entered the engine for a player whose previous
    /// call has not finished yet.
    #[error("call already in progress for player {0}")]
    CallInProgress(Identity),

    /// Arithmetic overflow (or underflow) in an economic calculation.
    #[error("arithmetic overflow in economic calculation")]
    Overflow,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Journal I/O failure or corruption.
    #[error("journal error: {0}")]
    Journal(String),
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;
