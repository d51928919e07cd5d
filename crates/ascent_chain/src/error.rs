//! Error types for the chain bridge.

use alloy_primitives::{Address, B256};
use ascent_economy::{EconomyError, Identity};
use thiserror::Error;

/// Chain bridge errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Log emitted by a contract other than the watched one.
    #[error("log from {0} does not belong to the watched contract")]
    ForeignContract(Address),

    /// Log that is not one of the progression events, or whose values do not
    /// fit the core's integer widths.
    #[error("undecodable log with topic0 {0}")]
    Undecodable(B256),

    /// Log carrying no topics at all.
    #[error("log has no topics")]
    Anonymous,

    /// Listener channel is full; the event was dropped.
    #[error("event channel full")]
    ChannelFull,

    /// Listener channel has no receiver left.
    #[error("event channel disconnected")]
    Disconnected,

    /// Event contradicts what the mirror already knows.
    #[error("mirror out of sync for {identity}: {reason}")]
    OutOfSync {
        /// Player the event refers to.
        identity: Identity,
        /// What did not line up.
        reason: String,
    },

    /// Formula or arithmetic failure while replaying an event.
    #[error(transparent)]
    Economy(#[from] EconomyError),
}

/// Result type for chain bridge operations.
pub type ChainResult<T> = Result<T, ChainError>;
