//! Shared primitive types and protocol constants.

/// Account that owns a player record and a ledger balance.
pub type Identity = alloy_primitives::Address;

/// Player level. Starts at 1, only ever goes up.
pub type Level = u64;

/// Token amount. Non-negative by construction.
pub type Amount = u128;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Minimum seconds between two successful claims.
pub const MIN_CLAIM_INTERVAL: u64 = 3600;

/// Tokens minted to a freshly created player.
pub const INITIAL_TOKENS: u64 = 175;

/// Level every player starts at.
pub const STARTING_LEVEL: Level = 1;
