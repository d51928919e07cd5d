//! # Ledger Boundary
//!
//! The token ledger is an external collaborator. The engine only ever asks
//! it three things: what is the balance, mint, burn.
//!
//! [`InMemoryLedger`] is the reference implementation used by tests, the
//! benches and the simulation binary. Production deployments plug a chain or
//! database backed implementation in through [`LedgerAdapter`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::TokenMetadata;
use crate::error::{EconomyError, EconomyResult};
use crate::types::{Amount, Identity};

/// Operations the progression core needs from a fungible-token ledger.
///
/// Implementations use interior mutability: the engine shares one ledger
/// across threads and calls it through `&self`.
pub trait LedgerAdapter: Send + Sync {
    /// Current balance of `identity` (zero if never seen).
    fn balance_of(&self, identity: &Identity) -> Amount;

    /// Increases the balance of `identity` by `amount`.
    fn mint(&self, identity: &Identity, amount: Amount) -> EconomyResult<()>;

    /// Decreases the balance of `identity` by `amount`.
    ///
    /// Must fail with [`EconomyError::InsufficientBalance`] and leave the
    /// balance unchanged if `amount` exceeds it.
    fn burn(&self, identity: &Identity, amount: Amount) -> EconomyResult<()>;

    /// Cosmetic token metadata.
    fn metadata(&self) -> TokenMetadata;
}

impl<T: LedgerAdapter + ?Sized> LedgerAdapter for Arc<T> {
    fn balance_of(&self, identity: &Identity) -> Amount {
        (**self).balance_of(identity)
    }

    fn mint(&self, identity: &Identity, amount: Amount) -> EconomyResult<()> {
        (**self).mint(identity, amount)
    }

    fn burn(&self, identity: &Identity, amount: Amount) -> EconomyResult<()> {
        (**self).burn(identity, amount)
    }

    fn metadata(&self) -> TokenMetadata {
        (**self).metadata()
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<Identity, Amount>,
    total_supply: Amount,
}

/// Thread-safe in-memory ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    metadata: TokenMetadata,
}

impl InMemoryLedger {
    /// Creates an empty ledger with default metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty ledger with the given metadata.
    #[must_use]
    pub fn with_metadata(metadata: TokenMetadata) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            metadata,
        }
    }

    /// Sum of all balances.
    #[must_use]
    pub fn total_supply(&self) -> Amount {
        self.state.read().total_supply
    }

    /// Number of accounts that have ever held a balance.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.state.read().balances.len()
    }
}

impl LedgerAdapter for InMemoryLedger {
    fn balance_of(&self, identity: &Identity) -> Amount {
        self.state.read().balances.get(identity).copied().unwrap_or(0)
    }

    fn mint(&self, identity: &Identity, amount: Amount) -> EconomyResult<()> {
        let mut state = self.state.write();
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(EconomyError::Overflow)?;
        // Any single balance is bounded by the supply, so this cannot overflow
        // once the supply check passed.
        let balance = state.balances.entry(*identity).or_insert(0);
        *balance += amount;
        state.total_supply = supply;
        Ok(())
    }

    fn burn(&self, identity: &Identity, amount: Amount) -> EconomyResult<()> {
        let mut state = self.state.write();
        let available = state.balances.get(identity).copied().unwrap_or(0);
        if amount > available {
            return Err(EconomyError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        state.balances.insert(*identity, available - amount);
        state.total_supply -= amount;
        Ok(())
    }

    fn metadata(&self) -> TokenMetadata {
        self.metadata.clone()
    }
}
