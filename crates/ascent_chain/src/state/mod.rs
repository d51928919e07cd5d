//! # Chain-Synced State
//!
//! Player progression rebuilt purely from chain events.
//!
//! The mirror applies the same formulas and initial grant as the engine, so
//! after consuming every event of a run it must agree with the engine's
//! registry and the ledger's balances. Any event that contradicts what the
//! mirror already knows is reported as [`ChainError::OutOfSync`] and leaves
//! the mirror untouched.

use std::collections::HashMap;

use ascent_economy::{formulas, Amount, EconomyError, Identity, ProgressionEvent, INITIAL_TOKENS};

use super::contracts::PlayerSnapshot;
use super::error::{ChainError, ChainResult};
use super::events::ChainEvent;

/// Player progression synchronized with the blockchain.
///
/// O(1) lookups by identity. Processing an event for a known player never
/// allocates.
pub struct ChainSyncedState {
    /// Snapshots indexed by identity.
    players: HashMap<Identity, PlayerSnapshot>,
    /// Tokens every new player starts with.
    initial_grant: Amount,
    /// Last processed block number.
    last_block: u64,
    /// Total state updates processed.
    updates_processed: u64,
}

impl ChainSyncedState {
    /// Creates an empty mirror.
    ///
    /// # Arguments
    ///
    /// * `initial_grant` - Tokens minted on player creation
    /// * `player_capacity` - Expected number of players
    #[must_use]
    pub fn new(initial_grant: Amount, player_capacity: usize) -> Self {
        Self {
            players: HashMap::with_capacity(player_capacity),
            initial_grant,
            last_block: 0,
            updates_processed: 0,
        }
    }

    /// Returns the last processed block number.
    #[inline]
    #[must_use]
    pub const fn last_block(&self) -> u64 {
        self.last_block
    }

    /// Returns the total number of state updates processed.
    #[inline]
    #[must_use]
    pub const fn updates_processed(&self) -> u64 {
        self.updates_processed
    }

    /// Returns the number of mirrored players.
    #[inline]
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Gets a player's snapshot.
    #[inline]
    #[must_use]
    pub fn get_player(&self, identity: &Identity) -> Option<&PlayerSnapshot> {
        self.players.get(identity)
    }

    /// Iterates over every snapshot in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &PlayerSnapshot)> {
        self.players.iter()
    }

    /// Sum of every expected balance.
    pub fn expected_supply(&self) -> ChainResult<Amount> {
        self.players
            .values()
            .try_fold(0 as Amount, |sum, p| sum.checked_add(p.expected_balance))
            .ok_or(ChainError::Economy(EconomyError::Overflow))
    }

    /// Processes a chain event and updates state.
    pub fn process_event(&mut self, event: &ChainEvent) -> ChainResult<()> {
        match *event {
            ChainEvent::Progression {
                event,
                block_number,
            } => {
                if let Err(err) = self.apply(&event) {
                    tracing::warn!("block {}: {}", block_number, err);
                    return Err(err);
                }
                self.last_block = self.last_block.max(block_number);
            }
            ChainEvent::NewBlock(block_number) => {
                self.last_block = self.last_block.max(block_number);
            }
        }
        self.updates_processed += 1;
        Ok(())
    }

    /// Processes events in order, stopping at the first one that fails.
    pub fn process_batch<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a ChainEvent>,
    ) -> ChainResult<()> {
        for event in events {
            self.process_event(event)?;
        }
        Ok(())
    }

    /// Clears all state (for testing/reset).
    pub fn clear(&mut self) {
        self.players.clear();
        self.last_block = 0;
        self.updates_processed = 0;
    }

    fn apply(&mut self, event: &ProgressionEvent) -> ChainResult<()> {
        let identity = event.identity();
        let out_of_sync = |reason: String| ChainError::OutOfSync { identity, reason };

        match *event {
            ProgressionEvent::PlayerCreated { timestamp, .. } => {
                if self.players.contains_key(&identity) {
                    return Err(out_of_sync("created twice".to_string()));
                }
                self.players
                    .insert(identity, PlayerSnapshot::created(timestamp, self.initial_grant));
            }
            ProgressionEvent::TokensClaimed {
                amount, timestamp, ..
            } => {
                let player = self
                    .players
                    .get_mut(&identity)
                    .ok_or_else(|| out_of_sync("claim before creation".to_string()))?;
                let total_claimed = player
                    .total_claimed
                    .checked_add(amount)
                    .ok_or(EconomyError::Overflow)?;
                let balance = player
                    .expected_balance
                    .checked_add(amount)
                    .ok_or(EconomyError::Overflow)?;
                player.last_claim_time = timestamp;
                player.total_claimed = total_claimed;
                player.expected_balance = balance;
            }
            ProgressionEvent::LevelUpgraded { new_level, .. } => {
                let player = self
                    .players
                    .get_mut(&identity)
                    .ok_or_else(|| out_of_sync("level up before creation".to_string()))?;
                if player.level.checked_add(1) != Some(new_level) {
                    return Err(out_of_sync(format!(
                        "level {} followed by level {}",
                        player.level, new_level
                    )));
                }
                let cost = formulas::level_cost(new_level)?;
                let reward = formulas::level_reward(new_level)?;
                let balance = player
                    .expected_balance
                    .checked_sub(cost)
                    .ok_or_else(|| {
                        out_of_sync(format!(
                            "level {} costs {} but only {} expected",
                            new_level, cost, player.expected_balance
                        ))
                    })?
                    .checked_add(reward)
                    .ok_or(EconomyError::Overflow)?;
                player.level = new_level;
                player.expected_balance = balance;
            }
        }
        Ok(())
    }
}

impl Default for ChainSyncedState {
    fn default() -> Self {
        Self::new(Amount::from(INITIAL_TOKENS), 1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::repeat_byte(0xA1)
    }

    fn at(block_number: u64, event: ProgressionEvent) -> ChainEvent {
        ChainEvent::Progression {
            event,
            block_number,
        }
    }

    #[test]
    fn test_state_creation() {
        let state = ChainSyncedState::default();
        assert_eq!(state.player_count(), 0);
        assert_eq!(state.last_block(), 0);
        assert_eq!(state.expected_supply(), Ok(0));
    }

    #[test]
    fn test_journey_is_mirrored() {
        let mut state = ChainSyncedState::default();
        let events = [
            at(10, ProgressionEvent::PlayerCreated { identity: alice(), timestamp: 0 }),
            at(11, ProgressionEvent::TokensClaimed { identity: alice(), amount: 5, timestamp: 3_600 }),
            at(12, ProgressionEvent::LevelUpgraded { identity: alice(), new_level: 2, timestamp: 3_600 }),
        ];

        state.process_batch(&events).unwrap();

        let snapshot = state.get_player(&alice()).unwrap();
        assert_eq!(snapshot.level, 2);
        assert_eq!(snapshot.last_claim_time, 3_600);
        assert_eq!(snapshot.created_at, 0);
        assert_eq!(snapshot.total_claimed, 5);
        assert_eq!(snapshot.expected_balance, 105);
        assert_eq!(state.last_block(), 12);
        assert_eq!(state.updates_processed(), 3);
    }

    #[test]
    fn test_skipped_level_is_out_of_sync() {
        let mut state = ChainSyncedState::default();
        state
            .process_event(&at(1, ProgressionEvent::PlayerCreated { identity: alice(), timestamp: 0 }))
            .unwrap();

        let err = state
            .process_event(&at(2, ProgressionEvent::LevelUpgraded { identity: alice(), new_level: 3, timestamp: 5 }))
            .unwrap_err();

        assert!(matches!(err, ChainError::OutOfSync { .. }));
        assert_eq!(state.get_player(&alice()).unwrap().level, 1);
        assert_eq!(state.last_block(), 1);
        assert_eq!(state.updates_processed(), 1);
    }

    #[test]
    fn test_orphan_and_duplicate_events() {
        let mut state = ChainSyncedState::default();
        let claim = at(1, ProgressionEvent::TokensClaimed { identity: alice(), amount: 5, timestamp: 1 });
        assert!(matches!(state.process_event(&claim), Err(ChainError::OutOfSync { .. })));

        let create = at(2, ProgressionEvent::PlayerCreated { identity: alice(), timestamp: 0 });
        state.process_event(&create).unwrap();
        assert!(matches!(state.process_event(&create), Err(ChainError::OutOfSync { .. })));
    }

    #[test]
    fn test_unaffordable_level_is_out_of_sync() {
        let mut state = ChainSyncedState::new(10, 4);
        state
            .process_event(&at(1, ProgressionEvent::PlayerCreated { identity: alice(), timestamp: 0 }))
            .unwrap();
        let err = state
            .process_event(&at(2, ProgressionEvent::LevelUpgraded { identity: alice(), new_level: 2, timestamp: 0 }))
            .unwrap_err();
        assert!(matches!(err, ChainError::OutOfSync { .. }));
        assert_eq!(state.get_player(&alice()).unwrap().expected_balance, 10);
    }

    #[test]
    fn test_new_block_advances_only() {
        let mut state = ChainSyncedState::default();
        state.process_event(&ChainEvent::NewBlock(50)).unwrap();
        state.process_event(&ChainEvent::NewBlock(40)).unwrap();
        assert_eq!(state.last_block(), 50);

        state.clear();
        assert_eq!(state.last_block(), 0);
    }
}
