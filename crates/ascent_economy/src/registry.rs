//! # Player Registry
//!
//! Keyed store of player progression state.
//!
//! Presence in the map *is* existence. No field value doubles as a
//! "not created" marker, so a level or timestamp of zero never changes the
//! answer of [`PlayerRegistry::exists`].
//!
//! Records are append-only: created once, mutated in place, never removed by
//! any public operation.

use std::collections::HashMap;

use crate::error::{EconomyError, EconomyResult};
use crate::journal::JournalEntry;
use crate::types::{Identity, Level, Timestamp, STARTING_LEVEL};

/// Progression state of a single player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Player {
    /// Current level (starts at 1).
    pub level: Level,
    /// Time of the last successful claim, or creation time.
    pub last_claim_time: Timestamp,
}

impl Player {
    /// A freshly created player at the starting level.
    #[inline]
    #[must_use]
    pub const fn new(created_at: Timestamp) -> Self {
        Self {
            level: STARTING_LEVEL,
            last_claim_time: created_at,
        }
    }
}

/// Map from identity to player record.
#[derive(Clone, Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<Identity, Player>,
}

impl PlayerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry with room for `capacity` players.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            players: HashMap::with_capacity(capacity),
        }
    }

    /// Returns true if a record exists for `identity`.
    #[inline]
    #[must_use]
    pub fn exists(&self, identity: &Identity) -> bool {
        self.players.contains_key(identity)
    }

    /// Returns a copy of the record for `identity`.
    #[inline]
    pub fn get(&self, identity: &Identity) -> EconomyResult<Player> {
        self.players
            .get(identity)
            .copied()
            .ok_or(EconomyError::PlayerNotFound(*identity))
    }

    /// Inserts a new record.
    ///
    /// Fails with `PlayerAlreadyExists` if `identity` already has one; the
    /// existing record is left untouched.
    pub fn create(
        &mut self,
        identity: Identity,
        initial_level: Level,
        initial_timestamp: Timestamp,
    ) -> EconomyResult<()> {
        if self.exists(&identity) {
            return Err(EconomyError::PlayerAlreadyExists(identity));
        }
        self.players.insert(
            identity,
            Player {
                level: initial_level,
                last_claim_time: initial_timestamp,
            },
        );
        Ok(())
    }

    /// Overwrites the level of an existing record.
    pub fn set_level(&mut self, identity: &Identity, new_level: Level) -> EconomyResult<()> {
        self.record_mut(identity)?.level = new_level;
        Ok(())
    }

    /// Overwrites the last-claim time of an existing record.
    pub fn set_last_claim_time(&mut self, identity: &Identity, time: Timestamp) -> EconomyResult<()> {
        self.record_mut(identity)?.last_claim_time = time;
        Ok(())
    }

    /// Drops a record whose creation never committed.
    ///
    /// Only the engine's rollback path calls this.
    pub(crate) fn discard_uncommitted(&mut self, identity: &Identity) {
        self.players.remove(identity);
    }

    /// Number of players.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// True if no player has been created.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Iterates over all records in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Player)> {
        self.players.iter()
    }

    /// Re-applies a committed journal entry during recovery.
    ///
    /// Entries must arrive in commit order: a claim or level-up for an
    /// identity that was never created means the journal is inconsistent.
    pub fn apply_journal_entry(&mut self, entry: &JournalEntry) -> EconomyResult<()> {
        let inconsistent = |what: &str, identity: &Identity| {
            EconomyError::Journal(format!("{what} for unknown player {identity}"))
        };
        match *entry {
            JournalEntry::PlayerCreated { identity, timestamp } => {
                self.create(identity, STARTING_LEVEL, timestamp)
            }
            JournalEntry::TokensClaimed { identity, timestamp, .. } => self
                .set_last_claim_time(&identity, timestamp)
                .map_err(|_| inconsistent("claim", &identity)),
            JournalEntry::LevelUpgraded { identity, new_level, .. } => self
                .set_level(&identity, new_level)
                .map_err(|_| inconsistent("level up", &identity)),
        }
    }

    fn record_mut(&mut self, identity: &Identity) -> EconomyResult<&mut Player> {
        self.players
            .get_mut(identity)
            .ok_or(EconomyError::PlayerNotFound(*identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> Identity {
        Identity::repeat_byte(byte)
    }

    #[test]
    fn test_create_and_get() {
        let mut registry = PlayerRegistry::new();
        assert!(!registry.exists(&id(1)));

        registry.create(id(1), 1, 1_000).unwrap();

        assert!(registry.exists(&id(1)));
        assert_eq!(registry.get(&id(1)).unwrap(), Player::new(1_000));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_twice_keeps_original() {
        let mut registry = PlayerRegistry::new();
        registry.create(id(1), 1, 1_000).unwrap();
        registry.set_level(&id(1), 4).unwrap();

        let err = registry.create(id(1), 1, 9_999).unwrap_err();

        assert_eq!(err, EconomyError::PlayerAlreadyExists(id(1)));
        let player = registry.get(&id(1)).unwrap();
        assert_eq!(player.level, 4);
        assert_eq!(player.last_claim_time, 1_000);
    }

    #[test]
    fn test_missing_player() {
        let mut registry = PlayerRegistry::new();
        assert_eq!(registry.get(&id(9)), Err(EconomyError::PlayerNotFound(id(9))));
        assert!(registry.set_level(&id(9), 2).is_err());
        assert!(registry.set_last_claim_time(&id(9), 5).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_zero_fields_do_not_hide_existence() {
        let mut registry = PlayerRegistry::new();
        registry.create(id(2), 0, 0).unwrap();
        assert!(registry.exists(&id(2)));
    }

    #[test]
    fn test_replay_journal() {
        let mut registry = PlayerRegistry::new();
        let entries = [
            JournalEntry::PlayerCreated { identity: id(1), timestamp: 10 },
            JournalEntry::TokensClaimed { identity: id(1), amount: 5, timestamp: 3_610 },
            JournalEntry::LevelUpgraded { identity: id(1), new_level: 2, cost: 100, reward: 25 },
        ];
        for entry in &entries {
            registry.apply_journal_entry(entry).unwrap();
        }

        let player = registry.get(&id(1)).unwrap();
        assert_eq!(player.level, 2);
        assert_eq!(player.last_claim_time, 3_610);
    }

    #[test]
    fn test_replay_rejects_orphan_entries() {
        let mut registry = PlayerRegistry::new();
        let orphan = JournalEntry::LevelUpgraded { identity: id(3), new_level: 2, cost: 100, reward: 25 };
        assert!(matches!(
            registry.apply_journal_entry(&orphan),
            Err(EconomyError::Journal(_))
        ));
    }
}
