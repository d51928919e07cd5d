//! # Progression Engine
//!
//! **Every token that enters or leaves a player's hands goes through here.**
//!
//! ## The Claim Path
//!
//! ```text
//! claim_tokens(player)
//!   1. Lock player (reentrant, held to the end)
//!   2. Check: player exists, interval elapsed
//!   3. Commit last_claim_time = now          <- internal state first
//!   4. Compute reward
//!   5. Mint via ledger                       <- external call second
//!   6. Journal, commit, emit TokensClaimed
//! ```
//!
//! Level-ups follow the same shape: level first, then burn, then mint.
//!
//! ## Atomicity
//!
//! Each mutating call builds a [`Transaction`] that records an undo step for
//! every effect it applies. If any later step fails the guard is dropped
//! uncommitted and replays the undo steps in reverse, so the call leaves no
//! observable change behind.
//!
//! ## Thread Safety
//!
//! `ProgressionEngine` is `Send + Sync`. Calls for the same player are
//! serialized by that player's lock; calls for different players run in
//! parallel. The registry lock is only ever held for a single read or write,
//! never across a ledger call, so a ledger that re-enters the engine sees the
//! committed state.
//!
//! The player lock is reentrant, so a re-entering call does not deadlock. It
//! runs the ordinary preconditions first and, if they pass, is refused with
//! `CallInProgress` before it changes anything: at most one mutating call per
//! player is in flight, which keeps the journal and the event stream in
//! commit order.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::config::EconomyConfig;
use crate::error::{EconomyError, EconomyResult};
use crate::events::{EventBuffer, EventSink, ProgressionEvent};
use crate::formulas;
use crate::journal::{Journal, JournalEntry};
use crate::ledger::LedgerAdapter;
use crate::registry::{Player, PlayerRegistry};
use crate::types::{Amount, Identity, Level, Timestamp};

/// Live counters.
#[derive(Debug, Default)]
struct EngineStats {
    players_created: AtomicU64,
    claims: AtomicU64,
    level_ups: AtomicU64,
    rejected: AtomicU64,
    rollbacks: AtomicU64,
}

/// Point-in-time copy of the engine counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    /// Successful `create_player` calls.
    pub players_created: u64,
    /// Successful `claim_tokens` calls.
    pub claims: u64,
    /// Successful `level_up` calls.
    pub level_ups: u64,
    /// Mutating calls that returned an error.
    pub rejected: u64,
    /// Calls that applied at least one step before failing and were unwound.
    pub rollbacks: u64,
}

/// One applied effect and how to take it back.
#[derive(Clone, Copy, Debug)]
enum Undo {
    /// A record was inserted.
    DiscardPlayer,
    /// The level was overwritten; holds the previous level.
    Level(Level),
    /// The last-claim time was overwritten; holds the previous time.
    LastClaim(Timestamp),
    /// Tokens were minted.
    Minted(Amount),
    /// Tokens were burned.
    Burned(Amount),
}

/// Compensating transaction for one player.
///
/// Rolls back on drop unless [`Transaction::commit`] was called.
struct Transaction<'e, L: LedgerAdapter> {
    identity: Identity,
    registry: &'e RwLock<PlayerRegistry>,
    ledger: &'e L,
    rollbacks: &'e AtomicU64,
    undo: Vec<Undo>,
    committed: bool,
}

impl<'e, L: LedgerAdapter> Transaction<'e, L> {
    fn insert_player(&mut self, player: Player) -> EconomyResult<()> {
        self.registry
            .write()
            .create(self.identity, player.level, player.last_claim_time)?;
        self.undo.push(Undo::DiscardPlayer);
        Ok(())
    }

    fn set_level(&mut self, level: Level) -> EconomyResult<()> {
        let mut registry = self.registry.write();
        let previous = registry.get(&self.identity)?.level;
        registry.set_level(&self.identity, level)?;
        self.undo.push(Undo::Level(previous));
        Ok(())
    }

    fn set_last_claim_time(&mut self, time: Timestamp) -> EconomyResult<()> {
        let mut registry = self.registry.write();
        let previous = registry.get(&self.identity)?.last_claim_time;
        registry.set_last_claim_time(&self.identity, time)?;
        self.undo.push(Undo::LastClaim(previous));
        Ok(())
    }

    fn mint(&mut self, amount: Amount) -> EconomyResult<()> {
        self.ledger.mint(&self.identity, amount)?;
        self.undo.push(Undo::Minted(amount));
        Ok(())
    }

    fn burn(&mut self, amount: Amount) -> EconomyResult<()> {
        self.ledger.burn(&self.identity, amount)?;
        self.undo.push(Undo::Burned(amount));
        Ok(())
    }

    fn commit(mut self) {
        self.committed = true;
    }

    fn unwind(&mut self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            "rolling back {} step(s) for {}",
            self.undo.len(),
            self.identity
        );

        while let Some(step) = self.undo.pop() {
            let outcome = match step {
                Undo::DiscardPlayer => {
                    self.registry.write().discard_uncommitted(&self.identity);
                    Ok(())
                }
                Undo::Level(previous) => self.registry.write().set_level(&self.identity, previous),
                Undo::LastClaim(previous) => self
                    .registry
                    .write()
                    .set_last_claim_time(&self.identity, previous),
                Undo::Minted(amount) => self.ledger.burn(&self.identity, amount),
                Undo::Burned(amount) => self.ledger.mint(&self.identity, amount),
            };
            if let Err(err) = outcome {
                tracing::error!(
                    "compensation {:?} failed for {}: {}",
                    step,
                    self.identity,
                    err
                );
            }
        }
    }
}

impl<L: LedgerAdapter> Drop for Transaction<'_, L> {
    fn drop(&mut self) {
        if !self.committed && !self.undo.is_empty() {
            self.unwind();
        }
    }
}

/// Per-player lock. The flag is set while a mutating call is past its
/// preconditions.
type PlayerLock = ReentrantMutex<Cell<bool>>;

/// Marks a player's mutating call as in flight until dropped.
struct InFlight<'g> {
    flag: &'g Cell<bool>,
}

impl<'g> InFlight<'g> {
    fn enter(flag: &'g Cell<bool>, identity: Identity) -> EconomyResult<Self> {
        if flag.replace(true) {
            return Err(EconomyError::CallInProgress(identity));
        }
        Ok(Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// The progression state machine.
///
/// Generic over the ledger and the clock so hosts can plug in their own and
/// tests can drive time by hand.
pub struct ProgressionEngine<L: LedgerAdapter, C: Clock = SystemClock> {
    /// Runtime constants.
    config: EconomyConfig,
    /// External token ledger.
    ledger: L,
    /// Time source.
    clock: C,
    /// Player records.
    registry: RwLock<PlayerRegistry>,
    /// One reentrant lock per player, created on first use.
    player_locks: Mutex<HashMap<Identity, Arc<PlayerLock>>>,
    /// Commit log, when configured.
    journal: Option<Journal>,
    /// Built-in event buffer, drained by the host.
    events: EventBuffer,
    /// Additional subscribers.
    sinks: Vec<Arc<dyn EventSink>>,
    /// Counters.
    stats: EngineStats,
}

impl<L: LedgerAdapter, C: Clock> ProgressionEngine<L, C> {
    /// Builds an engine.
    ///
    /// When `config.journal_path` is set the journal is opened and replayed,
    /// so the registry comes back exactly as it was at the last commit.
    pub fn new(ledger: L, clock: C, config: EconomyConfig) -> EconomyResult<Self> {
        config.validate()?;

        let mut registry = PlayerRegistry::new();
        let journal = match &config.journal_path {
            Some(path) => {
                let (journal, entries) = Journal::open(path)?;
                for entry in &entries {
                    registry.apply_journal_entry(entry)?;
                }
                Some(journal)
            }
            None => None,
        };

        tracing::info!(
            "progression engine ready: {} players, claim interval {}s, {} initial tokens",
            registry.len(),
            config.min_claim_interval_secs,
            config.initial_tokens
        );

        Ok(Self {
            config,
            ledger,
            clock,
            registry: RwLock::new(registry),
            player_locks: Mutex::new(HashMap::new()),
            journal,
            events: EventBuffer::new(),
            sinks: Vec::new(),
            stats: EngineStats::default(),
        })
    }

    /// Attaches an extra event subscriber.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    // ========================================================================
    // Mutating surface
    // ========================================================================

    /// Creates a player at level 1 and mints the initial tokens.
    pub fn create_player(&self, identity: Identity) -> EconomyResult<()> {
        if self.player_exists(&identity) {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(EconomyError::PlayerAlreadyExists(identity));
        }
        let lock = self.player_lock(&identity);
        let result = {
            let in_flight = lock.lock();
            self.try_create_player(identity, &in_flight)
        };
        if result.is_err() {
            self.release_unused_lock(&identity, lock);
        }
        self.record_rejection(&result);
        result
    }

    /// Claims the tokens accrued since the last claim.
    ///
    /// Returns the amount minted.
    pub fn claim_tokens(&self, identity: Identity) -> EconomyResult<Amount> {
        self.ensure_exists(&identity)?;
        let lock = self.player_lock(&identity);
        let in_flight = lock.lock();
        let result = self.try_claim_tokens(identity, &in_flight);
        self.record_rejection(&result);
        result
    }

    /// Spends `level_cost(level + 1)` to advance one level and receives
    /// `level_reward(level + 1)` back.
    ///
    /// Returns the new level.
    pub fn level_up(&self, identity: Identity) -> EconomyResult<Level> {
        self.ensure_exists(&identity)?;
        let lock = self.player_lock(&identity);
        let in_flight = lock.lock();
        let result = self.try_level_up(identity, &in_flight);
        self.record_rejection(&result);
        result
    }

    fn try_create_player(&self, identity: Identity, in_flight: &Cell<bool>) -> EconomyResult<()> {
        if self.registry.read().exists(&identity) {
            return Err(EconomyError::PlayerAlreadyExists(identity));
        }
        let now = self.clock.now();

        let _in_flight = InFlight::enter(in_flight, identity)?;
        let mut txn = self.begin(identity);
        txn.insert_player(Player::new(now))?;
        txn.mint(self.config.initial_grant())?;
        self.journal_append(&JournalEntry::PlayerCreated {
            identity,
            timestamp: now,
        })?;
        txn.commit();

        self.stats.players_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("player {} created at {}", identity, now);
        self.emit(ProgressionEvent::PlayerCreated {
            identity,
            timestamp: now,
        });
        Ok(())
    }

    fn try_claim_tokens(&self, identity: Identity, in_flight: &Cell<bool>) -> EconomyResult<Amount> {
        let player = self.registry.read().get(&identity)?;
        let now = self.clock.now();
        let interval = self.config.min_claim_interval_secs;

        // A clock that moved backwards reads as zero elapsed.
        let elapsed = now.saturating_sub(player.last_claim_time);
        if elapsed < interval {
            return Err(EconomyError::ClaimTooEarly {
                elapsed,
                required: interval,
            });
        }

        let _in_flight = InFlight::enter(in_flight, identity)?;
        let mut txn = self.begin(identity);
        txn.set_last_claim_time(now)?;
        let reward = formulas::claim_reward(elapsed, player.level, interval)?;
        txn.mint(reward)?;
        self.journal_append(&JournalEntry::TokensClaimed {
            identity,
            amount: reward,
            timestamp: now,
        })?;
        txn.commit();

        self.stats.claims.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "player {} claimed {} after {}s at level {}",
            identity,
            reward,
            elapsed,
            player.level
        );
        self.emit(ProgressionEvent::TokensClaimed {
            identity,
            amount: reward,
            timestamp: now,
        });
        Ok(reward)
    }

    fn try_level_up(&self, identity: Identity, in_flight: &Cell<bool>) -> EconomyResult<Level> {
        let player = self.registry.read().get(&identity)?;
        let new_level = player.level.checked_add(1).ok_or(EconomyError::Overflow)?;
        let cost = formulas::level_cost(new_level)?;
        let reward = formulas::level_reward(new_level)?;

        let available = self.ledger.balance_of(&identity);
        if available < cost {
            return Err(EconomyError::CantAffordLevelUp {
                required: cost,
                available,
            });
        }
        let now = self.clock.now();

        let _in_flight = InFlight::enter(in_flight, identity)?;
        let mut txn = self.begin(identity);
        txn.set_level(new_level)?;
        txn.burn(cost)?;
        txn.mint(reward)?;
        self.journal_append(&JournalEntry::LevelUpgraded {
            identity,
            new_level,
            cost,
            reward,
        })?;
        txn.commit();

        self.stats.level_ups.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "player {} reached level {} (cost {}, reward {})",
            identity,
            new_level,
            cost,
            reward
        );
        self.emit(ProgressionEvent::LevelUpgraded {
            identity,
            new_level,
            timestamp: now,
        });
        Ok(new_level)
    }

    // ========================================================================
    // Query surface
    // ========================================================================

    /// Tokens required to reach `level`.
    pub fn get_level_cost(&self, level: Level) -> EconomyResult<Amount> {
        formulas::level_cost(level)
    }

    /// Tokens granted upon reaching `level`.
    pub fn get_level_reward(&self, level: Level) -> EconomyResult<Amount> {
        formulas::level_reward(level)
    }

    /// Tokens per full hour at the player's current level.
    pub fn get_token_reward_per_hour(&self, identity: &Identity) -> EconomyResult<Amount> {
        formulas::hourly_rate(self.get_player(identity)?.level)
    }

    /// The player's current level.
    pub fn get_player_level(&self, identity: &Identity) -> EconomyResult<Level> {
        Ok(self.get_player(identity)?.level)
    }

    /// True if the balance covers the next level's cost.
    pub fn afford_level_up(&self, identity: &Identity) -> EconomyResult<bool> {
        let player = self.get_player(identity)?;
        let next = player.level.checked_add(1).ok_or(EconomyError::Overflow)?;
        Ok(self.ledger.balance_of(identity) >= formulas::level_cost(next)?)
    }

    /// Copy of the player's record.
    pub fn get_player(&self, identity: &Identity) -> EconomyResult<Player> {
        self.registry.read().get(identity)
    }

    /// True if `identity` has a player record.
    #[must_use]
    pub fn player_exists(&self, identity: &Identity) -> bool {
        self.registry.read().exists(identity)
    }

    /// Number of players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Copy of every player record.
    #[must_use]
    pub fn players(&self) -> Vec<(Identity, Player)> {
        self.registry
            .read()
            .iter()
            .map(|(identity, player)| (*identity, *player))
            .collect()
    }

    /// Ledger balance of `identity`.
    #[must_use]
    pub fn balance_of(&self, identity: &Identity) -> Amount {
        self.ledger.balance_of(identity)
    }

    /// What a claim would pay right now (0 before the interval has elapsed).
    pub fn claimable_tokens(&self, identity: &Identity) -> EconomyResult<Amount> {
        let player = self.get_player(identity)?;
        let interval = self.config.min_claim_interval_secs;
        let elapsed = self.clock.now().saturating_sub(player.last_claim_time);
        if elapsed < interval {
            return Ok(0);
        }
        formulas::claim_reward(elapsed, player.level, interval)
    }

    /// Seconds until the next claim is allowed (0 if allowed now).
    pub fn seconds_until_claim(&self, identity: &Identity) -> EconomyResult<u64> {
        let player = self.get_player(identity)?;
        let elapsed = self.clock.now().saturating_sub(player.last_claim_time);
        Ok(self.config.min_claim_interval_secs.saturating_sub(elapsed))
    }

    // ========================================================================
    // Host plumbing
    // ========================================================================

    /// Takes every buffered event, oldest first.
    pub fn drain_events(&self) -> Vec<ProgressionEvent> {
        self.events.drain()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            players_created: self.stats.players_created.load(Ordering::Relaxed),
            claims: self.stats.claims.load(Ordering::Relaxed),
            level_ups: self.stats.level_ups.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            rollbacks: self.stats.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// The ledger the engine mints and burns against.
    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The engine's time source.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The commit journal, if one is configured.
    #[must_use]
    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_exists(&self, identity: &Identity) -> EconomyResult<()> {
        // Records are never removed, so a miss here is final for this call
        // and there is no need to allocate a lock for it.
        if self.player_exists(identity) {
            Ok(())
        } else {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            Err(EconomyError::PlayerNotFound(*identity))
        }
    }

    fn player_lock(&self, identity: &Identity) -> Arc<PlayerLock> {
        let mut locks = self.player_locks.lock();
        Arc::clone(
            locks
                .entry(*identity)
                .or_insert_with(|| Arc::new(ReentrantMutex::new(Cell::new(false)))),
        )
    }

    /// Drops the lock of an identity whose creation failed, unless another
    /// call still holds a handle to it.
    fn release_unused_lock(&self, identity: &Identity, lock: Arc<PlayerLock>) {
        let mut locks = self.player_locks.lock();
        // One handle in the table, one here. New handles are only handed out
        // under the table mutex, so the count cannot grow while we hold it.
        if Arc::strong_count(&lock) == 2 && !self.player_exists(identity) {
            locks.remove(identity);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.player_locks.lock().len()
    }

    fn begin(&self, identity: Identity) -> Transaction<'_, L> {
        Transaction {
            identity,
            registry: &self.registry,
            ledger: &self.ledger,
            rollbacks: &self.stats.rollbacks,
            undo: Vec::with_capacity(3),
            committed: false,
        }
    }

    fn journal_append(&self, entry: &JournalEntry) -> EconomyResult<()> {
        if let Some(journal) = &self.journal {
            journal.append(entry)?;
        }
        Ok(())
    }

    fn emit(&self, event: ProgressionEvent) {
        self.events.emit(&event);
        for sink in &self.sinks {
            sink.emit(&event);
        }
    }

    fn record_rejection<T>(&self, result: &EconomyResult<T>) {
        if result.is_err() {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }
}
