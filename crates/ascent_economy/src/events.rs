//! # Progression Events
//!
//! One event per successful mutating call, emitted after the call has
//! committed and while the player's lock is still held, so the per-player
//! order of events matches the order of state changes.
//!
//! Every event carries the timestamp of the call that produced it.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::types::{Amount, Identity, Level, Timestamp};

/// Domain event emitted by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressionEvent {
    /// A player record was created and seeded with the initial tokens.
    PlayerCreated {
        /// The new player.
        identity: Identity,
        /// Creation time.
        timestamp: Timestamp,
    },
    /// A player claimed accrued tokens.
    TokensClaimed {
        /// The claiming player.
        identity: Identity,
        /// Tokens minted.
        amount: Amount,
        /// Claim time.
        timestamp: Timestamp,
    },
    /// A player reached a new level.
    LevelUpgraded {
        /// The player.
        identity: Identity,
        /// Level after the upgrade.
        new_level: Level,
        /// Upgrade time.
        timestamp: Timestamp,
    },
}

impl ProgressionEvent {
    /// Player the event belongs to.
    #[inline]
    #[must_use]
    pub const fn identity(&self) -> Identity {
        match *self {
            Self::PlayerCreated { identity, .. }
            | Self::TokensClaimed { identity, .. }
            | Self::LevelUpgraded { identity, .. } => identity,
        }
    }

    /// Time the event was emitted.
    #[inline]
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        match *self {
            Self::PlayerCreated { timestamp, .. }
            | Self::TokensClaimed { timestamp, .. }
            | Self::LevelUpgraded { timestamp, .. } => timestamp,
        }
    }
}

/// Receiver of engine events.
///
/// Sinks run under the emitting player's lock and must not block.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: &ProgressionEvent);
}

/// Unbounded in-memory buffer, drained by the host.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Mutex<Vec<ProgressionEvent>>,
}

impl EventBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every buffered event, oldest first.
    pub fn drain(&self) -> Vec<ProgressionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for EventBuffer {
    fn emit(&self, event: &ProgressionEvent) {
        self.events.lock().push(*event);
    }
}

/// Forwards events into a bounded channel.
///
/// A full channel drops the event rather than stall the engine; the drop is
/// counted and logged.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<ProgressionEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink and its receiving end.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<ProgressionEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Events discarded because the channel was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &ProgressionEvent) {
        if let Err(err) = self.sender.try_send(*event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match err {
                TrySendError::Full(_) => "full",
                TrySendError::Disconnected(_) => "disconnected",
            };
            tracing::warn!(
                "event channel {}, dropped {:?} for {}",
                reason,
                event,
                event.identity()
            );
        }
    }
}
