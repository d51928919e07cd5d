//! # ASCENT Economy System
//!
//! Progression economy for ASCENT: players join, claim tokens on a timer and
//! spend tokens to climb levels that pay out more per hour.
//!
//! ## Design Principles
//!
//! 1. **Integer-only economics** - quadratic costs and rewards, checked everywhere
//! 2. **State before ledger** - internal state commits before any external call
//! 3. **All-or-nothing calls** - a failed mint or burn unwinds the whole call
//! 4. **External configuration** - constants load from TOML
//!
//! ## Thread Safety
//!
//! [`ProgressionEngine`] is shared behind an `Arc`. Calls for one player are
//! serialized by a per-player reentrant lock; different players never contend.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ascent_economy::{EconomyConfig, InMemoryLedger, ProgressionEngine, SystemClock};
//!
//! let engine = ProgressionEngine::new(
//!     InMemoryLedger::new(),
//!     SystemClock,
//!     EconomyConfig::load("config/economy.toml")?,
//! )?;
//!
//! engine.create_player(player)?;
//! // ...an hour later
//! let paid = engine.claim_tokens(player)?;
//! if engine.afford_level_up(&player)? {
//!     engine.level_up(player)?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod formulas;
pub mod journal;
pub mod ledger;
pub mod registry;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EconomyConfig, TokenMetadata};
pub use engine::{EngineStatsSnapshot, ProgressionEngine};
pub use error::{EconomyError, EconomyResult};
pub use events::{ChannelSink, EventBuffer, EventSink, ProgressionEvent};
pub use formulas::{claim_reward, hourly_rate, level_cost, level_reward};
pub use journal::{Journal, JournalEntry};
pub use ledger::{InMemoryLedger, LedgerAdapter};
pub use registry::{Player, PlayerRegistry};
pub use types::{Amount, Identity, Level, Timestamp, INITIAL_TOKENS, MIN_CLAIM_INTERVAL, STARTING_LEVEL};
