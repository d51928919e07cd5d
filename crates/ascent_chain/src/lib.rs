//! # ASCENT Chain Bridge
//!
//! Maps the progression engine onto the progression token contract: the
//! contract interface, the log format of its events, a listener for those
//! logs and a player mirror rebuilt from them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  LogEmitter  ┌─────────────────┐
//! │  Progression    │ ──────────▶  │  EventListener  │
//! │  Engine         │   (logs)     │  (EventCodec)   │
//! └─────────────────┘              └────────┬────────┘
//!                                           │
//!                                           ▼
//!                                  ┌─────────────────┐
//!                                  │ChainSyncedState │
//!                                  │  (mirror)       │
//!                                  └─────────────────┘
//! ```
//!
//! After a run, the mirror must agree with the engine's registry and the
//! ledger's balances.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod contracts;
pub mod error;
pub mod events;
pub mod listener;
pub mod state;

pub use contracts::{IProgressionToken, PlayerSnapshot};
pub use error::{ChainError, ChainResult};
pub use events::{ChainEvent, EventCodec, RawLog};
pub use listener::{EventListener, ListenerConfig, ListenerStats, LogEmitter};
pub use state::ChainSyncedState;
