//! # Event Listener
//!
//! Receives raw contract logs, decodes them and hands the results to the
//! game side over a bounded channel.
//!
//! [`LogEmitter`] closes the loop in-process: plugged into the engine as an
//! [`EventSink`], it encodes each engine event as the log the token contract
//! would emit and feeds it straight into a listener.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use alloy_primitives::Address;
use ascent_economy::{EventSink, ProgressionEvent};

use super::error::{ChainError, ChainResult};
use super::events::{ChainEvent, EventCodec, RawLog};

/// Configuration for the event listener.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Contract address to watch.
    pub contract_address: Address,
    /// Channel buffer size for events.
    pub channel_buffer: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            contract_address: Address::ZERO,
            channel_buffer: 1024,
        }
    }
}

/// Statistics for the event listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Logs handed to the listener.
    pub logs_received: AtomicU64,
    /// Logs rejected (foreign contract or undecodable).
    pub logs_rejected: AtomicU64,
    /// Decoded events dropped because the channel was full.
    pub events_dropped: AtomicU64,
    /// Events the consumer reported as processed.
    pub events_processed: AtomicU64,
    /// Average latency in microseconds.
    pub avg_latency_us: AtomicU64,
    /// Maximum latency in microseconds.
    pub max_latency_us: AtomicU64,
}

/// Blockchain event listener.
///
/// ```text
/// ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
/// │   Raw logs   │ ──▶ │   Listener   │ ──▶ │   Channel    │ ──▶ Mirror
/// │              │     │   (Codec)    │     │   (Bounded)  │
/// └──────────────┘     └──────────────┘     └──────────────┘
/// ```
pub struct EventListener {
    /// Sender side of event channel.
    sender: Sender<(ChainEvent, Instant)>,
    /// Receiver side of event channel.
    receiver: Receiver<(ChainEvent, Instant)>,
    /// Whether the listener accepts logs.
    running: AtomicBool,
    /// Performance statistics.
    stats: Arc<ListenerStats>,
    /// Configuration.
    config: ListenerConfig,
}

impl EventListener {
    /// Creates a new event listener. It starts out running.
    #[must_use]
    pub fn new(config: ListenerConfig) -> Self {
        let (sender, receiver) = bounded(config.channel_buffer);

        Self {
            sender,
            receiver,
            running: AtomicBool::new(true),
            stats: Arc::new(ListenerStats::default()),
            config,
        }
    }

    /// Returns a clone of the event receiver.
    #[must_use]
    pub fn receiver(&self) -> Receiver<(ChainEvent, Instant)> {
        self.receiver.clone()
    }

    /// Returns a reference to the statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Checks if the listener is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stops the listener. Logs arriving afterwards are ignored.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Injects an already-decoded event (for testing/benchmarking).
    pub fn inject_event(&self, event: ChainEvent) -> ChainResult<()> {
        self.send(event, Instant::now())
    }

    /// Decodes a raw log and sends the result to the channel.
    ///
    /// Logs from other contracts and logs that are not progression events
    /// are counted and rejected.
    pub fn process_raw_log(&self, log: &RawLog, block_number: u64) -> ChainResult<()> {
        let timestamp = Instant::now();
        if !self.is_running() {
            return Err(ChainError::Disconnected);
        }
        self.stats.logs_received.fetch_add(1, Ordering::Relaxed);

        if log.address != self.config.contract_address {
            self.stats.logs_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(ChainError::ForeignContract(log.address));
        }

        match EventCodec::decode_log(log, block_number) {
            Ok(event) => self.send(event, timestamp),
            Err(err) => {
                self.stats.logs_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("rejected log in block {}: {}", block_number, err);
                Err(err)
            }
        }
    }

    /// Takes every queued event without blocking.
    pub fn drain(&self) -> Vec<ChainEvent> {
        self.receiver
            .try_iter()
            .map(|(event, received_at)| {
                self.record_latency(received_at);
                event
            })
            .collect()
    }

    /// Records latency statistics.
    ///
    /// Call this after processing an event with its original timestamp.
    pub fn record_latency(&self, event_timestamp: Instant) {
        let latency_us = u64::try_from(event_timestamp.elapsed().as_micros()).unwrap_or(u64::MAX);

        let count = self.stats.events_processed.fetch_add(1, Ordering::Relaxed) + 1;

        self.stats
            .max_latency_us
            .fetch_max(latency_us, Ordering::Relaxed);

        // Weighted moving average favoring recent values
        let current_avg = self.stats.avg_latency_us.load(Ordering::Relaxed);
        let new_avg = if count == 1 {
            latency_us
        } else {
            current_avg.saturating_mul(7).saturating_add(latency_us) / 8
        };
        self.stats.avg_latency_us.store(new_avg, Ordering::Relaxed);
    }

    fn send(&self, event: ChainEvent, timestamp: Instant) -> ChainResult<()> {
        self.sender
            .try_send((event, timestamp))
            .map_err(|err| match err {
                TrySendError::Full(_) => {
                    self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                    ChainError::ChannelFull
                }
                TrySendError::Disconnected(_) => ChainError::Disconnected,
            })
    }
}

/// Engine sink that publishes every event as a contract log.
///
/// Each event lands in its own block, numbered from `first_block`.
pub struct LogEmitter {
    listener: Arc<EventListener>,
    next_block: AtomicU64,
    failed: AtomicU64,
}

impl LogEmitter {
    /// Creates an emitter feeding `listener`.
    #[must_use]
    pub fn new(listener: Arc<EventListener>, first_block: u64) -> Self {
        Self {
            listener,
            next_block: AtomicU64::new(first_block),
            failed: AtomicU64::new(0),
        }
    }

    /// Block number the next event will be assigned.
    #[must_use]
    pub fn next_block(&self) -> u64 {
        self.next_block.load(Ordering::Relaxed)
    }

    /// Events the listener refused.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl EventSink for LogEmitter {
    fn emit(&self, event: &ProgressionEvent) {
        let log = EventCodec::encode(event, self.listener.config().contract_address);
        let block = self.next_block.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.listener.process_raw_log(&log, block) {
            self.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("log for {} not delivered: {}", event.identity(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascent_economy::Identity;

    fn created(byte: u8) -> ProgressionEvent {
        ProgressionEvent::PlayerCreated {
            identity: Identity::repeat_byte(byte),
            timestamp: 1_000,
        }
    }

    #[test]
    fn test_listener_creation() {
        let listener = EventListener::new(ListenerConfig::default());
        assert!(listener.is_running());
        listener.stop();
        assert!(!listener.is_running());
    }

    #[test]
    fn test_event_injection() {
        let listener = EventListener::new(ListenerConfig::default());
        let receiver = listener.receiver();

        listener.inject_event(ChainEvent::NewBlock(7)).unwrap();

        let (received, _timestamp) = receiver.try_recv().unwrap();
        assert_eq!(received, ChainEvent::NewBlock(7));
    }

    #[test]
    fn test_foreign_contract_rejected() {
        let config = ListenerConfig {
            contract_address: Address::repeat_byte(0xCC),
            ..ListenerConfig::default()
        };
        let listener = EventListener::new(config);
        let log = EventCodec::encode(&created(1), Address::repeat_byte(0xDD));

        assert_eq!(
            listener.process_raw_log(&log, 1),
            Err(ChainError::ForeignContract(Address::repeat_byte(0xDD)))
        );
        assert_eq!(listener.stats().logs_rejected.load(Ordering::Relaxed), 1);
        assert!(listener.drain().is_empty());
    }

    #[test]
    fn test_full_channel_counts_drop() {
        let listener = EventListener::new(ListenerConfig {
            channel_buffer: 1,
            ..ListenerConfig::default()
        });
        let log = EventCodec::encode(&created(1), Address::ZERO);

        assert!(listener.process_raw_log(&log, 1).is_ok());
        assert_eq!(listener.process_raw_log(&log, 2), Err(ChainError::ChannelFull));
        assert_eq!(listener.stats().events_dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_emitter_numbers_blocks() {
        let listener = Arc::new(EventListener::new(ListenerConfig::default()));
        let emitter = LogEmitter::new(Arc::clone(&listener), 100);

        emitter.emit(&created(1));
        emitter.emit(&created(2));

        let events = listener.drain();
        assert_eq!(
            events,
            vec![
                ChainEvent::Progression { event: created(1), block_number: 100 },
                ChainEvent::Progression { event: created(2), block_number: 101 },
            ]
        );
        assert_eq!(emitter.next_block(), 102);
        assert_eq!(emitter.failed(), 0);
        assert_eq!(listener.stats().events_processed.load(Ordering::Relaxed), 2);
    }
}
