//! # Chain Events
//!
//! Encoding of engine events as contract logs and decoding of logs back into
//! engine events.
//!
//! ## ABI Layout
//!
//! ```text
//! topic0  keccak256(event signature)
//! topic1  player address, left-padded to 32 bytes
//! data    one 32-byte big-endian word per non-indexed field
//! ```
//!
//! Decoding reads the words straight out of the byte slices. A word whose
//! value does not fit the engine's integer width (u64 levels and timestamps,
//! u128 amounts) makes the whole log undecodable.

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolEvent;
use ascent_economy::{Amount, Identity, ProgressionEvent};

use super::contracts::IProgressionToken;
use super::error::{ChainError, ChainResult};

/// ABI word size.
const WORD: usize = 32;

/// Everything the bridge cares about from the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    /// A progression event mined in `block_number`.
    Progression {
        /// Decoded engine event.
        event: ProgressionEvent,
        /// Block where it occurred.
        block_number: u64,
    },
    /// A new block was mined (for sync purposes).
    NewBlock(u64),
}

impl ChainEvent {
    /// Block the event belongs to.
    #[inline]
    #[must_use]
    pub const fn block_number(&self) -> u64 {
        match *self {
            Self::Progression { block_number, .. } | Self::NewBlock(block_number) => block_number,
        }
    }
}

/// A contract log as it appears on chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLog {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics, signature hash first.
    pub topics: Vec<[u8; 32]>,
    /// ABI-encoded non-indexed fields.
    pub data: Vec<u8>,
}

/// Encoder and decoder for the progression token's logs.
pub struct EventCodec;

impl EventCodec {
    /// Encodes an engine event as the log `contract` would emit for it.
    #[must_use]
    pub fn encode(event: &ProgressionEvent, contract: Address) -> RawLog {
        let (signature, words): (B256, Vec<u128>) = match *event {
            ProgressionEvent::PlayerCreated { timestamp, .. } => (
                IProgressionToken::PlayerCreated::SIGNATURE_HASH,
                vec![u128::from(timestamp)],
            ),
            ProgressionEvent::TokensClaimed {
                amount, timestamp, ..
            } => (
                IProgressionToken::TokensClaimed::SIGNATURE_HASH,
                vec![amount, u128::from(timestamp)],
            ),
            ProgressionEvent::LevelUpgraded {
                new_level,
                timestamp,
                ..
            } => (
                IProgressionToken::LevelUpgraded::SIGNATURE_HASH,
                vec![u128::from(new_level), u128::from(timestamp)],
            ),
        };

        let mut data = Vec::with_capacity(words.len() * WORD);
        for word in words {
            data.extend_from_slice(&[0u8; WORD - 16]);
            data.extend_from_slice(&word.to_be_bytes());
        }

        RawLog {
            address: contract,
            topics: vec![signature.0, address_topic(&event.identity())],
            data,
        }
    }

    /// Decodes a log into an engine event.
    ///
    /// # Returns
    ///
    /// Parsed event or None if the log is not a well-formed progression event.
    #[must_use]
    pub fn decode(topics: &[[u8; 32]], data: &[u8], block_number: u64) -> Option<ChainEvent> {
        // Signature + player, nothing else is indexed.
        let [signature, player] = topics else {
            return None;
        };
        let identity = topic_address(player)?;

        let event = if *signature == IProgressionToken::PlayerCreated::SIGNATURE_HASH.0 {
            let [timestamp] = words::<1>(data)?;
            ProgressionEvent::PlayerCreated {
                identity,
                timestamp: word_u64(timestamp)?,
            }
        } else if *signature == IProgressionToken::TokensClaimed::SIGNATURE_HASH.0 {
            let [amount, timestamp] = words::<2>(data)?;
            ProgressionEvent::TokensClaimed {
                identity,
                amount: word_u128(amount)?,
                timestamp: word_u64(timestamp)?,
            }
        } else if *signature == IProgressionToken::LevelUpgraded::SIGNATURE_HASH.0 {
            let [new_level, timestamp] = words::<2>(data)?;
            ProgressionEvent::LevelUpgraded {
                identity,
                new_level: word_u64(new_level)?,
                timestamp: word_u64(timestamp)?,
            }
        } else {
            return None;
        };

        Some(ChainEvent::Progression {
            event,
            block_number,
        })
    }

    /// Decodes a [`RawLog`], reporting why it was rejected.
    pub fn decode_log(log: &RawLog, block_number: u64) -> ChainResult<ChainEvent> {
        let signature = log.topics.first().ok_or(ChainError::Anonymous)?;
        Self::decode(&log.topics, &log.data, block_number)
            .ok_or_else(|| ChainError::Undecodable(B256::from(*signature)))
    }
}

fn address_topic(identity: &Identity) -> [u8; 32] {
    let mut topic = [0u8; 32];
    topic[12..].copy_from_slice(identity.as_slice());
    topic
}

fn topic_address(topic: &[u8; 32]) -> Option<Identity> {
    if topic[..12].iter().any(|&b| b != 0) {
        return None;
    }
    Some(Address::from_slice(&topic[12..]))
}

/// Splits `data` into exactly `N` words.
fn words<const N: usize>(data: &[u8]) -> Option<[&[u8]; N]> {
    if data.len() != N * WORD {
        return None;
    }
    let mut out = [&data[..0]; N];
    for (slot, chunk) in out.iter_mut().zip(data.chunks_exact(WORD)) {
        *slot = chunk;
    }
    Some(out)
}

fn word_u128(word: &[u8]) -> Option<Amount> {
    let (high, low) = word.split_at(WORD - 16);
    if high.iter().any(|&b| b != 0) {
        return None;
    }
    Some(u128::from_be_bytes(low.try_into().ok()?))
}

fn word_u64(word: &[u8]) -> Option<u64> {
    u64::try_from(word_u128(word)?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::repeat_byte(0xA1)
    }

    fn claimed() -> ProgressionEvent {
        ProgressionEvent::TokensClaimed {
            identity: alice(),
            amount: 52,
            timestamp: 1_700_003_600,
        }
    }

    #[test]
    fn test_encode_layout() {
        let contract = Address::repeat_byte(0xCC);
        let log = EventCodec::encode(&claimed(), contract);

        assert_eq!(log.address, contract);
        assert_eq!(log.topics.len(), 2);
        assert_eq!(
            log.topics[0],
            IProgressionToken::TokensClaimed::SIGNATURE_HASH.0
        );
        assert_eq!(&log.topics[1][..12], &[0u8; 12]);
        assert_eq!(&log.topics[1][12..], alice().as_slice());
        assert_eq!(log.data.len(), 64);
        assert_eq!(log.data[31], 52);
        assert_eq!(&log.data[56..64], &1_700_003_600u64.to_be_bytes());
    }

    #[test]
    fn test_decode_encoded_events() {
        let events = [
            ProgressionEvent::PlayerCreated {
                identity: alice(),
                timestamp: 7,
            },
            claimed(),
            ProgressionEvent::LevelUpgraded {
                identity: alice(),
                new_level: 3,
                timestamp: 9,
            },
        ];
        for event in events {
            let log = EventCodec::encode(&event, Address::ZERO);
            let decoded = EventCodec::decode(&log.topics, &log.data, 12_345).unwrap();
            assert_eq!(
                decoded,
                ChainEvent::Progression {
                    event,
                    block_number: 12_345
                }
            );
            assert_eq!(decoded.block_number(), 12_345);
        }
    }

    #[test]
    fn test_decode_rejects_oversized_words() {
        let mut log = EventCodec::encode(
            &ProgressionEvent::LevelUpgraded {
                identity: alice(),
                new_level: 2,
                timestamp: 9,
            },
            Address::ZERO,
        );
        // Level word now needs more than 64 bits.
        log.data[23] = 1;
        assert!(EventCodec::decode(&log.topics, &log.data, 1).is_none());

        let mut log = EventCodec::encode(&claimed(), Address::ZERO);
        // Amount word now needs more than 128 bits.
        log.data[0] = 1;
        assert!(EventCodec::decode(&log.topics, &log.data, 1).is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_logs() {
        let log = EventCodec::encode(&claimed(), Address::ZERO);

        // Truncated data.
        assert!(EventCodec::decode(&log.topics, &log.data[..32], 1).is_none());
        // Missing player topic.
        assert!(EventCodec::decode(&log.topics[..1], &log.data, 1).is_none());
        // Dirty address padding.
        let mut topics = log.topics.clone();
        topics[1][0] = 0xFF;
        assert!(EventCodec::decode(&topics, &log.data, 1).is_none());
        // Unknown signature.
        let mut topics = log.topics.clone();
        topics[0] = [0u8; 32];
        assert!(EventCodec::decode(&topics, &log.data, 1).is_none());
    }

    #[test]
    fn test_decode_log_reports_reason() {
        let mut log = EventCodec::encode(&claimed(), Address::ZERO);
        log.topics[0] = [0xEE; 32];
        assert_eq!(
            EventCodec::decode_log(&log, 1),
            Err(ChainError::Undecodable(B256::repeat_byte(0xEE)))
        );

        log.topics.clear();
        assert_eq!(EventCodec::decode_log(&log, 1), Err(ChainError::Anonymous));
    }
}
