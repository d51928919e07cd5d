//! # Progression Journal
//!
//! **Crash-safe commit log for the player registry.**
//!
//! Every successful mutating call appends one entry before it commits. On
//! restart the journal is replayed to rebuild the registry. The ledger keeps
//! its own durability; the journal only covers what the engine owns.
//!
//! ## Guarantees
//!
//! 1. **Durability**: once `append()` returns, the entry is on disk
//! 2. **Atomicity**: a call whose append failed is rolled back by the engine
//! 3. **Recovery**: a torn or corrupt tail is cut off; everything before it replays
//! 4. **No stale records**: a failed append is cut back to the last committed
//!    record before the error is returned. If that cut fails too, the journal
//!    refuses every later append
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "AJNL"]
//! [4 bytes: version]
//!
//! Entry format:
//! [8 bytes: LSN (Log Sequence Number)]
//! [1 byte: entry tag]
//! [4 bytes: payload length]
//! [N bytes: payload]
//! [4 bytes: CRC32 of above]
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{EconomyError, EconomyResult};
use crate::types::{Amount, Identity, Level, Timestamp};

/// Magic bytes identifying a journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"AJNL";

/// Current journal format version.
const JOURNAL_VERSION: u32 = 1;

/// Header size in bytes.
const HEADER_LEN: u64 = 8;

/// LSN + tag + payload length.
const RECORD_PREFIX_LEN: usize = 8 + 1 + 4;

/// Largest payload any entry produces; anything bigger is garbage.
const MAX_PAYLOAD_LEN: usize = 64;

const TAG_PLAYER_CREATED: u8 = 1;
const TAG_TOKENS_CLAIMED: u8 = 2;
const TAG_LEVEL_UPGRADED: u8 = 3;

/// A committed progression operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalEntry {
    /// `create_player` committed.
    PlayerCreated {
        /// The new player.
        identity: Identity,
        /// Creation time (initial last-claim time).
        timestamp: Timestamp,
    },
    /// `claim_tokens` committed.
    TokensClaimed {
        /// The claiming player.
        identity: Identity,
        /// Tokens minted.
        amount: Amount,
        /// New last-claim time.
        timestamp: Timestamp,
    },
    /// `level_up` committed.
    LevelUpgraded {
        /// The player.
        identity: Identity,
        /// Level after the upgrade.
        new_level: Level,
        /// Tokens burned.
        cost: Amount,
        /// Tokens minted back.
        reward: Amount,
    },
}

impl JournalEntry {
    fn tag(&self) -> u8 {
        match self {
            Self::PlayerCreated { .. } => TAG_PLAYER_CREATED,
            Self::TokensClaimed { .. } => TAG_TOKENS_CLAIMED,
            Self::LevelUpgraded { .. } => TAG_LEVEL_UPGRADED,
        }
    }

    /// Serializes the payload (little-endian, fixed width).
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_PAYLOAD_LEN);
        match self {
            Self::PlayerCreated { identity, timestamp } => {
                buf.extend_from_slice(identity.as_slice());
                buf.extend_from_slice(&timestamp.to_le_bytes());
            }
            Self::TokensClaimed { identity, amount, timestamp } => {
                buf.extend_from_slice(identity.as_slice());
                buf.extend_from_slice(&amount.to_le_bytes());
                buf.extend_from_slice(&timestamp.to_le_bytes());
            }
            Self::LevelUpgraded { identity, new_level, cost, reward } => {
                buf.extend_from_slice(identity.as_slice());
                buf.extend_from_slice(&new_level.to_le_bytes());
                buf.extend_from_slice(&cost.to_le_bytes());
                buf.extend_from_slice(&reward.to_le_bytes());
            }
        }
        buf
    }

    /// Deserializes a payload. `None` on unknown tag or short payload.
    fn deserialize(tag: u8, payload: &[u8]) -> Option<Self> {
        let mut cursor = Cursor(payload);
        let entry = match tag {
            TAG_PLAYER_CREATED => Self::PlayerCreated {
                identity: cursor.identity()?,
                timestamp: cursor.u64()?,
            },
            TAG_TOKENS_CLAIMED => Self::TokensClaimed {
                identity: cursor.identity()?,
                amount: cursor.u128()?,
                timestamp: cursor.u64()?,
            },
            TAG_LEVEL_UPGRADED => Self::LevelUpgraded {
                identity: cursor.identity()?,
                new_level: cursor.u64()?,
                cost: cursor.u128()?,
                reward: cursor.u128()?,
            },
            _ => return None,
        };
        cursor.0.is_empty().then_some(entry)
    }
}

/// Forward-only reader over a payload.
struct Cursor<'a>(&'a [u8]);

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.0.len() < n {
            return None;
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Some(head)
    }

    fn identity(&mut self) -> Option<Identity> {
        self.take(20).map(Identity::from_slice)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8)?.try_into().ok().map(u64::from_le_bytes)
    }

    fn u128(&mut self) -> Option<u128> {
        self.take(16)?.try_into().ok().map(u128::from_le_bytes)
    }
}

fn io_error(context: &'static str) -> impl Fn(std::io::Error) -> EconomyError {
    move |e| EconomyError::Journal(format!("{context}: {e}"))
}

/// Write side of the journal file.
struct JournalFile {
    file: File,
    /// Length of the file up to the last committed record.
    committed_len: u64,
    /// Set when a failed append could not be cut back.
    poisoned: bool,
}

impl JournalFile {
    /// Drops whatever a failed append left past the last committed record.
    fn cut_back(&mut self) -> std::io::Result<()> {
        self.file.set_len(self.committed_len)?;
        self.file.seek(SeekFrom::Start(self.committed_len))?;
        self.file.sync_data()
    }
}

/// Append-only commit log.
pub struct Journal {
    /// Path to the journal file.
    path: PathBuf,
    /// LSN the next append will use.
    next_lsn: AtomicU64,
    /// File handle (protected by mutex for writes).
    file: Mutex<JournalFile>,
    /// Makes the next append write half its record and then fail.
    #[cfg(test)]
    fail_next_append: std::sync::atomic::AtomicBool,
}

impl Journal {
    /// Opens or creates a journal, returning it with every committed entry.
    ///
    /// A torn or corrupt tail is truncated so later appends start on a
    /// record boundary.
    pub fn open(path: impl AsRef<Path>) -> EconomyResult<(Self, Vec<JournalEntry>)> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_error("failed to open journal"))?;

        let file_len = file
            .metadata()
            .map_err(io_error("failed to read journal metadata"))?
            .len();

        let (entries, next_lsn, valid_len) = if file_len == 0 {
            file.write_all(JOURNAL_MAGIC)
                .and_then(|()| file.write_all(&JOURNAL_VERSION.to_le_bytes()))
                .and_then(|()| file.sync_all())
                .map_err(io_error("failed to write journal header"))?;
            (Vec::new(), 0, HEADER_LEN)
        } else {
            Self::recover(&file)?
        };

        if valid_len < file_len {
            tracing::warn!(
                "journal {}: discarding {} bytes of torn tail",
                path.display(),
                file_len - valid_len
            );
            file.set_len(valid_len)
                .map_err(io_error("failed to truncate journal"))?;
        }
        file.seek(SeekFrom::Start(valid_len))
            .map_err(io_error("failed to seek journal"))?;

        tracing::info!(
            "journal {}: recovered {} entries, next lsn {}",
            path.display(),
            entries.len(),
            next_lsn
        );

        Ok((
            Self {
                path,
                next_lsn: AtomicU64::new(next_lsn),
                file: Mutex::new(JournalFile {
                    file,
                    committed_len: valid_len,
                    poisoned: false,
                }),
                #[cfg(test)]
                fail_next_append: std::sync::atomic::AtomicBool::new(false),
            },
            entries,
        ))
    }

    /// Appends an entry and syncs it to disk. Returns its LSN.
    ///
    /// On failure nothing of the entry stays in the file and the LSN is not
    /// consumed.
    pub fn append(&self, entry: &JournalEntry) -> EconomyResult<u64> {
        let payload = entry.serialize();
        let payload_len =
            u32::try_from(payload.len()).map_err(|_| EconomyError::Overflow)?;

        let mut file = self.file.lock();
        if file.poisoned {
            return Err(EconomyError::Journal(format!(
                "journal {} is unusable after a failed append",
                self.path.display()
            )));
        }
        let lsn = self.next_lsn.load(Ordering::SeqCst);

        let mut record = Vec::with_capacity(RECORD_PREFIX_LEN + payload.len() + 4);
        record.extend_from_slice(&lsn.to_le_bytes());
        record.push(entry.tag());
        record.extend_from_slice(&payload_len.to_le_bytes());
        record.extend_from_slice(&payload);
        let crc = crc32fast::hash(&record);
        record.extend_from_slice(&crc.to_le_bytes());

        if let Err(e) = self.write_record(&mut file, &record) {
            if let Err(cut) = file.cut_back() {
                file.poisoned = true;
                tracing::error!(
                    "journal {}: cannot drop failed record at lsn {}: {}",
                    self.path.display(),
                    lsn,
                    cut
                );
            }
            return Err(io_error("journal append failed")(e));
        }

        file.committed_len += record.len() as u64;
        self.next_lsn.store(lsn + 1, Ordering::SeqCst);
        Ok(lsn)
    }

    fn write_record(&self, file: &mut JournalFile, record: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            file.file.write_all(&record[..record.len() / 2])?;
            return Err(std::io::Error::other("injected append failure"));
        }
        file.file.write_all(record)?;
        file.file.sync_data()
    }

    /// Makes the next append leave a partial record behind and fail.
    #[cfg(test)]
    pub(crate) fn fail_next_append(&self) {
        self.fail_next_append.store(true, Ordering::SeqCst);
    }

    /// LSN the next append will use (equals the number of entries).
    #[must_use]
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn.load(Ordering::SeqCst)
    }

    /// Location of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every intact entry. Returns `(entries, next_lsn, valid_len)`.
    fn recover(file: &File) -> EconomyResult<(Vec<JournalEntry>, u64, u64)> {
        let mut reader = BufReader::new(file);

        let mut header = [0u8; 8];
        reader
            .read_exact(&mut header)
            .map_err(io_error("failed to read journal header"))?;
        if &header[0..4] != JOURNAL_MAGIC {
            return Err(EconomyError::Journal("invalid journal magic".to_string()));
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != JOURNAL_VERSION {
            return Err(EconomyError::Journal(format!(
                "unsupported journal version: {version}"
            )));
        }

        let mut entries = Vec::new();
        let mut valid_len = HEADER_LEN;
        let mut next_lsn = 0;

        while let Some((lsn, entry, record_len)) = Self::read_record(&mut reader) {
            if lsn != next_lsn {
                tracing::warn!("journal lsn gap: expected {}, found {}", next_lsn, lsn);
                break;
            }
            entries.push(entry);
            valid_len += record_len;
            next_lsn += 1;
        }

        Ok((entries, next_lsn, valid_len))
    }

    /// Reads one record. `None` on end of file, torn write or CRC mismatch.
    fn read_record(reader: &mut impl Read) -> Option<(u64, JournalEntry, u64)> {
        let mut prefix = [0u8; RECORD_PREFIX_LEN];
        reader.read_exact(&mut prefix).ok()?;

        let lsn = u64::from_le_bytes(prefix[0..8].try_into().ok()?);
        let tag = prefix[8];
        let payload_len = u32::from_le_bytes(prefix[9..13].try_into().ok()?) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return None;
        }

        let mut body = vec![0u8; payload_len + 4];
        reader.read_exact(&mut body).ok()?;
        let (payload, crc_bytes) = body.split_at(payload_len);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&prefix);
        hasher.update(payload);
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().ok()?);
        if hasher.finalize() != stored_crc {
            return None;
        }

        let entry = JournalEntry::deserialize(tag, payload)?;
        let record_len = (RECORD_PREFIX_LEN + payload_len + 4) as u64;
        Some((lsn, entry, record_len))
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("next_lsn", &self.next_lsn())
            .finish_non_exhaustive()
    }
}
