//! ==============================================================================
//! history.rs - append-only reading log on top of the key/value store
//! ==============================================================================
//!
//! layout:
//!     "count" -> u16, highest sequence written (absent on a fresh store)
//!     "t{n}"  -> "{timestamp} {value:.2}" for every n in 1..=count
//!
//! the store has no range queries, so the log is an arena addressed by a
//! persisted cursor. sequences only grow; they restart at 1 after a wipe.
//!
//! recovery policy:
//!     any failed write or commit wipes the whole store and resets the cursor.
//!     an append therefore either lands completely or leaves an empty log,
//!     never a cursor pointing at a missing record.
//!
//! ==============================================================================

use crate::store::{KvStore, StorageError};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

pub const COUNT_KEY: &str = "count";

/// storage key of the record with the given sequence number
pub fn record_key(sequence: u16) -> String {
    format!("t{}", sequence)
}

/// sequences a window of `n` slots reads, newest first
pub fn window_sequences(count: u16, n: usize) -> impl Iterator<Item = u16> {
    let take = usize::from(count).min(n);
    (0..take).map(move |i| count - i as u16)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub sequence: u16,
    pub timestamp: String,
    pub value: f64,
}

impl HistoryRecord {
    /// the string stored under the record's key
    pub fn encode(timestamp: &str, value: f64) -> String {
        format!("{} {:.2}", timestamp.trim_end(), value)
    }

    pub fn decode(sequence: u16, raw: &str) -> Option<Self> {
        let (timestamp, value) = raw.trim_end().rsplit_once(' ')?;
        let value = value.parse::<f64>().ok()?;
        Some(Self { sequence, timestamp: timestamp.trim_end().to_string(), value })
    }
}

impl fmt::Display for HistoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.timestamp, self.value)
    }
}

pub struct HistoryLog {
    store: Box<dyn KvStore>,
}

impl HistoryLog {
    pub fn new(store: Box<dyn KvStore>) -> Self {
        Self { store }
    }

    /// append one reading. on failure the log has already been wiped when
    /// this returns and the error says which step failed.
    pub fn append(&mut self, timestamp: &str, value: f64) -> Result<u16, StorageError> {
        let count = match self.store.get_u16(COUNT_KEY) {
            Ok(count) if count < u16::MAX => count,
            Ok(_) => {
                warn!("[HISTORY] Sequence space exhausted -> clearing store");
                self.clear();
                0
            }
            Err(e) => {
                if e.is_not_found() {
                    debug!("[HISTORY] No cursor yet, starting a fresh log");
                } else {
                    warn!("[HISTORY] Reading cursor failed: {} -> clearing store", e);
                }
                self.clear();
                0
            }
        };

        let sequence = count + 1;
        let record = HistoryRecord::encode(timestamp, value);

        let written = self
            .store
            .set_str(&record_key(sequence), &record)
            .and_then(|_| self.store.set_u16(COUNT_KEY, sequence))
            .and_then(|_| self.store.commit());

        match written {
            Ok(()) => {
                debug!("[HISTORY] Stored #{}: {}", sequence, record);
                Ok(sequence)
            }
            Err(e) => {
                warn!("[HISTORY] Writing record #{} failed: {} -> clearing store", sequence, e);
                self.clear();
                Err(e)
            }
        }
    }

    /// the `n` most recent records, newest first. always `n` slots long,
    /// slots without a readable record are None.
    pub fn last(&mut self, n: usize) -> Vec<Option<HistoryRecord>> {
        let mut slots = vec![None; n];

        let count = match self.store.get_u16(COUNT_KEY) {
            Ok(count) => count,
            Err(e) if e.is_not_found() => return slots,
            Err(e) => {
                warn!("[HISTORY] Reading cursor failed: {} -> clearing store", e);
                self.clear();
                return slots;
            }
        };

        for (slot, sequence) in slots.iter_mut().zip(window_sequences(count, n)) {
            match self.store.get_str(&record_key(sequence)) {
                Ok(raw) => {
                    *slot = HistoryRecord::decode(sequence, &raw);
                    if slot.is_none() {
                        warn!("[HISTORY] Record #{} is unreadable: {:?}", sequence, raw);
                    }
                }
                Err(e) => warn!("[HISTORY] Record #{} missing: {}", sequence, e),
            }
        }

        slots
    }

    /// committed cursor, 0 when the log is empty or unreadable
    pub fn count(&self) -> u16 {
        self.store.get_u16(COUNT_KEY).unwrap_or(0)
    }

    /// erase every key in the store. failures are logged, there is nothing
    /// further to fall back to.
    pub fn clear(&mut self) {
        let result = self.store.erase_all().and_then(|_| self.store.commit());
        if let Err(e) = result {
            warn!("[HISTORY] Clearing store failed: {}", e);
        }
    }
}
