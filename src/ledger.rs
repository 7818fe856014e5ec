//! Versioned key-value ledger the record store is built on
//!
//! Every write appends a new version under its key. The latest version is kept in the
//! `state` tree and every version, including the latest, in the `history` tree keyed by
//! `len(key) ++ key ++ version`, so a prefix scan yields a key's history oldest first.
use super::error::StoreError;
use super::record::TimeStamp;
use super::utils;
use chrono::Utc;
use minicbor::bytes::ByteVec;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Transactional, Tree};
use std::path::Path;
use tracing::debug;

/// A single committed version of a key.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct LedgerEntry {
    #[n(0)]
    pub version: u64,
    #[n(1)]
    pub tx_id: String,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub value: ByteVec,
}

impl LedgerEntry {
    fn to_cbor(&self) -> Result<Vec<u8>, StoreError> {
        minicbor::to_vec(self).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn from_cbor(bytes: &[u8]) -> Result<Self, StoreError> {
        minicbor::decode(bytes).map_err(|e| StoreError::Codec(e.to_string()))
    }
}

pub type RangeIter<'a> = Box<dyn Iterator<Item = Result<(String, Vec<u8>), StoreError>> + 'a>;
pub type HistoryIter<'a> = Box<dyn Iterator<Item = Result<LedgerEntry, StoreError>> + 'a>;

/// Primitives of the host ledger.
pub trait Ledger {
    /// Latest version under `key`, if it was ever written.
    fn get_state(&self, key: &str) -> Result<Option<LedgerEntry>, StoreError>;

    /// Appends `value` as a new version of `key`.
    ///
    /// The write only succeeds while the latest version of `key` is `expected`, where
    /// `None` demands that the key was never written. Otherwise `StoreError::Conflict`.
    fn put_state(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<LedgerEntry, StoreError>;

    /// Latest values of all keys in `[start, end)` in key order.
    fn get_state_by_range(&self, start: &str, end: &str) -> Result<RangeIter<'_>, StoreError>;

    /// All versions of `key`, oldest first.
    fn get_history_for_key(&self, key: &str) -> Result<HistoryIter<'_>, StoreError>;
}

pub struct SledLedger {
    db: sled::Db,
    state: Tree,
    history: Tree,
}

impl SledLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// A ledger in a temporary directory, removed when dropped.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let state = db.open_tree("state")?;
        let history = db.open_tree("history")?;
        Ok(Self { db, state, history })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

fn history_prefix(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4 + key.len() + 8);
    prefix.extend_from_slice(&(key.len() as u32).to_be_bytes());
    prefix.extend_from_slice(key.as_bytes());
    prefix
}

fn history_key(key: &str, version: u64) -> Vec<u8> {
    let mut hkey = history_prefix(key);
    hkey.extend_from_slice(&version.to_be_bytes());
    hkey
}

impl Ledger for SledLedger {
    fn get_state(&self, key: &str) -> Result<Option<LedgerEntry>, StoreError> {
        match self.state.get(key.as_bytes())? {
            Some(raw) => Ok(Some(LedgerEntry::from_cbor(&raw)?)),
            None => Ok(None),
        }
    }

    fn put_state(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<LedgerEntry, StoreError> {
        let tx_id = utils::new_tx_id(key);
        let timestamp = TimeStamp::new();

        let result = (&self.state, &self.history).transaction(|(state, history)| {
            let found = match state.get(key.as_bytes())? {
                Some(raw) => Some(
                    LedgerEntry::from_cbor(&raw)
                        .map_err(ConflictableTransactionError::Abort)?
                        .version,
                ),
                None => None,
            };
            if found != expected {
                return Err(ConflictableTransactionError::Abort(StoreError::Conflict {
                    key: key.to_owned(),
                    expected,
                    found,
                }));
            }

            let entry = LedgerEntry {
                version: found.map_or(0, |v| v + 1),
                tx_id: tx_id.clone(),
                timestamp: timestamp.clone(),
                value: ByteVec::from(value.clone()),
            };
            let encoded = entry.to_cbor().map_err(ConflictableTransactionError::Abort)?;

            state.insert(key.as_bytes(), encoded.clone())?;
            history.insert(history_key(key, entry.version), encoded)?;
            Ok(entry)
        });

        match result {
            Ok(entry) => {
                debug!(key, version = entry.version, tx_id = %entry.tx_id, "committed entry");
                Ok(entry)
            }
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    fn get_state_by_range(&self, start: &str, end: &str) -> Result<RangeIter<'_>, StoreError> {
        if start >= end {
            return Ok(Box::new(std::iter::empty()));
        }

        let iter = self
            .state
            .range(start.as_bytes()..end.as_bytes())
            .map(|item| -> Result<(String, Vec<u8>), StoreError> {
                let (key, raw) = item?;
                let key = String::from_utf8(key.to_vec())
                    .map_err(|e| StoreError::Codec(e.to_string()))?;
                let entry = LedgerEntry::from_cbor(&raw)?;
                Ok((key, entry.value.to_vec()))
            });

        Ok(Box::new(iter))
    }

    fn get_history_for_key(&self, key: &str) -> Result<HistoryIter<'_>, StoreError> {
        let iter = self
            .history
            .scan_prefix(history_prefix(key))
            .map(|item| -> Result<LedgerEntry, StoreError> {
                let (_, raw) = item?;
                LedgerEntry::from_cbor(&raw)
            });

        Ok(Box::new(iter))
    }
}
