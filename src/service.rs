//! Service layer API for e-document lifecycle operations
use super::config::ReferenceTables;
use super::error::{EdocError, StoreError, ValidationError};
use super::ledger::{HistoryIter, Ledger, LedgerEntry, RangeIter};
use super::record::{EDocument, HistoryEntry, KeyedRecord, Status, Submission};
use super::store::RecordStore;
use serde_json::value::RawValue;
use std::sync::Arc;
use tracing::{debug, info};

pub struct EDocService<L> {
    store: RecordStore<L>,
    tables: ReferenceTables,
}

impl<L: Ledger> EDocService<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self::with_tables(ledger, ReferenceTables::default())
    }

    pub fn with_tables(ledger: Arc<L>, tables: ReferenceTables) -> Self {
        Self {
            store: RecordStore::new(ledger),
            tables,
        }
    }

    pub fn store(&self) -> &RecordStore<L> {
        &self.store
    }

    pub fn tables(&self) -> &ReferenceTables {
        &self.tables
    }

    /// Register a new e-document, returning the transaction id of its first version
    pub fn create(&self, submission: Submission) -> Result<String, EdocError> {
        submission.validate(true)?;
        let key = self
            .store
            .compute_key(&submission.system_name, &submission.document_id)?;

        if self.store.exists(&key)? {
            return Err(EdocError::DuplicateKey {
                system_name: submission.system_name,
                document_id: submission.document_id,
            });
        }

        let record = EDocument::created(submission);
        let tx_id = self.store.write_version(&key, &record, None)?;

        info!(
            system_name = %record.system_name,
            document_id = %record.document_id,
            tx_id = %tx_id,
            "created e-document"
        );
        Ok(tx_id)
    }

    /// Move an existing e-document to `target`, which may not rank below its current status
    pub fn transition(&self, target: Status, submission: Submission) -> Result<String, EdocError> {
        if target == Status::Created {
            return Err(ValidationError::InitialStatus(target).into());
        }
        submission.validate(false)?;
        let key = self
            .store
            .compute_key(&submission.system_name, &submission.document_id)?;

        let Some(current) = self.store.read_latest(&key)? else {
            return Err(EdocError::NotFound {
                system_name: submission.system_name,
                document_id: submission.document_id,
            });
        };

        if !current.record.status.can_transition_to(target) {
            return Err(EdocError::InvalidTransition {
                from: current.record.status,
                to: target,
            });
        }

        let record = current.record.advance(target, submission);
        // fails if another invocation wrote this key after our read
        let tx_id = self
            .store
            .write_version(&key, &record, Some(current.version))?;

        info!(
            system_name = %record.system_name,
            document_id = %record.document_id,
            from = %current.record.status,
            to = %target,
            tx_id = %tx_id,
            "transitioned e-document"
        );
        Ok(tx_id)
    }

    pub fn modify(&self, submission: Submission) -> Result<String, EdocError> {
        self.transition(Status::Modified, submission)
    }

    pub fn archive(&self, submission: Submission) -> Result<String, EdocError> {
        self.transition(Status::Archived, submission)
    }

    pub fn delete(&self, submission: Submission) -> Result<String, EdocError> {
        self.transition(Status::Deleted, submission)
    }

    /// Latest version of an e-document
    pub fn query_record(
        &self,
        system_name: &str,
        document_id: &str,
    ) -> Result<EDocument, EdocError> {
        let key = self.store.compute_key(system_name, document_id)?;

        match self.store.read_latest(&key)? {
            Some(stored) => Ok(stored.record),
            None => Err(not_found(system_name, document_id)),
        }
    }

    /// Every version of an e-document, oldest first
    pub fn query_history(
        &self,
        system_name: &str,
        document_id: &str,
    ) -> Result<History<'_>, EdocError> {
        let key = self.store.compute_key(system_name, document_id)?;

        if !self.store.exists(&key)? {
            return Err(not_found(system_name, document_id));
        }

        let inner = self.store.ledger().get_history_for_key(&key)?;
        Ok(History { inner })
    }

    /// Latest values of all keys in `[prefix + start, prefix + end)`, in key order
    pub fn query_by_prefix(
        &self,
        prefix: &str,
        start: &str,
        end: &str,
    ) -> Result<KeyedRecords<'_>, EdocError> {
        let start_key = format!("{prefix}{start}");
        let end_key = format!("{prefix}{end}");
        debug!(start = %start_key, end = %end_key, "range query");

        let inner = self
            .store
            .ledger()
            .get_state_by_range(&start_key, &end_key)?;
        Ok(KeyedRecords { inner })
    }

    /// Write the reference tables to the ledger, skipping entries already stored unchanged
    ///
    /// Returns the number of entries written.
    pub fn init_ledger(&self) -> Result<usize, EdocError> {
        if !self.tables.persist_on_ledger {
            info!("reference tables are not persisted on the ledger");
            return Ok(0);
        }

        let ledger = self.store.ledger();
        let mut written = 0;
        for table in self.tables.tables() {
            for (index, entry) in table.entries.iter().enumerate() {
                let key = self.tables.entry_key(table, index);
                let value =
                    serde_json::to_vec(entry).map_err(|e| EdocError::StoreUnavailable(e.into()))?;

                let expected = match ledger.get_state(&key)? {
                    Some(current) if *current.value == value => continue,
                    Some(current) => Some(current.version),
                    None => None,
                };
                ledger.put_state(&key, value, expected)?;
                written += 1;
            }
        }

        info!(version = self.tables.version, written, "seeded reference tables");
        Ok(written)
    }

    /// Entries of a persisted reference table, `apis` or `op-codes`
    pub fn query_table(&self, name: &str) -> Result<Vec<KeyedRecord>, EdocError> {
        let table = self
            .tables
            .table(name)
            .ok_or_else(|| ValidationError::UnknownTable(name.to_owned()))?;
        let (start, end) = self.tables.suffix_bounds();

        let mut records = Vec::new();
        for item in self.query_by_prefix(&table.prefix, &start, &end)? {
            let record = item?;
            // the ledger never forgets entries seeded under an earlier layout
            if self.tables.entry_index(table, &record.key).is_some() {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn not_found(system_name: &str, document_id: &str) -> EdocError {
    EdocError::NotFound {
        system_name: system_name.to_owned(),
        document_id: document_id.to_owned(),
    }
}

fn raw_json(bytes: Vec<u8>) -> Result<Box<RawValue>, StoreError> {
    let text = String::from_utf8(bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(RawValue::from_string(text)?)
}

/// Lazy walk over the versions of one key. Not restartable, reissue the query instead.
pub struct History<'a> {
    inner: HistoryIter<'a>,
}

impl History<'_> {
    fn convert(entry: LedgerEntry) -> Result<HistoryEntry, EdocError> {
        Ok(HistoryEntry {
            tx_id: entry.tx_id,
            timestamp: entry.timestamp,
            record: raw_json(entry.value.to_vec())?,
        })
    }
}

impl Iterator for History<'_> {
    type Item = Result<HistoryEntry, EdocError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(item.map_err(EdocError::from).and_then(Self::convert))
    }
}

/// Lazy walk over a key range, see [`EDocService::query_by_prefix`].
pub struct KeyedRecords<'a> {
    inner: RangeIter<'a>,
}

impl Iterator for KeyedRecords<'_> {
    type Item = Result<KeyedRecord, EdocError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(item.map_err(EdocError::from).and_then(|(key, value)| {
            Ok(KeyedRecord {
                key,
                record: raw_json(value)?,
            })
        }))
    }
}
