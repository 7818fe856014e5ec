//! Record store adapter: composite keys and record reads/writes over a [`Ledger`]
use super::error::{EdocError, StoreError, ValidationError};
use super::ledger::Ledger;
use super::record::EDocument;
use std::sync::Arc;

/// Namespace every e-document key lives under.
pub const RECORD_NAMESPACE: &str = "EDOC";

const DELIMITER: char = '\0';

/// The latest version of a record together with the version token a conditional
/// write has to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub record: EDocument,
    pub version: u64,
}

pub struct RecordStore<L> {
    ledger: Arc<L>,
}

impl<L> Clone for RecordStore<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

/// `\0EDOC\0<system>\0<document>\0`. Components are NUL free, so distinct pairs never
/// share a key and no record key can fall inside a reference table range.
pub fn compute_key(system_name: &str, document_id: &str) -> Result<String, ValidationError> {
    for (field, value) in [("systemName", system_name), ("documentID", document_id)] {
        if value.is_empty() {
            return Err(ValidationError::EmptyField(field));
        }
        if value.contains(DELIMITER) {
            return Err(ValidationError::InvalidKeyComponent(field));
        }
    }

    let mut key =
        String::with_capacity(RECORD_NAMESPACE.len() + system_name.len() + document_id.len() + 4);
    key.push(DELIMITER);
    key.push_str(RECORD_NAMESPACE);
    key.push(DELIMITER);
    key.push_str(system_name);
    key.push(DELIMITER);
    key.push_str(document_id);
    key.push(DELIMITER);
    Ok(key)
}

impl<L: Ledger> RecordStore<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn compute_key(&self, system_name: &str, document_id: &str) -> Result<String, EdocError> {
        Ok(compute_key(system_name, document_id)?)
    }

    pub fn exists(&self, key: &str) -> Result<bool, EdocError> {
        Ok(self.ledger.get_state(key)?.is_some())
    }

    /// `None` when the key was never written.
    pub fn read_latest(&self, key: &str) -> Result<Option<StoredRecord>, EdocError> {
        let Some(entry) = self.ledger.get_state(key)? else {
            return Ok(None);
        };
        let record = EDocument::from_json(&entry.value)
            .map_err(|e| EdocError::StoreUnavailable(e.into()))?;

        Ok(Some(StoredRecord {
            record,
            version: entry.version,
        }))
    }

    /// Stores `record` as the next version of `key` and returns the transaction id.
    ///
    /// `expected` is the version the caller read, `None` for a record being created.
    pub fn write_version(
        &self,
        key: &str,
        record: &EDocument,
        expected: Option<u64>,
    ) -> Result<String, EdocError> {
        let value = record
            .to_json()
            .map_err(|e| EdocError::StoreUnavailable(e.into()))?;

        match self.ledger.put_state(key, value, expected) {
            Ok(entry) => Ok(entry.tx_id),
            // a create racing another create on the same key
            Err(StoreError::Conflict { expected: None, .. }) => Err(EdocError::DuplicateKey {
                system_name: record.system_name.clone(),
                document_id: record.document_id.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SledLedger;
    use crate::record::{Status, Submission};

    fn store() -> RecordStore<SledLedger> {
        RecordStore::new(Arc::new(SledLedger::temporary().unwrap()))
    }

    #[test]
    fn composite_keys_do_not_collide() {
        let a = compute_key("AB", "C").unwrap();
        let b = compute_key("A", "BC").unwrap();

        assert_ne!(a, b);
        assert_eq!(a, "\0EDOC\0AB\0C\0");
    }

    #[test]
    fn compute_key_rejects_bad_components() {
        assert_eq!(
            compute_key("", "C"),
            Err(ValidationError::EmptyField("systemName"))
        );
        assert_eq!(
            compute_key("A", "B\0C"),
            Err(ValidationError::InvalidKeyComponent("documentID"))
        );
    }

    #[test]
    fn write_then_read_latest() {
        let store = store();
        let key = store.compute_key("SAP", "INV-1").unwrap();
        let doc = EDocument::created(Submission::new("SAP", "INV-1", "alice", "t0", "h1"));

        assert!(!store.exists(&key).unwrap());
        assert!(store.read_latest(&key).unwrap().is_none());

        let tx_id = store.write_version(&key, &doc, None).unwrap();
        assert!(!tx_id.is_empty());
        assert!(store.exists(&key).unwrap());

        let stored = store.read_latest(&key).unwrap().unwrap();
        assert_eq!(stored.record, doc);
        assert_eq!(stored.version, 0);
    }

    #[test]
    fn conditional_write_conflicts() {
        let store = store();
        let key = store.compute_key("SAP", "INV-1").unwrap();
        let doc = EDocument::created(Submission::new("SAP", "INV-1", "alice", "t0", "h1"));
        store.write_version(&key, &doc, None).unwrap();

        let err = store.write_version(&key, &doc, None).unwrap_err();
        assert!(matches!(err, EdocError::DuplicateKey { .. }));

        let next = doc.advance(
            Status::Modified,
            Submission::new("SAP", "INV-1", "bob", "t1", "h2"),
        );
        store.write_version(&key, &next, Some(0)).unwrap();

        // a second writer that also read version 0
        let err = store.write_version(&key, &next, Some(0)).unwrap_err();
        assert!(matches!(
            err,
            EdocError::ConcurrentModification {
                expected: Some(0),
                ..
            }
        ));
    }
}
