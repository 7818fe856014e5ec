//! E-document records, their lifecycle status and the shapes returned by queries
use super::error::ValidationError;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;

/// Lifecycle status of an e-document. Ordered by rank, a record never moves to a lower rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "create")]
    Created,
    #[serde(rename = "modify")]
    Modified,
    #[serde(rename = "archive")]
    Archived,
    #[serde(rename = "delete")]
    Deleted,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Created,
        Status::Modified,
        Status::Archived,
        Status::Deleted,
    ];

    pub fn rank(self) -> u8 {
        match self {
            Status::Created => 0,
            Status::Modified => 1,
            Status::Archived => 2,
            Status::Deleted => 3,
        }
    }

    /// The operation code written to the `op-code` field of a stored record.
    pub fn op_code(self) -> &'static str {
        match self {
            Status::Created => "create",
            Status::Modified => "modify",
            Status::Archived => "archive",
            Status::Deleted => "delete",
        }
    }

    /// Equal rank is allowed, only regression is rejected.
    pub fn can_transition_to(self, target: Status) -> bool {
        self.rank() <= target.rank()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Created => "Created",
            Status::Modified => "Modified",
            Status::Archived => "Archived",
            Status::Deleted => "Deleted",
        };
        f.write_str(name)
    }
}

/// Free-form caller metadata, passed through exactly as supplied.
#[derive(Debug, Clone, Default)]
pub enum Metadata {
    #[default]
    Absent,
    Opaque(Box<RawValue>),
}

impl Metadata {
    /// An omitted, empty or `null` argument is absent, anything else must be well-formed JSON.
    pub fn parse(arg: Option<&str>) -> Result<Self, ValidationError> {
        match arg {
            None => Ok(Metadata::Absent),
            // a stored null would read back as absent
            Some(raw) if matches!(raw.trim(), "" | "null") => Ok(Metadata::Absent),
            Some(raw) => RawValue::from_string(raw.to_owned())
                .map(Metadata::Opaque)
                .map_err(|e| ValidationError::MalformedMetadata(e.to_string())),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Metadata::Absent)
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Metadata::Absent => None,
            Metadata::Opaque(raw) => Some(raw.get()),
        }
    }
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        self.as_raw() == other.as_raw()
    }
}

impl Eq for Metadata {}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Metadata::Absent => serializer.serialize_none(),
            Metadata::Opaque(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<Box<RawValue>> = Option::deserialize(deserializer)?;
        Ok(raw.map_or(Metadata::Absent, Metadata::Opaque))
    }
}

/// The fields a caller supplies on create and on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub system_name: String,
    pub document_id: String,
    pub submitter_id: String,
    pub operation_time: String,
    pub content_hash: String,
    pub metadata: Metadata,
}

impl Submission {
    pub fn new(
        system_name: impl Into<String>,
        document_id: impl Into<String>,
        submitter_id: impl Into<String>,
        operation_time: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            system_name: system_name.into(),
            document_id: document_id.into(),
            submitter_id: submitter_id.into(),
            operation_time: operation_time.into(),
            content_hash: content_hash.into(),
            metadata: Metadata::Absent,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The content hash is only mandatory when the record is first created.
    pub fn validate(&self, creating: bool) -> Result<(), ValidationError> {
        let required = [
            ("systemName", &self.system_name),
            ("documentID", &self.document_id),
            ("submitterID", &self.submitter_id),
            ("operationTime", &self.operation_time),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ValidationError::EmptyField(field));
            }
        }
        if creating && self.content_hash.is_empty() {
            return Err(ValidationError::EmptyField("contentHash"));
        }
        Ok(())
    }
}

/// One version of an e-document as persisted on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EDocument {
    #[serde(rename = "system-name")]
    pub system_name: String,
    #[serde(rename = "document-id")]
    pub document_id: String,
    #[serde(rename = "uid")]
    pub submitter_id: String,
    #[serde(rename = "op-code")]
    pub status: Status,
    #[serde(rename = "op-time")]
    pub operation_time: String,
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(
        rename = "meta-data",
        default,
        skip_serializing_if = "Metadata::is_absent"
    )]
    pub metadata: Metadata,
}

impl EDocument {
    pub fn created(submission: Submission) -> Self {
        Self {
            system_name: submission.system_name,
            document_id: submission.document_id,
            submitter_id: submission.submitter_id,
            status: Status::Created,
            operation_time: submission.operation_time,
            content_hash: submission.content_hash,
            metadata: submission.metadata,
        }
    }

    /// Next version of this record. Omitted metadata and an empty hash carry over.
    pub fn advance(&self, target: Status, submission: Submission) -> Self {
        let content_hash = if submission.content_hash.is_empty() {
            self.content_hash.clone()
        } else {
            submission.content_hash
        };
        let metadata = if submission.metadata.is_absent() {
            self.metadata.clone()
        } else {
            submission.metadata
        };

        Self {
            system_name: self.system_name.clone(),
            document_id: self.document_id.clone(),
            submitter_id: submission.submitter_id,
            status: target,
            operation_time: submission.operation_time,
            content_hash,
            metadata,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone + Eq> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone + Eq> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// `None` when the fields do not name a valid UTC instant.
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

/// One historical version of a record. `record` is the JSON exactly as stored.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "txid")]
    pub tx_id: String,
    #[serde(rename = "time")]
    pub timestamp: TimeStamp<Utc>,
    pub record: Box<RawValue>,
}

impl HistoryEntry {
    pub fn document(&self) -> Result<EDocument, serde_json::Error> {
        EDocument::from_json(self.record.get().as_bytes())
    }
}

/// A key and its latest stored value, as returned by range queries.
#[derive(Debug, Clone, Serialize)]
pub struct KeyedRecord {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Record")]
    pub record: Box<RawValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> Submission {
        Submission::new("SAP", "INV-1", "alice", "2024-01-01", "h1")
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn status_rank_is_total_order() {
        let ranks: Vec<u8> = Status::ALL.iter().map(|s| s.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
        assert!(Status::Modified.can_transition_to(Status::Modified));
        assert!(Status::Modified.can_transition_to(Status::Archived));
        assert!(!Status::Archived.can_transition_to(Status::Modified));
        assert!(Status::Deleted.can_transition_to(Status::Deleted));
    }

    #[test]
    fn record_uses_wire_field_names() {
        let doc = EDocument::created(submission());
        let value: serde_json::Value = serde_json::from_slice(&doc.to_json().unwrap()).unwrap();

        assert_eq!(value["system-name"], "SAP");
        assert_eq!(value["document-id"], "INV-1");
        assert_eq!(value["uid"], "alice");
        assert_eq!(value["op-code"], "create");
        assert_eq!(value["op-time"], "2024-01-01");
        assert_eq!(value["hash"], "h1");
        // absent metadata is omitted rather than written as null
        assert!(value.get("meta-data").is_none());
    }

    #[test]
    fn metadata_passes_through_verbatim() {
        let meta = Metadata::parse(Some(r#"{"pages": 3,  "tags":["a"]}"#)).unwrap();
        let doc = EDocument::created(submission().with_metadata(meta));

        let json = String::from_utf8(doc.to_json().unwrap()).unwrap();
        assert!(json.contains(r#""meta-data":{"pages": 3,  "tags":["a"]}"#));

        let decoded = EDocument::from_json(json.as_bytes()).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn metadata_parse_rules() {
        assert!(Metadata::parse(None).unwrap().is_absent());
        assert!(Metadata::parse(Some("")).unwrap().is_absent());
        assert!(Metadata::parse(Some(" null ")).unwrap().is_absent());
        assert!(!Metadata::parse(Some("0")).unwrap().is_absent());
        assert!(matches!(
            Metadata::parse(Some("{not json")),
            Err(ValidationError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn advance_preserves_omitted_fields() {
        let meta = Metadata::parse(Some(r#"{"k":"v"}"#)).unwrap();
        let doc = EDocument::created(submission().with_metadata(meta.clone()));

        let next = doc.advance(
            Status::Modified,
            Submission::new("SAP", "INV-1", "bob", "2024-01-02", ""),
        );

        assert_eq!(next.status, Status::Modified);
        assert_eq!(next.submitter_id, "bob");
        assert_eq!(next.content_hash, "h1");
        assert_eq!(next.metadata, meta);
    }

    #[test]
    fn validate_requires_hash_only_on_create() {
        let sub = Submission::new("SAP", "INV-1", "bob", "2024-01-02", "");
        assert_eq!(
            sub.validate(true),
            Err(ValidationError::EmptyField("contentHash"))
        );
        assert!(sub.validate(false).is_ok());

        let sub = Submission::new("SAP", "INV-1", "", "2024-01-02", "h");
        assert_eq!(
            sub.validate(false),
            Err(ValidationError::EmptyField("submitterID"))
        );
    }

    #[test]
    fn history_entry_serialises_envelope() {
        let doc = EDocument::created(submission());
        let json = String::from_utf8(doc.to_json().unwrap()).unwrap();
        let raw = RawValue::from_string(json).unwrap();
        let entry = HistoryEntry {
            tx_id: "abc".into(),
            timestamp: TimeStamp::new_with(2024, 1, 1, 0, 0, 0).unwrap(),
            record: raw,
        };

        let value: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["txid"], "abc");
        assert_eq!(value["time"], "2024-01-01T00:00:00.000000000Z");
        assert_eq!(value["record"]["uid"], "alice");
        assert_eq!(entry.document().unwrap(), doc);
    }
}
