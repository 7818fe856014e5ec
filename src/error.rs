use crate::record::Status;

/// Malformed invocations and inputs. Never retried.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Incorrect number of arguments for '{function}'. Expecting {usage}")]
    Usage {
        function: &'static str,
        usage: &'static str,
    },
    #[error("Not supported function name: {name}, args: {args:?}")]
    UnknownFunction { name: String, args: Vec<String> },
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{0} must not contain a NUL character")]
    InvalidKeyComponent(&'static str),
    #[error("meta-data is not valid JSON: {0}")]
    MalformedMetadata(String),
    #[error("'{0}' is the initial status and can only be assigned by create")]
    InitialStatus(Status),
    #[error("unknown reference table '{0}', expecting 'apis' or 'op-codes'")]
    UnknownTable(String),
}

/// Failures raised by a [`crate::ledger::Ledger`] implementation.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode or decode ledger entry: {0}")]
    Codec(String),
    #[error("conditional write on {key:?} expected version {expected:?}, found {found:?}")]
    Conflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum EdocError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("e-document {system_name}/{document_id} already exists, use modify, archive or delete")]
    DuplicateKey {
        system_name: String,
        document_id: String,
    },
    #[error("e-document {system_name}/{document_id} does not exist")]
    NotFound {
        system_name: String,
        document_id: String,
    },
    #[error("invalid transition from '{from}' to '{to}', status may not regress")]
    InvalidTransition { from: Status, to: Status },
    #[error("e-document {key:?} was modified concurrently (read version {expected:?}), retry")]
    ConcurrentModification { key: String, expected: Option<u64> },
    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),
}

impl From<StoreError> for EdocError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { key, expected, .. } => {
                EdocError::ConcurrentModification { key, expected }
            }
            other => EdocError::StoreUnavailable(other),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}
