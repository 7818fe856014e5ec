//! Invocation surface: a function name and string arguments in, a success payload or an
//! error message out
use super::error::{EdocError, StoreError, ValidationError};
use super::ledger::Ledger;
use super::record::{Metadata, Status, Submission};
use super::service::EDocService;
use serde::Serialize;
use serde::ser::{SerializeSeq, Serializer};
use tracing::{info, warn};

/// Outcome of one invocation. There is no partial success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Success(Vec<u8>),
    Error(String),
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Response::Success(payload) => Some(payload),
            Response::Error(_) => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Response::Success(_) => None,
            Response::Error(message) => Some(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Init,
    Apis,
    OpCodes,
    InitLedger,
    QueryTable,
    Create,
    Modify,
    Archive,
    Delete,
    Query,
    History,
}

const SUBMISSION_USAGE: &str =
    "5 or 6: systemName, documentID, submitterID, operationTime, contentHash, [metadata]";

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::Init,
        Operation::Apis,
        Operation::OpCodes,
        Operation::InitLedger,
        Operation::QueryTable,
        Operation::Create,
        Operation::Modify,
        Operation::Archive,
        Operation::Delete,
        Operation::Query,
        Operation::History,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Init => "init",
            Operation::Apis => "apis",
            Operation::OpCodes => "op-codes",
            Operation::InitLedger => "init-ledger",
            Operation::QueryTable => "query-table",
            Operation::Create => "create",
            Operation::Modify => "modify",
            Operation::Archive => "archive",
            Operation::Delete => "delete",
            Operation::Query => "query",
            Operation::History => "history",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn usage(self) -> &'static str {
        match self {
            Operation::Init | Operation::Apis | Operation::OpCodes | Operation::InitLedger => {
                "0, no arguments"
            }
            Operation::QueryTable => "1: tableName",
            Operation::Create | Operation::Modify | Operation::Archive | Operation::Delete => {
                SUBMISSION_USAGE
            }
            Operation::Query | Operation::History => "2: systemName, documentID",
        }
    }

    /// Lowest and highest accepted argument count.
    fn arity(self) -> (usize, usize) {
        match self {
            Operation::Init | Operation::Apis | Operation::OpCodes | Operation::InitLedger => {
                (0, 0)
            }
            Operation::QueryTable => (1, 1),
            Operation::Create | Operation::Modify | Operation::Archive | Operation::Delete => {
                (5, 6)
            }
            Operation::Query | Operation::History => (2, 2),
        }
    }

    fn check_args(self, args: &[String]) -> Result<(), ValidationError> {
        let (min, max) = self.arity();
        if args.len() < min || args.len() > max {
            return Err(ValidationError::Usage {
                function: self.name(),
                usage: self.usage(),
            });
        }
        Ok(())
    }
}

pub struct EDocContract<L> {
    service: EDocService<L>,
}

impl<L: Ledger> EDocContract<L> {
    pub fn new(service: EDocService<L>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &EDocService<L> {
        &self.service
    }

    pub fn invoke(&self, function: &str, args: &[String]) -> Response {
        let result = match Operation::from_name(function) {
            Some(op) => self.dispatch(op, args),
            None => Err(ValidationError::UnknownFunction {
                name: function.to_owned(),
                args: args.to_vec(),
            }
            .into()),
        };

        match result {
            Ok(payload) => {
                info!(function, bytes = payload.len(), "invocation succeeded");
                Response::Success(payload)
            }
            Err(err) => {
                warn!(function, error = %err, "invocation failed");
                Response::Error(err.to_string())
            }
        }
    }

    fn dispatch(&self, op: Operation, args: &[String]) -> Result<Vec<u8>, EdocError> {
        op.check_args(args)?;

        match op {
            Operation::Init => Ok(Vec::new()),
            Operation::Apis => to_json(&self.service.tables().apis().entries),
            Operation::OpCodes => to_json(&self.service.tables().op_codes().entries),
            Operation::InitLedger => {
                self.service.init_ledger()?;
                Ok(Vec::new())
            }
            Operation::QueryTable => to_json(&self.service.query_table(&args[0])?),
            Operation::Create => {
                let tx_id = self.service.create(submission(args)?)?;
                Ok(tx_id.into_bytes())
            }
            Operation::Modify => self.transition(Status::Modified, args),
            Operation::Archive => self.transition(Status::Archived, args),
            Operation::Delete => self.transition(Status::Deleted, args),
            Operation::Query => to_json(&self.service.query_record(&args[0], &args[1])?),
            Operation::History => json_array(self.service.query_history(&args[0], &args[1])?),
        }
    }

    fn transition(&self, target: Status, args: &[String]) -> Result<Vec<u8>, EdocError> {
        let tx_id = self.service.transition(target, submission(args)?)?;
        Ok(tx_id.into_bytes())
    }
}

fn submission(args: &[String]) -> Result<Submission, ValidationError> {
    let metadata = Metadata::parse(args.get(5).map(String::as_str))?;

    Ok(
        Submission::new(&args[0], &args[1], &args[2], &args[3], &args[4])
            .with_metadata(metadata),
    )
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EdocError> {
    serde_json::to_vec(value).map_err(|e| EdocError::StoreUnavailable(e.into()))
}

// serialises each element as the iterator yields it
fn json_array<T, I>(items: I) -> Result<Vec<u8>, EdocError>
where
    T: Serialize,
    I: Iterator<Item = Result<T, EdocError>>,
{
    let codec = |e: serde_json::Error| EdocError::StoreUnavailable(StoreError::from(e));

    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::new(&mut out);
    let mut seq = serializer.serialize_seq(None).map_err(codec)?;
    for item in items {
        seq.serialize_element(&item?).map_err(codec)?;
    }
    seq.end().map_err(codec)?;

    Ok(out)
}
