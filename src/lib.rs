//! Lifecycle tracking of electronic documents on an append-only versioned ledger.
//!
//! An e-document is keyed by its system name and document id and moves through
//! `create -> modify -> archive -> delete`, each step committed as a new ledger version.

pub mod config;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod record;
pub mod service;
pub mod store;
pub mod utils;

pub use contract::{EDocContract, Operation, Response};
pub use error::{EdocError, StoreError, ValidationError};
pub use ledger::{Ledger, SledLedger};
pub use record::{EDocument, Metadata, Status, Submission};
pub use service::EDocService;
