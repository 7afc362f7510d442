//! Store error taxonomy.
//!
//! Low-level I/O and encoding failures are wrapped here, once, at the
//! store boundary and not re-wrapped further up. Writes against a nid the
//! identity layer never issued are a programmer error and panic rather
//! than appearing in this taxonomy. A contradiction from the position
//! calculator is not an error at all; it is an ordinary result.

use termdb_types::{ElementSeq, Nid, StampSeq};
use thiserror::Error;

/// Errors that can occur in the chronicle store and its indices.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error reading or writing store files.
    #[error("IO error in chronicle store: {0}")]
    Io(#[from] std::io::Error),

    /// Binary encoding or decoding failure.
    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    /// A store file held a record that could not be understood.
    #[error("corrupt record in {file}: {detail}")]
    Corrupt {
        /// The file containing the bad record.
        file: String,
        /// What was wrong with it.
        detail: String,
    },

    /// A structural constraint rejected a write. No state was changed.
    #[error(
        "structural conflict: component {referenced} already carries member \
         {existing} in assemblage {assemblage}; rejected member {incoming}"
    )]
    StructuralConflict {
        /// The annotated component.
        referenced: Nid,
        /// The assemblage whose constraint was violated.
        assemblage: ElementSeq,
        /// The member already present in the range.
        existing: ElementSeq,
        /// The member whose write was rejected.
        incoming: ElementSeq,
    },

    /// A stamp sequence the registry never issued.
    #[error("unknown stamp sequence: {sequence}")]
    UnknownStamp {
        /// The unknown sequence.
        sequence: StampSeq,
    },

    /// A commit or cancel against a stamp that is not pending.
    #[error("stamp sequence {sequence} is not pending")]
    NotPending {
        /// The offending sequence.
        sequence: StampSeq,
    },

    /// An attempt to intern a tuple carrying a time sentinel.
    #[error("cannot intern a stamp with a {kind} time sentinel")]
    SentinelIntern {
        /// Which sentinel was supplied.
        kind: &'static str,
    },

    /// A read or staged write against a component with no chronicle yet.
    #[error("no chronicle exists for nid {nid}")]
    NoChronicle {
        /// The component's nid.
        nid: Nid,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
