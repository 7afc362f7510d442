//! Query engine error types.

use termdb_types::ElementSeq;
use thiserror::Error;

/// A component fetch that failed during the iteration pass.
///
/// Raised by [`Queryable`](crate::Queryable) implementations; any worker
/// hitting one fails the whole query, never a partial result.
#[derive(Debug, Clone, Error)]
#[error("component fetch failed for sequence {sequence}: {detail}")]
pub struct FetchError {
    /// Sequence of the component that could not be fetched.
    pub sequence: ElementSeq,
    /// Human-readable failure detail from the store.
    pub detail: String,
}

/// Errors raised during query construction or evaluation.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A clause referenced a let-binding key that was never bound.
    #[error("unbound let key: {key}")]
    UnboundKey {
        /// The key the clause referenced.
        key: String,
    },

    /// A let-binding had the wrong kind for the clause referencing it.
    #[error("let key `{key}` is bound to the wrong kind (expected {expected})")]
    BindingKind {
        /// The key the clause referenced.
        key: String,
        /// The binding kind the clause requires.
        expected: &'static str,
    },

    /// A combinator clause was constructed with no children.
    #[error("{kind} clause requires at least one child")]
    EmptyCombinator {
        /// The combinator kind.
        kind: &'static str,
    },

    /// NOT is a unary complement; any other arity is a grammar error.
    #[error("NOT clause requires exactly one child, got {children}")]
    NotArity {
        /// Number of children supplied.
        children: usize,
    },

    /// A text-match pattern failed to compile.
    #[error("invalid text-match pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The query requires the iteration phase but the engine was
    /// configured to forbid it.
    #[error("query requires full-population iteration, which is disabled")]
    IterationForbidden,

    /// The cancellation token was flipped while the query was running.
    #[error("query canceled")]
    Canceled,

    /// A partition worker failed to fetch a component.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
