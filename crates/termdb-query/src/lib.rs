//! # termdb-query
//!
//! Clause-tree query engine over the termdb component population.
//!
//! A query is a boolean tree of predicate clauses evaluated in three
//! phases: an index-driven narrowing pass, an optional parallel iteration
//! pass over every surviving candidate, and a final set-algebra
//! combination. The engine reaches the component store through the
//! [`Queryable`] trait, so it can run against any store implementation
//! (including small in-memory fixtures in tests).
//!
//! ## Example
//!
//! ```ignore
//! use std::collections::HashMap;
//! use termdb_query::{Binding, Clause, ForSet, Query};
//!
//! let mut lets = HashMap::new();
//! lets.insert("dialect".to_string(), Binding::Assemblage(9));
//!
//! let query = Query::new(
//!     ForSet::Components,
//!     lets,
//!     Clause::MemberOf { assemblage: "dialect".to_string() },
//! )?;
//! let members = query.compute(&store)?;
//! ```

#![warn(missing_docs)]

mod clause;
mod error;
mod evaluate;
mod query;
mod queryable;

pub use clause::{Clause, ClauseKind, PhaseSet};
pub use error::{FetchError, QueryError, QueryResult};
pub use query::{Binding, CancelToken, ForSet, Query, QueryOptions};
pub use queryable::Queryable;
