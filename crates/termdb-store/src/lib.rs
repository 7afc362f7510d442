//! # termdb-store
//!
//! The bitemporal version store: stamped, append-only component histories
//! with point-of-view resolution and durable secondary indices.
//!
//! The store is built from small injectable services — an
//! [`IdentityService`] for UUID/nid/sequence identity, a
//! [`StampRegistry`] interning attribution tuples, a [`PathRegistry`]
//! recording how editing paths branch — wired together by
//! [`ChronicleStore`], which owns the durable chronicle log and the
//! [`AssemblageIndex`]. Version visibility is decided by the
//! [`RelativePositionCalculator`], which surfaces concurrent edits on
//! divergent paths as an explicit [`Latest::Contradiction`] instead of
//! picking a winner.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use termdb_store::{ChronicleStore, IdentityService, PathRegistry};
//!
//! let identity = Arc::new(IdentityService::new());
//! let paths = Arc::new(PathRegistry::new());
//! let store = ChronicleStore::open("data/db".as_ref(), identity, paths)?;
//! ```

#![warn(missing_docs)]

mod backing;
mod chronicle;
mod error;
mod identity;
mod index;
mod paths;
mod position;
mod query;
mod stamp;
mod store;

pub use chronicle::{Chronicle, Version};
pub use error::{StoreError, StoreResult};
pub use identity::IdentityService;
pub use index::{AssemblageIndex, WriteConstraint};
pub use paths::PathRegistry;
pub use position::{Latest, RelativePositionCalculator};
pub use stamp::StampRegistry;
pub use store::ChronicleStore;

// Re-export the shared type definitions for convenience.
pub use termdb_types;
