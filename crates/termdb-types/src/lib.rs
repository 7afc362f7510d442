//! # termdb-types
//!
//! Type definitions for the termdb bitemporal terminology store.
//!
//! This crate provides the identity, stamp, coordinate, and index-key types
//! shared by the chronicle store and the query engine. It contains no
//! behavior beyond small helper predicates and explicit key ordering.
//!
//! ## Features
//!
//! - `serde` (default): Enables serialization/deserialization support via
//!   serde. Disable this feature for zero-dependency usage.
//!
//! ## Usage
//!
//! ```rust
//! use termdb_types::{Stamp, StampCoordinate, Status};
//!
//! let stamp = Stamp {
//!     status: Status::Active,
//!     time: 1_700_000_000_000,
//!     author: -2_147_483_640,
//!     module: -2_147_483_641,
//!     path: -2_147_483_642,
//! };
//! assert!(stamp.is_committed());
//!
//! let view = StampCoordinate::latest_on(stamp.path);
//! assert_eq!(view.position.path, stamp.path);
//! ```
//!
//! ## Without Serde
//!
//! To use this crate without serde (zero dependencies):
//!
//! ```toml
//! [dependencies]
//! termdb-types = { version = "0.1", default-features = false }
//! ```

#![warn(missing_docs)]

mod coordinate;
mod keys;
mod nid;
mod payload;
mod stamp;
mod status;

// Re-export all public types at crate root
pub use coordinate::{StampCoordinate, StampPosition, StampPrecedence};
pub use keys::{MembershipKey, ReferenceKey};
pub use nid::{ElementSeq, Nid, FIRST_ELEMENT_SEQ, FIRST_NID, NID_NONE};
pub use payload::{ComponentKind, VersionData};
pub use stamp::{Stamp, StampSeq, TIME_CANCELED, TIME_PENDING};
pub use status::Status;
