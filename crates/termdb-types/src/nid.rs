//! Native identifier (nid) and element sequence types.
//!
//! This module provides the two integer identity spaces used throughout the
//! store: process-stable nids and dense element sequences.

/// A native identifier for a component.
///
/// Nids are process-stable 32-bit integers allocated from the negative
/// number space, counting upward from [`FIRST_NID`]. They are stable for
/// the life of a database directory (restored from the chronicle log on
/// open) but carry no meaning outside it; external identity is a UUID.
///
/// # Examples
///
/// ```
/// use termdb_types::{Nid, FIRST_NID};
///
/// let first: Nid = FIRST_NID;
/// assert!(first < 0);
/// ```
pub type Nid = i32;

/// Reserved nid meaning "no component". Never allocated.
pub const NID_NONE: Nid = i32::MIN;

/// The first nid handed out by the identity layer.
///
/// Allocation proceeds upward from here, so every issued nid is negative
/// and distinct from any element sequence.
pub const FIRST_NID: Nid = i32::MIN + 1;

/// A dense element sequence for a component.
///
/// Sequences are small positive integers assigned in allocation order,
/// suitable as array and index keys. Sequence 0 is reserved as "none".
pub type ElementSeq = u32;

/// The first element sequence handed out by the identity layer.
pub const FIRST_ELEMENT_SEQ: ElementSeq = 1;
