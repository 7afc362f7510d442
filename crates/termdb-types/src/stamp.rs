//! Stamp tuple and stamp sequence types.
//!
//! A stamp is the immutable (status, time, author, module, path) tuple that
//! attributes one version of one component. Stamps are interned by the
//! stamp registry; the rest of the system refers to them by their small
//! integer [`StampSeq`].

use crate::{Nid, Status};

/// An interned stamp sequence.
///
/// Structurally identical stamp tuples always resolve to the same
/// sequence. A sequence assigned to a committed tuple is never reused or
/// mutated; pending sequences are promoted or canceled in place exactly
/// once.
pub type StampSeq = u32;

/// Time sentinel for a stamp staged on an open transaction.
///
/// A pending stamp sorts after every committed time, but the position
/// calculator excludes it entirely: pending versions are reached through
/// the chronicle, never through `latest`.
pub const TIME_PENDING: i64 = i64::MAX;

/// Time sentinel for a canceled stamp.
///
/// A canceled stamp sorts before every committed time and is never
/// visible from any coordinate.
pub const TIME_CANCELED: i64 = i64::MIN;

/// The attribution tuple for one version of one component.
///
/// # Examples
///
/// ```
/// use termdb_types::{Stamp, Status, TIME_PENDING};
///
/// let staged = Stamp {
///     status: Status::Active,
///     time: TIME_PENDING,
///     author: -2_147_483_640,
///     module: -2_147_483_641,
///     path: -2_147_483_642,
/// };
/// assert!(staged.is_pending());
/// assert!(!staged.is_committed());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stamp {
    /// Active or inactive at this point in history.
    pub status: Status,
    /// Commit time in epoch milliseconds, or one of the two sentinels.
    pub time: i64,
    /// The author concept's nid.
    pub author: Nid,
    /// The module concept's nid.
    pub module: Nid,
    /// The path concept's nid.
    pub path: Nid,
}

impl Stamp {
    /// Returns true if this stamp is staged on an open transaction.
    pub fn is_pending(&self) -> bool {
        self.time == TIME_PENDING
    }

    /// Returns true if this stamp was canceled.
    pub fn is_canceled(&self) -> bool {
        self.time == TIME_CANCELED
    }

    /// Returns true if this stamp carries a real commit time.
    pub fn is_committed(&self) -> bool {
        !self.is_pending() && !self.is_canceled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FIRST_NID;

    fn make_stamp(time: i64) -> Stamp {
        Stamp {
            status: Status::Active,
            time,
            author: FIRST_NID,
            module: FIRST_NID + 1,
            path: FIRST_NID + 2,
        }
    }

    #[test]
    fn test_committed_stamp() {
        let stamp = make_stamp(1_700_000_000_000);
        assert!(stamp.is_committed());
        assert!(!stamp.is_pending());
        assert!(!stamp.is_canceled());
    }

    #[test]
    fn test_sentinel_stamps() {
        assert!(make_stamp(TIME_PENDING).is_pending());
        assert!(make_stamp(TIME_CANCELED).is_canceled());
        assert!(!make_stamp(TIME_PENDING).is_committed());
        assert!(!make_stamp(TIME_CANCELED).is_committed());
    }
}
