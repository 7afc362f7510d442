//! Stamp positions, coordinates, and tie-break policy.
//!
//! A coordinate is a read-time point of view: which path and time bound,
//! which modules, and which statuses count as visible, plus the explicit
//! policy for same-path same-time ties. Coordinates are pure values; any
//! number of them may read the same store concurrently.

use std::collections::BTreeSet;

use crate::{Nid, Status};

/// A point on a path: (time bound, path nid).
///
/// Used both as the reference position of a coordinate and as the origin
/// points of branched paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StampPosition {
    /// Upper time bound in epoch milliseconds, inclusive.
    pub time: i64,
    /// The path this position sits on.
    pub path: Nid,
}

impl StampPosition {
    /// Creates a position at the given time on the given path.
    pub fn new(time: i64, path: Nid) -> Self {
        Self { time, path }
    }

    /// Creates a position at the end of time on the given path.
    pub fn latest_on(path: Nid) -> Self {
        Self {
            time: i64::MAX,
            path,
        }
    }
}

/// Tie-break policy for stamps that are not time-ordered.
///
/// Applies only to survivors at the same path and time; survivors on
/// divergent paths are always reported as a contradiction. Intern order is
/// never consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StampPrecedence {
    /// Report the tie as a contradiction (the default).
    #[default]
    Surface,
    /// Keep the active stamp when exactly one side of the tie is active.
    PreferActive,
    /// Keep the inactive stamp when exactly one side of the tie is inactive.
    PreferInactive,
}

/// A read-time point of view over the version store.
///
/// # Examples
///
/// ```
/// use termdb_types::{StampCoordinate, Status};
///
/// let path = -2_147_483_642;
/// let view = StampCoordinate::latest_active_on(path);
/// assert!(view.status_allowed(Status::Active));
/// assert!(!view.status_allowed(Status::Inactive));
/// assert!(view.module_allowed(-5)); // empty module set allows all
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StampCoordinate {
    /// Tie-break policy for stamps that are not time-ordered.
    pub precedence: StampPrecedence,
    /// The reference position: path plus inclusive time bound.
    pub position: StampPosition,
    /// Modules visible from this coordinate. Empty means all modules.
    pub modules: BTreeSet<Nid>,
    /// Statuses visible from this coordinate.
    pub allowed_states: BTreeSet<Status>,
}

impl StampCoordinate {
    /// A coordinate at the end of time on `path`, both statuses visible.
    pub fn latest_on(path: Nid) -> Self {
        Self {
            precedence: StampPrecedence::Surface,
            position: StampPosition::latest_on(path),
            modules: BTreeSet::new(),
            allowed_states: [Status::Active, Status::Inactive].into(),
        }
    }

    /// A coordinate at the end of time on `path`, active versions only.
    pub fn latest_active_on(path: Nid) -> Self {
        Self {
            allowed_states: [Status::Active].into(),
            ..Self::latest_on(path)
        }
    }

    /// Returns this coordinate with its reference position replaced.
    pub fn at(mut self, position: StampPosition) -> Self {
        self.position = position;
        self
    }

    /// Returns this coordinate restricted to the given modules.
    pub fn with_modules(mut self, modules: impl IntoIterator<Item = Nid>) -> Self {
        self.modules = modules.into_iter().collect();
        self
    }

    /// Returns this coordinate with the given tie-break policy.
    pub fn with_precedence(mut self, precedence: StampPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Returns true if the given module is visible from this coordinate.
    pub fn module_allowed(&self, module: Nid) -> bool {
        self.modules.is_empty() || self.modules.contains(&module)
    }

    /// Returns true if the given status is visible from this coordinate.
    pub fn status_allowed(&self, status: Status) -> bool {
        self.allowed_states.contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FIRST_NID;

    #[test]
    fn test_latest_coordinate_sees_both_statuses() {
        let view = StampCoordinate::latest_on(FIRST_NID);
        assert!(view.status_allowed(Status::Active));
        assert!(view.status_allowed(Status::Inactive));
        assert_eq!(view.precedence, StampPrecedence::Surface);
    }

    #[test]
    fn test_module_restriction() {
        let view = StampCoordinate::latest_on(FIRST_NID).with_modules([FIRST_NID + 1]);
        assert!(view.module_allowed(FIRST_NID + 1));
        assert!(!view.module_allowed(FIRST_NID + 2));
    }

    #[test]
    fn test_position_override() {
        let view = StampCoordinate::latest_on(FIRST_NID).at(StampPosition::new(500, FIRST_NID));
        assert_eq!(view.position.time, 500);
    }
}
