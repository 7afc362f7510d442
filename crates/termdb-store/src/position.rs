//! Relative position resolution: which stamps are "latest" from a
//! coordinate's point of view.
//!
//! The calculator is a pure function of the stamp registry, the path
//! registry, and the coordinate; it takes no locks of its own and many
//! callers may resolve concurrently. When concurrent edits on divergent
//! paths both survive, all of them are returned — the caller decides what
//! a contradiction means, never this module.

use std::sync::Arc;

use termdb_types::{Stamp, StampCoordinate, StampPosition, StampPrecedence, StampSeq};

use crate::error::StoreResult;
use crate::paths::PathRegistry;
use crate::stamp::StampRegistry;

/// The outcome of resolving a candidate set against a coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Latest {
    /// Nothing is visible from the coordinate.
    Empty,
    /// Exactly one stamp is latest.
    Single(StampSeq),
    /// Two or more stamps are concurrently latest. Sorted ascending.
    Contradiction(Vec<StampSeq>),
}

impl Latest {
    /// The surviving stamp sequences, ascending.
    pub fn stamps(&self) -> Vec<StampSeq> {
        match self {
            Latest::Empty => Vec::new(),
            Latest::Single(sequence) => vec![*sequence],
            Latest::Contradiction(sequences) => sequences.clone(),
        }
    }

    /// Returns true if nothing survived.
    pub fn is_empty(&self) -> bool {
        matches!(self, Latest::Empty)
    }

    /// Returns true for a multi-survivor outcome.
    pub fn is_contradiction(&self) -> bool {
        matches!(self, Latest::Contradiction(_))
    }

    /// The single survivor, if there is exactly one.
    pub fn single(&self) -> Option<StampSeq> {
        match self {
            Latest::Single(sequence) => Some(*sequence),
            _ => None,
        }
    }
}

/// Resolves candidate stamp sets to their latest visible subset.
#[derive(Clone)]
pub struct RelativePositionCalculator {
    stamps: Arc<StampRegistry>,
    paths: Arc<PathRegistry>,
}

impl RelativePositionCalculator {
    /// Creates a calculator over the given registries.
    pub fn new(stamps: Arc<StampRegistry>, paths: Arc<PathRegistry>) -> Self {
        Self { stamps, paths }
    }

    /// Reduces `candidates` to the subset latest and visible under
    /// `coordinate`.
    ///
    /// Resolution never consults intern order. Same-path same-time
    /// survivors are a tie broken only by the coordinate's explicit
    /// precedence policy; divergent-path survivors are always reported
    /// together as a contradiction.
    pub fn latest(
        &self,
        candidates: &[StampSeq],
        coordinate: &StampCoordinate,
    ) -> StoreResult<Latest> {
        let mut unique: Vec<StampSeq> = candidates.to_vec();
        unique.sort_unstable();
        unique.dedup();

        // Filter: committed, allowed status, allowed module, on route.
        let mut survivors: Vec<(StampSeq, Stamp)> = Vec::with_capacity(unique.len());
        for sequence in unique {
            let stamp = self.stamps.resolve(sequence)?;
            if !stamp.is_committed() {
                continue;
            }
            if !coordinate.status_allowed(stamp.status) {
                continue;
            }
            if !coordinate.module_allowed(stamp.module) {
                continue;
            }
            if !self
                .paths
                .on_route(stamp.path, stamp.time, &coordinate.position)
            {
                continue;
            }
            survivors.push((sequence, stamp));
        }

        // Retain only stamps not dominated by another survivor.
        let mut dominated = vec![false; survivors.len()];
        for i in 0..survivors.len() {
            for j in 0..survivors.len() {
                if i == j || dominated[i] {
                    continue;
                }
                let (_, a) = survivors[i];
                let (_, b) = survivors[j];
                let a_before_b = self.before(&a, &b);
                let b_before_a = self.before(&b, &a);
                if a_before_b && !b_before_a {
                    dominated[i] = true;
                } else if a_before_b && b_before_a {
                    // Same path, same time: an explicit tie.
                    if tie_loser(&a, &b, coordinate.precedence) {
                        dominated[i] = true;
                    }
                }
            }
        }

        let mut latest: Vec<StampSeq> = survivors
            .iter()
            .zip(&dominated)
            .filter(|(_, dominated)| !**dominated)
            .map(|((sequence, _), _)| *sequence)
            .collect();
        latest.sort_unstable();

        Ok(match latest.len() {
            0 => Latest::Empty,
            1 => Latest::Single(latest[0]),
            _ => Latest::Contradiction(latest),
        })
    }

    /// True when `a` is on or before the position of `b`.
    fn before(&self, a: &Stamp, b: &Stamp) -> bool {
        self.paths
            .on_route(a.path, a.time, &StampPosition::new(b.time, b.path))
    }
}

/// Whether `a` loses a same-path same-time tie against `b` under the
/// given policy.
fn tie_loser(a: &Stamp, b: &Stamp, precedence: StampPrecedence) -> bool {
    match precedence {
        StampPrecedence::Surface => false,
        StampPrecedence::PreferActive => a.status.is_inactive() && b.status.is_active(),
        StampPrecedence::PreferInactive => a.status.is_active() && b.status.is_inactive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termdb_types::{Nid, Status, FIRST_NID};

    const AUTHOR: Nid = FIRST_NID;
    const MODULE_A: Nid = FIRST_NID + 1;
    const MODULE_B: Nid = FIRST_NID + 2;
    const MAIN: Nid = FIRST_NID + 3;
    const LEFT: Nid = FIRST_NID + 4;
    const RIGHT: Nid = FIRST_NID + 5;
    const MERGED: Nid = FIRST_NID + 6;

    struct Fixture {
        stamps: Arc<StampRegistry>,
        paths: Arc<PathRegistry>,
        calculator: RelativePositionCalculator,
    }

    fn create_fixture() -> Fixture {
        let stamps = Arc::new(StampRegistry::new());
        let paths = Arc::new(PathRegistry::new());
        let calculator = RelativePositionCalculator::new(stamps.clone(), paths.clone());
        Fixture {
            stamps,
            paths,
            calculator,
        }
    }

    fn intern(
        fixture: &Fixture,
        status: Status,
        time: i64,
        module: Nid,
        path: Nid,
    ) -> StampSeq {
        fixture
            .stamps
            .intern(Stamp {
                status,
                time,
                author: AUTHOR,
                module,
                path,
            })
            .unwrap()
    }

    #[test]
    fn test_single_path_latest_wins() {
        let fixture = create_fixture();
        let early = intern(&fixture, Status::Active, 100, MODULE_A, MAIN);
        let late = intern(&fixture, Status::Inactive, 200, MODULE_A, MAIN);

        let view = StampCoordinate::latest_on(MAIN);
        let latest = fixture.calculator.latest(&[early, late], &view).unwrap();
        assert_eq!(latest, Latest::Single(late));
    }

    #[test]
    fn test_time_bound_hides_later_versions() {
        let fixture = create_fixture();
        let early = intern(&fixture, Status::Active, 100, MODULE_A, MAIN);
        let late = intern(&fixture, Status::Inactive, 200, MODULE_A, MAIN);

        let view = StampCoordinate::latest_on(MAIN).at(StampPosition::new(150, MAIN));
        let latest = fixture.calculator.latest(&[early, late], &view).unwrap();
        assert_eq!(latest, Latest::Single(early));
    }

    #[test]
    fn test_status_filter_drops_inactive() {
        let fixture = create_fixture();
        let early = intern(&fixture, Status::Active, 100, MODULE_A, MAIN);
        let late = intern(&fixture, Status::Inactive, 200, MODULE_A, MAIN);

        let view = StampCoordinate::latest_active_on(MAIN);
        let latest = fixture.calculator.latest(&[early, late], &view).unwrap();
        // The inactive tip is filtered; the earlier active version is latest.
        assert_eq!(latest, Latest::Single(early));
    }

    #[test]
    fn test_module_filter() {
        let fixture = create_fixture();
        let in_module = intern(&fixture, Status::Active, 100, MODULE_A, MAIN);
        let other_module = intern(&fixture, Status::Active, 200, MODULE_B, MAIN);

        let view = StampCoordinate::latest_on(MAIN).with_modules([MODULE_A]);
        let latest = fixture
            .calculator
            .latest(&[in_module, other_module], &view)
            .unwrap();
        assert_eq!(latest, Latest::Single(in_module));
    }

    #[test]
    fn test_empty_input_yields_empty() {
        let fixture = create_fixture();
        let view = StampCoordinate::latest_on(MAIN);
        assert_eq!(fixture.calculator.latest(&[], &view).unwrap(), Latest::Empty);
    }

    #[test]
    fn test_pending_stamps_are_invisible() {
        let fixture = create_fixture();
        let pending = fixture
            .stamps
            .intern_pending(Status::Active, AUTHOR, MODULE_A, MAIN)
            .unwrap();

        let view = StampCoordinate::latest_on(MAIN);
        assert_eq!(
            fixture.calculator.latest(&[pending], &view).unwrap(),
            Latest::Empty
        );
    }

    #[test]
    fn test_branch_tip_dominates_origin_history() {
        let fixture = create_fixture();
        fixture
            .paths
            .add_path(LEFT, vec![StampPosition::new(300, MAIN)]);
        let on_main = intern(&fixture, Status::Active, 250, MODULE_A, MAIN);
        let on_left = intern(&fixture, Status::Inactive, 400, MODULE_A, LEFT);

        let view = StampCoordinate::latest_on(LEFT);
        let latest = fixture
            .calculator
            .latest(&[on_main, on_left], &view)
            .unwrap();
        assert_eq!(latest, Latest::Single(on_left));
    }

    #[test]
    fn test_divergent_paths_surface_contradiction() {
        let fixture = create_fixture();
        fixture
            .paths
            .add_path(LEFT, vec![StampPosition::new(300, MAIN)]);
        fixture
            .paths
            .add_path(RIGHT, vec![StampPosition::new(300, MAIN)]);
        fixture.paths.add_path(
            MERGED,
            vec![
                StampPosition::new(1000, LEFT),
                StampPosition::new(1000, RIGHT),
            ],
        );

        let left_tip = intern(&fixture, Status::Active, 400, MODULE_A, LEFT);
        let right_tip = intern(&fixture, Status::Inactive, 500, MODULE_A, RIGHT);

        let view = StampCoordinate::latest_on(MERGED);
        let latest = fixture
            .calculator
            .latest(&[left_tip, right_tip], &view)
            .unwrap();

        let mut expected = vec![left_tip, right_tip];
        expected.sort_unstable();
        assert_eq!(latest, Latest::Contradiction(expected));
    }

    #[test]
    fn test_same_time_tie_surfaces_by_default() {
        let fixture = create_fixture();
        let active = intern(&fixture, Status::Active, 100, MODULE_A, MAIN);
        let inactive = intern(&fixture, Status::Inactive, 100, MODULE_A, MAIN);

        let view = StampCoordinate::latest_on(MAIN);
        let latest = fixture
            .calculator
            .latest(&[active, inactive], &view)
            .unwrap();
        assert!(latest.is_contradiction());
    }

    #[test]
    fn test_same_time_tie_prefer_active() {
        let fixture = create_fixture();
        let active = intern(&fixture, Status::Active, 100, MODULE_A, MAIN);
        let inactive = intern(&fixture, Status::Inactive, 100, MODULE_A, MAIN);

        let view =
            StampCoordinate::latest_on(MAIN).with_precedence(StampPrecedence::PreferActive);
        let latest = fixture
            .calculator
            .latest(&[active, inactive], &view)
            .unwrap();
        assert_eq!(latest, Latest::Single(active));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let fixture = create_fixture();
        fixture
            .paths
            .add_path(LEFT, vec![StampPosition::new(300, MAIN)]);
        fixture
            .paths
            .add_path(RIGHT, vec![StampPosition::new(300, MAIN)]);
        fixture.paths.add_path(
            MERGED,
            vec![
                StampPosition::new(1000, LEFT),
                StampPosition::new(1000, RIGHT),
            ],
        );

        let candidates = vec![
            intern(&fixture, Status::Active, 100, MODULE_A, MAIN),
            intern(&fixture, Status::Active, 400, MODULE_A, LEFT),
            intern(&fixture, Status::Inactive, 500, MODULE_A, RIGHT),
        ];

        let view = StampCoordinate::latest_on(MERGED);
        let once = fixture.calculator.latest(&candidates, &view).unwrap();
        let twice = fixture.calculator.latest(&once.stamps(), &view).unwrap();
        assert_eq!(once, twice);
    }
}
