//! Path registry and the route test.
//!
//! Paths are branches of editing history. A path may branch from one or
//! more origin positions on other paths; everything on an origin path up
//! to the branch time is part of the branching path's history. Versions
//! on paths with no origin relationship are concurrent and incomparable.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use termdb_types::{Nid, StampPosition};

/// Records where each path branched from.
///
/// Paths with no registered origins are roots. Read-mostly; safe for
/// concurrent use.
#[derive(Default)]
pub struct PathRegistry {
    origins: RwLock<HashMap<Nid, Vec<StampPosition>>>,
}

impl PathRegistry {
    /// Creates a registry with no paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a path and its origin positions.
    ///
    /// Re-registering a path replaces its origins.
    pub fn add_path(&self, path: Nid, origins: Vec<StampPosition>) {
        self.origins.write().insert(path, origins);
    }

    /// The origin positions of a path. Empty for roots and unknown paths.
    pub fn origins_of(&self, path: Nid) -> Vec<StampPosition> {
        self.origins.read().get(&path).cloned().unwrap_or_default()
    }

    /// The route test: is a stamp at `(path, time)` on or before
    /// `position`?
    ///
    /// True when the stamp sits on the position's own path at or before
    /// its time, or on any origin path at or before the branch point,
    /// recursively.
    pub fn on_route(&self, path: Nid, time: i64, position: &StampPosition) -> bool {
        let mut visited = HashSet::new();
        self.on_route_inner(path, time, position, &mut visited)
    }

    fn on_route_inner(
        &self,
        path: Nid,
        time: i64,
        position: &StampPosition,
        visited: &mut HashSet<Nid>,
    ) -> bool {
        if path == position.path {
            return time <= position.time;
        }
        if !visited.insert(position.path) {
            return false;
        }
        self.origins_of(position.path)
            .iter()
            .any(|origin| self.on_route_inner(path, time, origin, visited))
    }
}
