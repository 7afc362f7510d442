//! The chronicle: one component's full, append-only version history.
//!
//! Version lists are ordered by insertion, not by time; two versions may
//! share a timestamp on divergent paths. Committed versions are never
//! removed. The serialized form carries a write-sequence generation
//! counter so racing writers can be detected and merged instead of one
//! silently overwriting the other.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use termdb_types::{ComponentKind, Nid, StampSeq, VersionData};

use crate::error::StoreResult;
use crate::position::Latest;

/// One version of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// The interned stamp attributing this version.
    pub stamp: StampSeq,
    /// The type-specific payload.
    pub data: VersionData,
}

/// The append-only aggregate of every version sharing one nid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chronicle {
    /// The component's nid.
    pub nid: Nid,
    /// The component's primordial UUID.
    pub primordial_uuid: Uuid,
    /// The component's dense element sequence.
    pub sequence: u32,
    /// Concept or semantic annotation; fixed at creation.
    pub kind: ComponentKind,
    /// Versions in insertion order.
    pub versions: Vec<Version>,
    /// Generation counter, incremented on every durable write.
    pub write_sequence: u32,
}

impl Chronicle {
    /// Creates a concept chronicle with no versions yet.
    pub fn new_concept(nid: Nid, primordial_uuid: Uuid, sequence: u32) -> Self {
        Self {
            nid,
            primordial_uuid,
            sequence,
            kind: ComponentKind::Concept,
            versions: Vec::new(),
            write_sequence: 0,
        }
    }

    /// Creates a semantic-annotation chronicle with no versions yet.
    pub fn new_semantic(
        nid: Nid,
        primordial_uuid: Uuid,
        sequence: u32,
        assemblage: Nid,
        referenced: Nid,
    ) -> Self {
        Self {
            nid,
            primordial_uuid,
            sequence,
            kind: ComponentKind::Semantic {
                assemblage,
                referenced,
            },
            versions: Vec::new(),
            write_sequence: 0,
        }
    }

    /// Appends a version.
    pub fn add_version(&mut self, stamp: StampSeq, data: VersionData) {
        self.versions.push(Version { stamp, data });
    }

    /// Stamp sequences of every version, in insertion order.
    pub fn stamps(&self) -> Vec<StampSeq> {
        self.versions.iter().map(|version| version.stamp).collect()
    }

    /// Returns true if any version carries the given stamp.
    pub fn has_stamp(&self, stamp: StampSeq) -> bool {
        self.versions.iter().any(|version| version.stamp == stamp)
    }

    /// The versions selected by a resolution outcome, in insertion order.
    pub fn versions_for(&self, latest: &Latest) -> Vec<&Version> {
        let stamps = latest.stamps();
        self.versions
            .iter()
            .filter(|version| stamps.contains(&version.stamp))
            .collect()
    }

    /// Merges another writer's chronicle into this one.
    ///
    /// Versions are unioned by stamp sequence: this chronicle keeps its
    /// insertion order and gains the other's versions it has not seen.
    /// The result is the same set of versions regardless of merge
    /// direction.
    pub(crate) fn merge_from(&mut self, other: &Chronicle) {
        for version in &other.versions {
            if !self.has_stamp(version.stamp) {
                self.versions.push(version.clone());
            }
        }
    }

    /// Serializes to the persisted record form.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(postcard::to_stdvec(self)?)
    }

    /// Deserializes from the persisted record form.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termdb_types::FIRST_NID;

    fn make_concept() -> Chronicle {
        Chronicle::new_concept(FIRST_NID, Uuid::new_v4(), 1)
    }

    #[test]
    fn test_versions_grow_in_insertion_order() {
        let mut chronicle = make_concept();
        chronicle.add_version(7, VersionData::Concept);
        chronicle.add_version(3, VersionData::Concept);

        assert_eq!(chronicle.stamps(), vec![7, 3]);
        assert!(chronicle.has_stamp(3));
        assert!(!chronicle.has_stamp(4));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut base = make_concept();
        base.add_version(1, VersionData::Concept);

        let mut left = base.clone();
        left.add_version(2, VersionData::Concept);
        let mut right = base.clone();
        right.add_version(3, VersionData::Concept);

        let mut merged_lr = left.clone();
        merged_lr.merge_from(&right);
        let mut merged_rl = right.clone();
        merged_rl.merge_from(&left);

        let mut stamps_lr = merged_lr.stamps();
        let mut stamps_rl = merged_rl.stamps();
        stamps_lr.sort_unstable();
        stamps_rl.sort_unstable();
        assert_eq!(stamps_lr, vec![1, 2, 3]);
        assert_eq!(stamps_lr, stamps_rl);
    }

    #[test]
    fn test_merge_does_not_duplicate_shared_versions() {
        let mut base = make_concept();
        base.add_version(1, VersionData::Concept);
        let other = base.clone();

        base.merge_from(&other);
        assert_eq!(base.versions.len(), 1);
    }

    #[test]
    fn test_record_roundtrip() {
        let mut chronicle = Chronicle::new_semantic(
            FIRST_NID + 2,
            Uuid::new_v4(),
            3,
            FIRST_NID,
            FIRST_NID + 1,
        );
        chronicle.add_version(5, VersionData::Text("Diabetes mellitus".to_string()));
        chronicle.write_sequence = 4;

        let bytes = chronicle.to_bytes().unwrap();
        let decoded = Chronicle::from_bytes(&bytes).unwrap();
        assert_eq!(chronicle, decoded);
    }

    #[test]
    fn test_versions_for_resolution() {
        let mut chronicle = make_concept();
        chronicle.add_version(1, VersionData::Concept);
        chronicle.add_version(2, VersionData::Concept);
        chronicle.add_version(3, VersionData::Concept);

        let picked = chronicle.versions_for(&Latest::Contradiction(vec![1, 3]));
        assert_eq!(
            picked.iter().map(|version| version.stamp).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert!(chronicle.versions_for(&Latest::Empty).is_empty());
    }
}
