//! The assemblage index: durable secondary indices over the chronicle
//! store.
//!
//! Two ordered key sets answer the two hot read patterns: "all members of
//! assemblage X" and "all annotations of component Y". Entries are
//! inserted synchronously with the write that introduces them and never
//! removed for committed data; visibility filtering happens at read time.
//! The on-disk key log is a cache — when it is missing or corrupt the
//! index is rebuilt from the chronicle store, which stays authoritative.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use termdb_types::{ComponentKind, ElementSeq, MembershipKey, Nid, ReferenceKey};

use crate::chronicle::Chronicle;
use crate::error::{StoreError, StoreResult};

const KEY_LOG_VERSION: u8 = 1;

/// Structural constraints evaluated on the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteConstraint {
    /// At most one member of the assemblage per referenced component.
    ///
    /// Re-writing the member already in place is an idempotent success;
    /// any other member is a structural conflict.
    OnePerComponent,
}

#[derive(Serialize, Deserialize)]
struct KeyLog {
    version: u8,
    memberships: Vec<MembershipKey>,
    references: Vec<ReferenceKey>,
}

/// In-memory ordered indices with key-log persistence.
pub struct AssemblageIndex {
    memberships: RwLock<BTreeSet<MembershipKey>>,
    references: RwLock<BTreeSet<ReferenceKey>>,
}

impl Default for AssemblageIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AssemblageIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            memberships: RwLock::new(BTreeSet::new()),
            references: RwLock::new(BTreeSet::new()),
        }
    }

    /// Inserts the entries for one semantic component. Idempotent.
    pub fn insert(&self, referenced: Nid, assemblage: ElementSeq, member: ElementSeq) {
        self.memberships.write().insert(MembershipKey {
            assemblage,
            member,
        });
        self.references.write().insert(ReferenceKey {
            referenced,
            assemblage,
            member,
        });
    }

    /// Checks a structural constraint against the current index state.
    pub fn check(
        &self,
        constraint: WriteConstraint,
        referenced: Nid,
        assemblage: ElementSeq,
        member: ElementSeq,
    ) -> StoreResult<()> {
        match constraint {
            WriteConstraint::OnePerComponent => {
                let references = self.references.read();
                let mut range =
                    references.range(ReferenceKey::assemblage_range(referenced, assemblage));
                if let Some(existing) = range.find(|key| key.member != member) {
                    return Err(StoreError::StructuralConflict {
                        referenced,
                        assemblage,
                        existing: existing.member,
                        incoming: member,
                    });
                }
                Ok(())
            }
        }
    }

    /// Members of an assemblage, ascending. A half-open range scan.
    pub fn members_of(&self, assemblage: ElementSeq) -> Vec<ElementSeq> {
        self.memberships
            .read()
            .range(MembershipKey::assemblage_range(assemblage))
            .map(|key| key.member)
            .collect()
    }

    /// Annotations of a component, ascending, optionally restricted to
    /// one assemblage.
    pub fn annotations_of(
        &self,
        referenced: Nid,
        assemblage: Option<ElementSeq>,
    ) -> Vec<ElementSeq> {
        let references = self.references.read();
        let range = match assemblage {
            Some(assemblage) => ReferenceKey::assemblage_range(referenced, assemblage),
            None => ReferenceKey::component_range(referenced),
        };
        references.range(range).map(|key| key.member).collect()
    }

    /// Number of (membership, reference) keys held.
    pub fn key_counts(&self) -> (usize, usize) {
        (self.memberships.read().len(), self.references.read().len())
    }

    /// Flattens the index to its compact key log.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let log = KeyLog {
            version: KEY_LOG_VERSION,
            memberships: self.memberships.read().iter().copied().collect(),
            references: self.references.read().iter().copied().collect(),
        };
        fs::write(path, postcard::to_stdvec(&log)?)?;
        debug!(
            path = %path.display(),
            memberships = log.memberships.len(),
            references = log.references.len(),
            "index key log saved"
        );
        Ok(())
    }

    /// Loads the index from its key log.
    ///
    /// Returns `Ok(None)` when the log does not exist; decoding or
    /// version failures are errors so the caller can fall back to a
    /// rebuild.
    pub fn load(path: &Path) -> StoreResult<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let log: KeyLog = postcard::from_bytes(&bytes)?;
        if log.version != KEY_LOG_VERSION {
            return Err(StoreError::Corrupt {
                file: path.display().to_string(),
                detail: format!("unsupported key log version {}", log.version),
            });
        }
        let index = Self {
            memberships: RwLock::new(log.memberships.into_iter().collect()),
            references: RwLock::new(log.references.into_iter().collect()),
        };
        Ok(Some(index))
    }

    /// Re-derives both key sets from a chronicle scan.
    ///
    /// `sequence_of` maps a nid to its element sequence; chronicles whose
    /// assemblage is unknown to the identity layer cannot occur in a
    /// well-formed store.
    pub fn rebuild<'a>(
        chronicles: impl IntoIterator<Item = &'a Chronicle>,
        sequence_of: impl Fn(Nid) -> Option<ElementSeq>,
    ) -> Self {
        let index = Self::new();
        let mut entries = 0usize;
        for chronicle in chronicles {
            if let ComponentKind::Semantic {
                assemblage,
                referenced,
            } = chronicle.kind
            {
                if let Some(assemblage_seq) = sequence_of(assemblage) {
                    index.insert(referenced, assemblage_seq, chronicle.sequence);
                    entries += 1;
                }
            }
        }
        debug!(entries, "assemblage index rebuilt from chronicle scan");
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_range_scan_exactness() {
        let index = AssemblageIndex::new();
        for member in [3, 7, 9] {
            index.insert(-50, 1, member);
        }
        // Writes into a different assemblage do not leak into the scan.
        index.insert(-50, 2, 4);

        assert_eq!(index.members_of(1), vec![3, 7, 9]);
        assert_eq!(index.members_of(2), vec![4]);
        assert!(index.members_of(3).is_empty());
    }

    #[test]
    fn test_annotations_scan_with_and_without_assemblage() {
        let index = AssemblageIndex::new();
        index.insert(-50, 1, 10);
        index.insert(-50, 2, 11);
        index.insert(-51, 1, 12);

        assert_eq!(index.annotations_of(-50, None), vec![10, 11]);
        assert_eq!(index.annotations_of(-50, Some(2)), vec![11]);
        assert!(index.annotations_of(-52, None).is_empty());
    }

    #[test]
    fn test_one_per_component_conflict() {
        let index = AssemblageIndex::new();
        index.insert(-50, 1, 10);

        // The same member again is an idempotent update.
        index
            .check(WriteConstraint::OnePerComponent, -50, 1, 10)
            .unwrap();

        // A different member for the same (component, assemblage) is not.
        let err = index
            .check(WriteConstraint::OnePerComponent, -50, 1, 11)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StructuralConflict {
                existing: 10,
                incoming: 11,
                ..
            }
        ));

        // A different assemblage is unconstrained.
        index
            .check(WriteConstraint::OnePerComponent, -50, 2, 11)
            .unwrap();
    }

    #[test]
    fn test_key_log_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.keys");

        let index = AssemblageIndex::new();
        index.insert(-50, 1, 10);
        index.insert(-51, 2, 11);
        index.save(&path).unwrap();

        let loaded = AssemblageIndex::load(&path).unwrap().unwrap();
        assert_eq!(loaded.members_of(1), vec![10]);
        assert_eq!(loaded.annotations_of(-51, Some(2)), vec![11]);
        assert_eq!(loaded.key_counts(), index.key_counts());
    }

    #[test]
    fn test_missing_key_log_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AssemblageIndex::load(&dir.path().join("absent.keys"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_corrupt_key_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.keys");
        fs::write(&path, b"\xFF\xFF\xFF garbage").unwrap();

        assert!(AssemblageIndex::load(&path).is_err());
    }

    #[test]
    fn test_rebuild_from_chronicles() {
        let assemblage_nid = -60;
        let mut semantic = Chronicle::new_semantic(-70, Uuid::new_v4(), 5, assemblage_nid, -80);
        semantic.add_version(0, termdb_types::VersionData::Membership);
        let concept = Chronicle::new_concept(-80, Uuid::new_v4(), 2);

        let chronicles = vec![concept, semantic];
        let index = AssemblageIndex::rebuild(&chronicles, |nid| {
            (nid == assemblage_nid).then_some(9)
        });

        assert_eq!(index.members_of(9), vec![5]);
        assert_eq!(index.annotations_of(-80, Some(9)), vec![5]);
    }
}
