//! The chronicle store facade.
//!
//! Owns the durable backing log, the in-memory chronicle map, the
//! assemblage index, and the identity/stamp/path services, and wires them
//! into the write path: constraint check, generation check, merge on
//! conflict, durable append, map publish, synchronous index insert. A
//! write is complete only once its index entries are visible to readers.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

use termdb_types::{
    ComponentKind, ElementSeq, Nid, StampCoordinate, StampSeq, VersionData,
};

use crate::backing::LogStore;
use crate::chronicle::Chronicle;
use crate::error::{StoreError, StoreResult};
use crate::identity::IdentityService;
use crate::index::{AssemblageIndex, WriteConstraint};
use crate::paths::PathRegistry;
use crate::position::{Latest, RelativePositionCalculator};
use crate::stamp::StampRegistry;

const WRITE_STRIPES: usize = 64;

const CHRONICLE_LOG: &str = "chronicles.log";
const STAMP_LOG: &str = "stamps.log";
const INDEX_KEYS: &str = "index.keys";

/// The bitemporal component store.
///
/// Writers to different nids proceed freely in parallel; writers racing
/// on the same nid are serialized by a lock stripe and merged through the
/// chronicle's generation counter, so no committed version is ever lost
/// to a concurrent overwrite.
pub struct ChronicleStore {
    identity: Arc<IdentityService>,
    stamps: Arc<StampRegistry>,
    paths: Arc<PathRegistry>,
    calculator: RelativePositionCalculator,
    backing: LogStore,
    chronicles: RwLock<HashMap<Nid, Arc<Chronicle>>>,
    index: AssemblageIndex,
    index_path: PathBuf,
    stripes: Vec<Mutex<()>>,
    /// Pending stamp -> chronicles carrying a staged version of it.
    pending: RwLock<HashMap<StampSeq, BTreeSet<Nid>>>,
}

impl ChronicleStore {
    /// Opens a store rooted at `dir`, creating it on first run.
    ///
    /// Replays the chronicle log, restores identities, and loads the
    /// index key log — or rebuilds the index from the chronicle scan when
    /// the key log is absent, corrupt, or stale. The key log is only a
    /// cache; the chronicle log stays authoritative.
    pub fn open(
        dir: &Path,
        identity: Arc<IdentityService>,
        paths: Arc<PathRegistry>,
    ) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let stamps = Arc::new(StampRegistry::open(&dir.join(STAMP_LOG))?);
        let backing = LogStore::open(&dir.join(CHRONICLE_LOG))?;

        let mut chronicles = HashMap::new();
        let mut pending: HashMap<StampSeq, BTreeSet<Nid>> = HashMap::new();
        let mut semantic_count = 0usize;
        for (nid, bytes) in backing.scan() {
            let chronicle = Chronicle::from_bytes(&bytes)?;
            identity.restore(nid, chronicle.primordial_uuid, chronicle.sequence);
            if !chronicle.kind.is_concept() {
                semantic_count += 1;
            }
            for stamp in chronicle.stamps() {
                if stamps.resolve(stamp).map(|s| s.is_pending()).unwrap_or(false) {
                    pending.entry(stamp).or_default().insert(nid);
                }
            }
            chronicles.insert(nid, Arc::new(chronicle));
        }
        debug!(chronicles = backing.len(), "chronicle store opened");

        let index_path = dir.join(INDEX_KEYS);
        let index = match AssemblageIndex::load(&index_path) {
            Ok(Some(index)) if index.key_counts().0 == semantic_count => index,
            Ok(Some(_)) => {
                warn!("index key log is stale, rebuilding from chronicle store");
                rebuild_index(&chronicles, &identity)
            }
            Ok(None) => rebuild_index(&chronicles, &identity),
            Err(err) => {
                warn!(error = %err, "index key log unreadable, rebuilding from chronicle store");
                rebuild_index(&chronicles, &identity)
            }
        };

        let calculator = RelativePositionCalculator::new(stamps.clone(), paths.clone());
        Ok(Self {
            identity,
            stamps,
            paths,
            calculator,
            backing,
            chronicles: RwLock::new(chronicles),
            index,
            index_path,
            stripes: (0..WRITE_STRIPES).map(|_| Mutex::new(())).collect(),
            pending: RwLock::new(pending),
        })
    }

    /// The identity service this store was opened with.
    pub fn identity(&self) -> &Arc<IdentityService> {
        &self.identity
    }

    /// The stamp registry backing this store.
    pub fn stamps(&self) -> &Arc<StampRegistry> {
        &self.stamps
    }

    /// The path registry this store was opened with.
    pub fn paths(&self) -> &Arc<PathRegistry> {
        &self.paths
    }

    /// The relative position calculator over this store's registries.
    pub fn calculator(&self) -> &RelativePositionCalculator {
        &self.calculator
    }

    /// Reads a component's chronicle.
    ///
    /// # Panics
    ///
    /// Panics if `nid` was never issued by the identity layer; that is a
    /// programming error, not a recoverable condition.
    pub fn read(&self, nid: Nid) -> Option<Arc<Chronicle>> {
        assert!(
            self.identity.is_known(nid),
            "nid {nid} was never issued by the identity layer"
        );
        self.chronicles.read().get(&nid).cloned()
    }

    /// A writable copy of a chronicle with one staged version appended.
    ///
    /// The copy carries the generation it was read at; pass it back to
    /// [`write`](ChronicleStore::write) to persist.
    pub fn create_mutable_version(
        &self,
        nid: Nid,
        stamp: StampSeq,
        data: VersionData,
    ) -> StoreResult<Chronicle> {
        let current = self.read(nid).ok_or(StoreError::NoChronicle { nid })?;
        let mut copy = (*current).clone();
        copy.add_version(stamp, data);
        Ok(copy)
    }

    /// Persists a chronicle with no structural constraints.
    pub fn write(&self, chronicle: Chronicle) -> StoreResult<Arc<Chronicle>> {
        self.write_with(chronicle, &[])
    }

    /// Persists a chronicle, evaluating structural constraints first.
    ///
    /// A constraint failure rejects the write with no state change. On a
    /// generation conflict the incoming versions are merged into the
    /// latest stored chronicle rather than overwriting it, and the bytes
    /// actually persisted are re-deserialized as the canonical result.
    ///
    /// # Panics
    ///
    /// Panics if the chronicle's nid — or, for a semantic annotation, its
    /// assemblage or referenced nid — was never issued by the identity
    /// layer.
    pub fn write_with(
        &self,
        mut chronicle: Chronicle,
        constraints: &[WriteConstraint],
    ) -> StoreResult<Arc<Chronicle>> {
        let nid = chronicle.nid;
        assert!(
            self.identity.is_known(nid),
            "nid {nid} was never issued by the identity layer"
        );

        let semantic = match chronicle.kind {
            ComponentKind::Concept => None,
            ComponentKind::Semantic {
                assemblage,
                referenced,
            } => {
                assert!(
                    self.identity.is_known(referenced),
                    "referenced nid {referenced} was never issued by the identity layer"
                );
                let assemblage_seq = self
                    .identity
                    .sequence_for_nid(assemblage)
                    .unwrap_or_else(|| {
                        panic!("assemblage nid {assemblage} was never issued by the identity layer")
                    });
                Some((referenced, assemblage_seq, chronicle.sequence))
            }
        };

        // Serialize racing writers on this nid, and on the referenced
        // component so constraint checks cannot interleave.
        let _guards = self.lock_stripes(nid, semantic.map(|(referenced, _, _)| referenced));

        if let Some((referenced, assemblage_seq, member_seq)) = semantic {
            for constraint in constraints {
                self.index
                    .check(*constraint, referenced, assemblage_seq, member_seq)?;
            }
        }

        let current = self.chronicles.read().get(&nid).cloned();
        let current_generation = current.as_ref().map(|c| c.write_sequence).unwrap_or(0);
        if let Some(current) = &current {
            if chronicle.write_sequence != current.write_sequence {
                debug!(
                    nid,
                    stored = current.write_sequence,
                    incoming = chronicle.write_sequence,
                    "concurrent write detected, merging version lists"
                );
                let mut merged = (**current).clone();
                merged.merge_from(&chronicle);
                chronicle = merged;
            }
        }
        chronicle.write_sequence = current_generation + 1;

        let canonical = self.persist(chronicle)?;

        if let Some((referenced, assemblage_seq, member_seq)) = semantic {
            self.index.insert(referenced, assemblage_seq, member_seq);
        }
        Ok(canonical)
    }

    /// Promotes a pending stamp and finalizes every chronicle staged on
    /// it.
    ///
    /// Returns the final stamp sequence, which may differ from the
    /// pending one when the committed tuple was already interned.
    pub fn commit_pending(&self, pending: StampSeq, time: i64) -> StoreResult<StampSeq> {
        let final_stamp = self.stamps.commit(pending, time)?;
        let nids = self.pending.write().remove(&pending).unwrap_or_default();
        for nid in nids {
            let _guards = self.lock_stripes(nid, None);
            let Some(current) = self.chronicles.read().get(&nid).cloned() else {
                continue;
            };
            let mut updated = (*current).clone();
            for version in &mut updated.versions {
                if version.stamp == pending {
                    version.stamp = final_stamp;
                }
            }
            updated.write_sequence = current.write_sequence + 1;
            self.persist(updated)?;
        }
        debug!(pending, final_stamp, "pending stamp committed");
        Ok(final_stamp)
    }

    /// Discards a pending stamp and every version staged on it.
    pub fn cancel_pending(&self, pending: StampSeq) -> StoreResult<()> {
        self.stamps.cancel(pending)?;
        let nids = self.pending.write().remove(&pending).unwrap_or_default();
        for nid in nids {
            let _guards = self.lock_stripes(nid, None);
            let Some(current) = self.chronicles.read().get(&nid).cloned() else {
                continue;
            };
            let mut updated = (*current).clone();
            updated.versions.retain(|version| version.stamp != pending);
            updated.write_sequence = current.write_sequence + 1;
            self.persist(updated)?;
        }
        debug!(pending, "pending stamp canceled");
        Ok(())
    }

    /// Resolves a component's latest visible versions under a coordinate.
    pub fn latest_for(&self, nid: Nid, coordinate: &StampCoordinate) -> StoreResult<Latest> {
        let chronicle = self.read(nid).ok_or(StoreError::NoChronicle { nid })?;
        self.calculator.latest(&chronicle.stamps(), coordinate)
    }

    /// Members of an assemblage, ascending.
    pub fn members_of(&self, assemblage: ElementSeq) -> Vec<ElementSeq> {
        self.index.members_of(assemblage)
    }

    /// Annotations of a component, optionally restricted to an assemblage.
    pub fn annotations_of(
        &self,
        referenced: Nid,
        assemblage: Option<ElementSeq>,
    ) -> Vec<ElementSeq> {
        self.index.annotations_of(referenced, assemblage)
    }

    /// Number of chronicles in the store.
    pub fn component_count(&self) -> usize {
        self.chronicles.read().len()
    }

    /// A snapshot of every chronicle, in no particular order.
    ///
    /// Intended for full scans (exporters, index rebuilds); point reads
    /// go through [`read`](ChronicleStore::read).
    pub fn chronicles(&self) -> Vec<Arc<Chronicle>> {
        self.chronicles.read().values().cloned().collect()
    }

    /// Sequences of every concept chronicle, ascending.
    pub fn concept_sequences(&self) -> Vec<ElementSeq> {
        self.sequences_where(|kind| kind.is_concept())
    }

    /// Sequences of every chronicle, ascending.
    pub fn component_sequences(&self) -> Vec<ElementSeq> {
        self.sequences_where(|_| true)
    }

    /// Flattens the assemblage index to its key log.
    ///
    /// Called on clean shutdown (also attempted on drop); losing the key
    /// log only costs a rebuild on the next open.
    pub fn save_index(&self) -> StoreResult<()> {
        self.index.save(&self.index_path)
    }

    fn sequences_where(&self, keep: impl Fn(&ComponentKind) -> bool) -> Vec<ElementSeq> {
        let mut sequences: Vec<ElementSeq> = self
            .chronicles
            .read()
            .values()
            .filter(|chronicle| keep(&chronicle.kind))
            .map(|chronicle| chronicle.sequence)
            .collect();
        sequences.sort_unstable();
        sequences
    }

    /// Serializes, durably appends, re-deserializes, and publishes a
    /// chronicle. Callers hold the nid's stripe lock.
    fn persist(&self, chronicle: Chronicle) -> StoreResult<Arc<Chronicle>> {
        let nid = chronicle.nid;
        let bytes = chronicle.to_bytes()?;
        self.backing.put(nid, &bytes)?;
        let canonical = Arc::new(Chronicle::from_bytes(&bytes)?);

        self.chronicles.write().insert(nid, canonical.clone());

        let mut pending = self.pending.write();
        for stamp in canonical.stamps() {
            if self
                .stamps
                .resolve(stamp)
                .map(|s| s.is_pending())
                .unwrap_or(false)
            {
                pending.entry(stamp).or_default().insert(nid);
            }
        }
        Ok(canonical)
    }

    fn lock_stripes(&self, nid: Nid, other: Option<Nid>) -> Vec<MutexGuard<'_, ()>> {
        let mut indices = vec![stripe_of(nid)];
        if let Some(other) = other {
            indices.push(stripe_of(other));
        }
        indices.sort_unstable();
        indices.dedup();
        indices
            .into_iter()
            .map(|index| self.stripes[index].lock())
            .collect()
    }
}

impl Drop for ChronicleStore {
    fn drop(&mut self) {
        if let Err(err) = self.save_index() {
            warn!(error = %err, "failed to save index key log on shutdown");
        }
    }
}

fn stripe_of(nid: Nid) -> usize {
    (nid as i64).unsigned_abs() as usize % WRITE_STRIPES
}

fn rebuild_index(
    chronicles: &HashMap<Nid, Arc<Chronicle>>,
    identity: &IdentityService,
) -> AssemblageIndex {
    AssemblageIndex::rebuild(
        chronicles.values().map(Arc::as_ref),
        |nid| identity.sequence_for_nid(nid),
    )
}
