//! The identity layer: UUIDs, nids, and element sequences.
//!
//! Every component enters the system here. External identity is one or
//! more UUIDs; the identity service maps them onto a process-stable nid
//! and a dense element sequence. The service is an explicit, injectable
//! object — tests build as many independent ones as they like.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use termdb_types::{ElementSeq, Nid, FIRST_ELEMENT_SEQ, FIRST_NID};

#[derive(Default)]
struct Tables {
    by_uuid: HashMap<Uuid, Nid>,
    uuids: HashMap<Nid, Vec<Uuid>>,
    sequence_of: HashMap<Nid, ElementSeq>,
    /// Indexed by `sequence - FIRST_ELEMENT_SEQ`.
    nid_of: Vec<Nid>,
    next_nid: Nid,
}

/// Issues and resolves component identities.
///
/// Nids are allocated densely upward from [`FIRST_NID`], element
/// sequences upward from [`FIRST_ELEMENT_SEQ`]; neither is ever reused.
/// All methods are safe to call from any thread.
pub struct IdentityService {
    tables: RwLock<Tables>,
}

impl Default for IdentityService {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityService {
    /// Creates an empty identity service.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_nid: FIRST_NID,
                ..Tables::default()
            }),
        }
    }

    /// Resolves a UUID to its nid, allocating on first sight.
    ///
    /// Idempotent: equal UUIDs always resolve to the same nid, including
    /// under concurrent callers.
    pub fn nid_for_uuid(&self, uuid: Uuid) -> Nid {
        if let Some(nid) = self.tables.read().by_uuid.get(&uuid) {
            return *nid;
        }
        let mut tables = self.tables.write();
        // Re-check: another thread may have allocated while we waited.
        if let Some(nid) = tables.by_uuid.get(&uuid) {
            return *nid;
        }
        let nid = tables.next_nid;
        tables.next_nid += 1;
        let sequence = FIRST_ELEMENT_SEQ + tables.nid_of.len() as ElementSeq;
        tables.by_uuid.insert(uuid, nid);
        tables.uuids.insert(nid, vec![uuid]);
        tables.sequence_of.insert(nid, sequence);
        tables.nid_of.push(nid);
        nid
    }

    /// Looks up a UUID without allocating.
    pub fn get_nid(&self, uuid: Uuid) -> Option<Nid> {
        self.tables.read().by_uuid.get(&uuid).copied()
    }

    /// Registers an additional UUID for an existing component.
    ///
    /// # Panics
    ///
    /// Panics if `nid` was never issued by this service.
    pub fn append_uuid(&self, nid: Nid, uuid: Uuid) {
        let mut tables = self.tables.write();
        assert!(
            tables.uuids.contains_key(&nid),
            "nid {nid} was never issued by this identity service"
        );
        tables.by_uuid.insert(uuid, nid);
        let list = tables.uuids.entry(nid).or_default();
        if !list.contains(&uuid) {
            list.push(uuid);
        }
    }

    /// All UUIDs registered for a component, primordial first.
    pub fn uuids_for_nid(&self, nid: Nid) -> Vec<Uuid> {
        self.tables.read().uuids.get(&nid).cloned().unwrap_or_default()
    }

    /// The element sequence of a component.
    pub fn sequence_for_nid(&self, nid: Nid) -> Option<ElementSeq> {
        self.tables.read().sequence_of.get(&nid).copied()
    }

    /// The nid holding a given element sequence.
    pub fn nid_for_sequence(&self, sequence: ElementSeq) -> Option<Nid> {
        if sequence < FIRST_ELEMENT_SEQ {
            return None;
        }
        self.tables
            .read()
            .nid_of
            .get((sequence - FIRST_ELEMENT_SEQ) as usize)
            .copied()
    }

    /// Returns true if this service ever issued the given nid.
    pub fn is_known(&self, nid: Nid) -> bool {
        self.tables.read().uuids.contains_key(&nid)
    }

    /// Number of components known to this service.
    pub fn component_count(&self) -> usize {
        self.tables.read().nid_of.len()
    }

    /// Re-registers an identity restored from the chronicle log.
    ///
    /// Used during store open, before any fresh allocation. Keeps the
    /// allocation counters beyond every restored identity. Idempotent
    /// per nid.
    pub(crate) fn restore(&self, nid: Nid, uuid: Uuid, sequence: ElementSeq) {
        let mut tables = self.tables.write();
        if tables.uuids.contains_key(&nid) {
            return;
        }
        tables.by_uuid.insert(uuid, nid);
        tables.uuids.insert(nid, vec![uuid]);
        tables.sequence_of.insert(nid, sequence);
        let slot = (sequence - FIRST_ELEMENT_SEQ) as usize;
        if tables.nid_of.len() <= slot {
            tables.nid_of.resize(slot + 1, termdb_types::NID_NONE);
        }
        tables.nid_of[slot] = nid;
        if nid >= tables.next_nid {
            tables.next_nid = nid + 1;
        }
    }
}
