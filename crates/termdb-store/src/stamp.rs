//! The stamp registry: interning, pending promotion, and the stamp log.
//!
//! This is the one place in the system with a global, contended critical
//! section, so the table is kept behind a read/write lock with a
//! double-checked slow path: the common case (an already-interned tuple)
//! takes only the read lock. Log appends happen outside the table lock.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use termdb_types::{Nid, Stamp, StampSeq, Status, TIME_CANCELED, TIME_PENDING};

use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    /// Committed tuples only; pending tuples are never shared.
    by_stamp: HashMap<Stamp, StampSeq>,
    by_seq: Vec<Stamp>,
}

/// Interns stamp tuples into small integer sequences.
///
/// Structurally equal committed tuples always intern to the same
/// sequence, including under concurrent callers. Pending stamps get a
/// fresh sequence per request and are promoted in place by
/// [`commit`](StampRegistry::commit) or retired by
/// [`cancel`](StampRegistry::cancel).
pub struct StampRegistry {
    tables: RwLock<Tables>,
    log: Option<Mutex<BufWriter<File>>>,
}

impl StampRegistry {
    /// Creates a purely in-memory registry.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            log: None,
        }
    }

    /// Opens a file-backed registry, replaying any existing stamp log.
    ///
    /// The log carries one record per intern, commit, or cancel
    /// transition; replay applies records in order, so the last record
    /// for a sequence wins.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let mut tables = Tables::default();
        match File::open(path) {
            Ok(mut file) => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                replay(&bytes, &mut tables, path);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        debug!(stamps = tables.by_seq.len(), "stamp registry opened");

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            tables: RwLock::new(tables),
            log: Some(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Interns a committed stamp tuple.
    ///
    /// Tuples carrying a time sentinel are rejected; pending stamps come
    /// from [`intern_pending`](StampRegistry::intern_pending).
    pub fn intern(&self, stamp: Stamp) -> StoreResult<StampSeq> {
        if stamp.is_pending() {
            return Err(StoreError::SentinelIntern { kind: "pending" });
        }
        if stamp.is_canceled() {
            return Err(StoreError::SentinelIntern { kind: "canceled" });
        }

        if let Some(sequence) = self.tables.read().by_stamp.get(&stamp) {
            return Ok(*sequence);
        }

        let sequence = {
            let mut tables = self.tables.write();
            // Re-check: a racing intern of the same tuple may have won.
            if let Some(sequence) = tables.by_stamp.get(&stamp) {
                return Ok(*sequence);
            }
            let sequence = tables.by_seq.len() as StampSeq;
            tables.by_seq.push(stamp);
            tables.by_stamp.insert(stamp, sequence);
            sequence
        };

        self.append(sequence, &stamp)?;
        Ok(sequence)
    }

    /// Allocates a fresh pending stamp.
    ///
    /// Pending stamps are intentionally not deduplicated: every open
    /// transaction gets its own sequence.
    pub fn intern_pending(
        &self,
        status: Status,
        author: Nid,
        module: Nid,
        path: Nid,
    ) -> StoreResult<StampSeq> {
        let stamp = Stamp {
            status,
            time: TIME_PENDING,
            author,
            module,
            path,
        };
        let sequence = {
            let mut tables = self.tables.write();
            let sequence = tables.by_seq.len() as StampSeq;
            tables.by_seq.push(stamp);
            sequence
        };
        self.append(sequence, &stamp)?;
        Ok(sequence)
    }

    /// Promotes a pending stamp to a committed one.
    ///
    /// The sentinel is replaced in place. If the finalized tuple was
    /// already interned under another sequence, the pending slot is
    /// retired and the existing sequence is returned; callers must use
    /// the returned sequence.
    pub fn commit(&self, pending: StampSeq, time: i64) -> StoreResult<StampSeq> {
        if time == TIME_PENDING || time == TIME_CANCELED {
            return Err(StoreError::SentinelIntern { kind: "sentinel" });
        }

        let (final_seq, committed, retired) = {
            let mut tables = self.tables.write();
            let slot = tables
                .by_seq
                .get(pending as usize)
                .copied()
                .ok_or(StoreError::UnknownStamp { sequence: pending })?;
            if !slot.is_pending() {
                return Err(StoreError::NotPending { sequence: pending });
            }

            let committed = Stamp { time, ..slot };
            if let Some(existing) = tables.by_stamp.get(&committed).copied() {
                // The tuple already exists; retire the pending slot.
                let canceled = Stamp {
                    time: TIME_CANCELED,
                    ..slot
                };
                tables.by_seq[pending as usize] = canceled;
                (existing, committed, Some(canceled))
            } else {
                tables.by_seq[pending as usize] = committed;
                tables.by_stamp.insert(committed, pending);
                (pending, committed, None)
            }
        };

        match retired {
            Some(canceled) => self.append(pending, &canceled)?,
            None => self.append(final_seq, &committed)?,
        }
        Ok(final_seq)
    }

    /// Discards a pending stamp.
    pub fn cancel(&self, pending: StampSeq) -> StoreResult<()> {
        let canceled = {
            let mut tables = self.tables.write();
            let slot = tables
                .by_seq
                .get(pending as usize)
                .copied()
                .ok_or(StoreError::UnknownStamp { sequence: pending })?;
            if !slot.is_pending() {
                return Err(StoreError::NotPending { sequence: pending });
            }
            let canceled = Stamp {
                time: TIME_CANCELED,
                ..slot
            };
            tables.by_seq[pending as usize] = canceled;
            canceled
        };
        self.append(pending, &canceled)
    }

    /// Resolves a sequence back to its tuple.
    pub fn resolve(&self, sequence: StampSeq) -> StoreResult<Stamp> {
        self.tables
            .read()
            .by_seq
            .get(sequence as usize)
            .copied()
            .ok_or(StoreError::UnknownStamp { sequence })
    }

    /// Number of sequences ever issued, including retired ones.
    pub fn stamp_count(&self) -> usize {
        self.tables.read().by_seq.len()
    }

    fn append(&self, sequence: StampSeq, stamp: &Stamp) -> StoreResult<()> {
        let Some(log) = &self.log else {
            return Ok(());
        };
        let payload = postcard::to_stdvec(&(sequence, *stamp))?;
        let mut writer = log.lock();
        writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        writer.write_all(&payload)?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for StampRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn replay(bytes: &[u8], tables: &mut Tables, path: &Path) {
    let mut offset = 0;
    while offset + 4 <= bytes.len() {
        let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        if offset + 4 + len > bytes.len() {
            // Truncated tail from an interrupted append.
            warn!(path = %path.display(), "stamp log ends mid-record, dropping tail");
            return;
        }
        let record = &bytes[offset + 4..offset + 4 + len];
        offset += 4 + len;
        let Ok((sequence, stamp)) = postcard::from_bytes::<(StampSeq, Stamp)>(record) else {
            warn!(path = %path.display(), "undecodable stamp record, dropping tail");
            return;
        };
        let slot = sequence as usize;
        if tables.by_seq.len() <= slot {
            tables.by_seq.resize(
                slot + 1,
                Stamp {
                    status: Status::Inactive,
                    time: TIME_CANCELED,
                    author: termdb_types::NID_NONE,
                    module: termdb_types::NID_NONE,
                    path: termdb_types::NID_NONE,
                },
            );
        }
        tables.by_seq[slot] = stamp;
    }
    for (slot, stamp) in tables.by_seq.iter().enumerate() {
        if stamp.is_committed() {
            tables.by_stamp.insert(*stamp, slot as StampSeq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termdb_types::FIRST_NID;

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
    fn test_equal_tuples_intern_once() {
        let registry = StampRegistry::new();
        let a = registry.intern(make_stamp(100)).unwrap();
        let b = registry.intern(make_stamp(100)).unwrap();
        let c = registry.intern(make_stamp(200)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.resolve(a).unwrap(), make_stamp(100));
    }

    #[test]
    fn test_concurrent_intern_is_deterministic() {
        let registry = StampRegistry::new();
        let stamp = make_stamp(12345);

        let sequences: Vec<StampSeq> = std::thread::scope(|scope| {
            (0..16)
                .map(|_| scope.spawn(|| registry.intern(stamp).unwrap()))
                .collect::<Vec<_>>()
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        assert!(sequences.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(registry.stamp_count(), 1);
    }

    #[test]
    fn test_sentinel_intern_rejected() {
        let registry = StampRegistry::new();
        assert!(matches!(
            registry.intern(make_stamp(TIME_PENDING)),
            Err(StoreError::SentinelIntern { kind: "pending" })
        ));
        assert!(matches!(
            registry.intern(make_stamp(TIME_CANCELED)),
            Err(StoreError::SentinelIntern { kind: "canceled" })
        ));
    }

    #[test]
    fn test_pending_stamps_are_never_shared() {
        let registry = StampRegistry::new();
        let a = registry
            .intern_pending(Status::Active, FIRST_NID, FIRST_NID + 1, FIRST_NID + 2)
            .unwrap();
        let b = registry
            .intern_pending(Status::Active, FIRST_NID, FIRST_NID + 1, FIRST_NID + 2)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_commit_replaces_in_place() {
        let registry = StampRegistry::new();
        let pending = registry
            .intern_pending(Status::Active, FIRST_NID, FIRST_NID + 1, FIRST_NID + 2)
            .unwrap();

        let committed = registry.commit(pending, 500).unwrap();
        assert_eq!(committed, pending);
        let resolved = registry.resolve(committed).unwrap();
        assert_eq!(resolved.time, 500);
        assert!(resolved.is_committed());

        // A second commit of the same sequence is an error.
        assert!(matches!(
            registry.commit(pending, 600),
            Err(StoreError::NotPending { .. })
        ));
    }

    #[test]
    fn test_commit_collapses_onto_existing_tuple() {
        let registry = StampRegistry::new();
        let existing = registry.intern(make_stamp(500)).unwrap();
        let pending = registry
            .intern_pending(Status::Active, FIRST_NID, FIRST_NID + 1, FIRST_NID + 2)
            .unwrap();

        let committed = registry.commit(pending, 500).unwrap();
        assert_eq!(committed, existing);
        // The pending slot was retired, never reused.
        assert!(registry.resolve(pending).unwrap().is_canceled());
    }

    #[test]
    fn test_cancel_discards_pending() {
        let registry = StampRegistry::new();
        let pending = registry
            .intern_pending(Status::Active, FIRST_NID, FIRST_NID + 1, FIRST_NID + 2)
            .unwrap();

        registry.cancel(pending).unwrap();
        assert!(registry.resolve(pending).unwrap().is_canceled());
        assert!(matches!(
            registry.cancel(pending),
            Err(StoreError::NotPending { .. })
        ));
    }

    #[test]
    fn test_log_replay_restores_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamps.log");

        let (committed, canceled) = {
            let registry = StampRegistry::open(&path).unwrap();
            let committed = registry.intern(make_stamp(750)).unwrap();
            let pending = registry
                .intern_pending(Status::Inactive, FIRST_NID, FIRST_NID + 1, FIRST_NID + 2)
                .unwrap();
            registry.cancel(pending).unwrap();
            (committed, pending)
        };

        let reopened = StampRegistry::open(&path).unwrap();
        assert_eq!(reopened.resolve(committed).unwrap(), make_stamp(750));
        assert!(reopened.resolve(canceled).unwrap().is_canceled());
        // The committed tuple still dedups after replay.
        assert_eq!(reopened.intern(make_stamp(750)).unwrap(), committed);
    }
}
