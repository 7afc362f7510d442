//! The durable backing log for chronicle records.
//!
//! A single append-only file: a magic header, then framed records of
//! `(nid, payload length, payload)`. The newest record per nid wins.
//! Appends are flushed before the in-memory latest map is updated, so a
//! failed write leaves the prior durable state intact. A truncated tail
//! (crash mid-append) is tolerated on replay and logged.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use termdb_types::Nid;

use crate::error::{StoreError, StoreResult};

const MAGIC: &[u8; 8] = b"TDBCHRN1";

/// Append-only key/bytes log keyed by nid.
pub(crate) struct LogStore {
    writer: Mutex<BufWriter<File>>,
    latest: RwLock<HashMap<Nid, Vec<u8>>>,
    /// Nids in order of first appearance, for deterministic scans.
    order: RwLock<Vec<Nid>>,
}

impl LogStore {
    /// Opens or creates the log at `path`, replaying existing records.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let mut latest = HashMap::new();
        let mut order = Vec::new();

        match File::open(path) {
            Ok(mut file) => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
                    return Err(StoreError::Corrupt {
                        file: path.display().to_string(),
                        detail: "missing log header".to_string(),
                    });
                }
                replay(&bytes[MAGIC.len()..], &mut latest, &mut order, path);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let mut file = File::create(path)?;
                file.write_all(MAGIC)?;
                file.sync_all()?;
            }
            Err(err) => return Err(err.into()),
        }

        debug!(
            path = %path.display(),
            records = latest.len(),
            "chronicle log opened"
        );
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            latest: RwLock::new(latest),
            order: RwLock::new(order),
        })
    }

    /// Durably appends a record, then publishes it to readers.
    pub fn put(&self, nid: Nid, payload: &[u8]) -> StoreResult<()> {
        {
            let mut writer = self.writer.lock();
            writer.write_all(&nid.to_le_bytes())?;
            writer.write_all(&(payload.len() as u32).to_le_bytes())?;
            writer.write_all(payload)?;
            writer.flush()?;
        }
        let mut latest = self.latest.write();
        if latest.insert(nid, payload.to_vec()).is_none() {
            self.order.write().push(nid);
        }
        Ok(())
    }

    /// The newest payload for a nid.
    pub fn get(&self, nid: Nid) -> Option<Vec<u8>> {
        self.latest.read().get(&nid).cloned()
    }

    /// Snapshot of every nid's newest payload, in first-appearance order.
    pub fn scan(&self) -> Vec<(Nid, Vec<u8>)> {
        let latest = self.latest.read();
        self.order
            .read()
            .iter()
            .filter_map(|nid| latest.get(nid).map(|bytes| (*nid, bytes.clone())))
            .collect()
    }

    /// Number of distinct nids in the log.
    pub fn len(&self) -> usize {
        self.latest.read().len()
    }
}

fn replay(
    bytes: &[u8],
    latest: &mut HashMap<Nid, Vec<u8>>,
    order: &mut Vec<Nid>,
    path: &Path,
) {
    let mut offset = 0;
    while offset + 8 <= bytes.len() {
        let nid = Nid::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        let len =
            u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize;
        if offset + 8 + len > bytes.len() {
            warn!(path = %path.display(), "chronicle log ends mid-record, dropping tail");
            return;
        }
        let payload = bytes[offset + 8..offset + 8 + len].to_vec();
        offset += 8 + len;
        if latest.insert(nid, payload).is_none() {
            order.push(nid);
        }
    }
    if offset != bytes.len() {
        warn!(path = %path.display(), "chronicle log ends mid-header, dropping tail");
    }
}
