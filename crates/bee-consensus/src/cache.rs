// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - SPORK CACHE
//
// Optional on-disk snapshot of admitted spork records (sled + bincode).
//
// Layout:
//   "format"         -> CACHE_FORMAT tag
//   "spork/<hash>"   -> SporkMessage
//   "index"          -> spork id -> signer key id -> hash
//
// Trusted signers, quorum and keys are never written. Records are loaded
// back through normal admission, so the cache cannot grant trust. A tag
// mismatch or any undecodable entry discards the whole cache.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::spork::{SporkId, SporkMessage};
use bee_crypto::{Hash256, KeyId};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

pub const CACHE_FORMAT: &[u8] = b"bee-sporks/1";

const FORMAT_KEY: &[u8] = b"format";
const INDEX_KEY: &[u8] = b"index";
const RECORD_PREFIX: &str = "spork/";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("spork cache database: {0}")]
    Db(#[from] sled::Error),
    #[error("spork cache encoding: {0}")]
    Encode(#[from] bincode::Error),
    #[error("spork cache lock still held at {0}")]
    Locked(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SporkSnapshot {
    pub by_hash: BTreeMap<Hash256, SporkMessage>,
    pub by_id: BTreeMap<SporkId, BTreeMap<KeyId, Hash256>>,
}

impl SporkSnapshot {
    pub fn from_records(records: Vec<(SporkId, KeyId, SporkMessage)>) -> Self {
        let mut snapshot = SporkSnapshot::default();
        for (id, signer, msg) in records {
            let hash = msg.hash();
            snapshot.by_id.entry(id).or_default().insert(signer, hash);
            snapshot.by_hash.insert(hash, msg);
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn into_messages(self) -> Vec<SporkMessage> {
        self.by_hash.into_values().collect()
    }

    /// Every indexed hash has a record and every record is indexed.
    fn is_consistent(&self) -> bool {
        let indexed: usize = self.by_id.values().map(BTreeMap::len).sum();
        indexed == self.by_hash.len()
            && self
                .by_id
                .values()
                .flat_map(BTreeMap::values)
                .all(|h| self.by_hash.contains_key(h))
    }
}

pub struct SporkCache {
    db: sled::Db,
}

impl SporkCache {
    /// Open the cache, retrying briefly while another process releases the lock.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let retry_delays_ms: [u64; 3] = [200, 500, 1000];

        for (attempt, delay_ms) in std::iter::once(&0).chain(retry_delays_ms.iter()).enumerate() {
            if *delay_ms > 0 {
                std::thread::sleep(std::time::Duration::from_millis(*delay_ms));
            }
            match sled::open(path) {
                Ok(db) => return Ok(SporkCache { db }),
                Err(e) if Self::is_lock_error(&e) => {
                    warn!(target: "spork", "spork cache locked at {} (attempt {})", path.display(), attempt + 1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CacheError::Locked(path.display().to_string()))
    }

    fn is_lock_error(e: &sled::Error) -> bool {
        let msg = e.to_string();
        msg.contains("WouldBlock") || msg.contains("Resource temporarily unavailable") || msg.contains("lock")
    }

    pub fn save(&self, snapshot: &SporkSnapshot) -> Result<(), CacheError> {
        self.db.clear()?;
        for (hash, msg) in &snapshot.by_hash {
            let key = format!("{}{}", RECORD_PREFIX, hex::encode(hash));
            self.db.insert(key.as_bytes(), bincode::serialize(msg)?)?;
        }
        self.db.insert(INDEX_KEY, bincode::serialize(&snapshot.by_id)?)?;
        self.db.insert(FORMAT_KEY, CACHE_FORMAT)?;
        self.db.flush()?;
        Ok(())
    }

    /// `Ok(None)` when the cache is empty or was discarded.
    pub fn load(&self) -> Result<Option<SporkSnapshot>, CacheError> {
        match self.db.get(FORMAT_KEY)? {
            None => return Ok(None),
            Some(tag) if tag.as_ref() != CACHE_FORMAT => {
                warn!(
                    target: "spork",
                    "spork cache format {:?} does not match {:?}, discarding",
                    String::from_utf8_lossy(&tag),
                    String::from_utf8_lossy(CACHE_FORMAT)
                );
                self.discard()?;
                return Ok(None);
            }
            Some(_) => {}
        }

        match self.read_snapshot() {
            Some(snapshot) if snapshot.is_consistent() => {
                info!(target: "spork", "loaded {} cached spork records", snapshot.len());
                Ok(Some(snapshot))
            }
            _ => {
                warn!(target: "spork", "spork cache is corrupt, discarding");
                self.discard()?;
                Ok(None)
            }
        }
    }

    fn read_snapshot(&self) -> Option<SporkSnapshot> {
        let index = self.db.get(INDEX_KEY).ok()??;
        let by_id: BTreeMap<SporkId, BTreeMap<KeyId, Hash256>> = bincode::deserialize(&index).ok()?;

        let mut by_hash = BTreeMap::new();
        for entry in self.db.scan_prefix(RECORD_PREFIX.as_bytes()) {
            let (_, value) = entry.ok()?;
            let msg: SporkMessage = bincode::deserialize(&value).ok()?;
            by_hash.insert(msg.hash(), msg);
        }
        Some(SporkSnapshot { by_hash, by_id })
    }

    pub fn discard(&self) -> Result<(), CacheError> {
        self.db.clear()?;
        self.db.flush()?;
        Ok(())
    }
}
