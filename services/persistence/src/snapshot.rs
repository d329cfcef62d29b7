//! Book snapshots with integrity and compression
//!
//! A snapshot captures one pair's full book state (both ladders, in
//! priority order) plus the journal sequence it supersedes. Entries
//! below that sequence never need to be replayed again.
//!
//! Written atomically (tmp file, fsync, rename) with a SHA-256 hash over
//! the serialized state and optional zstd compression. The schema is
//! versioned so newer code can refuse snapshots it does not understand.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use types::limit_order::LimitOrder;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("No snapshots found")]
    NoSnapshots,
}

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized book state of one pair at a journal sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub version: u32,
    /// Pair key this snapshot belongs to.
    pub pair: String,
    /// Last journal sequence folded into this state.
    pub sequence: u64,
    /// Unix millis when the snapshot was taken.
    pub timestamp: i64,
    /// Bid ladder, best first.
    pub bids: Vec<LimitOrder>,
    /// Ask ladder, best first.
    pub asks: Vec<LimitOrder>,
    /// SHA-256 over the serialized ladders.
    pub checksum: String,
}

impl BookSnapshot {
    pub fn new(
        pair: String,
        sequence: u64,
        timestamp: i64,
        bids: Vec<LimitOrder>,
        asks: Vec<LimitOrder>,
    ) -> Self {
        let checksum = Self::state_hash(&bids, &asks);
        Self {
            version: SNAPSHOT_VERSION,
            pair,
            sequence,
            timestamp,
            bids,
            asks,
            checksum,
        }
    }

    fn state_hash(bids: &[LimitOrder], asks: &[LimitOrder]) -> String {
        let bytes = bincode::serialize(&(bids, asks)).expect("ladder serialization cannot fail");
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    pub fn verify_integrity(&self) -> bool {
        self.checksum == Self::state_hash(&self.bids, &self.asks)
    }
}

/// Reads and writes snapshots for one pair in one directory.
pub struct SnapshotStore {
    dir: PathBuf,
    compress: bool,
    /// How many snapshots to retain after each write.
    keep: usize,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            dir: dir.into(),
            compress,
            keep: 3,
        }
    }

    pub fn with_retention(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    /// Write a snapshot atomically, then prune old ones.
    pub fn write(&self, snapshot: &BookSnapshot) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let data = bincode::serialize(snapshot)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        let (body, ext) = if self.compress {
            let compressed = zstd::encode_all(data.as_slice(), 3)
                .map_err(|e| SnapshotError::Compression(e.to_string()))?;
            (compressed, "snap.zst")
        } else {
            (data, "snap")
        };

        let filename = format!("snapshot-{:012}.{}", snapshot.sequence, ext);
        let path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!("{}.tmp", filename));
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        self.prune()?;
        Ok(path)
    }

    /// Load the snapshot with the highest sequence.
    pub fn load_latest(&self) -> Result<BookSnapshot, SnapshotError> {
        let (_, path) = self
            .list()?
            .into_iter()
            .max_by_key(|(seq, _)| *seq)
            .ok_or(SnapshotError::NoSnapshots)?;
        self.load(&path)
    }

    pub fn load(&self, path: &Path) -> Result<BookSnapshot, SnapshotError> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;

        let decompressed = if path.to_string_lossy().ends_with(".zst") {
            zstd::decode_all(data.as_slice())
                .map_err(|e| SnapshotError::Compression(e.to_string()))?
        } else {
            data
        };

        let snapshot: BookSnapshot = bincode::deserialize(&decompressed)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        if !snapshot.verify_integrity() {
            return Err(SnapshotError::Integrity {
                expected: snapshot.checksum.clone(),
                actual: BookSnapshot::state_hash(&snapshot.bids, &snapshot.asks),
            });
        }
        Ok(snapshot)
    }

    /// All snapshots as `(sequence, path)`, unordered.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(seq) = parse_sequence(&name) {
                results.push((seq, entry.path()));
            }
        }
        Ok(results)
    }

    fn prune(&self) -> Result<(), SnapshotError> {
        let mut snapshots = self.list()?;
        snapshots.sort_by_key(|(seq, _)| *seq);
        while snapshots.len() > self.keep {
            let (_, path) = snapshots.remove(0);
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn parse_sequence(name: &str) -> Option<u64> {
    let stem = name
        .strip_prefix("snapshot-")?
        .strip_suffix(".snap.zst")
        .or_else(|| name.strip_prefix("snapshot-")?.strip_suffix(".snap"))?;
    stem.parse::<u64>().ok()
}

/// Decides when the actor should take a new snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotPolicy {
    pub event_interval: u64,
    last_snapshot_seq: u64,
}

impl SnapshotPolicy {
    pub fn new(event_interval: u64) -> Self {
        Self {
            event_interval: event_interval.max(1),
            last_snapshot_seq: 0,
        }
    }

    pub fn should_snapshot(&self, sequence: u64) -> bool {
        sequence >= self.last_snapshot_seq + self.event_interval
    }

    pub fn record(&mut self, sequence: u64) {
        self.last_snapshot_seq = sequence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use tempfile::TempDir;
    use types::assets::{Asset, AssetId, AssetPair};
    use types::math::PRICE_CONSTANT;
    use types::order::{Order, OrderSide, PublicKey};

    fn limit(side: OrderSide, price: u64, amount: u64) -> LimitOrder {
        let key = SigningKey::from_bytes(&[4; 32]);
        LimitOrder::new(
            Order::new(
                PublicKey::from(&key),
                PublicKey::from(&key),
                AssetPair::new(Asset::Issued(AssetId::new([0xB1; 32])), Asset::Native),
                side,
                price,
                amount,
                300_000,
                1_708_123_456_789,
                1_708_123_456_789 + 86_400_000,
            )
            .sign(&key),
        )
    }

    fn sample_snapshot(sequence: u64) -> BookSnapshot {
        BookSnapshot::new(
            "BTC-NATIVE".to_string(),
            sequence,
            1_708_123_456_789,
            vec![limit(OrderSide::Buy, 10 * PRICE_CONSTANT, 100)],
            vec![limit(OrderSide::Sell, 12 * PRICE_CONSTANT, 50)],
        )
    }

    #[test]
    fn test_write_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path(), false);
        let snapshot = sample_snapshot(500);

        store.write(&snapshot).unwrap();
        let loaded = store.load_latest().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(loaded.verify_integrity());
    }

    #[test]
    fn test_compressed_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path(), true);
        let snapshot = sample_snapshot(500);

        let path = store.write(&snapshot).unwrap();
        assert!(path.to_string_lossy().ends_with(".snap.zst"));
        let loaded = store.load_latest().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_integrity_detects_tamper() {
        let mut snapshot = sample_snapshot(1);
        snapshot.bids.push(limit(OrderSide::Buy, PRICE_CONSTANT, 7));
        assert!(!snapshot.verify_integrity());
    }

    #[test]
    fn test_load_latest_picks_highest_sequence() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path(), false).with_retention(10);
        for seq in [100u64, 500, 300] {
            store.write(&sample_snapshot(seq)).unwrap();
        }
        assert_eq!(store.load_latest().unwrap().sequence, 500);
    }

    #[test]
    fn test_retention_prunes_old_snapshots() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path(), false).with_retention(2);
        for seq in 1..=5u64 {
            store.write(&sample_snapshot(seq * 100)).unwrap();
        }
        let mut listed = store.list().unwrap();
        listed.sort_by_key(|(seq, _)| *seq);
        let sequences: Vec<u64> = listed.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(sequences, vec![400, 500]);
    }

    #[test]
    fn test_no_snapshots_error() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path(), false);
        assert!(matches!(store.load_latest(), Err(SnapshotError::NoSnapshots)));
    }

    #[test]
    fn test_policy_interval() {
        let mut policy = SnapshotPolicy::new(100);
        assert!(!policy.should_snapshot(50));
        assert!(policy.should_snapshot(100));
        policy.record(100);
        assert!(!policy.should_snapshot(150));
        assert!(policy.should_snapshot(200));
    }
}
