//! Crash recovery: snapshot restore + journal replay
//!
//! Recovery of one pair proceeds in order:
//! 1. load the latest snapshot, if any, and hand it to the applier;
//! 2. open the journal and seek strictly past the snapshot's sequence;
//! 3. replay every remaining entry in sequence order.
//!
//! Replay is deterministic: applying the same entries to the same
//! snapshot always produces the same book, and the history store skips
//! entries at or below its own watermark, so re-application is
//! idempotent.

use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use types::events::Event;

use crate::reader::{JournalReader, ReaderError};
use crate::snapshot::{BookSnapshot, SnapshotError, SnapshotStore};

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Apply error at sequence {sequence}: {detail}")]
    Apply { sequence: u64, detail: String },

    #[error("Journal error: {0}")]
    Journal(#[from] crate::journal::JournalError),
}

/// Consumer of recovered state: the pair actor's book plus its history
/// feed implement this.
pub trait EventApplier {
    /// Seed state from a snapshot. Called at most once, before replay.
    fn restore(&mut self, snapshot: &BookSnapshot) -> Result<(), String>;

    /// Apply one journal event.
    fn apply(&mut self, sequence: u64, timestamp: i64, event: &Event) -> Result<(), String>;
}

/// Outcome of a recovery run.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    /// Sequence of the restored snapshot (0 = cold start).
    pub snapshot_sequence: u64,
    /// Number of journal entries replayed.
    pub replayed: u64,
    /// Highest sequence seen (snapshot or journal).
    pub final_sequence: u64,
    pub elapsed_ms: u64,
}

/// Run full recovery for one pair.
pub fn recover<A: EventApplier>(
    snapshots: &SnapshotStore,
    journal_dir: &Path,
    applier: &mut A,
) -> Result<RecoveryReport, RecoveryError> {
    let started = Instant::now();

    let snapshot_sequence = match snapshots.load_latest() {
        Ok(snapshot) => {
            debug!(sequence = snapshot.sequence, pair = %snapshot.pair, "restoring snapshot");
            applier.restore(&snapshot).map_err(|detail| RecoveryError::Apply {
                sequence: snapshot.sequence,
                detail,
            })?;
            snapshot.sequence
        }
        Err(SnapshotError::NoSnapshots) => {
            debug!("no snapshot found, cold start");
            0
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = JournalReader::open(journal_dir)?;
    if snapshot_sequence > 0 {
        reader.seek_to_sequence(snapshot_sequence + 1)?;
    }

    let mut replayed = 0u64;
    let mut final_sequence = snapshot_sequence;
    while let Some(entry) = reader.next_entry()? {
        let event = entry.event()?;
        applier
            .apply(entry.sequence, entry.timestamp, &event)
            .map_err(|detail| RecoveryError::Apply {
                sequence: entry.sequence,
                detail,
            })?;
        final_sequence = entry.sequence;
        replayed += 1;
    }

    let report = RecoveryReport {
        snapshot_sequence,
        replayed,
        final_sequence,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        snapshot = report.snapshot_sequence,
        replayed = report.replayed,
        final_sequence = report.final_sequence,
        "recovery complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{EventJournal, JournalConfig};
    use ed25519_dalek::SigningKey;
    use tempfile::TempDir;
    use types::assets::{Asset, AssetId, AssetPair};
    use types::limit_order::LimitOrder;
    use types::math::PRICE_CONSTANT;
    use types::order::{Order, OrderSide, PublicKey};

    fn limit(seed: u8, amount: u64) -> LimitOrder {
        let key = SigningKey::from_bytes(&[seed; 32]);
        LimitOrder::new(
            Order::new(
                PublicKey::from(&key),
                PublicKey::from(&key),
                AssetPair::new(Asset::Issued(AssetId::new([0xB1; 32])), Asset::Native),
                OrderSide::Buy,
                10 * PRICE_CONSTANT,
                amount,
                300_000,
                1_708_123_456_789,
                1_708_123_456_789 + 86_400_000,
            )
            .sign(&key),
        )
    }

    /// Applier that records what it saw.
    #[derive(Default)]
    struct TraceApplier {
        restored: Option<u64>,
        applied: Vec<u64>,
    }

    impl EventApplier for TraceApplier {
        fn restore(&mut self, snapshot: &BookSnapshot) -> Result<(), String> {
            self.restored = Some(snapshot.sequence);
            Ok(())
        }

        fn apply(&mut self, sequence: u64, _timestamp: i64, _event: &Event) -> Result<(), String> {
            self.applied.push(sequence);
            Ok(())
        }
    }

    fn write_journal(dir: &Path, count: u64) {
        let mut journal = EventJournal::open(JournalConfig::new(dir)).unwrap();
        for i in 0..count {
            journal
                .append_event(
                    i as i64,
                    &Event::OrderAdded {
                        order: limit((i % 200) as u8, 100 + i),
                    },
                )
                .unwrap();
        }
        journal.sync().unwrap();
    }

    #[test]
    fn test_cold_start_replays_everything() {
        let tmp = TempDir::new().unwrap();
        let journal_dir = tmp.path().join("journal");
        write_journal(&journal_dir, 20);

        let snapshots = SnapshotStore::new(tmp.path().join("snapshots"), false);
        let mut applier = TraceApplier::default();
        let report = recover(&snapshots, &journal_dir, &mut applier).unwrap();

        assert_eq!(report.snapshot_sequence, 0);
        assert_eq!(report.replayed, 20);
        assert_eq!(report.final_sequence, 20);
        assert!(applier.restored.is_none());
        assert_eq!(applier.applied, (1..=20).collect::<Vec<u64>>());
    }

    #[test]
    fn test_snapshot_skips_replayed_prefix() {
        let tmp = TempDir::new().unwrap();
        let journal_dir = tmp.path().join("journal");
        write_journal(&journal_dir, 30);

        let snapshots = SnapshotStore::new(tmp.path().join("snapshots"), false);
        snapshots
            .write(&BookSnapshot::new(
                "BTC-NATIVE".to_string(),
                12,
                12_000,
                vec![limit(1, 100)],
                vec![],
            ))
            .unwrap();

        let mut applier = TraceApplier::default();
        let report = recover(&snapshots, &journal_dir, &mut applier).unwrap();

        assert_eq!(report.snapshot_sequence, 12);
        assert_eq!(applier.restored, Some(12));
        assert_eq!(report.replayed, 18);
        assert_eq!(applier.applied.first(), Some(&13));
        assert_eq!(report.final_sequence, 30);
    }

    #[test]
    fn test_empty_dirs_are_a_clean_cold_start() {
        let tmp = TempDir::new().unwrap();
        let snapshots = SnapshotStore::new(tmp.path().join("snapshots"), false);
        let mut applier = TraceApplier::default();
        let report = recover(&snapshots, &tmp.path().join("journal"), &mut applier).unwrap();
        assert_eq!(report.replayed, 0);
        assert_eq!(report.final_sequence, 0);
    }

    #[test]
    fn test_apply_error_aborts() {
        struct FailingApplier;
        impl EventApplier for FailingApplier {
            fn restore(&mut self, _: &BookSnapshot) -> Result<(), String> {
                Ok(())
            }
            fn apply(&mut self, _: u64, _: i64, _: &Event) -> Result<(), String> {
                Err("boom".to_string())
            }
        }

        let tmp = TempDir::new().unwrap();
        let journal_dir = tmp.path().join("journal");
        write_journal(&journal_dir, 3);
        let snapshots = SnapshotStore::new(tmp.path().join("snapshots"), false);

        let result = recover(&snapshots, &journal_dir, &mut FailingApplier);
        assert!(matches!(result, Err(RecoveryError::Apply { sequence: 1, .. })));
    }

    #[test]
    fn test_recovery_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let journal_dir = tmp.path().join("journal");
        write_journal(&journal_dir, 15);
        let snapshots = SnapshotStore::new(tmp.path().join("snapshots"), false);

        let mut a = TraceApplier::default();
        let mut b = TraceApplier::default();
        recover(&snapshots, &journal_dir, &mut a).unwrap();
        recover(&snapshots, &journal_dir, &mut b).unwrap();
        assert_eq!(a.applied, b.applied);
    }
}
