//! Replay determinism verification
//!
//! Recovery must be a pure function of the snapshot and the journal:
//! running it twice over the same files yields the same event stream
//! and the same final state. The verifier here replays a pair's
//! journal through a recording applier and compares fingerprints, so
//! any nondeterminism in framing, decoding or replay order surfaces as
//! a hash mismatch.

use sha2::{Digest, Sha256};
use std::path::Path;

use types::events::Event;

use crate::reader::JournalReader;
use crate::recovery::{recover, EventApplier};
use crate::snapshot::{BookSnapshot, SnapshotStore};

/// Applier that records everything it is given, in order.
#[derive(Debug, Default)]
pub struct RecordingApplier {
    snapshot_sequence: u64,
    records: Vec<(u64, i64, Event)>,
}

impl RecordingApplier {
    pub fn records(&self) -> &[(u64, i64, Event)] {
        &self.records
    }

    /// SHA-256 over the serialized snapshot sequence and record stream.
    pub fn fingerprint(&self) -> String {
        let bytes = bincode::serialize(&(self.snapshot_sequence, &self.records))
            .expect("record serialization cannot fail");
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}

impl EventApplier for RecordingApplier {
    fn restore(&mut self, snapshot: &BookSnapshot) -> Result<(), String> {
        self.snapshot_sequence = snapshot.sequence;
        Ok(())
    }

    fn apply(&mut self, sequence: u64, timestamp: i64, event: &Event) -> Result<(), String> {
        self.records.push((sequence, timestamp, event.clone()));
        Ok(())
    }
}

/// Report comparing two replay runs.
#[derive(Debug, Clone)]
pub struct DivergenceReport {
    pub fingerprint_a: String,
    pub fingerprint_b: String,
    pub replayed_a: usize,
    pub replayed_b: usize,
    pub detail: String,
}

impl DivergenceReport {
    pub fn is_match(&self) -> bool {
        self.fingerprint_a == self.fingerprint_b
    }
}

/// Verifies deterministic recovery by comparing repeated replays.
pub struct DeterminismVerifier;

impl DeterminismVerifier {
    /// Run recovery twice over the same files and compare.
    pub fn verify_double_replay(
        snapshots: &SnapshotStore,
        journal_dir: &Path,
    ) -> Result<DivergenceReport, String> {
        let a = Self::run_replay(snapshots, journal_dir)?;
        let b = Self::run_replay(snapshots, journal_dir)?;

        let fingerprint_a = a.fingerprint();
        let fingerprint_b = b.fingerprint();
        let detail = if fingerprint_a == fingerprint_b {
            "replays are identical".to_string()
        } else {
            format!(
                "replays diverge: {} vs {} records",
                a.records().len(),
                b.records().len()
            )
        };

        Ok(DivergenceReport {
            fingerprint_a,
            fingerprint_b,
            replayed_a: a.records().len(),
            replayed_b: b.records().len(),
            detail,
        })
    }

    /// Replaying the same journal twice must produce the same state.
    pub fn verify_idempotency(
        snapshots: &SnapshotStore,
        journal_dir: &Path,
    ) -> Result<bool, String> {
        Ok(Self::verify_double_replay(snapshots, journal_dir)?.is_match())
    }

    /// Read the journal twice and compare the raw entry streams.
    pub fn compare_event_outputs(journal_dir: &Path) -> Result<bool, String> {
        let mut reader_a =
            JournalReader::open(journal_dir).map_err(|e| format!("reader a: {}", e))?;
        let mut reader_b =
            JournalReader::open(journal_dir).map_err(|e| format!("reader b: {}", e))?;

        let entries_a = reader_a.read_all().map_err(|e| format!("read a: {}", e))?;
        let entries_b = reader_b.read_all().map_err(|e| format!("read b: {}", e))?;

        Ok(entries_a == entries_b)
    }

    fn run_replay(
        snapshots: &SnapshotStore,
        journal_dir: &Path,
    ) -> Result<RecordingApplier, String> {
        let mut applier = RecordingApplier::default();
        recover(snapshots, journal_dir, &mut applier).map_err(|e| format!("recovery: {}", e))?;
        Ok(applier)
    }
}


// ── Property-Based Tests ────────────────────────────────────────────
