//! Persistence Service
//!
//! Durability layer for the pair actors. Every committed book event is
//! appended to a checksummed, append-only journal; the full book state
//! is snapshotted periodically. Recovery loads the latest snapshot and
//! replays strictly-newer journal entries, which must reproduce the
//! pre-crash book and history byte for byte.
//!
//! ```text
//!  Book events ──► Journal (crc32c frames, rotation)
//!       │
//!       └────────► Snapshot (sha256 integrity, optional zstd)
//!
//!  Startup: latest snapshot ──► replay journal > snapshot.sequence
//! ```

pub mod determinism;
pub mod journal;
pub mod reader;
pub mod recovery;
pub mod snapshot;

pub use determinism::DeterminismVerifier;
pub use journal::{EventJournal, JournalConfig, JournalEntry, JournalError};
pub use reader::{JournalReader, ReaderError};
pub use recovery::{EventApplier, RecoveryError, RecoveryReport, recover};
pub use snapshot::{BookSnapshot, SnapshotError, SnapshotStore};
