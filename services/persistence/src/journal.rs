//! Append-only event journal with checksums
//!
//! One journal per asset pair, stored as a directory of rotated files.
//! Each entry is a length-prefixed frame:
//!
//! ```text
//! [body_len: u32]
//! [sequence: u64]
//! [timestamp: i64]                 // unix millis
//! [kind_len: u16][kind: bytes]     // event tag, e.g. "OrderExecuted"
//! [payload_len: u32][payload]      // bincode(Event)
//! [checksum: u32]                  // CRC32C over sequence..payload
//! ```
//!
//! Sequences are gapless and strictly increasing within a journal; an
//! append with the wrong sequence is refused rather than written.

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use types::events::Event;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sequence error: expected {expected}, got {got}")]
    Sequence { expected: u64, got: u64 },
}

/// One persisted event frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub timestamp: i64,
    pub kind: String,
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl JournalEntry {
    pub fn new(sequence: u64, timestamp: i64, kind: String, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(sequence, timestamp, &kind, &payload);
        Self {
            sequence,
            timestamp,
            kind,
            payload,
            checksum,
        }
    }

    /// Build an entry from a typed book event.
    pub fn from_event(sequence: u64, timestamp: i64, event: &Event) -> Result<Self, JournalError> {
        let payload =
            bincode::serialize(event).map_err(|e| JournalError::Serialization(e.to_string()))?;
        Ok(Self::new(sequence, timestamp, event.kind().to_string(), payload))
    }

    /// Decode the payload back into a typed event.
    pub fn event(&self) -> Result<Event, JournalError> {
        bincode::deserialize(&self.payload).map_err(|e| JournalError::Serialization(e.to_string()))
    }

    pub fn compute_checksum(sequence: u64, timestamp: i64, kind: &str, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(16 + kind.len() + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum
            == Self::compute_checksum(self.sequence, self.timestamp, &self.kind, &self.payload)
    }

    /// Serialize to the binary frame format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let kind_bytes = self.kind.as_bytes();
        let body_len: u32 =
            8 + 8 + 2 + kind_bytes.len() as u32 + 4 + self.payload.len() as u32 + 4;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(kind_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(kind_bytes);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize one frame; returns the entry and bytes consumed.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        if data.len() < 4 {
            return Err(JournalError::Serialization("truncated length prefix".into()));
        }
        let body_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if body_len > 100_000_000 {
            return Err(JournalError::Serialization(format!(
                "implausible body length {}",
                body_len
            )));
        }
        let total = 4 + body_len;
        if data.len() < total || body_len < 26 {
            return Err(JournalError::Serialization(format!(
                "incomplete frame: need {} bytes, have {}",
                total,
                data.len()
            )));
        }

        let body = &data[4..total];
        let mut pos = 0usize;

        let sequence = u64::from_le_bytes(body[pos..pos + 8].try_into().expect("sized slice"));
        pos += 8;
        let timestamp = i64::from_le_bytes(body[pos..pos + 8].try_into().expect("sized slice"));
        pos += 8;

        let kind_len =
            u16::from_le_bytes(body[pos..pos + 2].try_into().expect("sized slice")) as usize;
        pos += 2;
        if pos + kind_len + 4 > body.len() {
            return Err(JournalError::Serialization("kind overruns frame".into()));
        }
        let kind = String::from_utf8(body[pos..pos + kind_len].to_vec())
            .map_err(|e| JournalError::Serialization(e.to_string()))?;
        pos += kind_len;

        let payload_len =
            u32::from_le_bytes(body[pos..pos + 4].try_into().expect("sized slice")) as usize;
        pos += 4;
        if pos + payload_len + 4 > body.len() {
            return Err(JournalError::Serialization("payload overruns frame".into()));
        }
        let payload = body[pos..pos + payload_len].to_vec();
        pos += payload_len;

        let checksum = u32::from_le_bytes(body[pos..pos + 4].try_into().expect("sized slice"));

        Ok((
            Self {
                sequence,
                timestamp,
                kind,
                payload,
                checksum,
            },
            total,
        ))
    }
}

/// Journal configuration.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory holding this pair's journal files.
    pub dir: PathBuf,
    /// Rotate to a new file once the current one reaches this size.
    pub max_file_size: u64,
    /// Call fsync after every N appends (1 = every append).
    pub sync_every: usize,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024,
            sync_every: 1,
        }
    }
}

/// Append-only journal writer for one pair.
pub struct EventJournal {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    next_sequence: u64,
    appends_since_sync: usize,
    file_index: u64,
}

impl EventJournal {
    /// Open (or create) the journal in the configured directory,
    /// continuing after the highest existing file.
    pub fn open(config: JournalConfig) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;
        let file_index = Self::latest_index(&config.dir);
        let current_file = Self::file_path(&config.dir, file_index);
        let file = OpenOptions::new().create(true).append(true).open(&current_file)?;
        let current_file_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            next_sequence: 1,
            appends_since_sync: 0,
            file_index,
        })
    }

    /// Set the next expected sequence (after recovery).
    pub fn set_next_sequence(&mut self, sequence: u64) {
        self.next_sequence = sequence;
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Append a typed event, assigning it the next sequence.
    pub fn append_event(&mut self, timestamp: i64, event: &Event) -> Result<u64, JournalError> {
        let sequence = self.next_sequence;
        let entry = JournalEntry::from_event(sequence, timestamp, event)?;
        self.append(&entry)?;
        Ok(sequence)
    }

    /// Append a pre-built entry, enforcing sequence continuity.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        if entry.sequence != self.next_sequence {
            return Err(JournalError::Sequence {
                expected: self.next_sequence,
                got: entry.sequence,
            });
        }

        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let bytes = entry.to_bytes();
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        self.current_file_size += bytes.len() as u64;
        self.next_sequence = entry.sequence + 1;

        self.appends_since_sync += 1;
        if self.appends_since_sync >= self.config.sync_every {
            self.writer.get_ref().sync_all()?;
            self.appends_since_sync = 0;
        }
        Ok(())
    }

    /// Flush and fsync (before shutdown or snapshot).
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.appends_since_sync = 0;
        Ok(())
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    fn rotate(&mut self) -> Result<(), JournalError> {
        self.sync()?;
        self.file_index += 1;
        self.current_file = Self::file_path(&self.config.dir, self.file_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;
        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        Ok(())
    }

    pub(crate) fn file_path(dir: &Path, index: u64) -> PathBuf {
        dir.join(format!("journal-{:06}.bin", index))
    }

    fn latest_index(dir: &Path) -> u64 {
        fs::read_dir(dir)
            .ok()
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| parse_index(&e.file_name().to_string_lossy()))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

pub(crate) fn parse_index(name: &str) -> Option<u64> {
    name.strip_prefix("journal-")?
        .strip_suffix(".bin")?
        .parse::<u64>()
        .ok()
}
