//! Sequential journal reader with corruption detection
//!
//! Reads rotated journal files in index order, validating the CRC32C of
//! every frame. A corrupted or truncated tail is logged and skipped so a
//! crash mid-append never blocks recovery of the valid prefix.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::journal::{parse_index, JournalEntry, JournalError};

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Checksum mismatch at offset {offset}, sequence {sequence}")]
    ChecksumMismatch { offset: u64, sequence: u64 },

    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
}

/// A detected corruption, reported with its byte offset.
#[derive(Debug, Clone)]
pub struct Corruption {
    pub byte_offset: u64,
    pub detail: String,
}

/// Reads every journal file of one pair, oldest first.
pub struct JournalReader {
    files: Vec<PathBuf>,
    current_file_idx: usize,
    data: Vec<u8>,
    pos: usize,
    global_offset: u64,
    last_sequence: Option<u64>,
    corruptions: Vec<Corruption>,
}

impl JournalReader {
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        let mut files: Vec<(u64, PathBuf)> = if dir.exists() {
            fs::read_dir(dir)?
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    parse_index(&e.file_name().to_string_lossy()).map(|idx| (idx, e.path()))
                })
                .collect()
        } else {
            Vec::new()
        };
        files.sort_by_key(|(idx, _)| *idx);

        let mut reader = Self {
            files: files.into_iter().map(|(_, p)| p).collect(),
            current_file_idx: 0,
            data: Vec::new(),
            pos: 0,
            global_offset: 0,
            last_sequence: None,
            corruptions: Vec::new(),
        };
        reader.load_current_file()?;
        Ok(reader)
    }

    /// Next valid entry, or `None` once all files are exhausted.
    ///
    /// A frame that fails its checksum is an error; a truncated tail is
    /// logged and treated as end of file.
    pub fn next_entry(&mut self) -> Result<Option<JournalEntry>, ReaderError> {
        loop {
            if self.pos >= self.data.len() {
                if !self.advance_file()? {
                    return Ok(None);
                }
            }

            let offset = self.global_offset;
            match JournalEntry::from_bytes(&self.data[self.pos..]) {
                Ok((entry, consumed)) => {
                    self.pos += consumed;
                    self.global_offset += consumed as u64;

                    if !entry.verify_checksum() {
                        self.corruptions.push(Corruption {
                            byte_offset: offset,
                            detail: format!("CRC32C mismatch for sequence {}", entry.sequence),
                        });
                        return Err(ReaderError::ChecksumMismatch {
                            offset,
                            sequence: entry.sequence,
                        });
                    }

                    self.last_sequence = Some(entry.sequence);
                    return Ok(Some(entry));
                }
                Err(_) => {
                    let remaining = self.data.len() - self.pos;
                    if remaining > 0 {
                        warn!(offset, remaining, "truncated journal tail, stopping file");
                        self.corruptions.push(Corruption {
                            byte_offset: offset,
                            detail: format!("truncated frame, {} bytes left", remaining),
                        });
                    }
                    self.pos = self.data.len();
                }
            }
        }
    }

    /// All remaining entries, with gapless-sequence validation.
    pub fn read_all(&mut self) -> Result<Vec<JournalEntry>, ReaderError> {
        let mut entries = Vec::new();
        let mut expected: Option<u64> = None;
        while let Some(entry) = self.next_entry()? {
            if let Some(exp) = expected {
                if entry.sequence != exp {
                    return Err(ReaderError::SequenceGap {
                        expected: exp,
                        got: entry.sequence,
                    });
                }
            }
            expected = Some(entry.sequence + 1);
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Skip every entry with `sequence < target`, leaving the reader
    /// positioned at the first newer one. Returns the number skipped.
    pub fn seek_to_sequence(&mut self, target: u64) -> Result<u64, ReaderError> {
        let mut skipped = 0u64;
        loop {
            if self.pos >= self.data.len() {
                if !self.advance_file()? {
                    break;
                }
            }
            match JournalEntry::from_bytes(&self.data[self.pos..]) {
                Ok((entry, consumed)) => {
                    if entry.sequence >= target {
                        break;
                    }
                    self.pos += consumed;
                    self.global_offset += consumed as u64;
                    self.last_sequence = Some(entry.sequence);
                    skipped += 1;
                }
                Err(_) => {
                    self.pos = self.data.len();
                }
            }
        }
        Ok(skipped)
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn corruptions(&self) -> &[Corruption] {
        &self.corruptions
    }

    fn load_current_file(&mut self) -> Result<(), ReaderError> {
        self.data.clear();
        self.pos = 0;
        if self.current_file_idx < self.files.len() {
            let mut file = File::open(&self.files[self.current_file_idx])?;
            file.read_to_end(&mut self.data)?;
        }
        Ok(())
    }

    fn advance_file(&mut self) -> Result<bool, ReaderError> {
        self.current_file_idx += 1;
        if self.current_file_idx < self.files.len() {
            self.load_current_file()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
