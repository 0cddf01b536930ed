//! Vintage Journal: append-only vintage history with checksums
//!
//! One journal file per series. Each frame holds one bincode-serialized
//! `Vintage`, optionally zstd-compressed.
//!
//! # Binary Format (per frame)
//! ```text
//! [body_len:     u32]
//! [recorded_at:  i64]   // Unix millis, for scanning without decoding
//! [flags:        u8]    // bit 0 = zstd payload
//! [payload_len:  u32][payload: bytes]
//! [checksum:     u32]   // CRC32C over recorded_at ++ flags ++ payload
//! ```
//!
//! A short trailing frame is treated as a torn append and skipped; a checksum
//! mismatch anywhere is corruption and fails the read. The next append cuts a
//! torn tail off before writing, so frames always start on a frame boundary.

use crc32c::crc32c;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use types::vintage::Vintage;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Checksum mismatch at byte offset {offset}")]
    ChecksumMismatch { offset: u64 },

    #[error("Corruption detected at byte offset {offset}: {detail}")]
    Corruption { offset: u64, detail: String },

    #[error("Compression error: {0}")]
    Compression(String),
}

const FLAG_ZSTD: u8 = 0b0000_0001;

/// Fixed bytes in a body besides the payload: 8 (ts) + 1 (flags) + 4 (pl_len) + 4 (crc).
const BODY_OVERHEAD: usize = 17;

/// Upper bound on one frame; anything larger is taken as a corrupt length prefix.
const MAX_BODY_LEN: usize = 512 * 1024 * 1024;

// ── Frame ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Frame {
    recorded_at: i64,
    flags: u8,
    payload: Vec<u8>,
    checksum: u32,
}

impl Frame {
    fn new(recorded_at: i64, flags: u8, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(recorded_at, flags, &payload);
        Self {
            recorded_at,
            flags,
            payload,
            checksum,
        }
    }

    fn compute_checksum(recorded_at: i64, flags: u8, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(9 + payload.len());
        buf.extend_from_slice(&recorded_at.to_le_bytes());
        buf.push(flags);
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(self.recorded_at, self.flags, &self.payload)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let body_len = (BODY_OVERHEAD + self.payload.len()) as u32;
        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.recorded_at.to_le_bytes());
        buf.push(self.flags);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decode one frame from the start of `data`.
    ///
    /// `Ok(None)` means `data` ends before the frame does (torn tail).
    fn from_bytes(data: &[u8], offset: u64) -> Result<Option<(Self, usize)>, JournalError> {
        if data.len() < 4 {
            return Ok(None);
        }
        let body_len = u32::from_le_bytes(read_array(data, 0)) as usize;
        if !(BODY_OVERHEAD..=MAX_BODY_LEN).contains(&body_len) {
            return Err(JournalError::Corruption {
                offset,
                detail: format!("implausible body length {}", body_len),
            });
        }
        let total = 4 + body_len;
        if data.len() < total {
            return Ok(None);
        }

        let body = &data[4..total];
        let recorded_at = i64::from_le_bytes(read_array(body, 0));
        let flags = body[8];
        let payload_len = u32::from_le_bytes(read_array(body, 9)) as usize;
        if payload_len + BODY_OVERHEAD != body_len {
            return Err(JournalError::Corruption {
                offset,
                detail: format!(
                    "payload_len {} inconsistent with body_len {}",
                    payload_len, body_len
                ),
            });
        }
        let payload = body[13..13 + payload_len].to_vec();
        let checksum = u32::from_le_bytes(read_array(body, 13 + payload_len));

        Ok(Some((
            Self {
                recorded_at,
                flags,
                payload,
                checksum,
            },
            total,
        )))
    }
}

/// Copy `N` bytes at `at`; callers have already bounds-checked `data`.
fn read_array<const N: usize>(data: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[at..at + N]);
    out
}

// ── Journal ─────────────────────────────────────────────────────────

/// Result of reading a journal back.
#[derive(Debug, Clone, Default)]
pub struct JournalReadout {
    pub vintages: Vec<Vintage>,
    /// Bytes of an incomplete trailing frame that were skipped.
    pub torn_tail_bytes: usize,
}

/// Append-only vintage history for one series.
#[derive(Debug, Clone)]
pub struct VintageJournal {
    path: PathBuf,
    /// zstd level; `None` stores payloads uncompressed.
    compression: Option<i32>,
}

impl VintageJournal {
    pub fn new(path: impl Into<PathBuf>, compression: Option<i32>) -> Self {
        Self {
            path: path.into(),
            compression,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one vintage and fsync before returning. A torn trailing frame
    /// left by an earlier crash is truncated first.
    pub fn append(&self, vintage: &Vintage) -> Result<(), JournalError> {
        let raw =
            bincode::serialize(vintage).map_err(|e| JournalError::Serialization(e.to_string()))?;
        let (flags, payload) = match self.compression {
            Some(level) => {
                let compressed = zstd::encode_all(raw.as_slice(), level)
                    .map_err(|e| JournalError::Compression(e.to_string()))?;
                (FLAG_ZSTD, compressed)
            }
            None => (0, raw),
        };
        let frame = Frame::new(vintage.recorded_at.timestamp_millis(), flags, payload);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?;
        let mut existing = Vec::new();
        file.read_to_end(&mut existing)?;
        let (_, intact) = scan_frames(&existing)?;
        if intact < existing.len() {
            warn!(
                path = %self.path.display(),
                offset = intact,
                bytes = existing.len() - intact,
                "Truncating torn trailing vintage frame before append"
            );
            file.set_len(intact as u64)?;
        }
        file.seek(SeekFrom::Start(intact as u64))?;
        file.write_all(&frame.to_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Read every intact vintage in append order.
    pub fn read_all(&self) -> Result<JournalReadout, JournalError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(JournalReadout::default()),
            Err(e) => return Err(e.into()),
        };

        let mut readout = JournalReadout::default();
        let mut pos = 0usize;
        while pos < data.len() {
            let offset = pos as u64;
            match Frame::from_bytes(&data[pos..], offset)? {
                Some((frame, consumed)) => {
                    if !frame.verify_checksum() {
                        return Err(JournalError::ChecksumMismatch { offset });
                    }
                    readout.vintages.push(decode_payload(&frame)?);
                    pos += consumed;
                }
                None => {
                    readout.torn_tail_bytes = data.len() - pos;
                    warn!(
                        path = %self.path.display(),
                        offset,
                        bytes = readout.torn_tail_bytes,
                        "Skipping torn trailing vintage frame"
                    );
                    break;
                }
            }
        }
        Ok(readout)
    }

    /// Number of intact frames without decoding payloads.
    pub fn count(&self) -> Result<usize, JournalError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        Ok(scan_frames(&data)?.0)
    }
}

/// Walk frame boundaries: (complete frames, byte length they cover).
fn scan_frames(data: &[u8]) -> Result<(usize, usize), JournalError> {
    let mut pos = 0usize;
    let mut count = 0usize;
    while pos < data.len() {
        match Frame::from_bytes(&data[pos..], pos as u64)? {
            Some((_, consumed)) => {
                count += 1;
                pos += consumed;
            }
            None => break,
        }
    }
    Ok((count, pos))
}

fn decode_payload(frame: &Frame) -> Result<Vintage, JournalError> {
    let raw = if frame.flags & FLAG_ZSTD != 0 {
        zstd::decode_all(frame.payload.as_slice())
            .map_err(|e| JournalError::Compression(e.to_string()))?
    } else {
        frame.payload.clone()
    };
    bincode::deserialize(&raw).map_err(|e| JournalError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::TempDir;
    use types::ids::SeriesId;
    use types::report::{ChangeReport, ValueChange};
    use types::values::ValueSet;

    fn make_vintage(value: &str) -> Vintage {
        let period = "2025-01".parse().unwrap();
        let old = Decimal::from_str(value).unwrap();
        let superseded: ValueSet = vec![(period, Some(old))].into_iter().collect();
        let report = ChangeReport {
            changed: vec![ValueChange {
                period,
                old: Some(old),
                new: Some(old + Decimal::ONE),
                delta: Some(Decimal::ONE),
                pct: None,
            }],
            ..Default::default()
        };
        Vintage::new(SeriesId::new("PX_1"), Utc::now(), superseded, report)
    }

    #[test]
    fn test_append_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let journal = VintageJournal::new(tmp.path().join("v.journal"), None);
        let a = make_vintage("0.54");
        let b = make_vintage("0.56");
        journal.append(&a).unwrap();
        journal.append(&b).unwrap();

        let readout = journal.read_all().unwrap();
        assert_eq!(readout.vintages, vec![a, b]);
        assert_eq!(readout.torn_tail_bytes, 0);
        assert_eq!(journal.count().unwrap(), 2);
    }

    #[test]
    fn test_compressed_frames() {
        let tmp = TempDir::new().unwrap();
        let journal = VintageJournal::new(tmp.path().join("v.journal"), Some(3));
        let v = make_vintage("12.5");
        journal.append(&v).unwrap();
        assert_eq!(journal.read_all().unwrap().vintages, vec![v]);
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let tmp = TempDir::new().unwrap();
        let journal = VintageJournal::new(tmp.path().join("absent.journal"), None);
        assert!(journal.read_all().unwrap().vintages.is_empty());
        assert_eq!(journal.count().unwrap(), 0);
    }

    #[test]
    fn test_torn_tail_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("v.journal");
        let journal = VintageJournal::new(&path, None);
        let v = make_vintage("1");
        journal.append(&v).unwrap();

        // Simulate a crash halfway through the second append
        let partial = Frame::new(0, 0, vec![1, 2, 3, 4, 5, 6, 7, 8]).to_bytes();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&partial[..10]).unwrap();

        let readout = journal.read_all().unwrap();
        assert_eq!(readout.vintages, vec![v]);
        assert_eq!(readout.torn_tail_bytes, 10);
    }

    #[test]
    fn test_append_after_torn_tail_truncates_it() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("v.journal");
        let journal = VintageJournal::new(&path, None);
        let first = make_vintage("1");
        journal.append(&first).unwrap();
        let intact_len = fs::metadata(&path).unwrap().len();

        let partial = Frame::new(0, 0, vec![1, 2, 3, 4, 5, 6, 7, 8]).to_bytes();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&partial[..10]).unwrap();
        drop(file);

        let second = make_vintage("2");
        journal.append(&second).unwrap();

        let readout = journal.read_all().unwrap();
        assert_eq!(readout.vintages, vec![first, second]);
        assert_eq!(readout.torn_tail_bytes, 0);
        assert_eq!(journal.count().unwrap(), 2);
        assert!(fs::metadata(&path).unwrap().len() > intact_len);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("v.journal");
        let journal = VintageJournal::new(&path, None);
        journal.append(&make_vintage("1")).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        match journal.read_all() {
            Err(JournalError::ChecksumMismatch { offset }) => assert_eq!(offset, 0),
            other => panic!("Expected ChecksumMismatch, got {:?}", other),
        }
    }
}
