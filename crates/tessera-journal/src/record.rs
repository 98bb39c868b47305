//! Journal record framing.
//!
//! On-disk format of one record:
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload]
//! ```
//!
//! The payload starts with a kind byte:
//! ```text
//! chunk: [0x01][20-byte hash][zstd frame of the chunk bytes]
//! root:  [0x02][20-byte root hash][timestamp millis, i64 LE]
//! ```

use std::io::{self, Read};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tessera_types::{Chunk, Hash, HASH_LEN};

use crate::error::{JournalError, Result};

/// Header size: 4 bytes length + 4 bytes CRC.
pub const HEADER_SIZE: u64 = 8;

const KIND_CHUNK: u8 = 0x01;
const KIND_ROOT: u8 = 0x02;

/// A root-hash update. The sequence of these is the store's reflog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    pub root: Hash,
    pub timestamp: DateTime<Utc>,
}

impl RootRecord {
    pub fn now(root: Hash) -> Self {
        // Millisecond precision is what the record stores.
        let millis = Utc::now().timestamp_millis();
        Self {
            root,
            timestamp: Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now),
        }
    }
}

/// A decoded journal record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalRecord {
    Chunk(Chunk),
    Root(RootRecord),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Chunk,
    Root,
}

impl JournalRecord {
    /// Encode into a complete frame.
    pub fn encode(&self, level: i32) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        match self {
            Self::Chunk(chunk) => {
                payload.push(KIND_CHUNK);
                payload.extend_from_slice(chunk.hash().as_bytes());
                let compressed = zstd::encode_all(chunk.data(), level)
                    .map_err(|e| JournalError::Compression(e.to_string()))?;
                payload.extend_from_slice(&compressed);
            }
            Self::Root(record) => {
                payload.push(KIND_ROOT);
                payload.extend_from_slice(record.root.as_bytes());
                payload.extend_from_slice(&record.timestamp.timestamp_millis().to_le_bytes());
            }
        }
        let mut frame = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }
}

/// A CRC-checked frame whose payload has not been decoded yet.
#[derive(Clone, Debug)]
pub struct RawRecord {
    pub offset: u64,
    /// Frame length including the header.
    pub len: u32,
    payload: Vec<u8>,
}

impl RawRecord {
    pub fn kind(&self) -> RecordKind {
        if self.payload[0] == KIND_CHUNK {
            RecordKind::Chunk
        } else {
            RecordKind::Root
        }
    }

    /// The chunk hash, without decompressing.
    pub fn chunk_hash(&self) -> Option<Hash> {
        match self.kind() {
            RecordKind::Chunk => Hash::from_slice(&self.payload[1..1 + HASH_LEN]).ok(),
            RecordKind::Root => None,
        }
    }

    pub fn decode(&self) -> Result<JournalRecord> {
        let hash = Hash::from_slice(&self.payload[1..1 + HASH_LEN]).map_err(|e| {
            JournalError::Corrupt {
                offset: self.offset,
                reason: e.to_string(),
            }
        })?;
        let body = &self.payload[1 + HASH_LEN..];
        match self.kind() {
            RecordKind::Chunk => {
                let data = zstd::decode_all(body).map_err(|e| JournalError::Decompression {
                    offset: self.offset,
                    reason: e.to_string(),
                })?;
                let chunk = Chunk::from_parts(hash, data);
                if !chunk.verify() {
                    return Err(JournalError::HashMismatch {
                        offset: self.offset,
                        expected: hash,
                        actual: Hash::of(chunk.data()),
                    });
                }
                Ok(JournalRecord::Chunk(chunk))
            }
            RecordKind::Root => {
                let mut millis = [0u8; 8];
                millis.copy_from_slice(body);
                let timestamp = Utc
                    .timestamp_millis_opt(i64::from_le_bytes(millis))
                    .single()
                    .ok_or_else(|| JournalError::Corrupt {
                        offset: self.offset,
                        reason: "root timestamp out of range".into(),
                    })?;
                Ok(JournalRecord::Root(RootRecord { root: hash, timestamp }))
            }
        }
    }
}

/// Outcome of reading one frame.
#[derive(Debug)]
pub enum Frame {
    Record(RawRecord),
    /// Clean end of the journal.
    End,
    /// The journal ends mid-frame.
    Torn(&'static str),
    /// A complete frame of `len` bytes failed validation.
    Invalid { reason: &'static str, len: u64 },
}

/// Read the frame at `offset`, where the journal is `limit` bytes long.
/// The reader must be positioned at `offset`.
pub fn read_frame<R: Read>(reader: &mut R, offset: u64, limit: u64) -> io::Result<Frame> {
    if offset >= limit {
        return Ok(Frame::End);
    }
    if offset + HEADER_SIZE > limit {
        return Ok(Frame::Torn("truncated header"));
    }
    let mut header = [0u8; HEADER_SIZE as usize];
    reader.read_exact(&mut header)?;
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    if length == 0 {
        return Ok(Frame::Invalid {
            reason: "zero-length record",
            len: HEADER_SIZE,
        });
    }
    if offset + HEADER_SIZE + length as u64 > limit {
        return Ok(Frame::Torn("truncated payload"));
    }

    let len = HEADER_SIZE + length as u64;
    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload)?;
    if crc32fast::hash(&payload) != expected_crc {
        return Ok(Frame::Invalid {
            reason: "crc mismatch",
            len,
        });
    }
    let well_formed = match payload[0] {
        KIND_CHUNK => payload.len() >= 1 + HASH_LEN,
        KIND_ROOT => payload.len() == 1 + HASH_LEN + 8,
        _ => false,
    };
    if !well_formed {
        return Ok(Frame::Invalid {
            reason: "unknown record kind or bad length",
            len,
        });
    }
    Ok(Frame::Record(RawRecord {
        offset,
        len: len as u32,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame_of(record: &JournalRecord) -> Vec<u8> {
        record.encode(1).unwrap()
    }

    fn read(bytes: &[u8]) -> Frame {
        read_frame(&mut Cursor::new(bytes), 0, bytes.len() as u64).unwrap()
    }

    #[test]
    fn chunk_record_roundtrip() {
        let chunk = Chunk::new(b"journal chunk".to_vec());
        let record = JournalRecord::Chunk(chunk.clone());
        let bytes = frame_of(&record);
        let Frame::Record(raw) = read(&bytes) else { panic!("expected record") };
        assert_eq!(raw.len as usize, bytes.len());
        assert_eq!(raw.kind(), RecordKind::Chunk);
        assert_eq!(raw.chunk_hash(), Some(chunk.hash()));
        assert_eq!(raw.decode().unwrap(), record);
    }

    #[test]
    fn root_record_roundtrip() {
        let record = JournalRecord::Root(RootRecord::now(Hash::of(b"root")));
        let Frame::Record(raw) = read(&frame_of(&record)) else { panic!("expected record") };
        assert_eq!(raw.kind(), RecordKind::Root);
        assert_eq!(raw.chunk_hash(), None);
        assert_eq!(raw.decode().unwrap(), record);
    }

    #[test]
    fn detects_torn_frames() {
        let bytes = frame_of(&JournalRecord::Chunk(Chunk::new(b"x".to_vec())));
        assert!(matches!(read(&bytes[..4]), Frame::Torn(_)));
        assert!(matches!(read(&bytes[..bytes.len() - 1]), Frame::Torn(_)));
        assert!(matches!(read(&[]), Frame::End));
    }

    #[test]
    fn detects_crc_mismatch() {
        let mut bytes = frame_of(&JournalRecord::Chunk(Chunk::new(b"x".to_vec())));
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(read(&bytes), Frame::Invalid { reason: "crc mismatch", .. }));
    }

    #[test]
    fn detects_zero_length() {
        assert!(matches!(read(&[0u8; 8]), Frame::Invalid { reason: "zero-length record", len: 8 }));
    }

    #[test]
    fn detects_hash_mismatch() {
        let forged = Chunk::from_parts(Hash::of(b"one"), b"two".to_vec());
        let bytes = frame_of(&JournalRecord::Chunk(forged));
        let Frame::Record(raw) = read(&bytes) else { panic!("expected record") };
        assert!(matches!(raw.decode(), Err(JournalError::HashMismatch { .. })));
    }
}
