//! Companion index for a journal.
//!
//! The index file maps every chunk hash in the journal to its record and
//! carries the journal's root records. It names the journal length it
//! covers; an index whose length disagrees with the journal on disk is
//! stale and gets rebuilt. The index is purely an optimization: losing it
//! costs a rebuild, never data.
//!
//! On-disk format: `[bincode IndexFile][crc32 of the bincode bytes, u32 LE]`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tessera_types::Hash;
use tracing::{debug, warn};

use crate::error::{JournalError, Result};
use crate::record::RootRecord;

const INDEX_VERSION: u32 = 1;

/// Bootstrap state of a journal's index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexState {
    /// Below the record threshold; lookups scan the journal.
    NoIndex,
    /// Rebuilding from a full scan.
    Building,
    /// The in-memory index covers every record.
    Fresh,
    /// An index file exists but does not match the journal.
    Stale,
}

/// Position of a record in the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLocation {
    pub offset: u64,
    pub len: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexFile {
    pub version: u32,
    pub journal_len: u64,
    pub record_count: u64,
    pub chunks: Vec<(Hash, RecordLocation)>,
    pub roots: Vec<RootRecord>,
}

impl IndexFile {
    pub fn new(
        journal_len: u64,
        record_count: u64,
        chunks: &HashMap<Hash, RecordLocation>,
        roots: impl IntoIterator<Item = RootRecord>,
    ) -> Self {
        let mut chunks: Vec<(Hash, RecordLocation)> =
            chunks.iter().map(|(h, loc)| (*h, *loc)).collect();
        chunks.sort_by_key(|(_, loc)| loc.offset);
        Self {
            version: INDEX_VERSION,
            journal_len,
            record_count,
            chunks,
            roots: roots.into_iter().collect(),
        }
    }

    /// Write atomically next to the journal.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let mut bytes = bincode::serialize(self).map_err(|e| JournalError::Index(e.to_string()))?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| JournalError::Io(e.error))?;
        debug!(
            path = %path.display(),
            journal_len = self.journal_len,
            chunks = self.chunks.len(),
            "journal index persisted"
        );
        Ok(())
    }

    /// Load an index file. `Ok(None)` if there is none; an unreadable or
    /// corrupt file is reported as an error for the caller to treat as
    /// stale.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.len() < 4 {
            return Err(JournalError::Index("index file too short".into()));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if crc32fast::hash(body) != expected {
            return Err(JournalError::Index("index checksum mismatch".into()));
        }
        let file: Self =
            bincode::deserialize(body).map_err(|e| JournalError::Index(e.to_string()))?;
        if file.version != INDEX_VERSION {
            return Err(JournalError::Index(format!("unsupported index version {}", file.version)));
        }
        Ok(Some(file))
    }
}

/// Classify the index file at `path` against a journal of `journal_len`
/// bytes, returning the file when it is fresh.
pub(crate) fn classify(path: &Path, journal_len: u64) -> (IndexState, Option<IndexFile>) {
    match IndexFile::load(path) {
        Ok(Some(file)) if file.journal_len == journal_len => (IndexState::Fresh, Some(file)),
        Ok(Some(file)) => {
            debug!(
                indexed = file.journal_len,
                journal_len, "journal index does not match journal length"
            );
            (IndexState::Stale, None)
        }
        Ok(None) => (IndexState::NoIndex, None),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable journal index; treating as stale");
            (IndexState::Stale, None)
        }
    }
}

/// Index state as seen from outside, without loading the journal.
pub fn probe(path: &Path, journal_len: u64) -> IndexState {
    classify(path, journal_len).0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexFile {
        let mut chunks = HashMap::new();
        chunks.insert(Hash::of(b"a"), RecordLocation { offset: 0, len: 40 });
        chunks.insert(Hash::of(b"b"), RecordLocation { offset: 40, len: 41 });
        IndexFile::new(81, 2, &chunks, vec![RootRecord::now(Hash::of(b"r"))])
    }

    #[test]
    fn persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.idx");
        sample().persist(&path).unwrap();
        let loaded = IndexFile::load(&path).unwrap().unwrap();
        assert_eq!(loaded.journal_len, 81);
        assert_eq!(loaded.chunks.len(), 2);
        assert_eq!(loaded.chunks[0].1.offset, 0);
        assert_eq!(loaded.roots.len(), 1);
    }

    #[test]
    fn classify_states() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.idx");
        assert_eq!(probe(&path, 81), IndexState::NoIndex);
        sample().persist(&path).unwrap();
        assert_eq!(probe(&path, 81), IndexState::Fresh);
        assert_eq!(probe(&path, 100), IndexState::Stale);
        std::fs::write(&path, b"garbage bytes").unwrap();
        assert_eq!(probe(&path, 81), IndexState::Stale);
    }
}
