//! Offline journal inspection.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tessera_types::Hash;
use tracing::debug;

use crate::error::{JournalError, Result};
use crate::index::{probe, IndexState};
use crate::journal::INDEX_EXTENSION;
use crate::record::{read_frame, Frame, JournalRecord, RecordKind, RootRecord, HEADER_SIZE};

/// Summary of a journal file, produced without opening it for writing.
#[derive(Clone, Debug)]
pub struct JournalReport {
    pub path: PathBuf,
    pub file_len: u64,
    /// Length of the record prefix an open would keep.
    pub valid_len: u64,
    pub good_records: u64,
    pub chunk_records: u64,
    pub root_records: u64,
    pub zero_length_records: u64,
    /// Complete frames that failed their checksum or shape check.
    pub failed_records: u64,
    /// Longest run of consecutive good records.
    pub longest_run: u64,
    /// Set when the file ends mid-frame.
    pub torn_tail: Option<String>,
    pub index_state: IndexState,
    pub roots: Vec<RootRecord>,
    pub chunk_hashes: Vec<Hash>,
}

impl JournalReport {
    /// Every byte belongs to a good record.
    pub fn healthy(&self) -> bool {
        self.valid_len == self.file_len
    }

    pub fn trailing_bytes(&self) -> u64 {
        self.file_len - self.valid_len
    }
}

/// Scan a journal read-only. Unlike opening a journal this never truncates,
/// and it keeps going past complete-but-invalid frames so the report covers
/// the whole file.
pub fn inspect_journal(path: &Path) -> Result<JournalReport> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(JournalError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let file_len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(file);

    let mut report = JournalReport {
        path: path.to_path_buf(),
        file_len,
        valid_len: 0,
        good_records: 0,
        chunk_records: 0,
        root_records: 0,
        zero_length_records: 0,
        failed_records: 0,
        longest_run: 0,
        torn_tail: None,
        index_state: probe(&path.with_extension(INDEX_EXTENSION), file_len),
        roots: Vec::new(),
        chunk_hashes: Vec::new(),
    };

    let mut offset = 0u64;
    let mut run = 0u64;
    let mut clean = true;
    loop {
        match read_frame(&mut reader, offset, file_len)? {
            Frame::Record(raw) => {
                match raw.kind() {
                    RecordKind::Chunk => {
                        report.chunk_records += 1;
                        report.chunk_hashes.extend(raw.chunk_hash());
                    }
                    RecordKind::Root => {
                        report.root_records += 1;
                        if let JournalRecord::Root(root) = raw.decode()? {
                            report.roots.push(root);
                        }
                    }
                }
                offset += raw.len as u64;
                report.good_records += 1;
                run += 1;
                report.longest_run = report.longest_run.max(run);
                if clean {
                    report.valid_len = offset;
                }
            }
            Frame::Invalid { reason, len } => {
                if len == HEADER_SIZE {
                    report.zero_length_records += 1;
                } else {
                    report.failed_records += 1;
                }
                debug!(offset, reason, "invalid journal frame");
                offset += len;
                run = 0;
                clean = false;
            }
            Frame::Torn(reason) => {
                report.torn_tail = Some(reason.to_string());
                break;
            }
            Frame::End => break,
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{ChunkJournal, JournalConfig};
    use std::fs::OpenOptions;
    use tessera_types::Chunk;

    #[test]
    fn reports_records_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let identity = Hash::of(b"inspect");
        let path = {
            let journal = ChunkJournal::open(dir.path(), identity, JournalConfig::default()).unwrap();
            journal.append(&Chunk::new(b"a".to_vec())).unwrap();
            journal.append(&Chunk::new(b"b".to_vec())).unwrap();
            journal.commit_root(Hash::of(b"root")).unwrap();
            journal.path().to_path_buf()
        };

        let report = inspect_journal(&path).unwrap();
        assert!(report.healthy());
        assert_eq!(report.chunk_records, 2);
        assert_eq!(report.root_records, 1);
        assert_eq!(report.roots[0].root, Hash::of(b"root"));
        assert_eq!(report.index_state, IndexState::NoIndex);

        let len = report.file_len;
        OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 2).unwrap();
        let report = inspect_journal(&path).unwrap();
        assert!(!report.healthy());
        assert_eq!(report.root_records, 0);
        assert_eq!(report.good_records, 2);
        assert_eq!(report.torn_tail.as_deref(), Some("truncated payload"));
        // Inspection leaves the file alone.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len - 2);
    }

    #[test]
    fn scans_past_invalid_frames() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ChunkJournal::open(dir.path(), Hash::of(b"runs"), JournalConfig::default()).unwrap();
        let mut bounds = Vec::new();
        for i in 0..5u8 {
            let loc = journal.append(&Chunk::new(vec![i; 32])).unwrap().unwrap();
            bounds.push(loc);
        }
        let path = journal.path().to_path_buf();
        drop(journal);

        // Flip a payload byte in the second record.
        let mut bytes = std::fs::read(&path).unwrap();
        let at = (bounds[1].offset + bounds[1].len as u64 - 1) as usize;
        bytes[at] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let report = inspect_journal(&path).unwrap();
        assert!(!report.healthy());
        assert_eq!(report.valid_len, bounds[1].offset);
        assert_eq!(report.good_records, 4);
        assert_eq!(report.failed_records, 1);
        assert_eq!(report.zero_length_records, 0);
        assert_eq!(report.longest_run, 3);
        assert!(report.torn_tail.is_none());
    }

    #[test]
    fn missing_journal() {
        let dir = tempfile::tempdir().unwrap();
        let err = inspect_journal(&dir.path().join("none.jnl")).unwrap_err();
        assert!(matches!(err, JournalError::NotFound(_)));
    }
}
