//! Append-only write journal for the Tessera chunk store.
//!
//! New chunks and root updates land in a journal before they are ever
//! packed into an archive. A journal is a sequence of CRC-framed records;
//! a companion index (`<identity>.idx`) is built once the journal holds
//! enough chunks to make linear scans expensive, and rebuilt from the
//! journal whenever it is missing or stale.

pub mod error;
pub mod index;
pub mod inspect;
pub mod journal;
pub mod record;

pub use error::{JournalError, Result};
pub use index::{probe as probe_index, IndexState, RecordLocation};
pub use inspect::{inspect_journal, JournalReport};
pub use journal::{
    index_file_name, journal_file_name, ChunkJournal, JournalConfig, SyncMode, INDEX_EXTENSION,
    JOURNAL_EXTENSION,
};
pub use record::{JournalRecord, RecordKind, RootRecord};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tessera_types::{Chunk, ErrorClass, Hash};

    #[test]
    fn concurrent_appends_are_all_readable() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(
            ChunkJournal::open(
                dir.path(),
                Hash::of(b"concurrent"),
                JournalConfig {
                    index_threshold: 50,
                    ..JournalConfig::default()
                },
            )
            .unwrap(),
        );

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let journal = Arc::clone(&journal);
                thread::spawn(move || {
                    (0..40)
                        .map(|i| {
                            let chunk = Chunk::new(format!("thread {t} chunk {i}").into_bytes());
                            journal.append(&chunk).unwrap();
                            chunk
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let written: Vec<Chunk> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();

        assert_eq!(journal.chunk_count(), 160);
        assert_eq!(journal.state(), IndexState::Fresh);
        for chunk in &written {
            assert_eq!(journal.get(&chunk.hash()).unwrap().as_ref(), Some(chunk));
        }
    }

    #[test]
    fn journal_and_inspection_agree() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ChunkJournal::open(dir.path(), Hash::of(b"agree"), JournalConfig::default()).unwrap();
        for i in 0..10u8 {
            journal.append(&Chunk::new(vec![i; 64])).unwrap();
        }
        journal.commit_root(Hash::of(b"r1")).unwrap();
        journal.sync().unwrap();

        let report = inspect_journal(journal.path()).unwrap();
        assert_eq!(report.file_len, journal.len());
        assert_eq!(report.chunk_records, journal.chunk_count());
        assert_eq!(report.chunk_hashes, journal.chunk_hashes().unwrap());
        assert_eq!(report.roots, journal.roots());
    }

    #[test]
    fn error_classes() {
        let err = inspect_journal(std::path::Path::new("/nonexistent/x.jnl")).unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
        let err = JournalError::Corrupt {
            offset: 0,
            reason: "x".into(),
        };
        assert_eq!(err.class(), ErrorClass::Consistency);
    }
}
