//! Archive file format for the Tessera chunk store.
//!
//! An archive (`.darc`) is an immutable file of compressed chunks, laid out
//! as `[byte spans][chunk index][metadata][footer]`.
//!
//! # Architecture
//!
//! - **Byte spans**: each compressed payload, and each shared compression
//!   dictionary, is its own span with a 1-based ID
//! - **Chunk index**: prefix-sorted tables mapping a hash to its spans
//! - **ArchiveWriter**: staged low-level writer (spans, index, metadata, footer)
//! - **ArchiveBuilder**: groups small chunks behind a trained zstd dictionary
//! - **IndexReader**: one lookup contract, implemented in memory
//!   ([`InMemoryIndex`]) and over a memory mapping ([`MmapIndex`])
//! - **ArchiveReader**: opens a file with the configured [`ReaderKind`]
//! - **conjoin**: merges archives by copying spans verbatim
//! - **inspect**: reports for file, object-id, and index inspection

pub mod builder;
pub mod conjoin;
pub mod error;
pub mod format;
pub mod index;
pub mod inspect;
pub mod memory;
pub mod mmap;
pub mod reader;
pub mod writer;

pub use builder::{ArchiveBuilder, CompressionConfig};
pub use conjoin::conjoin;
pub use error::{ArchiveError, ArchiveResult};
pub use format::{
    archive_file_name, ArchiveMetadata, ByteSpan, ChunkRef, CompressionKind, Footer,
    ARCHIVE_EXTENSION, FORMAT_VERSION,
};
pub use index::{ChunkLocation, IndexEntry, IndexReader, ReaderKind};
pub use inspect::{ArchiveInspector, FileReport, IndexReport, ObjectReport};
pub use memory::InMemoryIndex;
pub use mmap::MmapIndex;
pub use reader::ArchiveReader;
pub use writer::{ArchiveFile, ArchiveWriter, Stage};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::Path;
    use tessera_types::{Chunk, ErrorClass, Hash};

    const KINDS: [ReaderKind; 2] = [ReaderKind::InMemory, ReaderKind::Mmap];

    fn row_chunks(n: u32) -> Vec<Chunk> {
        (0..n)
            .map(|i| {
                Chunk::new(
                    format!(r#"{{"id": {i}, "name": "user-{i}", "balance": {}}}"#, i * 37)
                        .into_bytes(),
                )
            })
            .collect()
    }

    fn write_archive(dir: &Path, chunks: &[Chunk]) -> ArchiveFile {
        let mut builder = ArchiveBuilder::new(CompressionConfig::default()).with_origin("test");
        for chunk in chunks {
            builder.add(chunk.clone());
        }
        builder.finish(dir).unwrap()
    }

    #[test]
    fn roundtrip_with_both_readers() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = row_chunks(10);
        let file = write_archive(dir.path(), &chunks);

        for kind in KINDS {
            let reader = ArchiveReader::open(&file.path, kind).unwrap();
            assert_eq!(reader.kind(), kind);
            assert_eq!(reader.chunk_count(), 10);
            assert_eq!(reader.name(), Some(file.name));
            for chunk in &chunks {
                let read = reader.get(&chunk.hash()).unwrap().unwrap();
                assert_eq!(read, *chunk);
            }
            assert!(reader.get(&Hash::of(b"absent")).unwrap().is_none());
        }
    }

    #[test]
    fn dictionary_archive_has_one_extra_span() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = row_chunks(230);
        let file = write_archive(dir.path(), &chunks);
        assert_eq!(file.chunk_count, 230);
        assert_eq!(file.byte_span_count, 231);

        for kind in KINDS {
            let reader = ArchiveReader::open(&file.path, kind).unwrap();
            for chunk in &chunks {
                let loc = reader.lookup(&chunk.hash()).unwrap();
                assert_eq!(loc.compression, CompressionKind::ZstdDictionary);
                assert_eq!(loc.dictionary, Some(1));
                assert_eq!(reader.get(&chunk.hash()).unwrap().unwrap(), *chunk);
            }
        }
    }

    #[test]
    fn inspect_index_and_object_ids() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_archive(dir.path(), &row_chunks(230));

        for kind in KINDS {
            let inspector = ArchiveInspector::open(&file.path, kind).unwrap();
            let report = inspector.file_report();
            assert_eq!(report.chunk_count, 230);
            assert_eq!(report.byte_span_count, 231);
            assert_eq!(report.signature, "TESSARC");
            assert_eq!(report.format_version, FORMAT_VERSION);
            assert_eq!(report.metadata.unwrap().origin.as_deref(), Some("test"));
            assert!(report.metadata_error.is_none());

            let first = inspector.index("0").unwrap();
            assert_eq!(first.reader, kind);
            assert_eq!(first.chunk_count, 230);
            assert_eq!(first.byte_span_count, 231);
            assert_eq!(first.prefix_hex, first.hash.prefix_hex());
            assert!(inspector.reader().contains(&first.hash));

            let err = inspector.index("99999999").unwrap_err();
            assert!(matches!(err, ArchiveError::IndexOutOfRange { .. }));
            assert!(err.to_string().contains("index out of range"));

            let err = inspector.index("abc").unwrap_err();
            assert!(err.to_string().contains("Expected unsigned integer"));
            assert_eq!(err.class(), ErrorClass::Format);

            let absent = inspector.object("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
            assert!(absent.location.is_none());
            assert_eq!(absent.prefix_hex.len(), 16);
            assert_eq!(absent.suffix_hex.len(), 24);
            assert!(matches!(absent.require_found(), Err(ArchiveError::NotFound(_))));

            let err = inspector.object("invalid").unwrap_err();
            assert_eq!(err.class(), ErrorClass::Format);
            assert_eq!(
                err.to_string(),
                "Invalid object ID format. Expected 32-character base32 encoded hash."
            );

            let present = inspector.object(&first.hash.to_string()).unwrap();
            let loc = present.require_found().unwrap();
            assert_eq!(loc.index, 0);
            assert_eq!(loc.dictionary.unwrap().id, 1);
            assert!(loc.data.span.length > 0);
        }
    }

    #[test]
    fn missing_file_is_reported_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.darc");
        for kind in KINDS {
            let err = ArchiveReader::open(&path, kind).unwrap_err();
            assert!(matches!(err, ArchiveError::FileNotFound(_)));
            assert!(err.to_string().contains("file does not exist"));
        }
    }

    #[test]
    fn garbage_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.darc");
        std::fs::write(&path, vec![0x42u8; 100]).unwrap();
        for kind in KINDS {
            let err = ArchiveReader::open(&path, kind).unwrap_err();
            assert!(matches!(err, ArchiveError::InvalidSignature { .. }));
        }

        std::fs::write(&path, b"short").unwrap();
        for kind in KINDS {
            assert!(matches!(
                ArchiveReader::open(&path, kind),
                Err(ArchiveError::Truncated(5))
            ));
        }
    }

    #[test]
    fn dangling_span_ref_is_a_consistency_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_archive(dir.path(), &row_chunks(3));
        let mut bytes = std::fs::read(&file.path).unwrap();

        let footer_at = bytes.len() - format::FOOTER_LEN as usize;
        let footer = Footer::decode(&bytes[footer_at..]).unwrap();
        let layout = footer.layout(bytes.len() as u64).unwrap();
        let data_ref_at = layout.refs_offset as usize + 4;
        bytes[data_ref_at..data_ref_at + 4].copy_from_slice(&99u32.to_be_bytes());
        std::fs::write(&file.path, &bytes).unwrap();

        for kind in KINDS {
            let err = ArchiveReader::open(&file.path, kind).unwrap_err();
            assert!(matches!(err, ArchiveError::SpanOutOfRange { id: 99, .. }));
            assert_eq!(err.class(), ErrorClass::Consistency);
        }
    }

    #[test]
    fn unreadable_metadata_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = row_chunks(3);
        let file = write_archive(dir.path(), &chunks);
        let mut bytes = std::fs::read(&file.path).unwrap();

        let footer_at = bytes.len() - format::FOOTER_LEN as usize;
        let footer = Footer::decode(&bytes[footer_at..]).unwrap();
        let layout = footer.layout(bytes.len() as u64).unwrap();
        bytes[layout.metadata_offset as usize] = b'#';
        std::fs::write(&file.path, &bytes).unwrap();

        for kind in KINDS {
            let inspector = ArchiveInspector::open(&file.path, kind).unwrap();
            let report = inspector.file_report();
            assert!(report.metadata.is_none());
            assert!(report.metadata_error.is_some());
            assert_eq!(report.chunk_count, 3);
            assert_eq!(inspector.reader().get(&chunks[0].hash()).unwrap().as_ref(), Some(&chunks[0]));
        }
    }

    #[test]
    fn conjoin_merges_archives() {
        let dir = tempfile::tempdir().unwrap();
        let all = row_chunks(60);
        let a = write_archive(dir.path(), &all[..40]);
        let b = write_archive(dir.path(), &all[30..]);
        let a = ArchiveReader::open(&a.path, ReaderKind::InMemory).unwrap();
        let b = ArchiveReader::open(&b.path, ReaderKind::Mmap).unwrap();

        let merged = conjoin([&a, &b], Some("conjoin".into()))
            .unwrap()
            .finish(dir.path())
            .unwrap();
        assert_eq!(merged.chunk_count, 60);
        assert_eq!(merged.byte_span_count, a.byte_span_count() + b.byte_span_count());

        let reader = ArchiveReader::open(&merged.path, ReaderKind::Mmap).unwrap();
        for chunk in &all {
            assert_eq!(reader.get(&chunk.hash()).unwrap().unwrap(), *chunk);
        }
    }

    #[test]
    fn empty_archive_opens() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_archive(dir.path(), &[]);
        for kind in KINDS {
            let reader = ArchiveReader::open(&file.path, kind).unwrap();
            assert_eq!(reader.chunk_count(), 0);
            assert_eq!(reader.byte_span_count(), 0);
            assert!(matches!(
                reader.index().index_at(0),
                Err(ArchiveError::IndexOutOfRange { index: 0, count: 0 })
            ));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn readers_agree(payloads in proptest::collection::hash_set(
            proptest::collection::vec(any::<u8>(), 0..300), 0..60)
        ) {
            let dir = tempfile::tempdir().unwrap();
            let chunks: Vec<Chunk> = payloads.into_iter().map(Chunk::new).collect();
            let file = write_archive(dir.path(), &chunks);
            let mem = ArchiveReader::open(&file.path, ReaderKind::InMemory).unwrap();
            let map = ArchiveReader::open(&file.path, ReaderKind::Mmap).unwrap();

            prop_assert_eq!(mem.chunk_count(), map.chunk_count());
            prop_assert_eq!(mem.byte_span_count(), map.byte_span_count());
            prop_assert_eq!(mem.chunk_count() as usize, chunks.len());
            for chunk in &chunks {
                let h = chunk.hash();
                prop_assert_eq!(mem.lookup(&h), map.lookup(&h));
                prop_assert_eq!(mem.get(&h).unwrap().unwrap(), chunk.clone());
                prop_assert_eq!(map.get(&h).unwrap().unwrap(), chunk.clone());
            }
            for i in 0..mem.chunk_count() as u64 {
                prop_assert_eq!(mem.index().index_at(i).unwrap(), map.index().index_at(i).unwrap());
            }
        }
    }
}
