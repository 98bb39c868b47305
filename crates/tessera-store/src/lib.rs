//! Generational chunk store for Tessera.
//!
//! A store directory holds a manifest, a write journal, new-generation
//! archives and, under `oldgen/`, old-generation archives. The manifest
//! names which of those files make up the store; everything else on disk
//! is either retired or orphaned.
//!
//! # Design Rules
//!
//! 1. Chunks are immutable and addressed by content hash.
//! 2. `put` appends to the journal; archives are only ever written whole.
//! 3. The manifest swap is the single serialization point for file-set
//!    changes, and manifest versions strictly increase.
//! 4. A published [`StoreState`] stays readable for as long as it is held.
//! 5. The journal is the source of truth for the latest root.

pub mod compact;
pub mod config;
pub mod error;
pub mod state;
pub mod store;
pub mod traits;

pub use compact::{pack_journal, promote, CompactionReport};
pub use config::{CompactionPolicy, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use state::{OpenArchive, StoreState, Tier};
pub use store::{Exclusive, FileSetChange, GenerationalStore, StoreStats};
pub use traits::ChunkStore;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use tessera_archive::ReaderKind;
    use tessera_types::{Chunk, Hash};

    fn config(reader: ReaderKind) -> StoreConfig {
        StoreConfig {
            reader,
            compaction: CompactionPolicy {
                journal_archive_threshold: 1,
                promote_threshold: Some(1),
            },
            ..StoreConfig::default()
        }
    }

    #[test]
    fn concurrent_puts_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GenerationalStore::open(dir.path(), config(ReaderKind::Mmap)).unwrap());
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut written = Vec::new();
                    for i in 0..25u32 {
                        // Every thread writes the shared chunk too.
                        let shared = Chunk::new(b"shared".to_vec());
                        store.put(&shared).unwrap();
                        let c = Chunk::new(format!("{t}:{i}").into_bytes());
                        store.put(&c).unwrap();
                        assert_eq!(store.get(&c.hash()).unwrap().as_ref(), Some(&c));
                        written.push(c);
                    }
                    written
                })
            })
            .collect();
        let all: Vec<Chunk> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert_eq!(store.snapshot().journal().chunk_count(), 101);

        store.compact().unwrap();
        for c in &all {
            assert_eq!(store.get(&c.hash()).unwrap().as_ref(), Some(c));
        }
    }

    #[test]
    fn reopen_after_compaction_with_either_reader() {
        let dir = tempfile::tempdir().unwrap();
        let chunks: Vec<Chunk> = (0..40u32).map(|i| Chunk::new(vec![i as u8; 100 + i as usize])).collect();
        {
            let store = GenerationalStore::open(dir.path(), config(ReaderKind::InMemory)).unwrap();
            for c in &chunks {
                store.put(c).unwrap();
            }
            store.commit(chunks[0].hash(), Hash::empty()).unwrap();
            store.compact().unwrap();
        }
        for reader in [ReaderKind::InMemory, ReaderKind::Mmap] {
            let store = GenerationalStore::open(dir.path(), config(reader)).unwrap();
            assert_eq!(store.root(), chunks[0].hash());
            assert_eq!(store.stats().unwrap().old_gen_chunks, 40);
            for c in &chunks {
                assert_eq!(store.get(&c.hash()).unwrap().as_ref(), Some(c));
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn roundtrip_through_every_tier(payloads in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..200), 1..30)
        ) {
            let dir = tempfile::tempdir().unwrap();
            let store = GenerationalStore::open(dir.path(), config(ReaderKind::InMemory)).unwrap();
            let chunks: Vec<Chunk> = payloads.into_iter().map(Chunk::new).collect();
            let half = chunks.len() / 2;
            for c in &chunks[..half] {
                store.put(c).unwrap();
            }
            store.compact().unwrap();
            for c in &chunks[half..] {
                store.put(c).unwrap();
            }
            for c in &chunks {
                prop_assert_eq!(store.get(&c.hash()).unwrap(), Some(c.clone()));
            }
        }
    }
}
