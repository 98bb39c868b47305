//! Moving content between tiers: journal → new generation → old generation.

use tessera_archive::{conjoin, ArchiveBuilder, ArchiveReader};
use tessera_manifest::{Generation, TableSpec};
use tracing::info;

use crate::error::StoreResult;
use crate::store::{Exclusive, FileSetChange, GenerationalStore};

/// What a compaction did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// New-generation archive the journal was packed into.
    pub packed: Option<TableSpec>,
    /// Old-generation archive the new generation was promoted into.
    pub promoted: Option<TableSpec>,
    /// Manifest version after compaction.
    pub version: u64,
}

impl CompactionReport {
    pub fn is_noop(&self) -> bool {
        self.packed.is_none() && self.promoted.is_none()
    }
}

impl GenerationalStore {
    /// Apply the compaction policy once.
    pub fn compact(&self) -> StoreResult<CompactionReport> {
        let access = self.exclusive();
        let policy = self.config().compaction.clone();
        let mut report = CompactionReport::default();

        let journal_chunks = access.state().journal().chunk_count();
        if journal_chunks > 0 && journal_chunks >= policy.journal_archive_threshold {
            report.packed = Some(pack_journal(&access)?);
        }
        if let Some(threshold) = policy.promote_threshold {
            let state = access.state();
            let new_chunks = state.manifest().chunk_count(Generation::New);
            if !state.generation(Generation::New).is_empty() && new_chunks >= threshold {
                drop(state);
                report.promoted = Some(promote(&access)?);
            }
        }
        report.version = access.state().version();
        Ok(report)
    }
}

/// Pack every journal chunk into one new-generation archive and rotate the
/// journal.
pub fn pack_journal(access: &Exclusive<'_>) -> StoreResult<TableSpec> {
    let state = access.state();
    let mut builder = ArchiveBuilder::new(access.config().compression.clone()).with_origin("journal");
    state.journal().visit_chunks(|chunk| {
        builder.add(chunk);
    })?;
    let spec = access.write_archive(builder.build()?, Generation::New)?;
    let journal = access.rotate_journal()?;

    let mut specs = state.manifest().specs.clone();
    if !specs.iter().any(|s| s.name == spec.name) {
        specs.push(spec);
    }
    drop(state);
    let published = access.publish(FileSetChange {
        specs,
        journal: Some(journal),
        bump_gc_generation: false,
    })?;
    info!(
        archive = %spec.name,
        chunks = spec.chunk_count,
        version = published.version(),
        "journal packed"
    );
    Ok(spec)
}

/// Conjoin every new-generation archive into one old-generation archive.
pub fn promote(access: &Exclusive<'_>) -> StoreResult<TableSpec> {
    let state = access.state();
    let sources: Vec<&ArchiveReader> = state
        .generation(Generation::New)
        .iter()
        .map(|a| a.reader.as_ref())
        .collect();
    let writer = conjoin(sources, Some("promote".into()))?;
    let spec = access.write_archive(writer, Generation::Old)?;

    let mut specs: Vec<TableSpec> = state.manifest().specs_in(Generation::Old).copied().collect();
    if !specs.iter().any(|s| s.name == spec.name) {
        specs.push(spec);
    }
    let from = state.generation(Generation::New).len();
    drop(state);
    let published = access.publish(FileSetChange {
        specs,
        journal: None,
        bump_gc_generation: false,
    })?;
    info!(
        archive = %spec.name,
        from,
        chunks = spec.chunk_count,
        version = published.version(),
        "new generation promoted"
    );
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use crate::config::{CompactionPolicy, StoreConfig};
    use crate::store::GenerationalStore;
    use crate::traits::ChunkStore;
    use crate::Tier;
    use tessera_manifest::Generation;
    use tessera_types::Chunk;

    fn config(journal: u64, promote: Option<u64>) -> StoreConfig {
        StoreConfig {
            compaction: CompactionPolicy {
                journal_archive_threshold: journal,
                promote_threshold: promote,
            },
            ..StoreConfig::default()
        }
    }

    fn put_batch(store: &GenerationalStore, tag: &str, n: u32) -> Vec<Chunk> {
        (0..n)
            .map(|i| {
                let c = Chunk::new(format!("{tag} {i}").into_bytes());
                store.put(&c).unwrap();
                c
            })
            .collect()
    }

    #[test]
    fn below_threshold_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = GenerationalStore::open(dir.path(), config(10, None)).unwrap();
        put_batch(&store, "x", 3);
        let before = store.manifest().version;
        let report = store.compact().unwrap();
        assert!(report.is_noop());
        assert_eq!(report.version, before);
    }

    #[test]
    fn journal_is_packed_and_rotated() {
        let dir = tempfile::tempdir().unwrap();
        let store = GenerationalStore::open(dir.path(), config(5, None)).unwrap();
        let chunks = put_batch(&store, "pack", 8);
        let root = chunks[0].hash();
        store.commit(root, store.root()).unwrap();
        let old_journal = store.manifest().journal.unwrap().identity;

        let report = store.compact().unwrap();
        let packed = report.packed.unwrap();
        assert_eq!(packed.chunk_count, 8);
        assert_eq!(packed.generation, Generation::New);

        let state = store.snapshot();
        assert_eq!(state.journal().chunk_count(), 0);
        assert_ne!(state.journal().identity(), old_journal);
        // The reflog survives rotation.
        assert_eq!(state.journal().latest_root().unwrap().root, root);
        for c in &chunks {
            assert_eq!(state.locate(&c.hash()), Some(Tier::NewGen));
            assert_eq!(store.get(&c.hash()).unwrap().as_ref(), Some(c));
        }
        drop(state);
        store.reclaim();
        assert!(!store.layout().journal_path(&old_journal).exists());
        assert!(!store.put(&chunks[0]).unwrap());
        assert_eq!(store.snapshot().journal().chunk_count(), 0);
    }

    #[test]
    fn promotion_conjoins_new_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = GenerationalStore::open(dir.path(), config(1, Some(10))).unwrap();
        let first = put_batch(&store, "first", 6);
        let report = store.compact().unwrap();
        assert!(report.packed.is_some());
        assert!(report.promoted.is_none());

        let second = put_batch(&store, "second", 6);
        let report = store.compact().unwrap();
        let promoted = report.promoted.unwrap();
        assert_eq!(promoted.chunk_count, 12);
        assert_eq!(promoted.generation, Generation::Old);

        let stats = store.stats().unwrap();
        assert_eq!(stats.old_gen_archives, 1);
        assert_eq!(stats.new_gen_archives, 0);
        for c in first.iter().chain(&second) {
            assert_eq!(store.snapshot().locate(&c.hash()), Some(Tier::OldGen));
            assert_eq!(store.get(&c.hash()).unwrap().as_ref(), Some(c));
        }
    }

    #[test]
    fn snapshot_outlives_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = GenerationalStore::open(dir.path(), config(1, Some(1))).unwrap();
        let chunks = put_batch(&store, "held", 4);
        let held = store.snapshot();
        store.compact().unwrap();
        store.reclaim();
        assert!(held.version() < store.manifest().version);
        for c in &chunks {
            assert_eq!(held.get(&c.hash()).unwrap().as_ref(), Some(c));
        }
    }
}
