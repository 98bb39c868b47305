//! The generational chunk store.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arc_swap::ArcSwap;
use tessera_archive::ArchiveWriter;
use tessera_journal::{ChunkJournal, IndexState, RootRecord};
use tessera_manifest::{
    Generation, JournalSpec, ManifestContents, ManifestError, ManifestManager, StoreLayout,
    TableSpec,
};
use tessera_refs::{LiveRefSource, LiveRoot};
use tessera_types::{Chunk, Hash};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::state::StoreState;
use crate::traits::ChunkStore;

/// A chunk store split into an old generation, a new generation and a
/// write journal.
///
/// Writes land in the journal. [`compact`](Self::compact) packs the journal
/// into new-generation archives and promotes those into the old generation.
/// The garbage collector rewrites generations through
/// [`begin_gc`](Self::begin_gc).
///
/// Reads go through the currently published [`StoreState`]. Writers take
/// the write gate shared; compaction and collection take it exclusively,
/// so file-set changes never interleave with `put` or `commit`.
pub struct GenerationalStore {
    layout: StoreLayout,
    config: StoreConfig,
    manifest: ManifestManager,
    state: ArcSwap<StoreState>,
    write_gate: RwLock<()>,
    commit_lock: Mutex<()>,
    gc_active: AtomicBool,
}

/// Counts and sizes for one published state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreStats {
    pub version: u64,
    pub root: Hash,
    pub gc_generation: u64,
    pub old_gen_archives: usize,
    pub old_gen_chunks: u64,
    pub new_gen_archives: usize,
    pub new_gen_chunks: u64,
    pub journal: Hash,
    pub journal_chunks: u64,
    pub journal_records: u64,
    pub journal_bytes: u64,
    pub journal_index: IndexState,
    pub reflog_entries: usize,
    pub size_on_disk: u64,
}

pub(crate) fn new_journal_identity() -> Hash {
    Hash::from_raw(rand::random())
}

impl GenerationalStore {
    /// Open the store rooted at `root`, creating it if needed.
    ///
    /// The journal's latest root record wins over the manifest's root: a
    /// commit that reached the journal but not the manifest is completed
    /// here.
    pub fn open(root: impl Into<PathBuf>, config: StoreConfig) -> StoreResult<Self> {
        let layout = StoreLayout::new(root);
        let manifest = ManifestManager::open(layout.clone())?;

        let mut contents = manifest.current();
        let identity = match contents.journal {
            Some(journal) => journal.identity,
            None => {
                let identity = new_journal_identity();
                let next = contents.next().with_journal(Some(JournalSpec { identity }));
                contents = manifest.update(contents.lock, next)?;
                info!(journal = %identity, "created journal");
                identity
            }
        };
        let journal = Arc::new(ChunkJournal::open(
            layout.journal_dir(),
            identity,
            config.journal.clone(),
        )?);

        if let Some(latest) = journal.latest_root() {
            if latest.root != contents.root {
                warn!(
                    manifest_root = %contents.root,
                    journal_root = %latest.root,
                    "manifest behind journal; adopting journal root"
                );
                contents = manifest.update(contents.lock, contents.next().with_root(latest.root))?;
            }
        }

        let state = StoreState::open(&layout, config.reader, contents, journal, None)?;
        info!(
            root = %layout.root().display(),
            version = state.version(),
            archives = state.archives().count(),
            "store opened"
        );
        Ok(Self {
            layout,
            config,
            manifest,
            state: ArcSwap::from_pointee(state),
            write_gate: RwLock::new(()),
            commit_lock: Mutex::new(()),
            gc_active: AtomicBool::new(false),
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn path(&self) -> &Path {
        self.layout.root()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The published state. Reads through a snapshot keep working while
    /// newer versions, including collections, are published.
    pub fn snapshot(&self) -> Arc<StoreState> {
        self.state.load_full()
    }

    pub fn manifest(&self) -> Arc<ManifestContents> {
        self.manifest.current()
    }

    /// Root records, oldest first.
    pub fn reflog(&self) -> Vec<RootRecord> {
        self.snapshot().journal().roots()
    }

    pub fn size_on_disk(&self) -> StoreResult<u64> {
        Ok(self.layout.size_on_disk()?)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let state = self.snapshot();
        let manifest = state.manifest();
        let journal = state.journal();
        Ok(StoreStats {
            version: manifest.version,
            root: manifest.root,
            gc_generation: manifest.gc_generation,
            old_gen_archives: state.generation(Generation::Old).len(),
            old_gen_chunks: manifest.chunk_count(Generation::Old),
            new_gen_archives: state.generation(Generation::New).len(),
            new_gen_chunks: manifest.chunk_count(Generation::New),
            journal: journal.identity(),
            journal_chunks: journal.chunk_count(),
            journal_records: journal.record_count(),
            journal_bytes: journal.len(),
            journal_index: journal.state(),
            reflog_entries: journal.roots().len(),
            size_on_disk: self.size_on_disk()?,
        })
    }

    /// Flush and sync the journal.
    pub fn sync(&self) -> StoreResult<()> {
        Ok(self.snapshot().journal().sync()?)
    }

    /// Delete files released by snapshots that have since been dropped.
    pub fn reclaim(&self) -> Vec<PathBuf> {
        self.manifest.reclaim()
    }

    /// Take the store exclusively for a file-set change. Blocks until
    /// in-flight writes finish.
    pub fn exclusive(&self) -> Exclusive<'_> {
        Exclusive {
            store: self,
            _gate: self.write_gate.write().expect("write gate poisoned"),
            gc: false,
        }
    }

    /// Take the store exclusively for a collection. Fails with
    /// [`StoreError::GcInProgress`] when one is already running.
    pub fn begin_gc(&self) -> StoreResult<Exclusive<'_>> {
        if self
            .gc_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StoreError::GcInProgress);
        }
        let mut access = self.exclusive();
        access.gc = true;
        Ok(access)
    }

    pub fn gc_in_progress(&self) -> bool {
        self.gc_active.load(Ordering::SeqCst)
    }

    fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.write_gate.read().expect("write gate poisoned")
    }
}

impl ChunkStore for GenerationalStore {
    fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        self.snapshot().get(hash)
    }

    fn has(&self, hash: &Hash) -> StoreResult<bool> {
        Ok(self.snapshot().has(hash))
    }

    fn put(&self, chunk: &Chunk) -> StoreResult<bool> {
        let _gate = self.shared();
        let state = self.snapshot();
        if state.archives().any(|a| a.reader.contains(&chunk.hash())) {
            return Ok(false);
        }
        Ok(state.journal().append(chunk)?.is_some())
    }

    fn root(&self) -> Hash {
        self.snapshot().root()
    }

    fn commit(&self, current: Hash, last: Hash) -> StoreResult<bool> {
        let _gate = self.shared();
        let _commit = self.commit_lock.lock().expect("commit lock poisoned");
        let state = self.snapshot();
        let manifest = state.manifest();
        if manifest.root != last {
            debug!(expected = %last, actual = %manifest.root, "commit lost race");
            return Ok(false);
        }
        state.journal().commit_root(current)?;
        state.journal().sync()?;

        let published = match self.manifest.update(manifest.lock, manifest.next().with_root(current)) {
            Ok(published) => published,
            Err(ManifestError::Conflict { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        self.state.store(Arc::new(state.with_manifest(published)));
        debug!(root = %current, "committed");
        Ok(true)
    }
}

/// Reflog entries are best-effort roots; the published root is required.
impl LiveRefSource for GenerationalStore {
    fn live_roots(&self) -> tessera_refs::Result<Vec<LiveRoot>> {
        let state = self.snapshot();
        let mut roots = vec![LiveRoot::required("root", state.root())];
        roots.extend(
            state
                .journal()
                .roots()
                .into_iter()
                .rev()
                .enumerate()
                .map(|(i, r)| LiveRoot::best_effort(format!("reflog@{{{i}}}"), r.root)),
        );
        Ok(roots)
    }
}

impl fmt::Debug for GenerationalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationalStore")
            .field("root", &self.layout.root())
            .field("version", &self.snapshot().version())
            .finish()
    }
}

/// Exclusive access to a store's file set.
///
/// While held, no `put` or `commit` runs, so the published state cannot
/// change underneath the holder.
pub struct Exclusive<'a> {
    store: &'a GenerationalStore,
    _gate: RwLockWriteGuard<'a, ()>,
    gc: bool,
}

/// A new file set to publish.
pub struct FileSetChange {
    pub specs: Vec<TableSpec>,
    /// Replacement journal, if the old one was rotated out.
    pub journal: Option<Arc<ChunkJournal>>,
    /// Set by collections.
    pub bump_gc_generation: bool,
}

impl<'a> Exclusive<'a> {
    pub fn state(&self) -> Arc<StoreState> {
        self.store.snapshot()
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.store.layout
    }

    pub fn config(&self) -> &StoreConfig {
        &self.store.config
    }

    /// Write a sealed archive into the directory of `generation`.
    pub fn write_archive(&self, writer: ArchiveWriter, generation: Generation) -> StoreResult<TableSpec> {
        let dir = self.store.layout.generation_dir(generation);
        let file = writer.finish(&dir)?;
        debug!(
            name = %file.name,
            chunks = file.chunk_count,
            size = file.size,
            ?generation,
            "archive written"
        );
        Ok(TableSpec {
            name: file.name,
            chunk_count: file.chunk_count,
            generation,
        })
    }

    /// Open a fresh journal carrying the newest root records of the current
    /// one.
    pub fn rotate_journal(&self) -> StoreResult<Arc<ChunkJournal>> {
        let config = &self.store.config.journal;
        let state = self.state();
        let journal = ChunkJournal::open(
            self.store.layout.journal_dir(),
            new_journal_identity(),
            config.clone(),
        )?;
        let roots = state.journal().roots();
        let carried = roots.len().saturating_sub(config.reflog_retention);
        for record in &roots[carried..] {
            journal.append_root(*record)?;
        }
        journal.sync()?;
        debug!(
            from = %state.journal().identity(),
            to = %journal.identity(),
            roots = roots.len() - carried,
            "journal rotated"
        );
        Ok(Arc::new(journal))
    }

    /// Publish `change` as the next manifest version.
    ///
    /// Readers are opened before the manifest is swapped, so a failure to
    /// open leaves the published state untouched. Files the old state named
    /// are reclaimed once its last holder drops it.
    pub fn publish(&self, change: FileSetChange) -> StoreResult<Arc<StoreState>> {
        let state = self.state();
        let journal = change
            .journal
            .clone()
            .unwrap_or_else(|| Arc::clone(state.journal()));

        let mut next = state
            .manifest()
            .next()
            .with_specs(change.specs)
            .with_journal(Some(JournalSpec {
                identity: journal.identity(),
            }));
        if change.bump_gc_generation {
            next.gc_generation += 1;
        }
        let staged = StoreState::open(
            &self.store.layout,
            self.store.config.reader,
            Arc::new(next.clone()),
            journal,
            Some(&state),
        )?;
        let published = self.store.manifest.update(state.manifest().lock, next)?;
        let published = Arc::new(staged.with_manifest(published));
        self.store.state.store(Arc::clone(&published));

        if change.journal.is_some() {
            state.journal().retire();
        }
        drop(state);
        self.store.manifest.reclaim();
        Ok(published)
    }

    /// Delete data files no manifest names, left behind by interrupted
    /// file-set changes.
    pub fn remove_orphans(&self) -> StoreResult<Vec<PathBuf>> {
        Ok(self.store.manifest.remove_orphans()?)
    }
}

impl Drop for Exclusive<'_> {
    fn drop(&mut self) {
        if self.gc {
            self.store.gc_active.store(false, Ordering::SeqCst);
        }
    }
}
