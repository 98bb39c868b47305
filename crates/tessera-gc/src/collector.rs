use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tessera_refs::{LiveRefSource, LiveRoot, Liveness};
use tessera_store::{GenerationalStore, StoreError};
use tracing::{info, warn};

use crate::error::GcResult;
use crate::mark::{GcMode, Marker, SkippedChunk};
use crate::sweep::sweep;
use crate::walker::{LinkedNodeWalker, RefWalker};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Threads marking roots in parallel.
    pub mark_workers: usize,
    /// Newest reflog entries kept alive as best-effort roots. Older
    /// entries stay in the reflog but no longer pin their content.
    pub reflog_roots: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            mark_workers: 4,
            reflog_roots: 0,
        }
    }
}

/// What one collection did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcReport {
    pub mode: GcMode,
    pub noop: bool,
    pub version_before: u64,
    pub version_after: u64,
    pub gc_generation: u64,
    pub roots: usize,
    pub visited: usize,
    pub reachable: usize,
    pub chunks_before: u64,
    pub chunks_after: u64,
    pub skipped: Vec<SkippedChunk>,
    /// Data files deleted by this collection, including orphans.
    pub removed: Vec<PathBuf>,
    pub size_before: u64,
    pub size_after: u64,
}

impl GcReport {
    pub fn reclaimed_bytes(&self) -> u64 {
        self.size_before.saturating_sub(self.size_after)
    }
}

/// Mark-and-sweep collector over a [`GenerationalStore`].
///
/// A collection holds the store exclusively from the first mark to the
/// final publish: writers block and a second collection fails with a
/// `Busy` error. Readers holding older snapshots are unaffected; files
/// they still use are deleted only after they let go.
pub struct GarbageCollector<W = LinkedNodeWalker> {
    config: GcConfig,
    walker: W,
}

impl GarbageCollector<LinkedNodeWalker> {
    pub fn linked(config: GcConfig) -> Self {
        Self::new(config, LinkedNodeWalker)
    }
}

impl<W: RefWalker> GarbageCollector<W> {
    pub fn new(config: GcConfig, walker: W) -> Self {
        Self { config, walker }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Collect everything unreachable from the store's committed root, its
    /// newest [`GcConfig::reflog_roots`] reflog entries and `sources`.
    pub fn collect(
        &self,
        store: &GenerationalStore,
        sources: &[&dyn LiveRefSource],
        mode: GcMode,
    ) -> GcResult<GcReport> {
        let access = store.begin_gc()?;
        let files_before = list_files(store)?;
        let size_before = store.size_on_disk()?;
        let state = access.state();
        let version_before = state.version();

        // The store lists its committed root first, then the reflog newest
        // first.
        let (mut roots, reflog): (Vec<LiveRoot>, Vec<LiveRoot>) = store
            .live_roots()?
            .into_iter()
            .partition(|r| r.liveness == Liveness::Required);
        roots.extend(reflog.into_iter().take(self.config.reflog_roots));
        for source in sources {
            roots.extend(source.live_roots()?);
        }
        let required = roots.iter().filter(|r| r.liveness == Liveness::Required).count();
        info!(?mode, version = version_before, roots = roots.len(), required, "collection started");

        let marked = Marker::new(&state, &self.walker, mode, self.config.mark_workers).mark(&roots)?;
        drop(state);

        let swept = sweep(&access, &marked.reachable, mode)?;
        let orphans = access.remove_orphans()?;
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "removed orphaned files");
        }
        let (version_after, gc_generation) = {
            let published = access.state();
            (published.version(), published.manifest().gc_generation)
        };
        drop(access);
        store.reclaim();

        let files_after: HashSet<PathBuf> = list_files(store)?.into_iter().collect();
        let removed = files_before
            .into_iter()
            .filter(|f| !files_after.contains(f))
            .collect();
        let report = GcReport {
            mode,
            noop: swept.noop,
            version_before,
            version_after,
            gc_generation,
            roots: roots.len(),
            visited: marked.visited,
            reachable: marked.reachable.len(),
            chunks_before: swept.chunks_before,
            chunks_after: swept.chunks_after,
            skipped: marked.skipped,
            removed,
            size_before,
            size_after: store.size_on_disk()?,
        };
        info!(
            ?mode,
            noop = report.noop,
            version = report.version_after,
            reachable = report.reachable,
            removed = report.removed.len(),
            reclaimed_bytes = report.reclaimed_bytes(),
            "collection finished"
        );
        Ok(report)
    }
}

fn list_files(store: &GenerationalStore) -> GcResult<Vec<PathBuf>> {
    Ok(store.layout().list_files().map_err(StoreError::from)?)
}
