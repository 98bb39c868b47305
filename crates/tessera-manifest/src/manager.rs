//! Publishing manifests and reclaiming the files they stop naming.
//!
//! Published manifests are immutable `Arc<ManifestContents>` snapshots
//! behind a single [`ArcSwap`]. Publishing is the store's only
//! serialization point: updates are checked against the caller's last
//! seen lock, assigned the next version, written to disk, then swapped in.
//!
//! Each replaced snapshot is handed to a [`Reclaimer`] as a weak reference,
//! together with the files its successor dropped. Those files are deleted
//! only once no held snapshot names them.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use arc_swap::ArcSwap;
use tessera_types::Hash;
use tracing::{debug, info, warn};

use crate::contents::ManifestContents;
use crate::error::{ManifestError, Result};
use crate::file::FileManifest;
use crate::layout::StoreLayout;

/// Deferred deletion of files dropped from the manifest.
///
/// Every replaced snapshot is tracked weakly, whether or not its successor
/// dropped anything: a reader may hold a root-only version whose files are
/// retired by a later update.
#[derive(Default)]
pub struct Reclaimer {
    snapshots: Vec<Weak<ManifestContents>>,
    pending: Vec<PathBuf>,
}

impl Reclaimer {
    /// Track `snapshot`, just replaced, and queue the `files` its successor
    /// no longer names.
    pub fn retire(&mut self, snapshot: &Arc<ManifestContents>, files: Vec<PathBuf>) {
        self.snapshots.push(Arc::downgrade(snapshot));
        for path in files {
            if !self.pending.contains(&path) {
                self.pending.push(path);
            }
        }
    }

    pub fn pending_files(&self) -> usize {
        self.pending.len()
    }

    /// Files named by `current` or by any replaced snapshot still held.
    fn protected(&mut self, current: &ManifestContents, layout: &StoreLayout) -> HashSet<PathBuf> {
        self.snapshots.retain(|s| s.strong_count() > 0);
        let mut protected: HashSet<PathBuf> = layout.files_of(current).into_iter().collect();
        for snapshot in self.snapshots.iter().filter_map(Weak::upgrade) {
            protected.extend(layout.files_of(&snapshot));
        }
        protected
    }

    /// Delete every queued file that neither the current manifest nor a
    /// still-held snapshot names. Returns the paths removed.
    pub fn sweep(&mut self, current: &ManifestContents, layout: &StoreLayout) -> Vec<PathBuf> {
        let named: HashSet<PathBuf> = layout.files_of(current).into_iter().collect();
        let protected = self.protected(current, layout);
        let mut removed = Vec::new();
        let mut kept = Vec::new();
        for path in self.pending.drain(..) {
            // Named again by the current manifest; a later update re-queues it.
            if named.contains(&path) {
                continue;
            }
            if protected.contains(&path) {
                kept.push(path);
                continue;
            }
            match remove_if_present(&path) {
                Ok(true) => removed.push(path),
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to reclaim file");
                    kept.push(path);
                }
            }
        }
        self.pending = kept;
        if !removed.is_empty() {
            info!(files = removed.len(), held = self.snapshots.len(), "reclaimed files");
        }
        removed
    }
}

fn remove_if_present(path: &std::path::Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

pub struct ManifestManager {
    layout: StoreLayout,
    file: FileManifest,
    current: ArcSwap<ManifestContents>,
    update_lock: Mutex<()>,
    reclaimer: Mutex<Reclaimer>,
}

impl ManifestManager {
    /// Open the manifest under `layout`, writing an empty one if the store
    /// is new.
    pub fn open(layout: StoreLayout) -> Result<Self> {
        layout.create_dirs()?;
        let file = FileManifest::new(layout.manifest_path());
        let contents = match file.load()? {
            Some(contents) => contents,
            None => {
                let contents = ManifestContents::empty();
                file.store(&contents)?;
                info!(root = %layout.root().display(), "initialized empty manifest");
                contents
            }
        };
        debug!(version = contents.version, specs = contents.specs.len(), "manifest opened");
        Ok(Self {
            layout,
            file,
            current: ArcSwap::from_pointee(contents),
            update_lock: Mutex::new(()),
            reclaimer: Mutex::new(Reclaimer::default()),
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// The published manifest. Holding the `Arc` keeps every file it names
    /// on disk.
    pub fn current(&self) -> Arc<ManifestContents> {
        self.current.load_full()
    }

    /// Publish `next` if the current lock is still `last_lock`.
    ///
    /// `next.version` and `next.lock` are overwritten. Returns the published
    /// snapshot; fails with [`ManifestError::Conflict`] when another update
    /// won the race.
    pub fn update(&self, last_lock: Hash, mut next: ManifestContents) -> Result<Arc<ManifestContents>> {
        let _guard = self.update_lock.lock().expect("manifest lock poisoned");
        let prev = self.current.load_full();
        if prev.lock != last_lock {
            return Err(ManifestError::Conflict {
                expected: last_lock,
                actual: prev.lock,
            });
        }
        next.version = prev.version + 1;
        next.lock = next.compute_lock();
        self.file.store(&next)?;

        let published = Arc::new(next);
        self.current.store(Arc::clone(&published));
        info!(
            version = published.version,
            root = %published.root,
            specs = published.specs.len(),
            "manifest published"
        );

        let keep: HashSet<PathBuf> = self.layout.files_of(&published).into_iter().collect();
        let dropped: Vec<PathBuf> = self
            .layout
            .files_of(&prev)
            .into_iter()
            .filter(|p| !keep.contains(p))
            .collect();
        let mut reclaimer = self.reclaimer.lock().expect("reclaimer lock poisoned");
        reclaimer.retire(&prev, dropped);
        drop(prev);
        reclaimer.sweep(&published, &self.layout);
        Ok(published)
    }

    /// Retry deletion of files whose last holder has since been dropped.
    pub fn reclaim(&self) -> Vec<PathBuf> {
        let current = self.current();
        self.reclaimer
            .lock()
            .expect("reclaimer lock poisoned")
            .sweep(&current, &self.layout)
    }

    pub fn pending_reclamation(&self) -> usize {
        self.reclaimer.lock().expect("reclaimer lock poisoned").pending_files()
    }

    /// Delete data files on disk that no manifest, current or still held,
    /// names. Callers must hold off writers while this runs.
    pub fn remove_orphans(&self) -> Result<Vec<PathBuf>> {
        let current = self.current();
        let mut reclaimer = self.reclaimer.lock().expect("reclaimer lock poisoned");
        let mut protected = reclaimer.protected(&current, &self.layout);
        protected.extend(reclaimer.pending.iter().cloned());
        let mut removed = Vec::new();
        for path in self.layout.list_files()? {
            if !protected.contains(&path) && remove_if_present(&path)? {
                removed.push(path);
            }
        }
        if !removed.is_empty() {
            info!(files = removed.len(), "removed orphaned files");
        }
        Ok(removed)
    }
}
