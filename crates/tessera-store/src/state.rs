//! The published state of a store: one manifest version plus the open
//! readers and journal it names.

use std::sync::Arc;

use tessera_archive::{ArchiveReader, ReaderKind};
use tessera_journal::ChunkJournal;
use tessera_manifest::{Generation, ManifestContents, StoreLayout, TableSpec};
use tessera_types::{Chunk, Hash};

use crate::error::StoreResult;

/// An open archive with the manifest entry that named it.
#[derive(Clone)]
pub struct OpenArchive {
    pub spec: TableSpec,
    pub reader: Arc<ArchiveReader>,
}

/// Immutable view of a store at one manifest version.
///
/// Holding an `Arc<StoreState>` keeps its manifest snapshot alive, and with
/// it every file the snapshot names, so reads keep working across later
/// publishes and collections.
pub struct StoreState {
    manifest: Arc<ManifestContents>,
    old_gen: Vec<OpenArchive>,
    new_gen: Vec<OpenArchive>,
    journal: Arc<ChunkJournal>,
}

impl StoreState {
    /// Open every archive `manifest` names, reusing readers from `previous`
    /// where the same archive is already open.
    pub(crate) fn open(
        layout: &StoreLayout,
        reader: ReaderKind,
        manifest: Arc<ManifestContents>,
        journal: Arc<ChunkJournal>,
        previous: Option<&StoreState>,
    ) -> StoreResult<Self> {
        let mut old_gen = Vec::new();
        let mut new_gen = Vec::new();
        for spec in &manifest.specs {
            let reused = previous.and_then(|p| p.archives().find(|a| a.spec == *spec).cloned());
            let archive = match reused {
                Some(archive) => archive,
                None => OpenArchive {
                    spec: *spec,
                    reader: Arc::new(ArchiveReader::open(&layout.archive_path(spec), reader)?),
                },
            };
            match spec.generation {
                Generation::Old => old_gen.push(archive),
                Generation::New => new_gen.push(archive),
            }
        }
        Ok(Self {
            manifest,
            old_gen,
            new_gen,
            journal,
        })
    }

    /// Same files under a newer manifest that only moved the root.
    pub(crate) fn with_manifest(&self, manifest: Arc<ManifestContents>) -> Self {
        Self {
            manifest,
            old_gen: self.old_gen.clone(),
            new_gen: self.new_gen.clone(),
            journal: Arc::clone(&self.journal),
        }
    }

    pub fn manifest(&self) -> &Arc<ManifestContents> {
        &self.manifest
    }

    pub fn version(&self) -> u64 {
        self.manifest.version
    }

    pub fn root(&self) -> Hash {
        self.manifest.root
    }

    pub fn journal(&self) -> &Arc<ChunkJournal> {
        &self.journal
    }

    pub fn generation(&self, generation: Generation) -> &[OpenArchive] {
        match generation {
            Generation::Old => &self.old_gen,
            Generation::New => &self.new_gen,
        }
    }

    /// Old generation first, then new.
    pub fn archives(&self) -> impl Iterator<Item = &OpenArchive> {
        self.old_gen.iter().chain(self.new_gen.iter())
    }

    /// Read through old generation, new generation, then the journal.
    pub fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        for archive in self.archives() {
            if let Some(chunk) = archive.reader.get(hash)? {
                return Ok(Some(chunk));
            }
        }
        Ok(self.journal.get(hash)?)
    }

    pub fn has(&self, hash: &Hash) -> bool {
        self.archives().any(|a| a.reader.contains(hash)) || self.journal.has(hash)
    }

    /// Which tier holds `hash`, checked in read order.
    pub fn locate(&self, hash: &Hash) -> Option<Tier> {
        if self.old_gen.iter().any(|a| a.reader.contains(hash)) {
            Some(Tier::OldGen)
        } else if self.new_gen.iter().any(|a| a.reader.contains(hash)) {
            Some(Tier::NewGen)
        } else if self.journal.has(hash) {
            Some(Tier::Journal)
        } else {
            None
        }
    }
}

/// Where a chunk lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    OldGen,
    NewGen,
    Journal,
}
