//! Manifest contents: one immutable, versioned description of a store.

use serde::{Deserialize, Serialize};
use tessera_types::Hash;

/// Which generation an archive belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Generation {
    /// Long-lived content; touched only by full GC and promotion.
    Old,
    /// Recently written content; the target of shallow GC.
    New,
}

/// One archive named by a manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Archive name; the file is `<name>.darc`.
    pub name: Hash,
    pub chunk_count: u32,
    pub generation: Generation,
}

/// The journal named by a manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSpec {
    pub identity: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestContents {
    /// Strictly increasing across published manifests.
    pub version: u64,
    /// Optimistic lock over `root`, `journal` and `specs`.
    pub lock: Hash,
    pub root: Hash,
    /// Bumped by every garbage collection.
    pub gc_generation: u64,
    pub journal: Option<JournalSpec>,
    pub specs: Vec<TableSpec>,
}

impl ManifestContents {
    /// The manifest of a store that has never been written.
    pub fn empty() -> Self {
        let mut contents = Self {
            version: 0,
            lock: Hash::empty(),
            root: Hash::empty(),
            gc_generation: 0,
            journal: None,
            specs: Vec::new(),
        };
        contents.lock = contents.compute_lock();
        contents
    }

    pub fn compute_lock(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.root.as_bytes());
        match &self.journal {
            Some(journal) => {
                hasher.update(&[1]);
                hasher.update(journal.identity.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        for spec in &self.specs {
            hasher.update(spec.name.as_bytes());
            hasher.update(&spec.chunk_count.to_be_bytes());
            hasher.update(&[match spec.generation {
                Generation::Old => 0,
                Generation::New => 1,
            }]);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; tessera_types::HASH_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[..tessera_types::HASH_LEN]);
        Hash::from_raw(bytes)
    }

    /// A draft for the next manifest. `version` and `lock` are assigned when
    /// the draft is published.
    pub fn next(&self) -> Self {
        self.clone()
    }

    pub fn with_root(mut self, root: Hash) -> Self {
        self.root = root;
        self
    }

    pub fn with_journal(mut self, journal: Option<JournalSpec>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_specs(mut self, specs: Vec<TableSpec>) -> Self {
        self.specs = specs;
        self
    }

    pub fn specs_in(&self, generation: Generation) -> impl Iterator<Item = &TableSpec> {
        self.specs.iter().filter(move |s| s.generation == generation)
    }

    /// Total chunks across the archives of one generation.
    pub fn chunk_count(&self, generation: Generation) -> u64 {
        self.specs_in(generation).map(|s| s.chunk_count as u64).sum()
    }

    pub fn names(&self, name: &Hash) -> bool {
        self.specs.iter().any(|s| s.name == *name)
    }
}
