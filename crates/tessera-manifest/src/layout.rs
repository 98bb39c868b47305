//! On-disk layout of a store directory.
//!
//! ```text
//! <root>/manifest.json
//! <root>/<name>.darc          new-generation archives
//! <root>/<identity>.jnl       journal
//! <root>/<identity>.idx       journal index
//! <root>/oldgen/<name>.darc   old-generation archives
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tessera_archive::{archive_file_name, ARCHIVE_EXTENSION};
use tessera_journal::{index_file_name, journal_file_name, INDEX_EXTENSION, JOURNAL_EXTENSION};
use tessera_types::Hash;

use crate::contents::{Generation, ManifestContents, TableSpec};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const OLD_GEN_DIR: &str = "oldgen";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.old_gen_dir())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn generation_dir(&self, generation: Generation) -> PathBuf {
        match generation {
            Generation::New => self.root.clone(),
            Generation::Old => self.old_gen_dir(),
        }
    }

    pub fn old_gen_dir(&self) -> PathBuf {
        self.root.join(OLD_GEN_DIR)
    }

    pub fn archive_path(&self, spec: &TableSpec) -> PathBuf {
        self.generation_dir(spec.generation).join(archive_file_name(&spec.name))
    }

    /// The journal lives beside the new generation.
    pub fn journal_dir(&self) -> &Path {
        &self.root
    }

    pub fn journal_path(&self, identity: &Hash) -> PathBuf {
        self.root.join(journal_file_name(identity))
    }

    pub fn journal_index_path(&self, identity: &Hash) -> PathBuf {
        self.root.join(index_file_name(identity))
    }

    /// Every file a manifest names.
    pub fn files_of(&self, contents: &ManifestContents) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = contents.specs.iter().map(|s| self.archive_path(s)).collect();
        if let Some(journal) = &contents.journal {
            files.push(self.journal_path(&journal.identity));
            files.push(self.journal_index_path(&journal.identity));
        }
        files
    }

    /// Store data files currently on disk in either generation directory.
    pub fn list_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in [self.root.clone(), self.old_gen_dir()] {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            for entry in entries {
                let path = entry?.path();
                let is_data = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| [ARCHIVE_EXTENSION, JOURNAL_EXTENSION, INDEX_EXTENSION].contains(&e));
                if is_data && path.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Total size of the store's data files and manifest.
    pub fn size_on_disk(&self) -> io::Result<u64> {
        let mut total = 0;
        for path in self.list_files()? {
            total += fs::metadata(path)?.len();
        }
        match fs::metadata(self.manifest_path()) {
            Ok(meta) => total += meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(total)
    }
}
