//! Manifest persistence: JSON, replaced by a single atomic rename.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::contents::ManifestContents;
use crate::error::{ManifestError, Result};

const MANIFEST_FORMAT: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ManifestDocument {
    format: u32,
    #[serde(flatten)]
    contents: ManifestContents,
}

#[derive(Clone, Debug)]
pub struct FileManifest {
    path: PathBuf,
}

impl FileManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no manifest has been written yet.
    pub fn load(&self) -> Result<Option<ManifestContents>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc: ManifestDocument =
            serde_json::from_slice(&bytes).map_err(|source| ManifestError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        if doc.format != MANIFEST_FORMAT {
            return Err(ManifestError::UnsupportedFormat(doc.format));
        }
        Ok(Some(doc.contents))
    }

    /// Write to a temporary file in the same directory, sync it, then rename
    /// over the manifest. Readers see the old file or the new one, never a mix.
    pub fn store(&self, contents: &ManifestContents) -> Result<()> {
        let doc = ManifestDocument {
            format: MANIFEST_FORMAT,
            contents: contents.clone(),
        };
        let json = serde_json::to_vec_pretty(&doc).map_err(|source| ManifestError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ManifestError::Io(e.error))?;
        debug!(path = %self.path.display(), version = contents.version, "manifest written");
        Ok(())
    }
}
