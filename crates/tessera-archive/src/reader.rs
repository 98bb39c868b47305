use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tessera_types::{Chunk, Hash};
use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{ArchiveMetadata, ARCHIVE_EXTENSION};
use crate::index::{ChunkLocation, IndexReader, ReaderKind};
use crate::memory::InMemoryIndex;
use crate::mmap::MmapIndex;

/// Random-access reader for one archive file.
///
/// The index implementation is picked by [`ReaderKind`] at open time.
/// Decompressed dictionaries are cached per span.
pub struct ArchiveReader {
    path: PathBuf,
    file_size: u64,
    index: Box<dyn IndexReader>,
    dictionaries: Mutex<HashMap<u32, Arc<Vec<u8>>>>,
}

impl ArchiveReader {
    /// Open an archive. A missing path is reported as
    /// [`ArchiveError::FileNotFound`] before any parsing.
    pub fn open(path: &Path, kind: ReaderKind) -> ArchiveResult<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArchiveError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let file_size = file.metadata()?.len();
        let index: Box<dyn IndexReader> = match kind {
            ReaderKind::InMemory => Box::new(InMemoryIndex::open(file, file_size)?),
            ReaderKind::Mmap => Box::new(MmapIndex::open(&file, file_size)?),
        };
        debug!(
            path = %path.display(),
            reader = %kind,
            chunks = index.chunk_count(),
            spans = index.byte_span_count(),
            "archive opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            file_size,
            index,
            dictionaries: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive name parsed from the file name, if it follows
    /// `<name>.darc`.
    pub fn name(&self) -> Option<Hash> {
        if self.path.extension()? != ARCHIVE_EXTENSION {
            return None;
        }
        Hash::parse(self.path.file_stem()?.to_str()?).ok()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn kind(&self) -> ReaderKind {
        self.index.kind()
    }

    pub fn index(&self) -> &dyn IndexReader {
        self.index.as_ref()
    }

    pub fn chunk_count(&self) -> u32 {
        self.index.chunk_count()
    }

    pub fn byte_span_count(&self) -> u32 {
        self.index.byte_span_count()
    }

    pub fn lookup(&self, hash: &Hash) -> Option<ChunkLocation> {
        self.index.lookup(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.lookup(hash).is_some()
    }

    /// Every chunk hash in index order.
    pub fn hashes(&self) -> impl Iterator<Item = Hash> + '_ {
        (0..self.chunk_count()).map(|i| self.index.hash_at(i))
    }

    pub fn read_span(&self, id: u32) -> ArchiveResult<Cow<'_, [u8]>> {
        self.index.read_span(id)
    }

    /// Raw bytes of the whole data section.
    pub fn data_section(&self) -> ArchiveResult<Cow<'_, [u8]>> {
        self.index.read_range(0, self.index.data_len())
    }

    pub fn metadata(&self) -> ArchiveResult<ArchiveMetadata> {
        ArchiveMetadata::from_bytes(&self.index.metadata_bytes()?)
    }

    /// Read and decompress a chunk. Returns `Ok(None)` if the archive does
    /// not hold it.
    pub fn get(&self, hash: &Hash) -> ArchiveResult<Option<Chunk>> {
        let Some(location) = self.index.lookup(hash) else {
            return Ok(None);
        };
        let compressed = self.index.read_span(location.data)?;
        let data = match location.dictionary {
            None => zstd::decode_all(&compressed[..])
                .map_err(|e| ArchiveError::Decompression(e.to_string()))?,
            Some(dict_id) => {
                let dictionary = self.dictionary(dict_id)?;
                let mut decoder =
                    zstd::stream::read::Decoder::with_dictionary(&compressed[..], &dictionary[..])
                        .map_err(|e| ArchiveError::Decompression(e.to_string()))?;
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| ArchiveError::Decompression(e.to_string()))?;
                out
            }
        };
        let chunk = Chunk::from_parts(*hash, data);
        if !chunk.verify() {
            return Err(ArchiveError::HashMismatch {
                expected: *hash,
                actual: Hash::of(chunk.data()),
            });
        }
        Ok(Some(chunk))
    }

    fn dictionary(&self, id: u32) -> ArchiveResult<Arc<Vec<u8>>> {
        if let Some(dict) = self.dictionaries.lock().expect("lock poisoned").get(&id) {
            return Ok(Arc::clone(dict));
        }
        let stored = self.index.read_span(id)?;
        let dict = Arc::new(
            zstd::decode_all(&stored[..])
                .map_err(|e| ArchiveError::Decompression(e.to_string()))?,
        );
        self.dictionaries
            .lock()
            .expect("lock poisoned")
            .insert(id, Arc::clone(&dict));
        Ok(dict)
    }
}

impl fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("path", &self.path)
            .field("kind", &self.kind())
            .field("chunks", &self.chunk_count())
            .finish()
    }
}
