//! The index-reader contract shared by the in-memory and memory-mapped
//! implementations.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_types::{search, Hash, Suffix};

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{ByteSpan, ChunkRef, CompressionKind, Footer};

/// Which index reader to open an archive with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReaderKind {
    /// Deserialize the whole index into memory at open.
    #[default]
    InMemory,
    /// Read the index straight from a memory mapping of the file.
    Mmap,
}

impl fmt::Display for ReaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => f.write_str("in-memory"),
            Self::Mmap => f.write_str("mmap"),
        }
    }
}

/// Where a chunk's payload lives inside an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLocation {
    /// Position in the sorted index.
    pub index: u32,
    pub compression: CompressionKind,
    pub dictionary: Option<u32>,
    pub data: u32,
}

/// One decoded index slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: Hash,
    pub prefix: u64,
    pub suffix: Suffix,
}

/// Read access to an archive's index and data section.
///
/// Implementors provide raw slot accessors; lookups, span resolution and
/// range checks are shared default methods, so every implementation answers
/// identically for the same file.
pub trait IndexReader: Send + Sync {
    fn kind(&self) -> ReaderKind;

    fn footer(&self) -> &Footer;

    /// Length of the data section.
    fn data_len(&self) -> u64;

    /// Prefix in slot `idx`. `idx` must be below `chunk_count()`.
    fn prefix_at(&self, idx: u32) -> u64;

    /// Suffix in slot `idx`. `idx` must be below `chunk_count()`.
    fn suffix_at(&self, idx: u32) -> Suffix;

    /// Span refs in slot `idx`. `idx` must be below `chunk_count()`.
    fn chunk_ref_at(&self, idx: u32) -> ChunkRef;

    /// End offset of the 0-based span `idx`.
    fn span_end_at(&self, idx: u32) -> u64;

    /// Read `len` bytes of the data section starting at `offset`.
    fn read_range(&self, offset: u64, len: u64) -> ArchiveResult<Cow<'_, [u8]>>;

    /// Raw metadata bytes.
    fn metadata_bytes(&self) -> ArchiveResult<Cow<'_, [u8]>>;

    fn chunk_count(&self) -> u32 {
        self.footer().chunk_count
    }

    fn byte_span_count(&self) -> u32 {
        self.footer().byte_span_count
    }

    fn hash_at(&self, idx: u32) -> Hash {
        Hash::from_parts(self.prefix_at(idx), self.suffix_at(idx))
    }

    fn lookup(&self, hash: &Hash) -> Option<ChunkLocation> {
        let idx = search::find(
            self.chunk_count() as usize,
            hash,
            |i| self.prefix_at(i as u32),
            |i| self.suffix_at(i as u32),
        )? as u32;
        let chunk_ref = self.chunk_ref_at(idx);
        Some(ChunkLocation {
            index: idx,
            compression: chunk_ref.compression(),
            dictionary: chunk_ref.dictionary_span(),
            data: chunk_ref.data,
        })
    }

    fn index_at(&self, idx: u64) -> ArchiveResult<IndexEntry> {
        let count = self.chunk_count();
        if idx >= count as u64 {
            return Err(ArchiveError::IndexOutOfRange { index: idx, count });
        }
        let idx = idx as u32;
        Ok(IndexEntry {
            hash: self.hash_at(idx),
            prefix: self.prefix_at(idx),
            suffix: self.suffix_at(idx),
        })
    }

    /// Resolve a 1-based span ID.
    fn byte_span(&self, id: u32) -> ArchiveResult<ByteSpan> {
        let count = self.byte_span_count();
        if id == 0 || id > count {
            return Err(ArchiveError::SpanOutOfRange { id, count });
        }
        let offset = if id == 1 { 0 } else { self.span_end_at(id - 2) };
        let end = self.span_end_at(id - 1);
        Ok(ByteSpan {
            offset,
            length: end - offset,
        })
    }

    fn read_span(&self, id: u32) -> ArchiveResult<Cow<'_, [u8]>> {
        let span = self.byte_span(id)?;
        self.read_range(span.offset, span.length)
    }
}
