//! Structured reports for archive inspection tools.
//!
//! Each report carries everything that could be decoded, so a caller can
//! print what it has before surfacing a downstream failure such as a hash
//! that is well-formed but absent.

use std::path::{Path, PathBuf};

use tessera_types::Hash;
use tracing::warn;

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{ArchiveMetadata, ByteSpan, CompressionKind, SIGNATURE};
use crate::index::ReaderKind;
use crate::reader::ArchiveReader;

/// File-level summary.
#[derive(Clone, Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub file_size: u64,
    pub reader: ReaderKind,
    pub format_version: u8,
    pub signature: String,
    pub chunk_count: u32,
    pub byte_span_count: u32,
    pub index_size: u64,
    pub metadata_size: u32,
    pub metadata: Option<ArchiveMetadata>,
    /// Why a non-empty metadata block could not be decoded.
    pub metadata_error: Option<String>,
}

/// A byte span with its ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpanReport {
    pub id: u32,
    pub span: ByteSpan,
}

/// Where an object lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectLocation {
    pub index: u32,
    pub compression: CompressionKind,
    pub dictionary: Option<SpanReport>,
    pub data: SpanReport,
}

/// Result of looking up an object id.
#[derive(Clone, Debug)]
pub struct ObjectReport {
    pub hash: Hash,
    pub prefix_hex: String,
    pub suffix_hex: String,
    pub location: Option<ObjectLocation>,
}

impl ObjectReport {
    /// The location, or [`ArchiveError::NotFound`].
    pub fn require_found(&self) -> ArchiveResult<&ObjectLocation> {
        self.location.as_ref().ok_or(ArchiveError::NotFound(self.hash))
    }
}

/// One index slot.
#[derive(Clone, Debug)]
pub struct IndexReport {
    pub reader: ReaderKind,
    pub chunk_count: u32,
    pub byte_span_count: u32,
    pub index: u64,
    pub hash: Hash,
    pub prefix_hex: String,
    pub suffix_hex: String,
}

/// Parse an index argument.
pub fn parse_index_arg(arg: &str) -> ArchiveResult<u64> {
    arg.trim()
        .parse::<u64>()
        .map_err(|_| ArchiveError::ExpectedUnsignedInteger(arg.to_string()))
}

pub struct ArchiveInspector {
    reader: ArchiveReader,
}

impl ArchiveInspector {
    pub fn open(path: &Path, kind: ReaderKind) -> ArchiveResult<Self> {
        Ok(Self {
            reader: ArchiveReader::open(path, kind)?,
        })
    }

    pub fn reader(&self) -> &ArchiveReader {
        &self.reader
    }

    pub fn file_report(&self) -> FileReport {
        let footer = *self.reader.index().footer();
        let (metadata, metadata_error) = match self.reader.metadata() {
            Ok(metadata) => (Some(metadata), None),
            Err(_) if footer.metadata_len == 0 => (None, None),
            Err(e) => {
                warn!(path = %self.reader.path().display(), error = %e, "archive metadata unreadable");
                (None, Some(e.to_string()))
            }
        };
        FileReport {
            path: self.reader.path().to_path_buf(),
            file_size: self.reader.file_size(),
            reader: self.reader.kind(),
            format_version: footer.format_version,
            signature: String::from_utf8_lossy(SIGNATURE).into_owned(),
            chunk_count: footer.chunk_count,
            byte_span_count: footer.byte_span_count,
            index_size: footer.index_len,
            metadata_size: footer.metadata_len,
            metadata,
            metadata_error,
        }
    }

    /// Decode an object id and look it up. Malformed ids fail before any
    /// lookup; absent ids yield a report with no location.
    pub fn object(&self, object_id: &str) -> ArchiveResult<ObjectReport> {
        let hash = Hash::parse(object_id)?;
        let location = match self.reader.lookup(&hash) {
            None => None,
            Some(loc) => {
                let index = self.reader.index();
                let dictionary = match loc.dictionary {
                    Some(id) => Some(SpanReport {
                        id,
                        span: index.byte_span(id)?,
                    }),
                    None => None,
                };
                Some(ObjectLocation {
                    index: loc.index,
                    compression: loc.compression,
                    dictionary,
                    data: SpanReport {
                        id: loc.data,
                        span: index.byte_span(loc.data)?,
                    },
                })
            }
        };
        Ok(ObjectReport {
            hash,
            prefix_hex: hash.prefix_hex(),
            suffix_hex: hash.suffix_hex(),
            location,
        })
    }

    /// Decode the index slot named by `arg`.
    pub fn index(&self, arg: &str) -> ArchiveResult<IndexReport> {
        let idx = parse_index_arg(arg)?;
        let entry = self.reader.index().index_at(idx)?;
        Ok(IndexReport {
            reader: self.reader.kind(),
            chunk_count: self.reader.chunk_count(),
            byte_span_count: self.reader.byte_span_count(),
            index: idx,
            hash: entry.hash,
            prefix_hex: entry.hash.prefix_hex(),
            suffix_hex: entry.hash.suffix_hex(),
        })
    }
}
