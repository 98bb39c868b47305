use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tessera_types::{Hash, HASH_LEN};
use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{archive_file_name, ArchiveMetadata, ByteSpan, ChunkRef, Footer, FORMAT_VERSION};

/// Result of writing an archive file.
#[derive(Clone, Debug)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub name: Hash,
    pub chunk_count: u32,
    pub byte_span_count: u32,
    pub size: u64,
}

/// Position of an [`ArchiveWriter`] in its write workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    ByteSpans,
    Index,
    Metadata,
    Footer,
    Flush,
}

struct StagedChunk {
    hash: Hash,
    chunk_ref: ChunkRef,
}

/// Low-level, staged archive writer.
///
/// Byte spans are written first, with chunks staged against the span IDs
/// they reference. Then the index, metadata and footer are appended in that
/// order. Each step checks the current [`Stage`] so a half-written archive
/// can never be flushed.
pub struct ArchiveWriter {
    buf: Vec<u8>,
    spans: Vec<ByteSpan>,
    staged: Vec<StagedChunk>,
    seen: HashSet<Hash>,
    stage: Stage,
    index_len: u64,
    metadata_len: u32,
    name: Option<Hash>,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            spans: Vec::new(),
            staged: Vec::new(),
            seen: HashSet::new(),
            stage: Stage::ByteSpans,
            index_len: 0,
            metadata_len: 0,
            name: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn chunk_count(&self) -> u32 {
        self.staged.len() as u32
    }

    pub fn byte_span_count(&self) -> u32 {
        self.spans.len() as u32
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.seen.contains(hash)
    }

    /// Append a byte span to the data section. Returns its 1-based ID.
    pub fn write_byte_span(&mut self, bytes: &[u8]) -> ArchiveResult<u32> {
        self.expect_stage(Stage::ByteSpans)?;
        if bytes.is_empty() {
            return Err(ArchiveError::EmptySpan);
        }
        let offset = self.buf.len() as u64;
        self.buf.extend_from_slice(bytes);
        self.spans.push(ByteSpan {
            offset,
            length: bytes.len() as u64,
        });
        Ok(self.spans.len() as u32)
    }

    /// Stage a chunk whose payload lives in span `data`, optionally
    /// compressed against the dictionary in span `dictionary` (0 for none).
    pub fn stage_chunk(&mut self, hash: Hash, dictionary: u32, data: u32) -> ArchiveResult<()> {
        self.expect_stage(Stage::ByteSpans)?;
        let count = self.spans.len() as u32;
        if data == 0 || data > count {
            return Err(ArchiveError::SpanOutOfRange { id: data, count });
        }
        if dictionary > count {
            return Err(ArchiveError::SpanOutOfRange { id: dictionary, count });
        }
        if !self.seen.insert(hash) {
            return Err(ArchiveError::DuplicateChunk(hash));
        }
        self.staged.push(StagedChunk {
            hash,
            chunk_ref: ChunkRef { dictionary, data },
        });
        Ok(())
    }

    /// Write the sorted chunk index. The archive name is derived here from
    /// the suffix table, so identical chunk sets produce identical names.
    pub fn write_index(&mut self) -> ArchiveResult<Hash> {
        self.expect_stage(Stage::ByteSpans)?;
        self.stage = Stage::Index;
        self.staged.sort_by(|a, b| a.hash.cmp(&b.hash));

        let start = self.buf.len();
        for span in &self.spans {
            self.buf.extend_from_slice(&span.end().to_be_bytes());
        }
        for chunk in &self.staged {
            self.buf.extend_from_slice(&chunk.hash.prefix().to_be_bytes());
        }
        for chunk in &self.staged {
            self.buf.extend_from_slice(&chunk.chunk_ref.dictionary.to_be_bytes());
            self.buf.extend_from_slice(&chunk.chunk_ref.data.to_be_bytes());
        }
        let suffix_start = self.buf.len();
        for chunk in &self.staged {
            self.buf.extend_from_slice(&chunk.hash.suffix());
        }

        let mut name = [0u8; HASH_LEN];
        name.copy_from_slice(&blake3::hash(&self.buf[suffix_start..]).as_bytes()[..HASH_LEN]);
        let name = Hash::from_raw(name);

        self.index_len = (self.buf.len() - start) as u64;
        self.name = Some(name);
        self.stage = Stage::Metadata;
        debug!(
            chunks = self.staged.len(),
            spans = self.spans.len(),
            index_len = self.index_len,
            %name,
            "archive index written"
        );
        Ok(name)
    }

    pub fn write_metadata(&mut self, metadata: &ArchiveMetadata) -> ArchiveResult<()> {
        self.expect_stage(Stage::Metadata)?;
        let bytes = metadata.to_bytes()?;
        self.buf.extend_from_slice(&bytes);
        self.metadata_len = bytes.len() as u32;
        self.stage = Stage::Footer;
        Ok(())
    }

    pub fn write_footer(&mut self) -> ArchiveResult<()> {
        self.expect_stage(Stage::Footer)?;
        let footer = Footer {
            index_len: self.index_len,
            byte_span_count: self.spans.len() as u32,
            chunk_count: self.staged.len() as u32,
            metadata_len: self.metadata_len,
            format_version: FORMAT_VERSION,
        };
        self.buf.extend_from_slice(&footer.encode());
        self.stage = Stage::Flush;
        Ok(())
    }

    /// Index, metadata and footer in one step.
    pub fn seal(&mut self, metadata: &ArchiveMetadata) -> ArchiveResult<Hash> {
        let name = self.write_index()?;
        self.write_metadata(metadata)?;
        self.write_footer()?;
        Ok(name)
    }

    /// Take the finished archive bytes (no disk I/O).
    pub fn finish_to_bytes(self) -> ArchiveResult<(Hash, Vec<u8>)> {
        let name = self.sealed_name()?;
        Ok((name, self.buf))
    }

    /// Write the finished archive into `dir` as `<name>.darc`.
    ///
    /// The file is written under a temporary name and renamed into place,
    /// so a reader never observes a partial archive.
    pub fn finish(self, dir: &Path) -> ArchiveResult<ArchiveFile> {
        let name = self.sealed_name()?;
        let path = dir.join(archive_file_name(&name));

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.buf)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| ArchiveError::Io(e.error))?;

        debug!(path = %path.display(), size = self.buf.len(), "archive flushed");
        Ok(ArchiveFile {
            path,
            name,
            chunk_count: self.staged.len() as u32,
            byte_span_count: self.spans.len() as u32,
            size: self.buf.len() as u64,
        })
    }

    fn sealed_name(&self) -> ArchiveResult<Hash> {
        self.expect_stage(Stage::Flush)?;
        self.name.ok_or(ArchiveError::WrongStage {
            expected: Stage::Flush,
            actual: Stage::Index,
        })
    }

    fn expect_stage(&self, expected: Stage) -> ArchiveResult<()> {
        if self.stage != expected {
            return Err(ArchiveError::WrongStage {
                expected,
                actual: self.stage,
            });
        }
        Ok(())
    }
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}
