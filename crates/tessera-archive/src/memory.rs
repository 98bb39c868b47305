use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;

use tessera_types::{Suffix, PREFIX_LEN, SUFFIX_LEN};

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{self, ChunkRef, Footer, Layout, FOOTER_LEN};
use crate::index::{IndexReader, ReaderKind};

/// Index reader that deserializes the whole chunk index at open.
///
/// Lookups never touch the file; span and metadata reads seek the file
/// handle held behind a mutex.
pub struct InMemoryIndex {
    footer: Footer,
    layout: Layout,
    span_ends: Vec<u64>,
    prefixes: Vec<u64>,
    refs: Vec<ChunkRef>,
    suffixes: Vec<Suffix>,
    file: Mutex<File>,
}

impl InMemoryIndex {
    pub fn open(mut file: File, file_len: u64) -> ArchiveResult<Self> {
        if file_len < FOOTER_LEN {
            return Err(ArchiveError::Truncated(file_len));
        }
        let mut footer_buf = [0u8; FOOTER_LEN as usize];
        file.seek(SeekFrom::Start(file_len - FOOTER_LEN))?;
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;
        let layout = footer.layout(file_len)?;

        let mut index = vec![0u8; footer.index_len as usize];
        file.seek(SeekFrom::Start(layout.index_offset))?;
        file.read_exact(&mut index)?;

        let spans = footer.byte_span_count as usize;
        let chunks = footer.chunk_count as usize;
        let prefixes_at = spans * 8;
        let refs_at = prefixes_at + chunks * PREFIX_LEN;
        let suffixes_at = refs_at + chunks * 8;

        let span_ends = (0..spans).map(|i| format::read_u64(&index, i * 8)).collect();
        let prefixes = (0..chunks)
            .map(|i| format::read_u64(&index, prefixes_at + i * PREFIX_LEN))
            .collect();
        let refs = (0..chunks)
            .map(|i| ChunkRef {
                dictionary: format::read_u32(&index, refs_at + i * 8),
                data: format::read_u32(&index, refs_at + i * 8 + 4),
            })
            .collect();
        let suffixes = (0..chunks)
            .map(|i| format::read_suffix(&index, suffixes_at + i * SUFFIX_LEN))
            .collect();

        let reader = Self {
            footer,
            layout,
            span_ends,
            prefixes,
            refs,
            suffixes,
            file: Mutex::new(file),
        };
        format::validate_index(
            &reader.footer,
            &reader.layout,
            |i| reader.span_ends[i as usize],
            |i| reader.prefixes[i as usize],
            |i| reader.refs[i as usize],
        )?;
        Ok(reader)
    }

    fn read_at(&self, offset: u64, len: u64) -> ArchiveResult<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        let mut file = self.file.lock().expect("lock poisoned");
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl IndexReader for InMemoryIndex {
    fn kind(&self) -> ReaderKind {
        ReaderKind::InMemory
    }

    fn footer(&self) -> &Footer {
        &self.footer
    }

    fn data_len(&self) -> u64 {
        self.layout.data_len
    }

    fn prefix_at(&self, idx: u32) -> u64 {
        self.prefixes[idx as usize]
    }

    fn suffix_at(&self, idx: u32) -> Suffix {
        self.suffixes[idx as usize]
    }

    fn chunk_ref_at(&self, idx: u32) -> ChunkRef {
        self.refs[idx as usize]
    }

    fn span_end_at(&self, idx: u32) -> u64 {
        self.span_ends[idx as usize]
    }

    fn read_range(&self, offset: u64, len: u64) -> ArchiveResult<Cow<'_, [u8]>> {
        if offset + len > self.layout.data_len {
            return Err(ArchiveError::Corrupt(format!(
                "read of {len} bytes at {offset} runs past the data section"
            )));
        }
        Ok(Cow::Owned(self.read_at(offset, len)?))
    }

    fn metadata_bytes(&self) -> ArchiveResult<Cow<'_, [u8]>> {
        Ok(Cow::Owned(
            self.read_at(self.layout.metadata_offset, self.footer.metadata_len as u64)?,
        ))
    }
}
