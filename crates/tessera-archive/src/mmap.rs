use std::borrow::Cow;
use std::fs::File;

use memmap2::Mmap;
use tessera_types::{Suffix, PREFIX_LEN, SUFFIX_LEN};

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::{self, ChunkRef, Footer, Layout, FOOTER_LEN};
use crate::index::{IndexReader, ReaderKind};

/// Index reader over a read-only memory mapping of the archive.
///
/// Nothing is copied at open beyond the footer; every slot is decoded from
/// the mapping on access.
pub struct MmapIndex {
    footer: Footer,
    layout: Layout,
    map: Mmap,
}

impl MmapIndex {
    pub fn open(file: &File, file_len: u64) -> ArchiveResult<Self> {
        if file_len < FOOTER_LEN {
            return Err(ArchiveError::Truncated(file_len));
        }
        // SAFETY: archives are immutable once renamed into place; files are
        // only ever replaced by rename, never rewritten.
        let map = unsafe { Mmap::map(file)? };
        if (map.len() as u64) != file_len {
            return Err(ArchiveError::Corrupt(format!(
                "mapping is {} bytes, file is {file_len}",
                map.len()
            )));
        }
        let footer = Footer::decode(&map[(file_len - FOOTER_LEN) as usize..])?;
        let layout = footer.layout(file_len)?;

        let reader = Self { footer, layout, map };
        format::validate_index(
            &reader.footer,
            &reader.layout,
            |i| reader.span_end_at(i),
            |i| reader.prefix_at(i),
            |i| reader.chunk_ref_at(i),
        )?;
        Ok(reader)
    }
}

impl IndexReader for MmapIndex {
    fn kind(&self) -> ReaderKind {
        ReaderKind::Mmap
    }

    fn footer(&self) -> &Footer {
        &self.footer
    }

    fn data_len(&self) -> u64 {
        self.layout.data_len
    }

    fn prefix_at(&self, idx: u32) -> u64 {
        let at = self.layout.prefixes_offset as usize + idx as usize * PREFIX_LEN;
        format::read_u64(&self.map, at)
    }

    fn suffix_at(&self, idx: u32) -> Suffix {
        let at = self.layout.suffixes_offset as usize + idx as usize * SUFFIX_LEN;
        format::read_suffix(&self.map, at)
    }

    fn chunk_ref_at(&self, idx: u32) -> ChunkRef {
        let at = self.layout.refs_offset as usize + idx as usize * 8;
        ChunkRef {
            dictionary: format::read_u32(&self.map, at),
            data: format::read_u32(&self.map, at + 4),
        }
    }

    fn span_end_at(&self, idx: u32) -> u64 {
        let at = self.layout.index_offset as usize + idx as usize * 8;
        format::read_u64(&self.map, at)
    }

    fn read_range(&self, offset: u64, len: u64) -> ArchiveResult<Cow<'_, [u8]>> {
        if offset + len > self.layout.data_len {
            return Err(ArchiveError::Corrupt(format!(
                "read of {len} bytes at {offset} runs past the data section"
            )));
        }
        Ok(Cow::Borrowed(&self.map[offset as usize..(offset + len) as usize]))
    }

    fn metadata_bytes(&self) -> ArchiveResult<Cow<'_, [u8]>> {
        let start = self.layout.metadata_offset as usize;
        let end = start + self.footer.metadata_len as usize;
        Ok(Cow::Borrowed(&self.map[start..end]))
    }
}
