//! On-disk layout of a `.darc` archive.
//!
//! ```text
//! [byte spans][chunk index][metadata][footer]
//! ```
//!
//! Byte spans are concatenated from offset 0. The chunk index is four
//! big-endian tables, each sorted by chunk hash:
//!
//! ```text
//! span ends   u64 x byte_span_count   cumulative end offset of span i+1
//! prefixes    u64 x chunk_count
//! chunk refs  (u32 dictionary, u32 data) x chunk_count
//! suffixes    [u8; 12] x chunk_count
//! ```
//!
//! Metadata is JSON. The footer is fixed size and sits at EOF:
//!
//! ```text
//! index_len u64 | byte_span_count u32 | chunk_count u32 | metadata_len u32
//! | format_version u8 | signature [u8; 7]
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_types::{Hash, PREFIX_LEN, SUFFIX_LEN};

use crate::error::{ArchiveError, ArchiveResult};

/// Archive file extension.
pub const ARCHIVE_EXTENSION: &str = "darc";

/// Magic bytes closing every archive.
pub const SIGNATURE: &[u8; 7] = b"TESSARC";

/// Current archive format version.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the fixed footer in bytes.
pub const FOOTER_LEN: u64 = 28;

/// Bytes per chunk in the index: prefix, dictionary ref, data ref, suffix.
pub const INDEX_BYTES_PER_CHUNK: u64 = PREFIX_LEN as u64 + 8 + SUFFIX_LEN as u64;

/// Bytes per byte span in the index.
pub const INDEX_BYTES_PER_SPAN: u64 = 8;

/// File name for an archive with the given name.
pub fn archive_file_name(name: &Hash) -> String {
    format!("{name}.{ARCHIVE_EXTENSION}")
}

/// Region of the data section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteSpan {
    pub offset: u64,
    pub length: u64,
}

impl ByteSpan {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// How a chunk's payload is compressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionKind {
    /// Plain zstd frame.
    Zstd,
    /// zstd frame compressed against a shared dictionary span.
    ZstdDictionary,
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zstd => f.write_str("zstd"),
            Self::ZstdDictionary => f.write_str("zstd+dictionary"),
        }
    }
}

/// Span references of one index entry. Span IDs are 1-based; a dictionary
/// ID of 0 means no dictionary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRef {
    pub dictionary: u32,
    pub data: u32,
}

impl ChunkRef {
    pub fn compression(&self) -> CompressionKind {
        if self.dictionary == 0 {
            CompressionKind::Zstd
        } else {
            CompressionKind::ZstdDictionary
        }
    }

    pub fn dictionary_span(&self) -> Option<u32> {
        (self.dictionary != 0).then_some(self.dictionary)
    }
}

/// Fixed-size trailer at the end of every archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Footer {
    pub index_len: u64,
    pub byte_span_count: u32,
    pub chunk_count: u32,
    pub metadata_len: u32,
    pub format_version: u8,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_LEN as usize] {
        let mut buf = [0u8; FOOTER_LEN as usize];
        buf[0..8].copy_from_slice(&self.index_len.to_be_bytes());
        buf[8..12].copy_from_slice(&self.byte_span_count.to_be_bytes());
        buf[12..16].copy_from_slice(&self.chunk_count.to_be_bytes());
        buf[16..20].copy_from_slice(&self.metadata_len.to_be_bytes());
        buf[20] = self.format_version;
        buf[21..28].copy_from_slice(SIGNATURE);
        buf
    }

    /// Decode a footer, checking the signature before anything else.
    pub fn decode(buf: &[u8]) -> ArchiveResult<Self> {
        if buf.len() != FOOTER_LEN as usize {
            return Err(ArchiveError::Truncated(buf.len() as u64));
        }
        if &buf[21..28] != SIGNATURE {
            return Err(ArchiveError::InvalidSignature {
                expected: String::from_utf8_lossy(SIGNATURE).into_owned(),
                actual: String::from_utf8_lossy(&buf[21..28]).into_owned(),
            });
        }
        let format_version = buf[20];
        if format_version != FORMAT_VERSION {
            return Err(ArchiveError::UnsupportedVersion(format_version));
        }
        Ok(Self {
            index_len: read_u64(buf, 0),
            byte_span_count: read_u32(buf, 8),
            chunk_count: read_u32(buf, 12),
            metadata_len: read_u32(buf, 16),
            format_version,
        })
    }

    /// Index section size implied by the counts.
    pub fn expected_index_len(&self) -> u64 {
        self.byte_span_count as u64 * INDEX_BYTES_PER_SPAN
            + self.chunk_count as u64 * INDEX_BYTES_PER_CHUNK
    }

    /// Resolve section offsets for a file of `file_len` bytes.
    pub fn layout(&self, file_len: u64) -> ArchiveResult<Layout> {
        if self.index_len != self.expected_index_len() {
            return Err(ArchiveError::Corrupt(format!(
                "index length {} does not match {} spans and {} chunks",
                self.index_len, self.byte_span_count, self.chunk_count
            )));
        }
        let trailer = self.index_len + self.metadata_len as u64 + FOOTER_LEN;
        if trailer > file_len {
            return Err(ArchiveError::Corrupt(format!(
                "index and metadata ({trailer} bytes) exceed file length {file_len}"
            )));
        }
        let data_len = file_len - trailer;
        let spans = self.byte_span_count as u64;
        let chunks = self.chunk_count as u64;
        let index_offset = data_len;
        let prefixes_offset = index_offset + spans * INDEX_BYTES_PER_SPAN;
        let refs_offset = prefixes_offset + chunks * PREFIX_LEN as u64;
        let suffixes_offset = refs_offset + chunks * 8;
        Ok(Layout {
            data_len,
            index_offset,
            prefixes_offset,
            refs_offset,
            suffixes_offset,
            metadata_offset: index_offset + self.index_len,
            footer_offset: file_len - FOOTER_LEN,
        })
    }
}

/// Absolute offsets of each section in an archive file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub data_len: u64,
    pub index_offset: u64,
    pub prefixes_offset: u64,
    pub refs_offset: u64,
    pub suffixes_offset: u64,
    pub metadata_offset: u64,
    pub footer_offset: u64,
}

/// Descriptive metadata stored as JSON between the index and the footer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub tool_version: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ArchiveMetadata {
    pub fn new(origin: Option<String>) -> Self {
        Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            origin,
        }
    }

    pub fn to_bytes(&self) -> ArchiveResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ArchiveError::Metadata(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> ArchiveResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ArchiveError::Metadata(e.to_string()))
    }
}

/// Check the span end table against the data section and every chunk ref
/// against the span table.
pub(crate) fn validate_index(
    footer: &Footer,
    layout: &Layout,
    span_end_at: impl Fn(u32) -> u64,
    prefix_at: impl Fn(u32) -> u64,
    ref_at: impl Fn(u32) -> ChunkRef,
) -> ArchiveResult<()> {
    let mut previous = 0u64;
    for i in 0..footer.byte_span_count {
        let end = span_end_at(i);
        if end <= previous {
            return Err(ArchiveError::Corrupt(format!("byte span {} is empty or out of order", i + 1)));
        }
        previous = end;
    }
    if previous != layout.data_len {
        return Err(ArchiveError::Corrupt(format!(
            "byte spans cover {previous} bytes, data section is {}",
            layout.data_len
        )));
    }

    let mut last_prefix = 0u64;
    for i in 0..footer.chunk_count {
        let prefix = prefix_at(i);
        if prefix < last_prefix {
            return Err(ArchiveError::Corrupt(format!("index entry {i} is out of order")));
        }
        last_prefix = prefix;
        let chunk_ref = ref_at(i);
        if chunk_ref.data == 0 || chunk_ref.data > footer.byte_span_count {
            return Err(ArchiveError::SpanOutOfRange {
                id: chunk_ref.data,
                count: footer.byte_span_count,
            });
        }
        if chunk_ref.dictionary > footer.byte_span_count {
            return Err(ArchiveError::SpanOutOfRange {
                id: chunk_ref.dictionary,
                count: footer.byte_span_count,
            });
        }
    }
    Ok(())
}

pub(crate) fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(b)
}

pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_be_bytes(b)
}

pub(crate) fn read_suffix(buf: &[u8], at: usize) -> tessera_types::Suffix {
    let mut b = [0u8; SUFFIX_LEN];
    b.copy_from_slice(&buf[at..at + SUFFIX_LEN]);
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footer() -> Footer {
        Footer {
            index_len: 8 * 3 + 28 * 2,
            byte_span_count: 3,
            chunk_count: 2,
            metadata_len: 10,
            format_version: FORMAT_VERSION,
        }
    }

    #[test]
    fn footer_roundtrip() {
        let f = footer();
        let bytes = f.encode();
        assert_eq!(&bytes[21..], SIGNATURE);
        assert_eq!(Footer::decode(&bytes).unwrap(), f);
    }

    #[test]
    fn footer_rejects_bad_signature() {
        let mut bytes = footer().encode();
        bytes[27] = b'X';
        assert!(matches!(
            Footer::decode(&bytes),
            Err(ArchiveError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn footer_rejects_unknown_version() {
        let mut bytes = footer().encode();
        bytes[20] = 9;
        assert!(matches!(Footer::decode(&bytes), Err(ArchiveError::UnsupportedVersion(9))));
    }

    #[test]
    fn layout_places_sections() {
        let f = footer();
        let data_len = 100;
        let file_len = data_len + f.index_len + 10 + FOOTER_LEN;
        let layout = f.layout(file_len).unwrap();
        assert_eq!(layout.data_len, data_len);
        assert_eq!(layout.prefixes_offset, data_len + 24);
        assert_eq!(layout.refs_offset, data_len + 24 + 16);
        assert_eq!(layout.suffixes_offset, data_len + 24 + 16 + 16);
        assert_eq!(layout.metadata_offset, data_len + f.index_len);
        assert_eq!(layout.footer_offset, file_len - FOOTER_LEN);
    }

    #[test]
    fn layout_rejects_inconsistent_index_len() {
        let mut f = footer();
        f.index_len += 1;
        assert!(matches!(f.layout(10_000), Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn layout_rejects_short_file() {
        assert!(matches!(footer().layout(50), Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn chunk_ref_compression() {
        let plain = ChunkRef { dictionary: 0, data: 1 };
        assert_eq!(plain.compression(), CompressionKind::Zstd);
        assert_eq!(plain.dictionary_span(), None);
        let dict = ChunkRef { dictionary: 1, data: 2 };
        assert_eq!(dict.compression(), CompressionKind::ZstdDictionary);
        assert_eq!(dict.dictionary_span(), Some(1));
    }

    #[test]
    fn metadata_roundtrip() {
        let meta = ArchiveMetadata::new(Some("journal".into()));
        let back = ArchiveMetadata::from_bytes(&meta.to_bytes().unwrap()).unwrap();
        assert_eq!(back, meta);
    }
}
