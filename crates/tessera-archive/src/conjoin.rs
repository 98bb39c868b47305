//! Merge several archives into one without recompressing.
//!
//! Each source's byte spans are copied verbatim and its span IDs shifted
//! past the spans already written. When a hash appears in more than one
//! source the first occurrence wins; the later copy's spans are still
//! carried over but nothing references them.

use tracing::debug;

use crate::error::ArchiveResult;
use crate::format::ArchiveMetadata;
use crate::reader::ArchiveReader;
use crate::writer::ArchiveWriter;

/// Conjoin `sources` into a sealed writer.
pub fn conjoin<'a>(
    sources: impl IntoIterator<Item = &'a ArchiveReader>,
    origin: Option<String>,
) -> ArchiveResult<ArchiveWriter> {
    let mut writer = ArchiveWriter::new();
    let mut merged = 0usize;
    for source in sources {
        let base = writer.byte_span_count();
        let data = source.data_section()?;
        let index = source.index();
        for id in 1..=index.byte_span_count() {
            let span = index.byte_span(id)?;
            writer.write_byte_span(&data[span.offset as usize..span.end() as usize])?;
        }
        for i in 0..index.chunk_count() {
            let hash = index.hash_at(i);
            if writer.contains(&hash) {
                continue;
            }
            let chunk_ref = index.chunk_ref_at(i);
            let dictionary = match chunk_ref.dictionary {
                0 => 0,
                id => base + id,
            };
            writer.stage_chunk(hash, dictionary, base + chunk_ref.data)?;
        }
        merged += 1;
    }
    let name = writer.seal(&ArchiveMetadata::new(origin))?;
    debug!(sources = merged, chunks = writer.chunk_count(), %name, "archives conjoined");
    Ok(writer)
}
