use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_types::{Chunk, Hash};
use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};
use crate::format::ArchiveMetadata;
use crate::writer::{ArchiveFile, ArchiveWriter};

/// Compression settings for archive building.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// zstd compression level.
    pub level: i32,
    /// Chunks up to this size share a dictionary.
    pub small_chunk_limit: usize,
    /// Fewest small chunks worth training a dictionary for.
    pub min_samples: usize,
    /// Most small chunks fed to dictionary training.
    pub max_samples: usize,
    /// Target dictionary size in bytes.
    pub dictionary_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: 3,
            small_chunk_limit: 16 * 1024,
            min_samples: 25,
            max_samples: 1000,
            dictionary_size: 4096,
        }
    }
}

/// Builds an archive from whole chunks.
///
/// Chunks are emitted in hash order. When enough small chunks are present a
/// dictionary is trained from them, written as its own span, and every small
/// chunk is compressed against it. Everything else is a plain zstd frame.
pub struct ArchiveBuilder {
    config: CompressionConfig,
    chunks: BTreeMap<Hash, Vec<u8>>,
    origin: Option<String>,
}

impl ArchiveBuilder {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            config,
            chunks: BTreeMap::new(),
            origin: None,
        }
    }

    /// Record where the archive's content came from (journal, gc, conjoin).
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Queue a chunk. Returns `false` if it was already queued.
    pub fn add(&mut self, chunk: Chunk) -> bool {
        let hash = chunk.hash();
        if self.chunks.contains_key(&hash) {
            return false;
        }
        self.chunks.insert(hash, chunk.into_data());
        true
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.chunks.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Compress every queued chunk into a sealed writer.
    pub fn build(self) -> ArchiveResult<ArchiveWriter> {
        let level = self.config.level;
        let mut writer = ArchiveWriter::new();

        let small: Vec<(&Hash, &Vec<u8>)> = self
            .chunks
            .iter()
            .filter(|(_, data)| data.len() <= self.config.small_chunk_limit)
            .collect();
        let use_dictionary = small.len() >= self.config.min_samples;

        if use_dictionary {
            let samples: Vec<&[u8]> = small
                .iter()
                .take(self.config.max_samples)
                .map(|(_, data)| data.as_slice())
                .collect();
            let dictionary = train_dictionary(&samples, self.config.dictionary_size);
            let stored = zstd::encode_all(dictionary.as_slice(), level)
                .map_err(|e| ArchiveError::Compression(e.to_string()))?;
            let dict_span = writer.write_byte_span(&stored)?;

            let mut compressor = zstd::bulk::Compressor::with_dictionary(level, &dictionary)
                .map_err(|e| ArchiveError::Compression(e.to_string()))?;
            for (hash, data) in &small {
                let compressed = compressor
                    .compress(data)
                    .map_err(|e| ArchiveError::Compression(e.to_string()))?;
                let span = writer.write_byte_span(&compressed)?;
                writer.stage_chunk(**hash, dict_span, span)?;
            }
            debug!(
                samples = samples.len(),
                dictionary_len = dictionary.len(),
                chunks = small.len(),
                "dictionary compression"
            );
        }

        for (hash, data) in &self.chunks {
            if writer.contains(hash) {
                continue;
            }
            let compressed = zstd::encode_all(data.as_slice(), level)
                .map_err(|e| ArchiveError::Compression(e.to_string()))?;
            let span = writer.write_byte_span(&compressed)?;
            writer.stage_chunk(*hash, 0, span)?;
        }

        writer.seal(&ArchiveMetadata::new(self.origin))?;
        Ok(writer)
    }

    /// Build and write the archive into `dir`.
    pub fn finish(self, dir: &Path) -> ArchiveResult<ArchiveFile> {
        self.build()?.finish(dir)
    }

    /// Build the archive in memory.
    pub fn finish_to_bytes(self) -> ArchiveResult<(Hash, Vec<u8>)> {
        self.build()?.finish_to_bytes()
    }
}

/// Train a zstd dictionary, falling back to a raw-content dictionary built
/// from the samples themselves when training fails.
fn train_dictionary(samples: &[&[u8]], size: usize) -> Vec<u8> {
    match zstd::dict::from_samples(samples, size) {
        Ok(dict) if !dict.is_empty() => dict,
        Ok(_) => raw_dictionary(samples, size),
        Err(e) => {
            debug!(error = %e, samples = samples.len(), "dictionary training failed; using raw content");
            raw_dictionary(samples, size)
        }
    }
}

fn raw_dictionary(samples: &[&[u8]], size: usize) -> Vec<u8> {
    let mut dict = Vec::with_capacity(size);
    for sample in samples {
        let room = size - dict.len();
        if room == 0 {
            break;
        }
        dict.extend_from_slice(&sample[..sample.len().min(room)]);
    }
    dict
}
