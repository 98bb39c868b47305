use std::path::PathBuf;

use tessera_types::{ErrorClass, Hash, HashError};
use thiserror::Error;

use crate::writer::Stage;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid archive signature: expected {expected:?}, got {actual:?}")]
    InvalidSignature { expected: String, actual: String },

    #[error("unsupported archive format version: {0}")]
    UnsupportedVersion(u8),

    #[error("archive too short: {0} bytes")]
    Truncated(u64),

    #[error("corrupt archive: {0}")]
    Corrupt(String),

    #[error("index out of range: {index} (archive has {count} chunks)")]
    IndexOutOfRange { index: u64, count: u32 },

    #[error("Expected unsigned integer, got {0:?}")]
    ExpectedUnsignedInteger(String),

    #[error("byte span {id} out of range (archive has {count} spans)")]
    SpanOutOfRange { id: u32, count: u32 },

    #[error("object not found: {0}")]
    NotFound(Hash),

    #[error("duplicate chunk in archive: {0}")]
    DuplicateChunk(Hash),

    #[error("byte spans must not be empty")]
    EmptySpan,

    #[error("archive writer is at stage {actual:?}, operation needs {expected:?}")]
    WrongStage { expected: Stage, actual: Stage },

    #[error("hash mismatch: index says {expected}, content hashes to {actual}")]
    HashMismatch { expected: Hash, actual: Hash },

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error(transparent)]
    InvalidHash(#[from] HashError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::FileNotFound(_) | Self::NotFound(_) => ErrorClass::NotFound,
            Self::InvalidSignature { .. }
            | Self::UnsupportedVersion(_)
            | Self::Truncated(_)
            | Self::ExpectedUnsignedInteger(_)
            | Self::InvalidHash(_) => ErrorClass::Format,
            Self::Io(_) => ErrorClass::Io,
            Self::IndexOutOfRange { .. } => ErrorClass::NotFound,
            Self::Corrupt(_)
            | Self::SpanOutOfRange { .. }
            | Self::DuplicateChunk(_)
            | Self::EmptySpan
            | Self::WrongStage { .. }
            | Self::HashMismatch { .. }
            | Self::Compression(_)
            | Self::Decompression(_)
            | Self::Metadata(_) => ErrorClass::Consistency,
        }
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
