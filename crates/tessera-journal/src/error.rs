//! Error types for journal operations.

use std::path::PathBuf;

use tessera_types::{ErrorClass, Hash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("corrupt journal record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("hash mismatch at offset {offset}: record says {expected}, content hashes to {actual}")]
    HashMismatch { offset: u64, expected: Hash, actual: Hash },

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("decompression failed at offset {offset}: {reason}")]
    Decompression { offset: u64, reason: String },

    #[error("journal index error: {0}")]
    Index(String),

    #[error("journal {} refuses writes after a failed rollback", .0.display())]
    Unwritable(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl JournalError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Io(_) | Self::Unwritable(_) => ErrorClass::Io,
            Self::Corrupt { .. }
            | Self::HashMismatch { .. }
            | Self::Compression(_)
            | Self::Decompression { .. }
            | Self::Index(_) => ErrorClass::Consistency,
        }
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
