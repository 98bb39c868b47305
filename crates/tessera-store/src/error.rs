use std::path::PathBuf;

use tessera_archive::ArchiveError;
use tessera_journal::JournalError;
use tessera_manifest::ManifestError;
use tessera_refs::RefError;
use tessera_types::ErrorClass;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Refs(#[from] RefError),

    #[error("invalid configuration {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    /// Another collection holds the store.
    #[error("garbage collection already in progress")]
    GcInProgress,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Archive(e) => e.class(),
            Self::Journal(e) => e.class(),
            Self::Manifest(e) => e.class(),
            Self::Refs(e) => e.class(),
            Self::Config { .. } => ErrorClass::Format,
            Self::GcInProgress => ErrorClass::Busy,
            Self::Io(_) => ErrorClass::Io,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
