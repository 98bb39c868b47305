use std::path::PathBuf;

use tessera_types::{ErrorClass, Hash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest lock moved: expected {expected}, found {actual}")]
    Conflict { expected: Hash, actual: Hash },

    #[error("malformed manifest {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported manifest format {0}")]
    UnsupportedFormat(u32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ManifestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::Malformed { .. } | Self::UnsupportedFormat(_) => ErrorClass::Format,
            Self::Io(_) => ErrorClass::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;
