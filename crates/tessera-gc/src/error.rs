use tessera_refs::RefError;
use tessera_store::StoreError;
use tessera_types::{ErrorClass, Hash};

#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Refs(#[from] RefError),

    /// A chunk reachable from a required root is absent.
    #[error("chunk {hash} reachable from required root {root} is missing")]
    MissingChunk { root: String, hash: Hash },

    /// A chunk reachable from a required root cannot be read or walked.
    #[error("chunk {hash} reachable from required root {root} is unreadable: {reason}")]
    CorruptChunk {
        root: String,
        hash: Hash,
        reason: String,
    },
}

impl GcError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Store(e) => e.class(),
            Self::Refs(e) => e.class(),
            Self::MissingChunk { .. } | Self::CorruptChunk { .. } => ErrorClass::Consistency,
        }
    }
}

pub type GcResult<T> = Result<T, GcError>;
