//! Error types for reference operations.

use tessera_types::ErrorClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefError {
    #[error("ref not found: {name}")]
    NotFound { name: String },

    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Tags are never moved once written.
    #[error("tag is immutable: {name}")]
    TagImmutable { name: String },

    #[error("cannot delete current branch: {name}")]
    DeleteCurrentBranch { name: String },

    #[error("stash stack is empty")]
    EmptyStash,
}

impl RefError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } | Self::EmptyStash => ErrorClass::NotFound,
            Self::InvalidName { .. } => ErrorClass::Format,
            Self::TagImmutable { .. } | Self::DeleteCurrentBranch { .. } => ErrorClass::Conflict,
        }
    }
}

pub type Result<T> = std::result::Result<T, RefError>;
