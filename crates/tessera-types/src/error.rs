use thiserror::Error;

/// Coarse classification shared by every error in the workspace.
///
/// Callers branch on the class instead of matching each crate's variants:
/// `NotFound` and `Format` are surfaced to the user as-is, `Consistency`
/// is healed where possible, `Io` on a required path is fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The requested thing is absent.
    NotFound,
    /// Input was malformed; nothing was looked up.
    Format,
    /// The filesystem failed underneath us.
    Io,
    /// On-disk structures disagree with each other.
    Consistency,
    /// An optimistic update lost a race.
    Conflict,
    /// The resource is held by another operation.
    Busy,
}

/// Errors produced by hash parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("Invalid object ID format. Expected 32-character base32 encoded hash.")]
    InvalidFormat(String),

    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl HashError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Format
    }
}
