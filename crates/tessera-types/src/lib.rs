//! Foundation types for the Tessera chunk store.
//!
//! Every other Tessera crate depends on `tessera-types`.
//!
//! # Key Types
//!
//! - [`Hash`]: 20-byte content hash, split into a sortable prefix and a suffix
//! - [`Chunk`]: immutable payload addressed by its hash
//! - [`ErrorClass`]: NotFound / Format / Io / Consistency classification
//! - [`search`]: prefix-table lookup used by the archive index readers

pub mod chunk;
pub mod error;
pub mod hash;
pub mod search;

pub use chunk::Chunk;
pub use error::{ErrorClass, HashError};
pub use hash::{Hash, Suffix, HASH_LEN, HASH_STRING_LEN, PREFIX_LEN, SUFFIX_LEN};
