//! Live references for the Tessera chunk store.
//!
//! References are the entry points the garbage collector marks from:
//! branch heads, tags, working sets (including staged roots and merge
//! state), stashes and a detached HEAD. Reflog entries are supplied by the
//! store itself as best-effort roots.
//!
//! - [`RefStore`]: storage interface for named refs
//! - [`LiveRefSource`]: anything that enumerates [`LiveRoot`]s
//! - [`InMemoryRefStore`]: in-memory implementation of both

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use memory::InMemoryRefStore;
pub use names::validate_ref_name;
pub use traits::{ref_store_roots, LiveRefSource, RefStore};
pub use types::{Head, LiveRoot, Liveness, MergeState, Ref};
