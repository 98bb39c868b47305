//! Garbage collection for the Tessera chunk store.
//!
//! A collection marks every chunk reachable from the live roots (the
//! store's committed root, the newest reflog entries [`GcConfig`] retains,
//! and whatever [`LiveRefSource`]s the caller supplies) and rewrites the
//! collected tiers with only those chunks.
//!
//! - [`GcMode::Full`] rewrites both generations into a single
//!   old-generation archive.
//! - [`GcMode::Shallow`] leaves the old generation alone and rewrites the
//!   new generation and journal into a single new-generation archive.
//!
//! Collections are idempotent: running one on a store that is already
//! clean publishes nothing.
//!
//! [`LiveRefSource`]: tessera_refs::LiveRefSource

pub mod collector;
pub mod error;
pub mod mark;
pub mod sweep;
pub mod walker;

pub use collector::{GarbageCollector, GcConfig, GcReport};
pub use error::{GcError, GcResult};
pub use mark::{GcMode, MarkOutcome, Marker, SkippedChunk};
pub use sweep::{sweep, SweepOutcome};
pub use walker::{LinkedNode, LinkedNodeWalker, RefWalker, WalkError};
