//! Store manifest for Tessera.
//!
//! The manifest names everything a store consists of: its archives (tagged
//! old or new generation), its journal, the current root hash and the GC
//! generation. It is the single point where a store changes state.
//!
//! - [`ManifestContents`]: one immutable version
//! - [`FileManifest`]: JSON persistence with atomic replace
//! - [`ManifestManager`]: optimistic-lock publishing behind an atomic swap
//! - [`Reclaimer`]: deletes files only after the last snapshot naming them
//!   is released
//! - [`StoreLayout`]: where each file lives on disk

pub mod contents;
pub mod error;
pub mod file;
pub mod layout;
pub mod manager;

pub use contents::{Generation, JournalSpec, ManifestContents, TableSpec};
pub use error::{ManifestError, Result};
pub use file::FileManifest;
pub use layout::{StoreLayout, MANIFEST_FILE, OLD_GEN_DIR};
pub use manager::{ManifestManager, Reclaimer};
