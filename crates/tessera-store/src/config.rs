//! Store configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_archive::{CompressionConfig, ReaderKind};
use tessera_journal::JournalConfig;

use crate::error::{StoreError, StoreResult};

/// When [`compact`](crate::GenerationalStore::compact) moves content
/// between tiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionPolicy {
    /// Journal chunks before the journal is packed into a new-generation
    /// archive.
    pub journal_archive_threshold: u64,
    /// New-generation chunks before the new-generation archives are
    /// conjoined into one old-generation archive. `None` promotes only on
    /// full garbage collection.
    pub promote_threshold: Option<u64>,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            journal_archive_threshold: 4096,
            promote_threshold: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub reader: ReaderKind,
    pub journal: JournalConfig,
    pub compression: CompressionConfig,
    pub compaction: CompactionPolicy,
}

impl StoreConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| StoreError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_journal::SyncMode;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(StoreConfig::from_toml("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let config = StoreConfig::from_toml(
            r#"
            reader = "mmap"

            [journal]
            sync_mode = "every-write"
            index_threshold = 16

            [compaction]
            journal_archive_threshold = 100
            promote_threshold = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.reader, ReaderKind::Mmap);
        assert_eq!(config.journal.sync_mode, SyncMode::EveryWrite);
        assert_eq!(config.journal.index_threshold, 16);
        assert_eq!(config.journal.reflog_retention, 128);
        assert_eq!(config.compaction.promote_threshold, Some(1000));
        assert_eq!(config.compression, CompressionConfig::default());
    }

    #[test]
    fn bad_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        fs::write(&path, "reader = 7").unwrap();
        let err = StoreConfig::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
    }
}
