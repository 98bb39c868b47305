use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tessera_gc::GcConfig;
use tessera_store::StoreConfig;

#[derive(Parser, Debug)]
#[command(
    name = "tessera",
    about = "Tessera chunk store tools: inspection, compaction and garbage collection",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML file with [store] and [gc] tables
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty store
    Init(StoreArgs),
    /// Show store generations, journal and size
    Stat(StoreArgs),
    /// Inspect an archive file
    Archive(ArchiveArgs),
    /// Scan a journal file and report its health
    Journal(JournalArgs),
    /// Pack the journal and promote the new generation per the compaction policy
    Compact(StoreArgs),
    /// Collect chunks unreachable from the store's roots
    Gc(GcArgs),
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Store directory
    pub store: PathBuf,
}

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Path to a .darc file
    pub path: PathBuf,
    /// Read the index through a memory mapping instead of loading it
    #[arg(long)]
    pub mmap: bool,
    /// Decode an object id and locate it
    #[arg(long, value_name = "ID")]
    pub object_id: Option<String>,
    /// Show the index slot at N
    #[arg(long, value_name = "N")]
    pub inspect_index: Option<String>,
}

#[derive(Args, Debug)]
pub struct JournalArgs {
    /// Path to a .jnl file
    pub path: PathBuf,
    /// List every chunk hash and root record
    #[arg(long)]
    pub records: bool,
}

#[derive(Args, Debug)]
pub struct GcArgs {
    /// Store directory
    pub store: PathBuf,
    /// Collect only the new generation and journal
    #[arg(short, long)]
    pub shallow: bool,
}

/// Contents of `--config`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub store: StoreConfig,
    pub gc: GcConfig,
}

impl CliConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_archive::ReaderKind;

    #[test]
    fn parses_archive_inspection() {
        let cli = Cli::try_parse_from([
            "tessera",
            "archive",
            "data/abc.darc",
            "--mmap",
            "--object-id",
            "invalid",
            "--inspect-index",
            "0",
        ])
        .unwrap();
        let Command::Archive(args) = cli.command else {
            panic!("expected archive command");
        };
        assert_eq!(args.path, PathBuf::from("data/abc.darc"));
        assert!(args.mmap);
        assert_eq!(args.object_id.as_deref(), Some("invalid"));
        assert_eq!(args.inspect_index.as_deref(), Some("0"));
    }

    #[test]
    fn index_argument_is_taken_verbatim() {
        // Validation happens at inspection time so the report can say why.
        let cli = Cli::try_parse_from(["tessera", "archive", "a.darc", "--inspect-index", "ten"]).unwrap();
        let Command::Archive(args) = cli.command else {
            panic!("expected archive command");
        };
        assert_eq!(args.inspect_index.as_deref(), Some("ten"));
    }

    #[test]
    fn parses_gc_modes() {
        let cli = Cli::try_parse_from(["tessera", "gc", "store"]).unwrap();
        assert!(matches!(cli.command, Command::Gc(GcArgs { shallow: false, .. })));
        let cli = Cli::try_parse_from(["tessera", "gc", "-s", "store", "--verbose"]).unwrap();
        assert!(matches!(cli.command, Command::Gc(GcArgs { shallow: true, .. })));
        assert!(cli.verbose);
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["tessera", "stat", "store", "--config", "t.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("t.toml")));
    }

    #[test]
    fn rejects_missing_paths() {
        assert!(Cli::try_parse_from(["tessera", "archive"]).is_err());
        assert!(Cli::try_parse_from(["tessera", "gc"]).is_err());
        assert!(Cli::try_parse_from(["tessera", "unknown"]).is_err());
    }

    #[test]
    fn config_tables() {
        let config = CliConfig::from_toml(
            r#"
            [store]
            reader = "mmap"

            [store.compaction]
            journal_archive_threshold = 10

            [gc]
            mark_workers = 8
            reflog_roots = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.store.reader, ReaderKind::Mmap);
        assert_eq!(config.store.compaction.journal_archive_threshold, 10);
        assert_eq!(config.gc.mark_workers, 8);
        assert_eq!(config.gc.reflog_roots, 16);

        let empty = CliConfig::from_toml("").unwrap();
        assert_eq!(empty.gc, GcConfig::default());
        assert!(CliConfig::from_toml("[gc]\nmark_workers = \"many\"").is_err());
    }
}
