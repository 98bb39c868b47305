use std::fmt::Display;
use std::path::{Path, PathBuf};

use colored::Colorize;
use tessera_archive::{ArchiveError, ArchiveInspector, ReaderKind};
use tessera_gc::{GarbageCollector, GcError, GcMode};
use tessera_journal::{inspect_journal, JournalError};
use tessera_manifest::{ManifestError, MANIFEST_FILE};
use tessera_refs::RefError;
use tessera_store::{GenerationalStore, StoreError};
use tessera_types::{ErrorClass, HashError};

use crate::cli::*;

/// A store command pointed at a directory that holds no store.
#[derive(Debug, thiserror::Error)]
#[error("no store at {} (run `tessera init` first)", .0.display())]
pub struct MissingStore(pub PathBuf);

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Init(args) => cmd_init(&args.store, &config),
        Command::Stat(args) => cmd_stat(&args.store, &config),
        Command::Archive(args) => cmd_archive(&args),
        Command::Journal(args) => cmd_journal(&args),
        Command::Compact(args) => cmd_compact(&args.store, &config),
        Command::Gc(args) => cmd_gc(&args, &config),
    }
}

/// Error class of the first classified error in the chain.
pub fn error_class(err: &anyhow::Error) -> Option<ErrorClass> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<ArchiveError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<JournalError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<ManifestError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<StoreError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<GcError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<RefError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<HashError>() {
            Some(e.class())
        } else if cause.is::<MissingStore>() {
            Some(ErrorClass::NotFound)
        } else {
            None
        }
    })
}

pub fn exit_code(err: &anyhow::Error) -> u8 {
    match error_class(err) {
        Some(ErrorClass::Format) => 2,
        Some(ErrorClass::NotFound) => 3,
        _ => 1,
    }
}

fn field(label: &str, value: impl Display) {
    println!("  {:<18} {}", format!("{label}:"), value);
}

fn open_existing(dir: &Path, config: &CliConfig) -> anyhow::Result<GenerationalStore> {
    if !dir.join(MANIFEST_FILE).is_file() {
        return Err(MissingStore(dir.to_path_buf()).into());
    }
    Ok(GenerationalStore::open(dir, config.store.clone())?)
}

fn cmd_init(dir: &Path, config: &CliConfig) -> anyhow::Result<()> {
    let existed = dir.join(MANIFEST_FILE).is_file();
    let store = GenerationalStore::open(dir, config.store.clone())?;
    let manifest = store.manifest();
    let verb = if existed { "Reopened" } else { "Initialized" };
    println!("{} {verb} store in {}", "✓".green().bold(), dir.display().to_string().bold());
    field("Version", manifest.version);
    if let Some(journal) = manifest.journal {
        field("Journal", journal.identity.to_string().cyan());
    }
    Ok(())
}

fn cmd_stat(dir: &Path, config: &CliConfig) -> anyhow::Result<()> {
    let store = open_existing(dir, config)?;
    let stats = store.stats()?;
    println!("Store {}", dir.display().to_string().bold());
    field("Version", stats.version);
    field("Root", stats.root.to_string().yellow());
    field("GC generation", stats.gc_generation);
    field(
        "Old generation",
        format!("{} archives, {} chunks", stats.old_gen_archives, stats.old_gen_chunks),
    );
    field(
        "New generation",
        format!("{} archives, {} chunks", stats.new_gen_archives, stats.new_gen_chunks),
    );
    field("Journal", stats.journal.to_string().cyan());
    field(
        "Journal records",
        format!(
            "{} ({} chunks, {} bytes)",
            stats.journal_records, stats.journal_chunks, stats.journal_bytes
        ),
    );
    field("Journal index", format!("{:?}", stats.journal_index));
    field("Reflog entries", stats.reflog_entries);
    field("Size on disk", format!("{} bytes", stats.size_on_disk));
    Ok(())
}

fn cmd_archive(args: &ArchiveArgs) -> anyhow::Result<()> {
    let kind = if args.mmap { ReaderKind::Mmap } else { ReaderKind::InMemory };
    let inspector = ArchiveInspector::open(&args.path, kind)?;

    let report = inspector.file_report();
    println!("Archive {}", report.path.display().to_string().bold());
    field("Size", format!("{} bytes", report.file_size));
    field("Format version", report.format_version);
    field("Signature", &report.signature);
    field("Chunks", report.chunk_count);
    field("Byte spans", report.byte_span_count);
    field("Index size", format!("{} bytes", report.index_size));
    field("Metadata size", format!("{} bytes", report.metadata_size));
    if let Some(meta) = &report.metadata {
        field("Written by", &meta.tool_version);
        field("Created", meta.created_at.to_rfc3339());
        if let Some(origin) = &meta.origin {
            field("Origin", origin);
        }
    }
    if let Some(err) = &report.metadata_error {
        field("Metadata", format!("unreadable: {err}").red());
    }

    if let Some(id) = &args.object_id {
        let object = inspector.object(id)?;
        println!("Object {}", id.bold());
        field("Hash", object.hash.to_string().yellow());
        field("Prefix", &object.prefix_hex);
        field("Suffix", &object.suffix_hex);
        let location = object.require_found()?;
        field("Index", location.index);
        field("Compression", location.compression);
        match location.dictionary {
            Some(dict) => field(
                "Dictionary span",
                format!("#{} (offset {}, length {})", dict.id, dict.span.offset, dict.span.length),
            ),
            None => field("Dictionary span", "none"),
        }
        field(
            "Data span",
            format!(
                "#{} (offset {}, length {})",
                location.data.id, location.data.span.offset, location.data.span.length
            ),
        );
    }

    if let Some(arg) = &args.inspect_index {
        let slot = inspector.index(arg)?;
        println!("Index slot {}", slot.index.to_string().bold());
        field("Reader", slot.reader);
        field("Chunks", slot.chunk_count);
        field("Byte spans", slot.byte_span_count);
        field("Hash", slot.hash.to_string().yellow());
        field("Prefix", &slot.prefix_hex);
        field("Suffix", &slot.suffix_hex);
    }
    Ok(())
}

fn cmd_journal(args: &JournalArgs) -> anyhow::Result<()> {
    let report = inspect_journal(&args.path)?;
    let health = if report.healthy() {
        "healthy".green()
    } else {
        "needs recovery".red()
    };
    println!("Journal {} ({health})", report.path.display().to_string().bold());
    field("File length", format!("{} bytes", report.file_len));
    field("Valid length", format!("{} bytes", report.valid_len));
    field(
        "Good records",
        format!(
            "{} ({} chunks, {} roots)",
            report.good_records, report.chunk_records, report.root_records
        ),
    );
    field("Zero-length", report.zero_length_records);
    field("Failed", report.failed_records);
    field("Longest run", report.longest_run);
    if let Some(reason) = &report.torn_tail {
        field("Torn tail", format!("{reason} ({} trailing bytes)", report.trailing_bytes()).red());
    }
    field("Index", format!("{:?}", report.index_state));
    if let Some(latest) = report.roots.last() {
        field("Latest root", format!("{} at {}", latest.root, latest.timestamp.to_rfc3339()));
    }
    if args.records {
        for hash in &report.chunk_hashes {
            println!("  chunk {hash}");
        }
        for record in &report.roots {
            println!("  root  {} {}", record.root, record.timestamp.to_rfc3339());
        }
    }
    Ok(())
}

fn cmd_compact(dir: &Path, config: &CliConfig) -> anyhow::Result<()> {
    let store = open_existing(dir, config)?;
    let report = store.compact()?;
    if report.is_noop() {
        println!("{} Nothing to compact (version {}).", "✓".green(), report.version);
        return Ok(());
    }
    println!("{} Compacted to version {}", "✓".green().bold(), report.version);
    if let Some(spec) = report.packed {
        field("Journal packed", format!("{} ({} chunks)", spec.name, spec.chunk_count));
    }
    if let Some(spec) = report.promoted {
        field("Promoted", format!("{} ({} chunks)", spec.name, spec.chunk_count));
    }
    Ok(())
}

fn cmd_gc(args: &GcArgs, config: &CliConfig) -> anyhow::Result<()> {
    let store = open_existing(&args.store, config)?;
    let mode = if args.shallow { GcMode::Shallow } else { GcMode::Full };
    let report = GarbageCollector::linked(config.gc.clone()).collect(&store, &[], mode)?;

    for skip in &report.skipped {
        println!(
            "  {} {} under {}: {}",
            "skipped".yellow(),
            skip.hash,
            skip.root,
            skip.reason
        );
    }
    if report.noop {
        println!(
            "{} GC ({mode:?}): store already clean at version {}.",
            "✓".green(),
            report.version_after
        );
        return Ok(());
    }
    println!(
        "{} GC ({mode:?}): version {} → {}",
        "✓".green().bold(),
        report.version_before,
        report.version_after
    );
    field("Roots", report.roots);
    field("Reachable", report.reachable);
    field(
        "Chunks",
        format!("{} → {}", report.chunks_before, report.chunks_after),
    );
    field("Files removed", report.removed.len());
    field(
        "Size on disk",
        format!(
            "{} → {} bytes ({} reclaimed)",
            report.size_before,
            report.size_after,
            report.reclaimed_bytes()
        ),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_archive::{ArchiveBuilder, CompressionConfig};
    use tessera_store::ChunkStore;
    use tessera_types::{Chunk, Hash};

    fn write_archive(dir: &Path, n: u32) -> (PathBuf, Vec<Chunk>) {
        let mut builder = ArchiveBuilder::new(CompressionConfig::default());
        let chunks: Vec<Chunk> = (0..n)
            .map(|i| Chunk::new(format!("row {i} of the inspection fixture").into_bytes()))
            .collect();
        for c in &chunks {
            builder.add(c.clone());
        }
        let file = builder.build().unwrap().finish(dir).unwrap();
        (file.path, chunks)
    }

    fn archive_args(path: &Path) -> ArchiveArgs {
        ArchiveArgs {
            path: path.to_path_buf(),
            mmap: false,
            object_id: None,
            inspect_index: None,
        }
    }

    #[test]
    fn archive_inspection_classes() {
        let dir = tempfile::tempdir().unwrap();
        let (path, chunks) = write_archive(dir.path(), 230);

        assert!(cmd_archive(&archive_args(&path)).is_ok());

        let present = ArchiveArgs {
            object_id: Some(chunks[7].hash().to_string()),
            inspect_index: Some("0".into()),
            mmap: true,
            ..archive_args(&path)
        };
        assert!(cmd_archive(&present).is_ok());

        let malformed = ArchiveArgs {
            object_id: Some("invalid".into()),
            ..archive_args(&path)
        };
        assert_eq!(exit_code(&cmd_archive(&malformed).unwrap_err()), 2);

        let absent = ArchiveArgs {
            object_id: Some(Hash::of(b"not in this archive").to_string()),
            ..archive_args(&path)
        };
        assert_eq!(exit_code(&cmd_archive(&absent).unwrap_err()), 3);

        let out_of_range = ArchiveArgs {
            inspect_index: Some("99999999".into()),
            ..archive_args(&path)
        };
        let err = cmd_archive(&out_of_range).unwrap_err();
        assert!(err.to_string().contains("index out of range"));

        let not_a_number = ArchiveArgs {
            inspect_index: Some("-1".into()),
            ..archive_args(&path)
        };
        let err = cmd_archive(&not_a_number).unwrap_err();
        assert!(err.to_string().contains("Expected unsigned integer"));
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn missing_files_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_archive(&archive_args(&dir.path().join("nope.darc"))).unwrap_err();
        assert_eq!(error_class(&err), Some(ErrorClass::NotFound));

        let journal = JournalArgs {
            path: dir.path().join("nope.jnl"),
            records: false,
        };
        assert_eq!(exit_code(&cmd_journal(&journal).unwrap_err()), 3);

        let err = cmd_stat(&dir.path().join("empty"), &CliConfig::default()).unwrap_err();
        assert_eq!(exit_code(&err), 3);
        assert!(!dir.path().join("empty").exists());
    }

    #[test]
    fn store_maintenance_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::default();
        cmd_init(dir.path(), &config).unwrap();

        {
            let store = GenerationalStore::open(dir.path(), config.store.clone()).unwrap();
            let kept = Chunk::new(b"kept".to_vec());
            store.put(&kept).unwrap();
            store.put(&Chunk::new(b"garbage".to_vec())).unwrap();
            assert!(store.commit(kept.hash(), store.root()).unwrap());
            let journal = store.snapshot().journal().path().to_path_buf();
            cmd_journal(&JournalArgs {
                path: journal,
                records: true,
            })
            .unwrap();
        }

        cmd_stat(dir.path(), &config).unwrap();
        cmd_compact(dir.path(), &config).unwrap();
        cmd_gc(
            &GcArgs {
                store: dir.path().to_path_buf(),
                shallow: true,
            },
            &config,
        )
        .unwrap();
        cmd_gc(
            &GcArgs {
                store: dir.path().to_path_buf(),
                shallow: false,
            },
            &config,
        )
        .unwrap();

        let store = GenerationalStore::open(dir.path(), config.store.clone()).unwrap();
        assert!(store.has(&Chunk::new(b"kept".to_vec()).hash()).unwrap());
        assert!(!store.has(&Chunk::new(b"garbage".to_vec()).hash()).unwrap());
    }
}
