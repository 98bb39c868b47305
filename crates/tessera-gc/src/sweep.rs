//! Sweep phase: rewrite the collected tiers with only reachable chunks.

use std::collections::HashSet;

use tessera_archive::ArchiveBuilder;
use tessera_manifest::{Generation, TableSpec};
use tessera_store::{Exclusive, FileSetChange, StoreState};
use tessera_types::Hash;
use tracing::{debug, info};

use crate::error::{GcError, GcResult};
use crate::mark::GcMode;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Nothing to collect; no file was written and no version published.
    pub noop: bool,
    pub archive: Option<TableSpec>,
    /// Chunks held by the collected tiers before and after.
    pub chunks_before: u64,
    pub chunks_after: u64,
}

/// Chunks in the tiers `mode` rewrites.
pub fn collected_chunks(state: &StoreState, mode: GcMode) -> u64 {
    let new_gen = state.manifest().chunk_count(Generation::New);
    let journal = state.journal().chunk_count();
    match mode {
        GcMode::Full => state.manifest().chunk_count(Generation::Old) + new_gen + journal,
        GcMode::Shallow => new_gen + journal,
    }
}

/// True when rewriting would reproduce the current file set.
///
/// That is the case once the journal holds no chunks and the collected
/// tiers consist of at most one archive holding exactly `reachable`.
pub fn is_clean(state: &StoreState, reachable: &HashSet<Hash>, mode: GcMode) -> bool {
    if state.journal().chunk_count() > 0 {
        return false;
    }
    let archives = match mode {
        GcMode::Full => {
            if !state.generation(Generation::New).is_empty() {
                return false;
            }
            state.generation(Generation::Old)
        }
        GcMode::Shallow => state.generation(Generation::New),
    };
    match archives {
        [] => reachable.is_empty(),
        [only] => {
            only.reader.chunk_count() as usize == reachable.len()
                && reachable.iter().all(|h| only.reader.contains(h))
        }
        _ => false,
    }
}

/// Write the reachable chunks of the collected tiers into one archive,
/// rotate the journal and publish the new file set.
pub fn sweep(access: &Exclusive<'_>, reachable: &HashSet<Hash>, mode: GcMode) -> GcResult<SweepOutcome> {
    let state = access.state();
    let chunks_before = collected_chunks(&state, mode);
    if is_clean(&state, reachable, mode) {
        debug!(?mode, chunks = chunks_before, "collected tiers already clean");
        return Ok(SweepOutcome {
            noop: true,
            archive: None,
            chunks_before,
            chunks_after: chunks_before,
        });
    }

    let (generation, origin) = match mode {
        GcMode::Full => (Generation::Old, "gc"),
        GcMode::Shallow => (Generation::New, "gc-shallow"),
    };
    let archive = if reachable.is_empty() {
        None
    } else {
        let mut builder = ArchiveBuilder::new(access.config().compression.clone()).with_origin(origin);
        for hash in reachable {
            let chunk = state.get(hash)?.ok_or_else(|| GcError::MissingChunk {
                root: "sweep".into(),
                hash: *hash,
            })?;
            builder.add(chunk);
        }
        let writer = builder.build().map_err(tessera_store::StoreError::from)?;
        Some(access.write_archive(writer, generation)?)
    };

    let mut specs: Vec<TableSpec> = match mode {
        GcMode::Full => Vec::new(),
        GcMode::Shallow => state.manifest().specs_in(Generation::Old).copied().collect(),
    };
    specs.extend(archive);
    let journal = access.rotate_journal()?;
    drop(state);

    let published = access.publish(FileSetChange {
        specs,
        journal: Some(journal),
        bump_gc_generation: true,
    })?;
    let chunks_after = collected_chunks(&published, mode);
    info!(
        ?mode,
        version = published.version(),
        gc_generation = published.manifest().gc_generation,
        chunks_before,
        chunks_after,
        "sweep published"
    );
    Ok(SweepOutcome {
        noop: false,
        archive,
        chunks_before,
        chunks_after,
    })
}
