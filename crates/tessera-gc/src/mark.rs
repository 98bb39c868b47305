//! Mark phase: everything reachable from the live roots.
//!
//! Roots are handed out to worker threads from a shared queue. Each worker
//! walks its root with an explicit worklist; a concurrent visited set
//! shared by all workers makes sure every chunk is loaded once.
//!
//! Required roots are marked to completion first. A missing or unreadable
//! chunk under a required root aborts the collection. Best-effort roots are
//! marked afterwards; failures there are reported and the walk continues
//! with the rest of that root's graph.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::thread;

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tessera_refs::{LiveRoot, Liveness};
use tessera_store::{StoreState, Tier};
use tessera_types::Hash;
use tracing::{debug, warn};

use crate::error::{GcError, GcResult};
use crate::walker::RefWalker;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GcMode {
    /// Rewrite both generations into one old-generation archive.
    Full,
    /// Rewrite only the new generation and journal; the old generation is
    /// neither traversed nor touched.
    Shallow,
}

/// A chunk skipped under a best-effort root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedChunk {
    pub root: String,
    pub hash: Hash,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct MarkOutcome {
    /// Chunks to carry into the rewritten tiers.
    pub reachable: HashSet<Hash>,
    /// Every hash the walk touched, including old-generation hashes a
    /// shallow mark stops at.
    pub visited: usize,
    pub skipped: Vec<SkippedChunk>,
}

pub struct Marker<'a> {
    state: &'a StoreState,
    walker: &'a dyn RefWalker,
    mode: GcMode,
    workers: usize,
}

struct Shared<'r> {
    queue: Mutex<VecDeque<&'r LiveRoot>>,
    visited: DashSet<Hash>,
    reachable: DashSet<Hash>,
    skipped: Mutex<Vec<SkippedChunk>>,
}

impl<'a> Marker<'a> {
    pub fn new(state: &'a StoreState, walker: &'a dyn RefWalker, mode: GcMode, workers: usize) -> Self {
        Self {
            state,
            walker,
            mode,
            workers: workers.max(1),
        }
    }

    pub fn mark(&self, roots: &[LiveRoot]) -> GcResult<MarkOutcome> {
        let shared = Shared {
            queue: Mutex::new(VecDeque::new()),
            visited: DashSet::new(),
            reachable: DashSet::new(),
            skipped: Mutex::new(Vec::new()),
        };
        for liveness in [Liveness::Required, Liveness::BestEffort] {
            let batch: VecDeque<&LiveRoot> = roots.iter().filter(|r| r.liveness == liveness).collect();
            let count = batch.len();
            *shared.queue.lock().expect("mark queue poisoned") = batch;
            self.run(&shared, count)?;
            debug!(?liveness, roots = count, visited = shared.visited.len(), "mark pass done");
        }
        Ok(MarkOutcome {
            visited: shared.visited.len(),
            reachable: shared.reachable.into_iter().collect(),
            skipped: shared.skipped.into_inner().expect("skip list poisoned"),
        })
    }

    fn run(&self, shared: &Shared<'_>, roots: usize) -> GcResult<()> {
        if roots == 0 {
            return Ok(());
        }
        let workers = self.workers.min(roots);
        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| -> GcResult<()> {
                        loop {
                            let next = shared.queue.lock().expect("mark queue poisoned").pop_front();
                            let Some(root) = next else {
                                return Ok(());
                            };
                            self.walk(root, shared)?;
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("mark worker panicked"))
                .collect::<GcResult<()>>()
        })
    }

    fn walk(&self, root: &LiveRoot, shared: &Shared<'_>) -> GcResult<()> {
        let mut worklist = vec![root.hash];
        while let Some(hash) = worklist.pop() {
            if hash.is_empty() || !shared.visited.insert(hash) {
                continue;
            }
            if self.mode == GcMode::Shallow && self.state.locate(&hash) == Some(Tier::OldGen) {
                continue;
            }
            let loaded = match self.state.get(&hash) {
                Ok(Some(chunk)) => self
                    .walker
                    .children(&chunk)
                    .map_err(|e| GcError::CorruptChunk {
                        root: root.name.clone(),
                        hash,
                        reason: e.reason,
                    }),
                Ok(None) => Err(GcError::MissingChunk {
                    root: root.name.clone(),
                    hash,
                }),
                Err(e) => Err(GcError::CorruptChunk {
                    root: root.name.clone(),
                    hash,
                    reason: e.to_string(),
                }),
            };
            match loaded {
                Ok(children) => {
                    shared.reachable.insert(hash);
                    worklist.extend(children);
                }
                Err(e) if root.liveness == Liveness::BestEffort => {
                    warn!(root = %root.name, %hash, error = %e, "skipping chunk under best-effort root");
                    shared
                        .skipped
                        .lock()
                        .expect("skip list poisoned")
                        .push(SkippedChunk {
                            root: root.name.clone(),
                            hash,
                            reason: e.to_string(),
                        });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
