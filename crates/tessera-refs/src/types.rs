//! Reference kinds and the live roots they contribute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_types::Hash;

/// How strictly the collector must honor a root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Liveness {
    /// Everything reachable must be present; a missing chunk is fatal.
    Required,
    /// Kept if possible; missing or corrupt chunks are reported and skipped.
    BestEffort,
}

/// One entry point into the chunk graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRoot {
    /// Where the root came from, e.g. `refs/heads/main`.
    pub name: String,
    pub hash: Hash,
    pub liveness: Liveness,
}

impl LiveRoot {
    pub fn required(name: impl Into<String>, hash: Hash) -> Self {
        Self {
            name: name.into(),
            hash,
            liveness: Liveness::Required,
        }
    }

    pub fn best_effort(name: impl Into<String>, hash: Hash) -> Self {
        Self {
            name: name.into(),
            hash,
            liveness: Liveness::BestEffort,
        }
    }
}

/// State of a merge that has started but not been committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeState {
    /// The commit being merged in.
    pub from: Hash,
    /// Working root before the merge started, restored on abort.
    pub pre_merge_working: Hash,
}

/// A named reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ref {
    /// Mutable pointer to a commit.
    Branch { name: String, target: Hash },

    /// Immutable pointer to a commit.
    Tag {
        name: String,
        target: Hash,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Uncommitted state of a branch.
    WorkingSet {
        branch: String,
        working: Hash,
        staged: Option<Hash>,
        merge: Option<MergeState>,
    },
}

impl Ref {
    pub fn canonical_name(&self) -> String {
        match self {
            Ref::Branch { name, .. } => format!("refs/heads/{name}"),
            Ref::Tag { name, .. } => format!("refs/tags/{name}"),
            Ref::WorkingSet { branch, .. } => format!("refs/workingSets/heads/{branch}"),
        }
    }

    pub fn short_name(&self) -> &str {
        match self {
            Ref::Branch { name, .. } | Ref::Tag { name, .. } => name,
            Ref::WorkingSet { branch, .. } => branch,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Ref::Tag { .. })
    }

    /// Every root this ref keeps alive. Working sets contribute their
    /// working and staged roots and any in-progress merge.
    pub fn live_roots(&self) -> Vec<LiveRoot> {
        let name = self.canonical_name();
        match self {
            Ref::Branch { target, .. } | Ref::Tag { target, .. } => {
                vec![LiveRoot::required(name, *target)]
            }
            Ref::WorkingSet {
                working,
                staged,
                merge,
                ..
            } => {
                let mut roots = vec![LiveRoot::required(format!("{name}#working"), *working)];
                if let Some(staged) = staged {
                    roots.push(LiveRoot::required(format!("{name}#staged"), *staged));
                }
                if let Some(merge) = merge {
                    roots.push(LiveRoot::required(format!("{name}#merge"), merge.from));
                    roots.push(LiveRoot::required(
                        format!("{name}#pre-merge"),
                        merge.pre_merge_working,
                    ));
                }
                roots
            }
        }
    }
}

/// HEAD: a branch name or a detached commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Head {
    Symbolic(String),
    Detached(Hash),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_set_contributes_every_root() {
        let ws = Ref::WorkingSet {
            branch: "main".into(),
            working: Hash::of(b"w"),
            staged: Some(Hash::of(b"s")),
            merge: Some(MergeState {
                from: Hash::of(b"m"),
                pre_merge_working: Hash::of(b"p"),
            }),
        };
        let roots = ws.live_roots();
        assert_eq!(roots.len(), 4);
        assert!(roots.iter().all(|r| r.liveness == Liveness::Required));
        assert_eq!(roots[0].name, "refs/workingSets/heads/main#working");
        assert_eq!(roots[2].hash, Hash::of(b"m"));
    }

    #[test]
    fn serde_liveness_is_kebab_case() {
        let json = serde_json::to_string(&Liveness::BestEffort).unwrap();
        assert_eq!(json, "\"best-effort\"");
    }
}
