//! In-memory reference store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tessera_types::Hash;
use tracing::debug;

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;
use crate::traits::{ref_store_roots, LiveRefSource, RefStore};
use crate::types::{Head, LiveRoot, Ref};

#[derive(Debug, Default)]
struct RefState {
    refs: BTreeMap<String, Ref>,
    head: Option<Head>,
    /// Newest last.
    stashes: Vec<Hash>,
}

/// A [`RefStore`] held entirely in memory. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    state: RwLock<RefState>,
}

impl InMemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `refs/heads/<name>` at `target`.
    pub fn set_branch(&self, name: &str, target: Hash) -> Result<()> {
        self.write_ref(&Ref::Branch {
            name: name.to_string(),
            target,
        })
    }
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<Ref>> {
        let state = self.state.read().expect("ref lock poisoned");
        Ok(state.refs.get(name).cloned())
    }

    fn write_ref(&self, reference: &Ref) -> Result<()> {
        validate_ref_name(reference.short_name())?;
        let name = reference.canonical_name();
        let mut state = self.state.write().expect("ref lock poisoned");
        if reference.is_tag() && state.refs.get(&name).is_some_and(Ref::is_tag) {
            return Err(RefError::TagImmutable { name });
        }
        debug!(%name, "ref written");
        state.refs.insert(name, reference.clone());
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        let mut state = self.state.write().expect("ref lock poisoned");
        if let Some(Head::Symbolic(current)) = &state.head {
            if name == format!("refs/heads/{current}") {
                return Err(RefError::DeleteCurrentBranch {
                    name: current.clone(),
                });
            }
        }
        Ok(state.refs.remove(name).is_some())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, Ref)>> {
        let state = self.state.read().expect("ref lock poisoned");
        Ok(state
            .refs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn head(&self) -> Result<Option<Head>> {
        Ok(self.state.read().expect("ref lock poisoned").head.clone())
    }

    fn set_head(&self, head: Head) -> Result<()> {
        if let Head::Symbolic(branch) = &head {
            validate_ref_name(branch)?;
        }
        self.state.write().expect("ref lock poisoned").head = Some(head);
        Ok(())
    }

    fn stashes(&self) -> Result<Vec<Hash>> {
        let state = self.state.read().expect("ref lock poisoned");
        Ok(state.stashes.iter().rev().copied().collect())
    }

    fn push_stash(&self, root: Hash) -> Result<()> {
        self.state.write().expect("ref lock poisoned").stashes.push(root);
        Ok(())
    }

    fn pop_stash(&self) -> Result<Hash> {
        self.state
            .write()
            .expect("ref lock poisoned")
            .stashes
            .pop()
            .ok_or(RefError::EmptyStash)
    }
}

impl LiveRefSource for InMemoryRefStore {
    fn live_roots(&self) -> Result<Vec<LiveRoot>> {
        ref_store_roots(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Liveness, MergeState};
    use chrono::Utc;

    fn tag(name: &str, target: Hash) -> Ref {
        Ref::Tag {
            name: name.to_string(),
            target,
            message: format!("Release {name}"),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn branches_move_tags_do_not() {
        let store = InMemoryRefStore::new();
        store.set_branch("main", Hash::of(b"c1")).unwrap();
        store.set_branch("main", Hash::of(b"c2")).unwrap();
        let main = store.read_ref("refs/heads/main").unwrap().unwrap();
        assert_eq!(
            main,
            Ref::Branch {
                name: "main".into(),
                target: Hash::of(b"c2")
            }
        );

        store.write_ref(&tag("v1", Hash::of(b"c1"))).unwrap();
        let err = store.write_ref(&tag("v1", Hash::of(b"c2"))).unwrap_err();
        assert!(matches!(err, RefError::TagImmutable { .. }));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let store = InMemoryRefStore::new();
        assert!(store.set_branch("bad..name", Hash::of(b"x")).is_err());
        assert!(store.set_head(Head::Symbolic("a b".into())).is_err());
    }

    #[test]
    fn cannot_delete_current_branch() {
        let store = InMemoryRefStore::new();
        store.set_branch("main", Hash::of(b"c1")).unwrap();
        store.set_branch("dev", Hash::of(b"c2")).unwrap();
        store.set_head(Head::Symbolic("main".into())).unwrap();
        assert!(store.delete_ref("refs/heads/main").is_err());
        assert!(store.delete_ref("refs/heads/dev").unwrap());
        assert!(!store.delete_ref("refs/heads/dev").unwrap());
    }

    #[test]
    fn list_by_prefix_is_sorted() {
        let store = InMemoryRefStore::new();
        for name in ["zeta", "alpha", "mid"] {
            store.set_branch(name, Hash::of(name.as_bytes())).unwrap();
        }
        store.write_ref(&tag("v1", Hash::of(b"t"))).unwrap();
        let names: Vec<String> = store.branches().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["refs/heads/alpha", "refs/heads/mid", "refs/heads/zeta"]);
        assert_eq!(store.tags().unwrap().len(), 1);
    }

    #[test]
    fn stash_is_a_stack() {
        let store = InMemoryRefStore::new();
        assert!(matches!(store.pop_stash(), Err(RefError::EmptyStash)));
        store.push_stash(Hash::of(b"s1")).unwrap();
        store.push_stash(Hash::of(b"s2")).unwrap();
        assert_eq!(store.stashes().unwrap(), vec![Hash::of(b"s2"), Hash::of(b"s1")]);
        assert_eq!(store.pop_stash().unwrap(), Hash::of(b"s2"));
    }

    #[test]
    fn live_roots_cover_every_kind() {
        let store = InMemoryRefStore::new();
        store.set_branch("main", Hash::of(b"branch")).unwrap();
        store.write_ref(&tag("v1", Hash::of(b"tag"))).unwrap();
        store
            .write_ref(&Ref::WorkingSet {
                branch: "main".into(),
                working: Hash::of(b"working"),
                staged: None,
                merge: Some(MergeState {
                    from: Hash::of(b"theirs"),
                    pre_merge_working: Hash::of(b"before"),
                }),
            })
            .unwrap();
        store.push_stash(Hash::of(b"stash")).unwrap();
        store.set_head(Head::Detached(Hash::of(b"detached"))).unwrap();

        let roots = store.live_roots().unwrap();
        let hashes: Vec<Hash> = roots.iter().map(|r| r.hash).collect();
        for seed in [
            &b"branch"[..],
            b"tag",
            b"working",
            b"theirs",
            b"before",
            b"stash",
            b"detached",
        ] {
            assert!(hashes.contains(&Hash::of(seed)), "{}", String::from_utf8_lossy(seed));
        }
        assert!(roots.iter().all(|r| r.liveness == Liveness::Required));
    }
}
