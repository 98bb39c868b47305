//! Storage and liveness interfaces for references.

use tessera_types::Hash;

use crate::error::Result;
use crate::types::{Head, LiveRoot, Ref};

/// Storage backend for named references.
///
/// Names are canonical: `refs/heads/*`, `refs/tags/*` and
/// `refs/workingSets/heads/*`.
pub trait RefStore: Send + Sync {
    /// `Ok(None)` if the ref does not exist.
    fn read_ref(&self, name: &str) -> Result<Option<Ref>>;

    /// Create or replace a ref. Fails for an existing tag.
    fn write_ref(&self, reference: &Ref) -> Result<()>;

    /// `Ok(true)` if the ref existed.
    fn delete_ref(&self, name: &str) -> Result<bool>;

    /// Refs whose canonical name starts with `prefix`, sorted by name.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, Ref)>>;

    fn head(&self) -> Result<Option<Head>>;

    fn set_head(&self, head: Head) -> Result<()>;

    /// Stashed roots, newest first.
    fn stashes(&self) -> Result<Vec<Hash>>;

    fn push_stash(&self, root: Hash) -> Result<()>;

    fn pop_stash(&self) -> Result<Hash>;

    fn branches(&self) -> Result<Vec<(String, Ref)>> {
        self.list_refs("refs/heads/")
    }

    fn tags(&self) -> Result<Vec<(String, Ref)>> {
        self.list_refs("refs/tags/")
    }

    fn working_sets(&self) -> Result<Vec<(String, Ref)>> {
        self.list_refs("refs/workingSets/")
    }
}

/// Anything that can enumerate roots the collector must keep.
pub trait LiveRefSource: Send + Sync {
    fn live_roots(&self) -> Result<Vec<LiveRoot>>;
}

/// The required roots of a ref store: each ref, each stash and a detached
/// HEAD.
pub fn ref_store_roots(store: &(impl RefStore + ?Sized)) -> Result<Vec<LiveRoot>> {
    let mut roots: Vec<LiveRoot> = store
        .list_refs("refs/")?
        .iter()
        .flat_map(|(_, r)| r.live_roots())
        .collect();
    for (i, stash) in store.stashes()?.into_iter().enumerate() {
        roots.push(LiveRoot::required(format!("stash@{{{i}}}"), stash));
    }
    if let Some(Head::Detached(hash)) = store.head()? {
        roots.push(LiveRoot::required("HEAD", hash));
    }
    Ok(roots)
}

/// A fixed set of roots.
impl LiveRefSource for Vec<LiveRoot> {
    fn live_roots(&self) -> Result<Vec<LiveRoot>> {
        Ok(self.clone())
    }
}
