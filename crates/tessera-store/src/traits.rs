use tessera_types::{Chunk, Hash};

use crate::error::StoreResult;

/// Content-addressed chunk store.
///
/// - Chunks are immutable; the same bytes always have the same hash.
/// - `put` is idempotent.
/// - Concurrent reads are always safe.
/// - The root only moves through `commit`, guarded by the caller's last
///   seen root.
pub trait ChunkStore: Send + Sync {
    /// `Ok(None)` if the chunk is not stored.
    fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>>;

    fn has(&self, hash: &Hash) -> StoreResult<bool>;

    /// Store a chunk. Returns `false` if it was already present.
    fn put(&self, chunk: &Chunk) -> StoreResult<bool>;

    fn root(&self) -> Hash;

    /// Move the root from `last` to `current`. Returns `false` without
    /// changing anything when the root is no longer `last`.
    fn commit(&self, current: Hash, last: Hash) -> StoreResult<bool>;

    fn get_many(&self, hashes: &[Hash]) -> StoreResult<Vec<Option<Chunk>>> {
        hashes.iter().map(|h| self.get(h)).collect()
    }

    /// Hashes from `hashes` the store does not hold.
    fn missing(&self, hashes: &[Hash]) -> StoreResult<Vec<Hash>> {
        let mut absent = Vec::new();
        for hash in hashes {
            if !self.has(hash)? {
                absent.push(*hash);
            }
        }
        Ok(absent)
    }
}
