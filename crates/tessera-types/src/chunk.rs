use std::fmt;

use crate::hash::Hash;

/// An immutable, content-addressed payload.
///
/// The hash is computed once at construction; chunks are never mutated
/// afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
    hash: Hash,
    data: Vec<u8>,
}

impl Chunk {
    /// Create a chunk, hashing its bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            hash: Hash::of(&data),
            data,
        }
    }

    /// Reassemble a chunk read back from storage under a known hash.
    ///
    /// The hash is trusted; call [`Chunk::verify`] when it should not be.
    pub fn from_parts(hash: Hash, data: Vec<u8>) -> Self {
        Self { hash, data }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the bytes still hash to the stored hash.
    pub fn verify(&self) -> bool {
        Hash::of(&self.data) == self.hash
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("hash", &self.hash)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_hashes_content() {
        let chunk = Chunk::new(b"abc".to_vec());
        assert_eq!(chunk.hash(), Hash::of(b"abc"));
        assert_eq!(chunk.data(), b"abc");
        assert_eq!(chunk.len(), 3);
        assert!(chunk.verify());
    }

    #[test]
    fn verify_detects_mismatch() {
        let chunk = Chunk::from_parts(Hash::of(b"one"), b"two".to_vec());
        assert!(!chunk.verify());
    }

    #[test]
    fn empty_chunk_is_valid() {
        let chunk = Chunk::new(Vec::new());
        assert!(chunk.is_empty());
        assert!(chunk.verify());
    }
}
