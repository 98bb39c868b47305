//! Discovering the children of a chunk.
//!
//! The store never interprets chunk bytes; the collector asks a
//! [`RefWalker`] which hashes a chunk refers to. The database layer plugs
//! in a walker for its own encoding. [`LinkedNodeWalker`] understands the
//! minimal [`LinkedNode`] framing used by tools and tests:
//!
//! ```text
//! [4 bytes: "TNOD"]
//! [4 bytes: child count, big-endian u32]
//! [20 bytes per child hash]
//! [payload]
//! ```
//!
//! Chunks without the magic are leaves.

use tessera_types::{Chunk, Hash, HASH_LEN};

pub const NODE_MAGIC: &[u8; 4] = b"TNOD";

const NODE_HEADER_LEN: usize = 8;

/// A chunk's children could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot walk chunk {hash}: {reason}")]
pub struct WalkError {
    pub hash: Hash,
    pub reason: String,
}

pub trait RefWalker: Send + Sync {
    /// Hashes directly referenced by `chunk`.
    fn children(&self, chunk: &Chunk) -> Result<Vec<Hash>, WalkError>;
}

/// A chunk that references other chunks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedNode {
    pub children: Vec<Hash>,
    pub payload: Vec<u8>,
}

impl LinkedNode {
    pub fn new(children: Vec<Hash>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            children,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NODE_HEADER_LEN + self.children.len() * HASH_LEN + self.payload.len());
        out.extend_from_slice(NODE_MAGIC);
        out.extend_from_slice(&(self.children.len() as u32).to_be_bytes());
        for child in &self.children {
            out.extend_from_slice(child.as_bytes());
        }
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn to_chunk(&self) -> Chunk {
        Chunk::new(self.encode())
    }

    /// `Ok(None)` for a leaf.
    pub fn decode(chunk: &Chunk) -> Result<Option<Self>, WalkError> {
        let data = chunk.data();
        if !data.starts_with(NODE_MAGIC) {
            return Ok(None);
        }
        let fail = |reason: &str| WalkError {
            hash: chunk.hash(),
            reason: reason.to_string(),
        };
        if data.len() < NODE_HEADER_LEN {
            return Err(fail("truncated node header"));
        }
        let count = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
        let refs_end = count
            .checked_mul(HASH_LEN)
            .and_then(|n| n.checked_add(NODE_HEADER_LEN))
            .filter(|end| *end <= data.len())
            .ok_or_else(|| fail("child table runs past end of chunk"))?;
        let children = data[NODE_HEADER_LEN..refs_end]
            .chunks_exact(HASH_LEN)
            .map(|raw| Hash::from_slice(raw).map_err(|e| fail(&e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Self {
            children,
            payload: data[refs_end..].to_vec(),
        }))
    }
}

/// Walks [`LinkedNode`] chunks.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkedNodeWalker;

impl RefWalker for LinkedNodeWalker {
    fn children(&self, chunk: &Chunk) -> Result<Vec<Hash>, WalkError> {
        Ok(LinkedNode::decode(chunk)?.map(|n| n.children).unwrap_or_default())
    }
}
