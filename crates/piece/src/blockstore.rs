//! Content-addressed block storage.

use std::collections::HashMap;

use bytes::Bytes;
use comb_primitives::{Block, ContentId};
use parking_lot::RwLock;

use crate::error::BlockstoreError;

/// A store of graph blocks keyed by content id.
///
/// Implementations may keep blocks in memory, on disk, or behind a remote
/// service. Methods are synchronous: the archive codec calls them from the
/// producer thread of the piece pipeline.
pub trait Blockstore: Send + Sync {
    /// Retrieves a block. Returns `None` if it is not stored.
    fn get(&self, cid: &ContentId) -> Result<Option<Block>, BlockstoreError>;

    /// Stores a block, returning its content id.
    fn put(&self, block: Block) -> Result<ContentId, BlockstoreError>;

    /// Checks if a block is stored.
    fn has(&self, cid: &ContentId) -> Result<bool, BlockstoreError>;
}

/// In-memory block store.
#[derive(Debug, Default)]
pub struct MemoryBlockstore {
    blocks: RwLock<HashMap<ContentId, Block>>,
}

impl MemoryBlockstore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    /// Whether the store holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl Blockstore for MemoryBlockstore {
    fn get(&self, cid: &ContentId) -> Result<Option<Block>, BlockstoreError> {
        Ok(self.blocks.read().get(cid).cloned())
    }

    fn put(&self, block: Block) -> Result<ContentId, BlockstoreError> {
        let cid = block.cid();
        self.blocks.write().entry(cid).or_insert(block);
        Ok(cid)
    }

    fn has(&self, cid: &ContentId) -> Result<bool, BlockstoreError> {
        Ok(self.blocks.read().contains_key(cid))
    }
}

/// Split `data` into leaf blocks of at most `chunk_size` bytes and store them.
///
/// Data that fits one chunk becomes a single leaf. Otherwise the leaves are
/// linked, in order, from a root block with an empty payload. Returns the
/// root content id.
pub fn import_bytes(
    bs: &dyn Blockstore,
    data: &[u8],
    chunk_size: usize,
) -> Result<ContentId, BlockstoreError> {
    let chunk_size = chunk_size.max(1);
    if data.len() <= chunk_size {
        return bs.put(Block::leaf(Bytes::copy_from_slice(data)));
    }

    let links = data
        .chunks(chunk_size)
        .map(|chunk| bs.put(Block::leaf(Bytes::copy_from_slice(chunk))))
        .collect::<Result<Vec<_>, _>>()?;
    bs.put(Block::new(links, Bytes::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let bs = MemoryBlockstore::new();
        let block = Block::leaf(&b"data"[..]);
        let cid = bs.put(block.clone()).unwrap();

        assert_eq!(cid, block.cid());
        assert!(bs.has(&cid).unwrap());
        assert_eq!(bs.get(&cid).unwrap(), Some(block));
        assert_eq!(bs.get(&ContentId::zero()).unwrap(), None);
    }

    #[test]
    fn test_import_small_is_single_leaf() {
        let bs = MemoryBlockstore::new();
        let root = import_bytes(&bs, b"tiny", 1024).unwrap();
        assert_eq!(bs.len(), 1);
        assert!(bs.get(&root).unwrap().unwrap().links().is_empty());
    }

    #[test]
    fn test_import_chunks_link_in_order() {
        let bs = MemoryBlockstore::new();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let root = import_bytes(&bs, &data, 300).unwrap();

        let root_block = bs.get(&root).unwrap().unwrap();
        assert_eq!(root_block.links().len(), 4);

        let rebuilt: Vec<u8> = root_block
            .links()
            .iter()
            .flat_map(|cid| bs.get(cid).unwrap().unwrap().data().to_vec())
            .collect();
        assert_eq!(rebuilt, data);
    }
}
