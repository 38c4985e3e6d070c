//! Blocks of a content-addressed data graph
//!
//! A [`Block`] carries an ordered list of links to child blocks and an opaque
//! data payload. Its content id is the keccak256 digest of its encoding:
//!
//! ```text
//! +-------------+----------------------+-----------+
//! | link count  | links                | data      |
//! | u32 (BE)    | count * 32 bytes     | remaining |
//! +-------------+----------------------+-----------+
//! ```

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

use crate::cache::OnceCache;
use crate::cid::ContentId;
use crate::error::{PrimitivesError, Result};

/// Size of the link count prefix.
const LINK_COUNT_SIZE: usize = 4;

/// A node of a data graph.
#[derive(Debug, Clone)]
pub struct Block {
    links: Vec<ContentId>,
    data: Bytes,
    cid: OnceCache<ContentId>,
}

impl Block {
    /// Create a block with child links and data.
    pub fn new(links: Vec<ContentId>, data: impl Into<Bytes>) -> Self {
        Self {
            links,
            data: data.into(),
            cid: OnceCache::new(),
        }
    }

    /// Create a block without links.
    pub fn leaf(data: impl Into<Bytes>) -> Self {
        Self::new(Vec::new(), data)
    }

    /// Links to child blocks, in order.
    pub fn links(&self) -> &[ContentId] {
        &self.links
    }

    /// The data payload.
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Content id of this block.
    pub fn cid(&self) -> ContentId {
        *self.cid.get_or_compute(|| ContentId::hash(self.encode()))
    }

    /// Length of the encoded block in bytes.
    pub fn encoded_len(&self) -> usize {
        LINK_COUNT_SIZE + self.links.len() * ContentId::LENGTH + self.data.len()
    }

    /// Encode the block.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        let mut count = [0u8; LINK_COUNT_SIZE];
        BigEndian::write_u32(&mut count, self.links.len() as u32);
        buf.put_slice(&count);
        for link in &self.links {
            buf.put_slice(link.as_bytes());
        }
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Decode a block, remembering the content id of `encoded`.
    pub fn decode(encoded: Bytes) -> Result<Self> {
        if encoded.len() < LINK_COUNT_SIZE {
            return Err(PrimitivesError::InvalidBlock("missing link count"));
        }
        let count = BigEndian::read_u32(&encoded[..LINK_COUNT_SIZE]) as usize;
        let links_end = count
            .checked_mul(ContentId::LENGTH)
            .and_then(|len| len.checked_add(LINK_COUNT_SIZE))
            .filter(|end| *end <= encoded.len())
            .ok_or(PrimitivesError::InvalidBlock("truncated links"))?;

        let links = encoded[LINK_COUNT_SIZE..links_end]
            .chunks_exact(ContentId::LENGTH)
            .map(ContentId::from_slice)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            links,
            data: encoded.slice(links_end..),
            cid: OnceCache::with_value(ContentId::hash(&encoded)),
        })
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.links == other.links && self.data == other.data
    }
}

impl Eq for Block {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_encoding() {
        let block = Block::leaf(&b"hello"[..]);
        let encoded = block.encode();
        assert_eq!(encoded.len(), 4 + 5);
        assert_eq!(&encoded[..4], &[0, 0, 0, 0]);
        assert_eq!(block.cid(), ContentId::hash(&encoded));
    }

    #[test]
    fn test_links_change_cid() {
        let child = Block::leaf(&b"child"[..]);
        let parent = Block::new(vec![child.cid()], &b"child"[..]);
        assert_ne!(parent.cid(), child.cid());
        assert_eq!(parent.encoded_len(), 4 + 32 + 5);

        let decoded = Block::decode(parent.encode()).unwrap();
        assert_eq!(decoded, parent);
        assert_eq!(decoded.links(), &[child.cid()]);
        assert_eq!(decoded.cid(), parent.cid());
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(matches!(
            Block::decode(Bytes::from_static(&[0, 0])),
            Err(PrimitivesError::InvalidBlock(_))
        ));
        // claims one link but carries only 8 bytes after the prefix
        let mut bad = vec![0, 0, 0, 1];
        bad.extend_from_slice(&[0xAA; 8]);
        assert!(matches!(
            Block::decode(Bytes::from(bad)),
            Err(PrimitivesError::InvalidBlock("truncated links"))
        ));
    }
}
