//! Content-addressed archive codec
//!
//! An archive is a header followed by one section per selected block, in
//! depth-first pre-order from the root. Each block appears once.
//!
//! ```text
//! header:  b"nCAR" | version (u8) | root cid (32)
//! section: block length (u64 BE) | block cid (32) | encoded block
//! ```
//!
//! Preparing an archive walks the graph once to fix the block order and the
//! exact encoded length; dumping it later streams the sections straight from
//! the block store without building the archive in memory.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use comb_primitives::{Block, ContentId};
use tracing::trace;

use crate::blockstore::Blockstore;
use crate::error::CarError;
use crate::selector::Selector;

/// Archive magic bytes.
const MAGIC: &[u8; 4] = b"nCAR";

/// Archive format version.
const VERSION: u8 = 1;

/// Length of the archive header.
pub const HEADER_LEN: u64 = (MAGIC.len() + 1 + ContentId::LENGTH) as u64;

/// Per-block overhead: length prefix plus content id.
pub const SECTION_OVERHEAD: u64 = (8 + ContentId::LENGTH) as u64;

/// Largest block section accepted when loading.
const MAX_BLOCK_LEN: u64 = 1 << 30;

/// An archive whose size is known before any byte is produced.
pub trait PreparedCar: Send {
    /// Exact length of the archive in bytes.
    fn size(&self) -> u64;

    /// Write the archive to `out`.
    fn dump(&self, out: &mut dyn Write) -> Result<(), CarError>;
}

/// Archive encoding of data graphs.
pub trait CarIo: Send + Sync {
    /// Prepared archive handle.
    type Prepared: PreparedCar + 'static;

    /// Walk the graph under `root` and fix the archive layout.
    fn prepare_car(
        &self,
        bs: Arc<dyn Blockstore>,
        root: ContentId,
        selector: Selector,
    ) -> Result<Self::Prepared, CarError>;

    /// Write the archive of the graph under `root`, returning its length.
    fn write_car(
        &self,
        bs: &dyn Blockstore,
        root: ContentId,
        selector: Selector,
        out: &mut dyn Write,
    ) -> Result<u64, CarError>;

    /// Read an archive into the block store, returning its root.
    fn load_car(&self, bs: &dyn Blockstore, reader: &mut dyn Read) -> Result<ContentId, CarError>;
}

/// The default archive codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Car;

/// Archive layout produced by [`Car::prepare_car`].
pub struct PreparedArchive {
    bs: Arc<dyn Blockstore>,
    root: ContentId,
    blocks: Vec<ContentId>,
    size: u64,
}

impl std::fmt::Debug for PreparedArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedArchive")
            .field("root", &self.root)
            .field("blocks", &self.blocks.len())
            .field("size", &self.size)
            .finish()
    }
}

impl PreparedArchive {
    /// Root content id recorded in the header.
    pub const fn root(&self) -> ContentId {
        self.root
    }

    /// Content ids of the archived blocks, in archive order.
    pub fn blocks(&self) -> &[ContentId] {
        &self.blocks
    }
}

impl PreparedCar for PreparedArchive {
    fn size(&self) -> u64 {
        self.size
    }

    fn dump(&self, out: &mut dyn Write) -> Result<(), CarError> {
        dump_sections(&*self.bs, self.root, &self.blocks, out)
    }
}

/// Walk the selected graph, returning block ids in archive order and the
/// archive length.
fn layout(
    bs: &dyn Blockstore,
    root: ContentId,
    selector: Selector,
) -> Result<(Vec<ContentId>, u64), CarError> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut size = HEADER_LEN;
    let mut stack = vec![(root, 0u32)];

    while let Some((cid, depth)) = stack.pop() {
        if !selector.selects(depth) || !seen.insert(cid) {
            continue;
        }
        let block = bs.get(&cid)?.ok_or(CarError::MissingBlock(cid))?;
        size += SECTION_OVERHEAD + block.encoded_len() as u64;
        order.push(cid);
        // reversed so the first link is visited first
        stack.extend(block.links().iter().rev().map(|link| (*link, depth + 1)));
    }

    Ok((order, size))
}

fn dump_sections(
    bs: &dyn Blockstore,
    root: ContentId,
    blocks: &[ContentId],
    out: &mut dyn Write,
) -> Result<(), CarError> {
    out.write_all(MAGIC)?;
    out.write_u8(VERSION)?;
    out.write_all(root.as_bytes())?;

    for cid in blocks {
        let block = bs.get(cid)?.ok_or(CarError::MissingBlock(*cid))?;
        let encoded = block.encode();
        out.write_u64::<BigEndian>(encoded.len() as u64)?;
        out.write_all(cid.as_bytes())?;
        out.write_all(&encoded)?;
    }
    out.flush()?;
    Ok(())
}

/// Read a section length, distinguishing a clean end of archive.
fn read_section_len(reader: &mut dyn Read) -> Result<Option<u64>, CarError> {
    let mut buf = [0u8; 8];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(u64::from_be_bytes(buf)))
}

impl CarIo for Car {
    type Prepared = PreparedArchive;

    fn prepare_car(
        &self,
        bs: Arc<dyn Blockstore>,
        root: ContentId,
        selector: Selector,
    ) -> Result<PreparedArchive, CarError> {
        let (blocks, size) = layout(&*bs, root, selector)?;
        trace!(%root, blocks = blocks.len(), size, "prepared archive");
        Ok(PreparedArchive {
            bs,
            root,
            blocks,
            size,
        })
    }

    fn write_car(
        &self,
        bs: &dyn Blockstore,
        root: ContentId,
        selector: Selector,
        out: &mut dyn Write,
    ) -> Result<u64, CarError> {
        let (blocks, size) = layout(bs, root, selector)?;
        dump_sections(bs, root, &blocks, out)?;
        Ok(size)
    }

    fn load_car(&self, bs: &dyn Blockstore, reader: &mut dyn Read) -> Result<ContentId, CarError> {
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| CarError::InvalidHeader("truncated"))?;
        if &magic != MAGIC {
            return Err(CarError::InvalidHeader("bad magic"));
        }
        if reader.read_u8()? != VERSION {
            return Err(CarError::InvalidHeader("unsupported version"));
        }
        let mut root = [0u8; ContentId::LENGTH];
        reader
            .read_exact(&mut root)
            .map_err(|_| CarError::InvalidHeader("truncated"))?;
        let root = ContentId::new(root);

        let mut loaded = 0usize;
        while let Some(len) = read_section_len(reader)? {
            if len > MAX_BLOCK_LEN {
                return Err(CarError::BlockTooLarge(len));
            }
            let mut cid = [0u8; ContentId::LENGTH];
            reader.read_exact(&mut cid)?;
            let expected = ContentId::new(cid);

            // grows with the bytes actually present, not the claimed length
            let mut encoded = Vec::new();
            (&mut *reader).take(len).read_to_end(&mut encoded)?;
            if encoded.len() as u64 != len {
                return Err(CarError::Io(io::ErrorKind::UnexpectedEof.into()));
            }
            let actual = ContentId::hash(&encoded);
            if actual != expected {
                return Err(CarError::CidMismatch { expected, actual });
            }

            bs.put(Block::decode(Bytes::from(encoded))?)?;
            loaded += 1;
        }

        trace!(%root, blocks = loaded, "loaded archive");
        Ok(root)
    }
}
