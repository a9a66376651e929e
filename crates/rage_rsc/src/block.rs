//! Blocks are the units of a resource graph that get assigned a position and serialized.

use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{self, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{ConsistencyError, Result};

/// Shared handle to a block. Identity is the allocation, so a block reached twice is placed once.
pub type BlockRef = Arc<dyn ResourceBlock>;

/// Which arena a block lives in
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Arena {
    /// CPU side structures, addressed from `0x50000000`
    System,
    /// GPU side payloads, addressed from `0x60000000`
    Graphics,
}

impl Arena {
    /// Virtual address the arena starts at
    pub const fn base(self) -> u64 {
        match self {
            Arena::System => 0x5000_0000,
            Arena::Graphics => 0x6000_0000,
        }
    }
}

/// How the blocks of an arena are laid out into pages
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PackingStrategy {
    /// Size classed bin packing
    #[default]
    Advanced,
    /// Blocks in original order, every page the same size
    ///
    /// Metadata roots must use this; their loader rejects the size classed layout.
    Naive,
}

/// A unit of serializable data with a fixed length
pub trait ResourceBlock: Debug + Send + Sync {
    /// Number of bytes [`ResourceBlock::write`] produces
    fn block_length(&self) -> u64;

    /// The arena this block belongs to
    fn arena(&self) -> Arena;

    /// Blocks this one points at. Graphics blocks are leaves.
    fn references(&self) -> Vec<BlockRef> {
        Vec::new()
    }

    /// Blocks stored inline at a fixed offset inside this one
    fn parts(&self) -> Vec<(u64, BlockRef)> {
        Vec::new()
    }

    /// Layout strategy used when this block is the first of its arena
    fn packing(&self) -> PackingStrategy {
        PackingStrategy::Advanced
    }

    /// Serialize the block
    fn write(&self, writer: &mut BlockWriter<'_>) -> Result<()>;
}

/// Identity key of a block, its allocation address
pub(crate) fn block_key(block: &BlockRef) -> usize {
    Arc::as_ptr(block) as *const () as usize
}

/// Absolute positions of every placed block (and every part within one)
#[derive(Debug, Default, Clone)]
pub struct PositionTable {
    positions: HashMap<usize, u64>,
}

impl PositionTable {
    /// Record a block's position, and the positions of its parts relative to it
    pub(crate) fn assign(&mut self, block: &BlockRef, position: u64) {
        self.positions.insert(block_key(block), position);
        for (offset, part) in block.parts() {
            self.assign(&part, position + offset);
        }
    }

    /// Position of a block, if it was placed
    pub fn get(&self, block: &BlockRef) -> Option<u64> {
        self.positions.get(&block_key(block)).copied()
    }
}

/// Cursor handed to [`ResourceBlock::write`], bounded to the block's arena
pub struct BlockWriter<'a> {
    buffer: &'a mut [u8],
    written: usize,
    positions: &'a PositionTable,
}

impl<'a> BlockWriter<'a> {
    pub(crate) fn new(buffer: &'a mut [u8], positions: &'a PositionTable) -> Self {
        Self {
            buffer,
            written: 0,
            positions,
        }
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written as u64
    }

    /// Absolute position of another block
    pub fn position_of(&self, block: &BlockRef) -> Option<u64> {
        self.positions.get(block)
    }

    /// Write a 64-bit pointer to another block, or zero when there is none
    pub fn write_pointer(&mut self, target: Option<&BlockRef>) -> io::Result<()> {
        let position = target.and_then(|t| self.position_of(t)).unwrap_or(0);
        self.write_u64::<LittleEndian>(position)
    }

    /// Write `count` zero bytes
    pub fn pad(&mut self, count: usize) -> io::Result<()> {
        const ZEROES: [u8; 16] = [0; 16];
        let mut remaining = count;
        while remaining > 0 {
            let step = remaining.min(ZEROES.len());
            self.write_all(&ZEROES[..step])?;
            remaining -= step;
        }
        Ok(())
    }
}

impl Write for BlockWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let available = self.buffer.len() - self.written;
        let count = buf.len().min(available);
        self.buffer[self.written..self.written + count].copy_from_slice(&buf[..count]);
        self.written += count;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A system block backed by raw bytes
///
/// Pointer slots are 8 byte fields inside `data` that get the target's absolute position
/// when written. Slots must not overlap. Parts are sub-structures whose bytes are already
/// inside `data`.
#[derive(Debug, Clone, Default)]
pub struct SystemBlock {
    data: Vec<u8>,
    pointers: Vec<(usize, BlockRef)>,
    parts: Vec<(u64, BlockRef)>,
    packing: PackingStrategy,
}

impl SystemBlock {
    /// Wrap a buffer
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Point the 8 bytes at `offset` at another block
    pub fn with_pointer(mut self, offset: usize, target: BlockRef) -> Self {
        self.pointers.push((offset, target));
        self
    }

    /// Declare an inline part at `offset`
    pub fn with_part(mut self, offset: u64, part: BlockRef) -> Self {
        self.parts.push((offset, part));
        self
    }

    /// Lay this block's arena out with [`PackingStrategy::Naive`]
    pub fn metadata_root(mut self) -> Self {
        self.packing = PackingStrategy::Naive;
        self
    }

    /// Finish building and share the block
    pub fn into_ref(self) -> BlockRef {
        Arc::new(self)
    }
}

impl ResourceBlock for SystemBlock {
    fn block_length(&self) -> u64 {
        self.data.len() as u64
    }

    fn arena(&self) -> Arena {
        Arena::System
    }

    fn references(&self) -> Vec<BlockRef> {
        self.pointers.iter().map(|(_, target)| target.clone()).collect()
    }

    fn parts(&self) -> Vec<(u64, BlockRef)> {
        self.parts.clone()
    }

    fn packing(&self) -> PackingStrategy {
        self.packing
    }

    fn write(&self, writer: &mut BlockWriter<'_>) -> Result<()> {
        let mut slots = self.pointers.iter().collect::<Vec<_>>();
        slots.sort_by_key(|(offset, _)| *offset);

        let mut cursor = 0;
        for (offset, target) in slots {
            let end = offset.saturating_add(8);
            if *offset < cursor || end > self.data.len() {
                return Err(ConsistencyError::PointerSlot {
                    offset: *offset as u64,
                    length: self.block_length(),
                }
                .into());
            }
            writer.write_all(&self.data[cursor..*offset])?;
            writer.write_pointer(Some(target))?;
            cursor = end;
        }
        writer.write_all(&self.data[cursor..])?;
        Ok(())
    }
}

/// A graphics block backed by raw bytes
#[derive(Debug, Clone, Default)]
pub struct GraphicsBlock {
    data: Vec<u8>,
}

impl GraphicsBlock {
    /// Wrap a buffer
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Finish building and share the block
    pub fn into_ref(self) -> BlockRef {
        Arc::new(self)
    }
}

impl ResourceBlock for GraphicsBlock {
    fn block_length(&self) -> u64 {
        self.data.len() as u64
    }

    fn arena(&self) -> Arena {
        Arena::Graphics
    }

    fn write(&self, writer: &mut BlockWriter<'_>) -> Result<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }
}
