//! Turning a block graph into a standalone RSC7 resource.

use std::io;

use bon::Builder;
use tracing::{debug, instrument};

use crate::block::{Arena, BlockRef, BlockWriter, PositionTable};
use crate::compression::deflate;
use crate::error::{ConsistencyError, Error, Result};
use crate::frame::ResourceFrame;
use crate::pack::{collect_blocks, pack, BlockSet, Packing};

/// Default page limit handed to the advanced packer for each arena
pub const DEFAULT_MAX_PAGE_COUNT: u32 = 128;

/// Options for how a resource should be built
#[derive(Debug, Clone, Copy, Builder)]
pub struct BuildOptions {
    /// Whether the arenas are DEFLATE compressed after the frame
    #[builder(default = true)]
    pub compress: bool,

    /// Maximum number of pages per arena for the advanced packer
    #[builder(default = DEFAULT_MAX_PAGE_COUNT)]
    pub max_page_count: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Collect, pack, serialize and frame the graph rooted at `root`
///
/// ```
/// # fn doit() -> rage_rsc::error::Result<()> {
/// use rage_rsc::block::{GraphicsBlock, SystemBlock};
/// use rage_rsc::build::{build, BuildOptions};
///
/// let pixels = GraphicsBlock::new(vec![0xFF; 64]).into_ref();
/// let root = SystemBlock::new(vec![0; 16]).with_pointer(8, pixels).into_ref();
///
/// let resource = build(&root, 13, &BuildOptions::default())?;
/// assert_eq!(&resource[..4], b"RSC7");
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
#[instrument(skip(root), err)]
pub fn build(root: &BlockRef, version: u32, options: &BuildOptions) -> Result<Vec<u8>> {
    let blocks = collect_blocks(root);
    let system = pack(&blocks.system, Arena::System, options.max_page_count)?;
    let graphics = pack(&blocks.graphics, Arena::Graphics, options.max_page_count)?;

    let data = serialize(&blocks, &system, &graphics)?;
    debug!(
        system = system.flags.total_size(),
        graphics = graphics.flags.total_size(),
        "serialized resource"
    );

    let payload = if options.compress {
        deflate(&data)?
    } else {
        data
    };

    let mut output = ResourceFrame::new(version, system.flags, graphics.flags).to_bytes()?;
    output.extend_from_slice(&payload);
    Ok(output)
}

/// Write every block at its assigned position and return `system ++ graphics`
///
/// Each arena is exactly as long as its page table says.
pub fn serialize(blocks: &BlockSet, system: &Packing, graphics: &Packing) -> Result<Vec<u8>> {
    let mut positions = PositionTable::default();
    for (block, position) in blocks.system.iter().zip(&system.positions) {
        positions.assign(block, *position);
    }
    for (block, position) in blocks.graphics.iter().zip(&graphics.positions) {
        positions.assign(block, *position);
    }

    let mut output = write_arena(&blocks.system, Arena::System, system, &positions)?;
    output.extend(write_arena(
        &blocks.graphics,
        Arena::Graphics,
        graphics,
        &positions,
    )?);
    Ok(output)
}

fn write_arena(
    blocks: &[BlockRef],
    arena: Arena,
    packing: &Packing,
    positions: &PositionTable,
) -> Result<Vec<u8>> {
    let size = packing.flags.total_size();
    let mut buffer = vec![0; size as usize];

    for block in blocks {
        let position = positions.get(block).ok_or(ConsistencyError::Unplaced)?;
        let start = position
            .checked_sub(arena.base())
            .filter(|start| *start <= size)
            .ok_or(ConsistencyError::OutsideArena { position })?;

        let mut writer = BlockWriter::new(&mut buffer[start as usize..], positions);
        match block.write(&mut writer) {
            Err(Error::IOError(e)) if e.kind() == io::ErrorKind::WriteZero => {
                return Err(ConsistencyError::OutsideArena { position }.into());
            }
            result => result?,
        }

        let declared = block.block_length();
        let written = writer.written();
        if written != declared {
            return Err(ConsistencyError::LengthMismatch {
                position,
                declared,
                written,
            }
            .into());
        }
    }

    Ok(buffer)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::{build, BuildOptions};
    use crate::block::{Arena, BlockRef, BlockWriter, GraphicsBlock, ResourceBlock, SystemBlock};
    use crate::error::{ConsistencyError, Error, Result};
    use crate::frame::{decompress_resource, ResourceFrame};

    #[derive(Debug)]
    struct ShortBlock;

    impl ResourceBlock for ShortBlock {
        fn block_length(&self) -> u64 {
            32
        }

        fn arena(&self) -> Arena {
            Arena::System
        }

        fn write(&self, writer: &mut BlockWriter<'_>) -> Result<()> {
            writer.write_all(&[1; 20])?;
            Ok(())
        }
    }

    #[traced_test]
    #[test]
    fn build_uncompressed() -> Result<()> {
        let pixels = GraphicsBlock::new(vec![0xEE; 48]).into_ref();
        let root = SystemBlock::new(vec![0x11; 16])
            .with_pointer(8, pixels)
            .into_ref();

        let options = BuildOptions::builder().compress(false).build();
        let resource = build(&root, 0x2B, &options)?;

        let frame = ResourceFrame::parse(&resource)?;
        assert_eq!(frame.flags_version(), 0x2B);
        assert_eq!(frame.system_size(), 0x2000);
        assert_eq!(frame.graphics_size(), 0x2000);

        let body = &resource[ResourceFrame::SIZE..];
        assert_eq!(body.len(), 0x4000);
        assert_eq!(&body[..8], &[0x11; 8]);
        assert_eq!(&body[8..16], &0x6000_0000u64.to_le_bytes());
        assert_eq!(&body[0x2000..0x2030], &[0xEE; 48]);

        Ok(())
    }

    #[test]
    fn build_compressed_round_trips() -> Result<()> {
        let children = (0..20)
            .map(|i| SystemBlock::new(vec![i as u8; 100 + i * 10]).into_ref())
            .collect::<Vec<BlockRef>>();
        let root = children
            .iter()
            .enumerate()
            .fold(SystemBlock::new(vec![0; 20 * 8]), |root, (i, child)| {
                root.with_pointer(i * 8, child.clone())
            })
            .into_ref();

        let resource = build(&root, 2, &BuildOptions::default())?;
        let (frame, data) = decompress_resource(&resource)?;
        let frame = frame.ok_or(Error::InvalidFrame)?;

        assert_eq!(data.len() as u64, frame.system_size() + frame.graphics_size());
        assert_eq!(frame.graphics_size(), 0);

        for (i, slot) in data[..20 * 8].chunks(8).enumerate() {
            let position = u64::from_le_bytes(slot.try_into().unwrap());
            let offset = (position - 0x5000_0000) as usize;
            assert_eq!(data[offset], i as u8);
        }

        Ok(())
    }

    #[test]
    fn short_write_is_inconsistent() {
        let root: BlockRef = std::sync::Arc::new(ShortBlock);
        let result = build(&root, 0, &BuildOptions::default());
        assert!(matches!(
            result,
            Err(Error::Consistency(ConsistencyError::LengthMismatch {
                declared: 32,
                written: 20,
                ..
            }))
        ));
    }
}
