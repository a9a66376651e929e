//! The 16 byte frame in front of a standalone resource.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::compression::inflate;
use crate::error::{Error, Result};
use crate::flags::PageFlags;

/// RSC7 resource frame
///
/// Starts with "RSC7" and stores the resource version followed by the page tables of the
/// system and graphics arenas. The top nibble of each page table carries half of the version.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little, magic = 0x37435352u32)]
pub struct ResourceFrame {
    /// The resource type version
    pub version: i32,

    /// Page table of the system (CPU) arena
    pub system_flags: PageFlags,

    /// Page table of the graphics (GPU) arena
    pub graphics_flags: PageFlags,
}

impl ResourceFrame {
    /// Length of the frame in bytes
    pub const SIZE: usize = 16;

    /// "RSC7" read as a little endian integer
    pub const MAGIC: u32 = 0x37435352;

    /// Build a frame, splitting the version across the two page tables
    pub fn new(version: u32, system_flags: PageFlags, graphics_flags: PageFlags) -> Self {
        Self {
            version: version as i32,
            system_flags: system_flags.with_version((version >> 4) & 0xF),
            graphics_flags: graphics_flags.with_version(version & 0xF),
        }
    }

    /// Whether the buffer starts with the frame magic
    pub fn is_framed(data: &[u8]) -> bool {
        data.len() >= Self::SIZE && data[..4] == Self::MAGIC.to_le_bytes()
    }

    /// Read the frame from the start of a buffer
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !Self::is_framed(data) {
            return Err(Error::InvalidFrame);
        }
        Ok(Self::read(&mut Cursor::new(data))?)
    }

    /// Serialize the frame
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut output = Cursor::new(Vec::with_capacity(Self::SIZE));
        self.write(&mut output)?;
        Ok(output.into_inner())
    }

    /// The version recombined from the page table nibbles
    pub fn flags_version(&self) -> u32 {
        (self.system_flags.version() << 4) | self.graphics_flags.version()
    }

    /// Size of the system arena
    pub fn system_size(&self) -> u64 {
        self.system_flags.total_size()
    }

    /// Size of the graphics arena
    pub fn graphics_size(&self) -> u64 {
        self.graphics_flags.total_size()
    }
}

/// Inflate a resource, stripping its frame first when the data carries one.
///
/// Data extracted from an archive entry has no frame; a free-standing file does.
pub fn decompress_resource(data: &[u8]) -> Result<(Option<ResourceFrame>, Vec<u8>)> {
    if ResourceFrame::is_framed(data) {
        let frame = ResourceFrame::parse(data)?;
        Ok((Some(frame), inflate(&data[ResourceFrame::SIZE..])?))
    } else {
        Ok((None, inflate(data)?))
    }
}
