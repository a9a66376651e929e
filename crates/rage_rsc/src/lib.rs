//! This library packs, frames and reads **RSC7** resources used by RAGE engine titles.
//!
//! # RSC7 Resource Format Documentation
//!
//! A resource is a graph of structures (blocks) that the game loads by copying two memory arenas
//! in one go and patching nothing. Every block therefore has to be given its final virtual address
//! before it is written, and pointers between blocks are stored as those addresses.
//!
//! ## Arenas
//!
//! | Arena    | Base address  | Contents                                   |
//! |----------|---------------|--------------------------------------------|
//! | System   | `0x50000000`  | CPU side structures, the root comes first  |
//! | Graphics | `0x60000000`  | GPU side payloads such as texture data     |
//!
//! Each arena is a sequence of pages, largest pages first. The page table of an arena is packed into
//! a single 32-bit [`flags::PageFlags`] value.
//!
//! ## Frame
//!
//! A free-standing resource file starts with a 16 byte frame, followed by the raw DEFLATE stream of
//! the system arena immediately followed by the graphics arena.
//!
//! | Offset (bytes) | Field          | Description                                         |
//! |----------------|----------------|-----------------------------------------------------|
//! | 0x0000         | Magic number   | 4 bytes: 0x37435352 ("RSC7")                        |
//! | 0x0004         | Version        | 4 bytes: Resource type version                      |
//! | 0x0008         | System flags   | 4 bytes: Page table of the system arena             |
//! | 0x000C         | Graphics flags | 4 bytes: Page table of the graphics arena           |
//!
//! The top nibble of the system flags holds bits 4..8 of the version and the top nibble of the
//! graphics flags holds bits 0..4.
//!
//! Resources stored inside an **RPF7** archive keep their frame on disk, but the archive entry
//! carries the two page tables as well.
//!
//! ## Building
//!
//! - [`pack::collect_blocks`] walks the graph and splits it by arena.
//! - [`pack::pack`] assigns every block a position and produces the page table.
//! - [`build::build`] writes the blocks, compresses the result and prepends the frame.
//!
//! ## Additional Information
//!
//! - **File Extensions**: `.ydr`, `.ytd`, `.ymap`, `.ybn` and friends
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Compression**: Raw DEFLATE without a zlib header
//!

pub mod block;
pub mod build;
pub mod compression;
pub mod error;
pub mod flags;
pub mod frame;
pub mod pack;

pub use block::{Arena, BlockRef, ResourceBlock};
pub use build::{build, BuildOptions};
pub use flags::PageFlags;
pub use frame::ResourceFrame;
