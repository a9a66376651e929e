//! This library reads and edits **RPF7** archives used by RAGE engine titles.
//!
//! # RPF7 Archive Format Documentation
//!
//! An RPF7 archive is a block addressed container. The header sits at the start and is followed
//! by the file data, every file starting on a 512 byte block boundary. Archives can be nested:
//! a file whose name ends in `.rpf` is itself an archive, and its blocks are counted from its own
//! start.
//!
//! ## Header
//!
//! | Offset (bytes) | Field          | Description                                           |
//! |----------------|----------------|-------------------------------------------------------|
//! | 0x0000         | Magic number   | 4 bytes: 0x52504637 ("7FPR" on disk)                  |
//! | 0x0004         | Entry count    | 4 bytes: Number of entry records, the root included   |
//! | 0x0008         | Names length   | 4 bytes: Length of the name blob                      |
//! | 0x000C         | Encryption     | 4 bytes: How the records and names are encrypted      |
//!
//! The header is followed by `entry_count` 16 byte records and `names_length` bytes of NUL
//! terminated names. Records and names are encrypted together, with AES or with the NG cipher
//! keyed by the archive's name and size. Decryption itself is provided by a [`CryptoProvider`].
//!
//! ## Entry records
//!
//! The second 32-bit word of a record decides its kind:
//!
//! | Kind      | Second word                | Layout                                                     |
//! |-----------|----------------------------|------------------------------------------------------------|
//! | Directory | `0x7FFFFF00`               | name offset, ident, first child index, child count         |
//! | Resource  | top bit of offset set      | name offset, size:24, offset:24, system flags, gfx flags   |
//! | Binary    | anything else              | name offset, size:24, offset:24, uncompressed size, crypt  |
//!
//! A directory's children are stored contiguously, sorted by ordinal name comparison. A resource
//! whose size does not fit in 24 bits stores `0xFFFFFF` and keeps the real size scattered
//! through its RSC7 frame.
//!
//! ## Editing
//!
//! New files are placed in the smallest free gap that fits, or at the end. When a header or file
//! grows into its neighbours, they are moved out of the way first, so the archive stays valid on
//! disk after every operation.
//!
//! - Data framed as an RSC7 resource becomes a resource entry.
//! - Nested archives and `.awc` audio banks are stored uncompressed.
//! - Everything else is DEFLATE compressed.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.rpf`
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Compression**: Raw DEFLATE without a zlib header
//!

pub mod container;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod hash;
pub mod read;
pub mod types;
pub mod write;

pub use container::{ContainerId, RpfContainer};
pub use crypto::{CryptoProvider, NoCrypto};
pub use entry::{Entry, EntryId, EntryKind};
pub use hash::jenkins_hash;
pub use read::{RpfArchive, RpfOptions};
pub use types::EncryptionMode;

#[cfg(feature = "encryption")]
pub use crypto::AesCrypto;
