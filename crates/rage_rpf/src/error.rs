//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::types::EncryptionMode;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent wrapper for [`rage_rsc::error::Error`]
    #[error(transparent)]
    Resource(#[from] rage_rsc::error::Error),

    /// archive data is malformed
    #[error("archive data is malformed")]
    Format(#[from] FormatError),

    /// unable to decrypt archive data
    #[error("unable to decrypt archive data")]
    Decryption(#[from] DecryptionError),

    /// archive layout is inconsistent
    #[error("archive layout is inconsistent")]
    Consistency(#[from] ConsistencyError),

    /// unable to find requested entry
    #[error("unable to find requested entry {0}")]
    EntryNotFound(String),

    /// unable to find requested container
    #[error("unable to find requested container {0}")]
    ContainerNotFound(usize),

    /// {0} is not a directory
    #[error("{0} is not a directory")]
    NotADirectory(String),

    /// {0} is not a file
    #[error("{0} is not a file")]
    NotAFile(String),

    /// an entry named {0} already exists
    #[error("an entry named {0} already exists")]
    EntryExists(String),

    /// the root directory cannot be renamed or deleted
    #[error("the root directory cannot be renamed or deleted")]
    RootEntry,
}

/// Error type describing data that does not decode as an archive
#[derive(Error, Diagnostic, Debug)]
pub enum FormatError {
    /// not an RPF7 archive
    #[error("not an RPF7 archive")]
    BadMagic,

    /// the first entry is not a directory
    #[error("the first entry is not a directory")]
    MissingRoot,

    /// unknown header encryption tag
    #[error("unknown header encryption tag")]
    UnknownEncryption,

    /// binary entry has encryption type {0}, expected 0 or 1
    #[error("binary entry has encryption type {0}, expected 0 or 1")]
    BadEncryptionType(u32),

    /// directory entries {index}..+{count} do not fit in {total} entries
    #[error("directory entries {index}..+{count} do not fit in {total} entries")]
    BadDirectoryRange {
        /// First child index
        index: u32,
        /// Number of children
        count: u32,
        /// Entries in the container
        total: usize,
    },

    /// header needs {length} bytes but the archive holds {available}
    #[error("header needs {length} bytes but the archive holds {available}")]
    TruncatedHeader {
        /// Bytes covered by the header, records and names
        length: u64,
        /// Size of the archive
        available: u64,
    },

    /// entry {0} is listed by more than one directory
    #[error("entry {0} is listed by more than one directory")]
    SharedEntry(u32),

    /// {field} value {value:#x} does not fit in its entry record
    #[error("{field} value {value:#x} does not fit in its entry record")]
    FieldOverflow {
        /// Name of the field
        field: &'static str,
        /// The value that was too large
        value: u64,
    },
}

/// Error type for failures of the crypto provider
#[derive(Error, Diagnostic, Debug)]
pub enum DecryptionError {
    /// no keys were provided for {0:?} encryption
    #[error("no keys were provided for {0:?} encryption")]
    MissingKeys(EncryptionMode),

    /// the provided key is invalid
    #[error("the provided key is invalid")]
    InvalidKey,
}

/// Error type for operations that would break the layout of a container
#[derive(Error, Diagnostic, Debug)]
pub enum ConsistencyError {
    /// moving {blocks} blocks from {from} to {to} would overlap
    #[error("moving {blocks} blocks from {from} to {to} would overlap")]
    OverlappingRelocation {
        /// Current first block
        from: u64,
        /// Requested first block
        to: u64,
        /// Length of the entry in blocks
        blocks: u64,
    },
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
