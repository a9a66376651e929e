//! Typed archive entries and their translation to and from raw records.

use rage_rsc::flags::PageFlags;

use crate::error::{FormatError, Result};
use crate::hash::{jenkins_hash, short_name};
use crate::types::{block_count, EntryRecord};

/// Longest name kept from the name blob, in characters
pub const MAX_NAME_LENGTH: usize = 256;

/// Handle of an entry inside its container
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    /// Position of the entry in its container's entry arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// A directory, listing a contiguous range of the container's positional entry list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Position of the first child in the entry list
    pub entries_index: u32,
    /// Number of children
    pub entries_count: u32,
    /// Child directories
    pub directories: Vec<EntryId>,
    /// Child files
    pub files: Vec<EntryId>,
}

/// A plain file, usually DEFLATE compressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryFileEntry {
    /// First block of the data
    pub file_offset: u32,
    /// Stored size, zero when the data is stored uncompressed
    pub file_size: u32,
    /// Size after decompression
    pub file_uncompressed_size: u32,
    /// Encrypted with the container's cipher
    pub is_encrypted: bool,
}

impl BinaryFileEntry {
    /// The record's encryption type, 0 or 1
    pub fn encryption_type(&self) -> u32 {
        u32::from(self.is_encrypted)
    }
}

/// A resource, stored as an RSC7 frame followed by the compressed arenas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceFileEntry {
    /// First block of the data
    pub file_offset: u32,
    /// Stored size, frame included
    pub file_size: u32,
    /// Page table of the system arena
    pub system_flags: PageFlags,
    /// Page table of the graphics arena
    pub graphics_flags: PageFlags,
    /// Encrypted with the container's cipher (only scripts are)
    pub is_encrypted: bool,
}

impl ResourceFileEntry {
    /// Resource version recombined from the nibbles of both page tables
    pub fn version(&self) -> u32 {
        (self.system_flags.version() << 4) | self.graphics_flags.version()
    }

    /// Size of the system arena once decompressed
    pub fn system_size(&self) -> u64 {
        self.system_flags.total_size()
    }

    /// Size of the graphics arena once decompressed
    pub fn graphics_size(&self) -> u64 {
        self.graphics_flags.total_size()
    }
}

/// The three entry kinds, decided by a record's discriminant word
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory(DirectoryEntry),
    BinaryFile(BinaryFileEntry),
    ResourceFile(ResourceFileEntry),
}

/// An entry of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Name as stored
    pub name: String,
    /// Lowercase name
    pub name_lower: String,
    /// Slash joined lowercase path, starting with the container's path
    pub path: String,
    /// [`jenkins_hash`] of the name
    pub name_hash: u32,
    /// [`jenkins_hash`] of the name without its extension
    pub short_name_hash: u32,
    /// Directory listing this entry, `None` for the root
    pub parent: Option<EntryId>,
    /// Offset of the name in the name blob as of the last header read or write
    pub name_offset: u32,
    /// Kind specific fields
    pub kind: EntryKind,
}

impl Entry {
    /// Create an unattached entry
    pub fn new(name: &str, kind: EntryKind) -> Self {
        let mut entry = Self {
            name: String::new(),
            name_lower: String::new(),
            path: String::new(),
            name_hash: 0,
            short_name_hash: 0,
            parent: None,
            name_offset: 0,
            kind,
        };
        entry.set_name(name);
        entry
    }

    /// Create an entry from a decoded record and the name it points at
    pub fn from_record(record: EntryRecord, name: &str) -> Self {
        let name_offset = match record {
            EntryRecord::Directory { name_offset, .. }
            | EntryRecord::BinaryFile { name_offset, .. }
            | EntryRecord::ResourceFile { name_offset, .. } => name_offset,
        };

        let kind = match record {
            EntryRecord::Directory {
                entries_index,
                entries_count,
                ..
            } => EntryKind::Directory(DirectoryEntry {
                entries_index,
                entries_count,
                ..Default::default()
            }),
            EntryRecord::BinaryFile {
                file_size,
                file_offset,
                uncompressed_size,
                encryption_type,
                ..
            } => EntryKind::BinaryFile(BinaryFileEntry {
                file_offset,
                file_size,
                file_uncompressed_size: uncompressed_size,
                is_encrypted: encryption_type == 1,
            }),
            EntryRecord::ResourceFile {
                file_size,
                file_offset,
                system_flags,
                graphics_flags,
                ..
            } => EntryKind::ResourceFile(ResourceFileEntry {
                file_offset,
                file_size,
                system_flags,
                graphics_flags,
                is_encrypted: false,
            }),
        };

        let mut entry = Self::new(name, kind);
        entry.name_offset = name_offset;
        if let EntryKind::ResourceFile(resource) = &mut entry.kind {
            resource.is_encrypted = entry.name_lower.ends_with(".ysc");
        }
        entry
    }

    /// The record for this entry, with the name at `name_offset`
    pub fn to_record(&self, name_offset: u32) -> Result<EntryRecord> {
        Ok(match &self.kind {
            EntryKind::Directory(dir) => EntryRecord::Directory {
                name_offset,
                entries_index: dir.entries_index,
                entries_count: dir.entries_count,
            },
            EntryKind::BinaryFile(file) => EntryRecord::BinaryFile {
                name_offset,
                file_size: file.file_size,
                file_offset: file.file_offset,
                uncompressed_size: file.file_uncompressed_size,
                encryption_type: file.encryption_type(),
            },
            EntryKind::ResourceFile(file) => EntryRecord::ResourceFile {
                name_offset,
                file_size: file.file_size.min(EntryRecord::SIZE_SENTINEL),
                file_offset: file.file_offset,
                system_flags: file.system_flags,
                graphics_flags: file.graphics_flags,
            },
        })
    }

    /// Rename the entry and recompute the lowercase name and both hashes
    ///
    /// Paths are left alone, they depend on the parent.
    pub fn set_name(&mut self, name: &str) {
        self.name = name.chars().take(MAX_NAME_LENGTH).collect();
        self.name_lower = self.name.to_lowercase();
        self.name_hash = jenkins_hash(&self.name_lower);
        self.short_name_hash = jenkins_hash(short_name(&self.name_lower));
    }

    /// Whether this is a directory
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory(_))
    }

    /// Whether this is a binary or resource file
    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    /// Whether this is a binary file whose name marks it as a nested archive
    pub fn is_archive(&self) -> bool {
        matches!(self.kind, EntryKind::BinaryFile(_)) && self.name_lower.ends_with(".rpf")
    }

    /// Directory fields, if this is one
    pub fn as_directory(&self) -> Option<&DirectoryEntry> {
        match &self.kind {
            EntryKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Mutable directory fields, if this is one
    pub fn as_directory_mut(&mut self) -> Option<&mut DirectoryEntry> {
        match &mut self.kind {
            EntryKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// First block of a file's data
    pub fn file_offset(&self) -> Option<u32> {
        match &self.kind {
            EntryKind::Directory(_) => None,
            EntryKind::BinaryFile(file) => Some(file.file_offset),
            EntryKind::ResourceFile(file) => Some(file.file_offset),
        }
    }

    /// Move a file's data pointer, no data is touched
    pub fn set_file_offset(&mut self, offset: u32) {
        match &mut self.kind {
            EntryKind::Directory(_) => {}
            EntryKind::BinaryFile(file) => file.file_offset = offset,
            EntryKind::ResourceFile(file) => file.file_offset = offset,
        }
    }

    /// Whether the stored data has to be decrypted
    pub fn is_encrypted(&self) -> bool {
        match &self.kind {
            EntryKind::Directory(_) => false,
            EntryKind::BinaryFile(file) => file.is_encrypted,
            EntryKind::ResourceFile(file) => file.is_encrypted,
        }
    }

    /// Bytes the file occupies in the archive
    ///
    /// The stored size when there is one, otherwise the uncompressed size (binary) or the sum
    /// of both arenas (resource).
    pub fn effective_size(&self) -> Option<u64> {
        match &self.kind {
            EntryKind::Directory(_) => None,
            EntryKind::BinaryFile(file) if file.file_size > 0 => Some(file.file_size as u64),
            EntryKind::BinaryFile(file) => Some(file.file_uncompressed_size as u64),
            EntryKind::ResourceFile(file) if file.file_size > 0 => Some(file.file_size as u64),
            EntryKind::ResourceFile(file) => Some(file.system_size() + file.graphics_size()),
        }
    }

    /// Blocks the file occupies, zero for directories
    pub fn block_count(&self) -> u64 {
        self.effective_size().map(block_count).unwrap_or(0)
    }

    /// Key length handed to NG when en/decrypting this file's data
    pub(crate) fn ng_length(&self) -> u32 {
        match &self.kind {
            EntryKind::Directory(_) => 0,
            EntryKind::BinaryFile(file) => file.file_uncompressed_size,
            EntryKind::ResourceFile(file) => file.file_size,
        }
    }
}

/// Read the NUL terminated name at `offset` in a decrypted name blob
pub fn read_name(names: &[u8], offset: u32) -> Result<String> {
    let tail = names
        .get(offset as usize..)
        .ok_or(FormatError::FieldOverflow {
            field: "name offset",
            value: offset as u64,
        })?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end])
        .chars()
        .take(MAX_NAME_LENGTH)
        .collect())
}
