//! One archive's entry tree, as decoded from (or about to be encoded into) its header.

use std::collections::HashMap;
use std::ops::AddAssign;

use crate::entry::{DirectoryEntry, Entry, EntryId, EntryKind};
use crate::error::{Error, FormatError, Result};
use crate::types::{EncryptionMode, EntryRecord, RpfHeader};

/// Handle of a container inside its [`crate::read::RpfArchive`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(pub(crate) usize);

impl ContainerId {
    /// The top-level container of an archive
    pub const ROOT: ContainerId = ContainerId(0);

    /// Position of the container in the archive's container arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// Entry counts gathered while scanning, nested archives included
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanTotals {
    /// Archives, this one included
    pub archives: u32,
    /// Binary and resource files, nested archives excluded
    pub files: u32,
    /// Directories, roots included
    pub folders: u32,
    /// Resource files
    pub resources: u32,
    /// Binary files, nested archives excluded
    pub binaries: u32,
}

impl AddAssign for ScanTotals {
    fn add_assign(&mut self, other: Self) {
        self.archives += other.archives;
        self.files += other.files;
        self.folders += other.folders;
        self.resources += other.resources;
        self.binaries += other.binaries;
    }
}

/// One RPF7 archive, either a physical file or nested inside another archive's entry
#[derive(Debug, Clone)]
pub struct RpfContainer {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) file_size: u64,
    pub(crate) start_pos: u64,
    pub(crate) header: RpfHeader,
    pub(crate) entries: Vec<Entry>,
    pub(crate) order: Vec<EntryId>,
    pub(crate) root: EntryId,
    pub(crate) children: Vec<ContainerId>,
    pub(crate) parent: Option<(ContainerId, EntryId)>,
    pub(crate) last_error: Option<String>,
    pub(crate) totals: ScanTotals,
}

impl RpfContainer {
    /// A container holding nothing but its root directory
    pub(crate) fn empty(name: &str, path: &str, start_pos: u64, encryption: EncryptionMode) -> Self {
        let mut root = Entry::new("", EntryKind::Directory(DirectoryEntry::default()));
        root.path = path.to_lowercase();

        let mut container = Self {
            name: name.to_owned(),
            path: path.to_owned(),
            file_size: 0,
            start_pos,
            header: RpfHeader {
                entry_count: 1,
                names_length: 0,
                encryption,
            },
            entries: vec![root],
            order: vec![EntryId(0)],
            root: EntryId(0),
            children: Vec::new(),
            parent: None,
            last_error: None,
            totals: ScanTotals::default(),
        };
        container.ensure_all_entries();
        container
    }

    /// Build the tree from decoded records and their names
    ///
    /// Records are linked by a pre-order walk from the root, which also assigns every path.
    pub(crate) fn from_records(
        name: &str,
        path: &str,
        start_pos: u64,
        file_size: u64,
        header: RpfHeader,
        records: Vec<(EntryRecord, String)>,
    ) -> Result<Self> {
        let mut entries = records
            .into_iter()
            .map(|(record, name)| Entry::from_record(record, &name))
            .collect::<Vec<_>>();

        let root = EntryId(0);
        match entries.first_mut() {
            Some(entry) if entry.is_directory() => entry.path = path.to_lowercase(),
            _ => return Err(FormatError::MissingRoot.into()),
        }

        let total = entries.len();
        let mut seen = vec![false; total];
        seen[0] = true;

        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            let (index, count) = match entries[dir.0].as_directory() {
                Some(d) => (d.entries_index, d.entries_count),
                None => continue,
            };

            let start = index as usize;
            let end = start + count as usize;
            if end > total {
                return Err(FormatError::BadDirectoryRange {
                    index,
                    count,
                    total,
                }
                .into());
            }

            let dir_path = entries[dir.0].path.clone();
            for i in start..end {
                if seen[i] {
                    return Err(FormatError::SharedEntry(i as u32).into());
                }
                seen[i] = true;

                let child = EntryId(i);
                let entry = &mut entries[i];
                entry.parent = Some(dir);
                entry.path = format!("{dir_path}/{}", entry.name_lower);
                let is_directory = entry.is_directory();

                if let Some(d) = entries[dir.0].as_directory_mut() {
                    if is_directory {
                        d.directories.push(child);
                    } else {
                        d.files.push(child);
                    }
                }
                if is_directory {
                    stack.push(child);
                }
            }
        }

        Ok(Self {
            name: name.to_owned(),
            path: path.to_owned(),
            file_size,
            start_pos,
            header,
            order: (0..total).map(EntryId).collect(),
            entries,
            root,
            children: Vec::new(),
            parent: None,
            last_error: None,
            totals: ScanTotals::default(),
        })
    }

    /// Name of the archive file
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the archive, nested archives are prefixed by their parent's path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Size of the archive in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Absolute offset of the archive's header in the physical stream
    pub fn start_pos(&self) -> u64 {
        self.start_pos
    }

    /// The header as of the last read or write
    pub fn header(&self) -> &RpfHeader {
        &self.header
    }

    /// How the header is encrypted
    pub fn encryption(&self) -> EncryptionMode {
        self.header.encryption
    }

    /// The root directory
    pub fn root(&self) -> EntryId {
        self.root
    }

    /// Nested archives found in this one
    pub fn children(&self) -> &[ContainerId] {
        &self.children
    }

    /// The archive this one is nested in, with the entry holding it
    pub fn parent(&self) -> Option<(ContainerId, EntryId)> {
        self.parent
    }

    /// The last per-entry failure seen while scanning or extracting
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Counts gathered by the last scan
    pub fn totals(&self) -> ScanTotals {
        self.totals
    }

    /// Number of entries in the positional entry list
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the entry list is empty (a valid archive always has a root)
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Look an entry up by handle
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id.0)
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> Result<&mut Entry> {
        self.entries
            .get_mut(id.0)
            .ok_or_else(|| Error::EntryNotFound(format!("#{}", id.0)))
    }

    pub(crate) fn get(&self, id: EntryId) -> Result<&Entry> {
        self.entry(id)
            .ok_or_else(|| Error::EntryNotFound(format!("#{}", id.0)))
    }

    /// Entries in positional order, the root first
    pub fn entries(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.order.iter().map(|id| (*id, &self.entries[id.0]))
    }

    /// File entries in positional order
    pub fn file_entries(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.entries().filter(|(_, entry)| entry.is_file())
    }

    /// Find a direct child of `dir` by name, ignoring case
    pub fn find_child(&self, dir: EntryId, name: &str) -> Option<EntryId> {
        let name = name.to_lowercase();
        let dir = self.entry(dir)?.as_directory()?;
        dir.directories
            .iter()
            .chain(dir.files.iter())
            .copied()
            .find(|id| self.entries[id.0].name_lower == name)
    }

    /// Resolve a slash separated path relative to the root, ignoring case
    ///
    /// ```
    /// # use rage_rpf::{RpfArchive, RpfOptions, ContainerId};
    /// # fn doit() -> rage_rpf::error::Result<()> {
    /// let mut rpf = RpfArchive::create_new(std::io::Cursor::new(Vec::new()), "a.rpf", Default::default(), RpfOptions::default())?;
    /// let root = rpf.container(ContainerId::ROOT)?.root();
    /// let dir = rpf.create_directory(ContainerId::ROOT, root, "Data")?;
    /// rpf.create_file(ContainerId::ROOT, dir, "hello.txt", b"hello")?;
    ///
    /// assert!(rpf.container(ContainerId::ROOT)?.find_entry("data/HELLO.txt").is_some());
    /// # Ok(())
    /// # }
    /// # doit().unwrap();
    /// ```
    pub fn find_entry(&self, path: &str) -> Option<EntryId> {
        path.split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .try_fold(self.root, |dir, part| self.find_child(dir, part))
    }

    /// Number of blocks the header currently needs
    pub fn header_blocks(&self) -> u64 {
        self.header.block_count()
    }

    /// Link a new entry under `dir` and give it its path
    pub(crate) fn attach(&mut self, dir: EntryId, mut entry: Entry) -> Result<EntryId> {
        let dir_entry = self.get(dir)?;
        if !dir_entry.is_directory() {
            return Err(Error::NotADirectory(dir_entry.path.clone()));
        }
        if self.find_child(dir, &entry.name).is_some() {
            return Err(Error::EntryExists(entry.name));
        }

        let id = EntryId(self.entries.len());
        entry.parent = Some(dir);
        entry.path = format!("{}/{}", dir_entry.path, entry.name_lower);
        let is_directory = entry.is_directory();
        self.entries.push(entry);

        if let Some(d) = self.entries[dir.0].as_directory_mut() {
            if is_directory {
                d.directories.push(id);
            } else {
                d.files.push(id);
            }
        }
        Ok(id)
    }

    /// Unlink an entry from its directory, its subtree goes with it
    pub(crate) fn detach(&mut self, id: EntryId) -> Result<()> {
        let parent = self.get(id)?.parent.ok_or(Error::RootEntry)?;
        if let Some(d) = self.entries[parent.0].as_directory_mut() {
            d.directories.retain(|child| *child != id);
            d.files.retain(|child| *child != id);
        }
        self.entries[id.0].parent = None;
        Ok(())
    }

    /// Every entry below `id`, `id` included
    pub(crate) fn subtree(&self, id: EntryId) -> Vec<EntryId> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            found.push(next);
            if let Some(d) = self.entries[next.0].as_directory() {
                stack.extend(d.directories.iter().chain(d.files.iter()).copied());
            }
        }
        found
    }

    /// Recompute the paths of `id` and everything below it from its parent's path
    pub(crate) fn update_paths(&mut self, id: EntryId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let path = match self.entries[next.0].parent {
                Some(parent) => format!(
                    "{}/{}",
                    self.entries[parent.0].path, self.entries[next.0].name_lower
                ),
                None => self.path.to_lowercase(),
            };
            self.entries[next.0].path = path;
            if let Some(d) = self.entries[next.0].as_directory() {
                stack.extend(d.directories.iter().chain(d.files.iter()).copied());
            }
        }
    }

    /// Rebuild the positional entry list from the tree
    ///
    /// Each directory's children are stored contiguously, sorted by ordinal name comparison,
    /// and `entries_index`/`entries_count` are set to match.
    pub(crate) fn ensure_all_entries(&mut self) {
        let mut order = vec![self.root];
        let mut stack = vec![self.root];

        while let Some(dir) = stack.pop() {
            let Some(d) = self.entries[dir.0].as_directory() else {
                continue;
            };
            let mut children = d
                .directories
                .iter()
                .chain(d.files.iter())
                .copied()
                .collect::<Vec<_>>();
            children.sort_by(|a, b| self.entries[a.0].name.cmp(&self.entries[b.0].name));

            let index = order.len() as u32;
            let count = children.len() as u32;
            if let Some(d) = self.entries[dir.0].as_directory_mut() {
                d.entries_index = index;
                d.entries_count = count;
            }

            for child in children {
                order.push(child);
                if self.entries[child.0].is_directory() {
                    stack.push(child);
                }
            }
        }

        self.header.entry_count = order.len() as u32;
        self.order = order;
    }

    /// Build the deduplicated name blob, padded to 16 bytes, and record every name offset
    pub(crate) fn build_names(&mut self) -> Vec<u8> {
        let mut blob = Vec::new();
        let mut offsets: HashMap<String, u32> = HashMap::new();

        for id in &self.order {
            let entry = &mut self.entries[id.0];
            let offset = *offsets.entry(entry.name.clone()).or_insert_with(|| {
                let offset = blob.len() as u32;
                blob.extend_from_slice(entry.name.as_bytes());
                blob.push(0);
                offset
            });
            entry.name_offset = offset;
        }

        blob.resize(blob.len().next_multiple_of(16), 0);
        self.header.names_length = blob.len() as u32;
        blob
    }

    /// Encode the entry table in positional order
    pub(crate) fn encode_entries(&self) -> Result<Vec<u8>> {
        let mut table = Vec::with_capacity(self.order.len() * EntryRecord::SIZE);
        for (_, entry) in self.entries() {
            table.extend_from_slice(&entry.to_record(entry.name_offset)?.to_bytes()?);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::RpfContainer;
    use crate::entry::{BinaryFileEntry, DirectoryEntry, Entry, EntryKind};
    use crate::error::{Error, FormatError, Result};
    use crate::types::{EncryptionMode, EntryRecord, RpfHeader};

    fn file(name: &str, offset: u32) -> Entry {
        Entry::new(
            name,
            EntryKind::BinaryFile(BinaryFileEntry {
                file_offset: offset,
                file_uncompressed_size: 10,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn link_records() -> Result<()> {
        let records = vec![
            (
                EntryRecord::Directory {
                    name_offset: 0,
                    entries_index: 1,
                    entries_count: 2,
                },
                String::new(),
            ),
            (
                EntryRecord::Directory {
                    name_offset: 0,
                    entries_index: 3,
                    entries_count: 1,
                },
                "Data".to_owned(),
            ),
            (
                EntryRecord::BinaryFile {
                    name_offset: 0,
                    file_size: 0,
                    file_offset: 1,
                    uncompressed_size: 5,
                    encryption_type: 0,
                },
                "a.txt".to_owned(),
            ),
            (
                EntryRecord::BinaryFile {
                    name_offset: 0,
                    file_size: 0,
                    file_offset: 2,
                    uncompressed_size: 5,
                    encryption_type: 0,
                },
                "B.txt".to_owned(),
            ),
        ];

        let container = RpfContainer::from_records(
            "Test.rpf",
            "Test.rpf",
            0,
            2048,
            RpfHeader::default(),
            records,
        )?;

        let paths = container
            .entries()
            .map(|(_, e)| e.path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec!["test.rpf", "test.rpf/data", "test.rpf/a.txt", "test.rpf/data/b.txt"]
        );
        assert!(container.find_entry("DATA/b.TXT").is_some());
        assert!(container.find_entry("data/c.txt").is_none());

        Ok(())
    }

    #[test]
    fn reject_bad_ranges() {
        let records = vec![(
            EntryRecord::Directory {
                name_offset: 0,
                entries_index: 1,
                entries_count: 4,
            },
            String::new(),
        )];

        assert!(matches!(
            RpfContainer::from_records("a", "a", 0, 0, RpfHeader::default(), records),
            Err(Error::Format(FormatError::BadDirectoryRange { count: 4, .. }))
        ));
    }

    #[test]
    fn reject_cycles() {
        let records = vec![(
            EntryRecord::Directory {
                name_offset: 0,
                entries_index: 0,
                entries_count: 1,
            },
            String::new(),
        )];

        assert!(matches!(
            RpfContainer::from_records("a", "a", 0, 0, RpfHeader::default(), records),
            Err(Error::Format(FormatError::SharedEntry(0)))
        ));
    }

    #[test]
    fn entries_are_sorted_ordinally() -> Result<()> {
        let mut container = RpfContainer::empty("a.rpf", "a.rpf", 0, EncryptionMode::None);
        let root = container.root();

        container.attach(root, file("a.txt", 1))?;
        let dir = container.attach(root, Entry::new("Z", EntryKind::Directory(DirectoryEntry::default())))?;
        container.attach(root, file("B.txt", 2))?;
        container.attach(dir, file("inner", 3))?;
        container.ensure_all_entries();

        let names = container
            .entries()
            .map(|(_, e)| e.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["", "B.txt", "Z", "a.txt", "inner"]);

        let root_dir = container.entry(root).and_then(|e| e.as_directory()).cloned();
        assert_eq!(root_dir.map(|d| (d.entries_index, d.entries_count)), Some((1, 3)));
        assert_eq!(container.header.entry_count, 5);

        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() -> Result<()> {
        let mut container = RpfContainer::empty("a.rpf", "a.rpf", 0, EncryptionMode::None);
        let root = container.root();
        container.attach(root, file("same.txt", 1))?;

        assert!(matches!(
            container.attach(root, file("SAME.txt", 2)),
            Err(Error::EntryExists(_))
        ));

        Ok(())
    }

    #[test]
    fn names_are_deduplicated() -> Result<()> {
        let mut container = RpfContainer::empty("a.rpf", "a.rpf", 0, EncryptionMode::None);
        let root = container.root();
        let a = container.attach(root, Entry::new("a", EntryKind::Directory(DirectoryEntry::default())))?;
        let b = container.attach(root, Entry::new("b", EntryKind::Directory(DirectoryEntry::default())))?;
        container.attach(a, file("x.txt", 1))?;
        container.attach(b, file("x.txt", 2))?;
        container.ensure_all_entries();

        let blob = container.build_names();
        assert_eq!(blob.len() % 16, 0);
        assert_eq!(&blob[..11], b"\0a\0b\0x.txt\0");

        let offsets = container
            .file_entries()
            .map(|(_, e)| e.name_offset)
            .collect::<Vec<_>>();
        assert_eq!(offsets, vec![5, 5]);

        Ok(())
    }
}
