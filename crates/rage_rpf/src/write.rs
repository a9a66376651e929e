//! Types for editing RPF7 archives in place
//!
//! Every edit keeps the archive valid on disk: data that is in the way of a growing header or
//! file is moved to a free gap (or to the end), and the header is rewritten after each change.
//! Growing a nested archive grows the file that holds it in the parent, all the way up.

use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;

use binrw::BinWrite;
use rage_rsc::compression::deflate;
use rage_rsc::frame::ResourceFrame;
use tracing::{debug, instrument, trace};

use crate::container::{ContainerId, RpfContainer};
use crate::crypto::encrypt;
use crate::entry::{BinaryFileEntry, DirectoryEntry, Entry, EntryId, EntryKind, ResourceFileEntry};
use crate::error::{ConsistencyError, Error, FormatError, Result};
use crate::read::{entry_encryption, RpfArchive, RpfOptions};
use crate::types::{block_count, scatter_size, EncryptionMode, EntryRecord, RpfHeader, BLOCK_SIZE};

/// Relocations are copied in chunks of this many bytes
const COPY_CHUNK: usize = 16 * 1024;

const ZEROES: [u8; BLOCK_SIZE as usize] = [0; BLOCK_SIZE as usize];

/// Extension of files that are stored without compression
const AUDIO_EXTENSION: &str = ".awc";

/// Extension of resources that are stored encrypted
const SCRIPT_EXTENSION: &str = ".ysc";

/// Live file entries holding at least one block, sorted by first block
fn occupied_extents(container: &RpfContainer) -> Vec<(EntryId, Range<u64>)> {
    let mut extents = container
        .file_entries()
        .filter_map(|(id, entry)| {
            let start = entry.file_offset()? as u64;
            let blocks = entry.block_count();
            (blocks > 0).then_some((id, start..start + blocks))
        })
        .collect::<Vec<_>>();
    extents.sort_by_key(|(_, range)| range.start);
    extents
}

/// Check that `block` fits in the offset field of a file record
fn check_offset(block: u64) -> Result<u32> {
    u32::try_from(block)
        .ok()
        .filter(|block| *block <= EntryRecord::MAX_FILE_OFFSET)
        .ok_or_else(|| {
            FormatError::FieldOverflow {
                field: "file offset",
                value: block,
            }
            .into()
        })
}

fn to_u32(field: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| FormatError::FieldOverflow { field, value }.into())
}

/// Write `count` zero bytes at the current position
fn write_zeroes<W: Write>(writer: &mut W, count: u64) -> Result<()> {
    let mut remaining = count;
    while remaining > 0 {
        let step = remaining.min(ZEROES.len() as u64) as usize;
        writer.write_all(&ZEROES[..step])?;
        remaining -= step as u64;
    }
    Ok(())
}

/// Fill as much of `buffer` as the stream has left, returning the byte count
fn read_up_to<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(count) => filled += count,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Copy `length` bytes from `from` to `to` and zero-pad the destination to `padded` bytes
///
/// Bytes missing from the end of the stream are copied as zeroes.
fn copy_range<S: Read + Write + Seek>(
    stream: &mut S,
    from: u64,
    to: u64,
    length: u64,
    padded: u64,
) -> Result<()> {
    let mut buffer = vec![0u8; COPY_CHUNK];
    let mut done = 0;

    while done < length {
        let step = (length - done).min(COPY_CHUNK as u64) as usize;
        stream.seek(SeekFrom::Start(from + done))?;
        let read = read_up_to(stream, &mut buffer[..step])?;
        buffer[read..step].fill(0);

        stream.seek(SeekFrom::Start(to + done))?;
        stream.write_all(&buffer[..step])?;
        done += step as u64;
    }

    write_zeroes(stream, padded.saturating_sub(length))
}

/// Whether `entry` holding `data` is an archive to open
fn is_nested_archive(entry: &Entry, data: &[u8]) -> bool {
    entry.is_archive() && data.starts_with(&RpfHeader::MAGIC.to_le_bytes())
}

/// Choose the entry kind for new file data and the bytes to store
///
/// - RSC7 framed data becomes a resource with the page tables of its frame.
/// - Archives (with an RPF7 header) and audio banks are stored as they are.
/// - Everything else is DEFLATE compressed.
fn prepare_file(name_lower: &str, data: &[u8]) -> Result<(EntryKind, Vec<u8>)> {
    let length = to_u32("file size", data.len() as u64)?;

    if ResourceFrame::is_framed(data) {
        let frame = ResourceFrame::parse(data)?;
        let mut stored = data.to_vec();
        if length >= EntryRecord::SIZE_SENTINEL {
            scatter_size(&mut stored, length);
        }

        let resource = ResourceFileEntry {
            file_offset: 0,
            file_size: length,
            system_flags: frame.system_flags,
            graphics_flags: frame.graphics_flags,
            is_encrypted: name_lower.ends_with(SCRIPT_EXTENSION),
        };
        return Ok((EntryKind::ResourceFile(resource), stored));
    }

    let is_archive =
        name_lower.ends_with(".rpf") && data.starts_with(&RpfHeader::MAGIC.to_le_bytes());
    if is_archive || name_lower.ends_with(AUDIO_EXTENSION) {
        let binary = BinaryFileEntry {
            file_size: 0,
            file_uncompressed_size: length,
            ..Default::default()
        };
        return Ok((EntryKind::BinaryFile(binary), data.to_vec()));
    }

    let compressed = deflate(data)?;
    let binary = BinaryFileEntry {
        file_size: to_u32("file size", compressed.len() as u64)?,
        file_uncompressed_size: length,
        ..Default::default()
    };
    Ok((EntryKind::BinaryFile(binary), compressed))
}

impl<S: Read + Write + Seek> RpfArchive<S> {
    /// Write an empty archive to the start of `stream`
    ///
    /// The archive holds a root directory and takes a single block.
    #[instrument(skip(stream, options), err)]
    pub fn create_new(
        stream: S,
        name: &str,
        encryption: EncryptionMode,
        options: RpfOptions,
    ) -> Result<Self> {
        let mut archive = Self {
            stream,
            containers: vec![RpfContainer::empty(name, name, 0, encryption)],
            options,
        };
        archive.write_header(ContainerId::ROOT)?;
        Ok(archive)
    }

    /// Smallest free gap of at least `required` blocks, skipping gaps that touch `protect`
    ///
    /// The header counts as occupied. Returns the first block of the gap.
    pub fn find_hole(
        &self,
        id: ContainerId,
        required: u64,
        protect: Range<u64>,
    ) -> Result<Option<u64>> {
        let container = self.container(id)?;

        let mut occupied = vec![0..container.header_blocks()];
        occupied.extend(occupied_extents(container).into_iter().map(|(_, range)| range));
        occupied.sort_by_key(|range| range.start);

        let mut best: Option<Range<u64>> = None;
        let mut cursor = 0;
        for range in occupied {
            if range.start > cursor {
                let gap = cursor..range.start;
                let touches = gap.start < protect.end && gap.end > protect.start;
                let fits = gap.end - gap.start >= required;
                let smaller = best
                    .as_ref()
                    .map_or(true, |b| gap.end - gap.start < b.end - b.start);
                if !touches && fits && smaller {
                    best = Some(gap);
                }
            }
            cursor = cursor.max(range.end);
        }

        Ok(best.map(|gap| gap.start))
    }

    /// First block after every file and the header
    pub fn find_end_block(&self, id: ContainerId) -> Result<u64> {
        let container = self.container(id)?;
        Ok(occupied_extents(container)
            .into_iter()
            .map(|(_, range)| range.end)
            .fold(container.header_blocks(), u64::max))
    }

    /// Grow a container to `new_size` bytes, never shrinks
    ///
    /// A nested container grows the file that holds it, which may move the parent's files and
    /// grow the parent in turn. The top-level container extends the physical stream.
    #[instrument(skip(self), err)]
    pub fn grow_archive(&mut self, id: ContainerId, new_size: u64) -> Result<()> {
        let container = self.container(id)?;
        if new_size <= container.file_size {
            return Ok(());
        }
        debug!(from = container.file_size, to = new_size, "growing {}", container.path);

        let parent = container.parent;
        match parent {
            Some((parent, origin)) => {
                let size = to_u32("archive size", new_size)?;
                let entry = self.container_mut(parent)?.entry_mut(origin)?;
                if let EntryKind::BinaryFile(file) = &mut entry.kind {
                    file.file_size = 0;
                    file.file_uncompressed_size = size;
                }

                self.container_mut(id)?.file_size = new_size;
                self.ensure_space(parent, Some(origin), new_size)?;
            }
            None => {
                let length = self.stream.seek(SeekFrom::End(0))?;
                if length < new_size {
                    self.stream.seek(SeekFrom::Start(new_size - 1))?;
                    self.stream.write_all(&[0])?;
                }
                self.container_mut(id)?.file_size = new_size;
            }
        }

        Ok(())
    }

    /// Move a file's data to `new_block`
    ///
    /// The source and destination ranges must not overlap; nothing is touched when they do.
    /// Nested archives stored in the file follow it.
    #[instrument(skip(self), err)]
    pub fn relocate_file(&mut self, id: ContainerId, entry: EntryId, new_block: u64) -> Result<()> {
        let container = self.container(id)?;
        let file = container.get(entry)?;
        let old_block = file
            .file_offset()
            .ok_or_else(|| Error::NotAFile(file.path.clone()))? as u64;
        let blocks = file.block_count();

        if old_block < new_block + blocks && new_block < old_block + blocks {
            return Err(ConsistencyError::OverlappingRelocation {
                from: old_block,
                to: new_block,
                blocks,
            }
            .into());
        }
        let offset = check_offset(new_block)?;

        let start_pos = container.start_pos;
        let length = file.effective_size().unwrap_or(0);
        debug!(from = old_block, to = new_block, blocks, "relocating {}", file.path);

        copy_range(
            &mut self.stream,
            start_pos + old_block * BLOCK_SIZE,
            start_pos + new_block * BLOCK_SIZE,
            length,
            blocks * BLOCK_SIZE,
        )?;
        self.container_mut(id)?
            .entry_mut(entry)?
            .set_file_offset(offset);

        if let Some(child) = self.child_for(id, entry) {
            self.move_container(child, start_pos + new_block * BLOCK_SIZE);
        }
        Ok(())
    }

    /// Point a nested container and everything below it at a new start
    fn move_container(&mut self, id: ContainerId, new_start: u64) {
        let old_start = self.containers[id.0].start_pos;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let container = &mut self.containers[next.0];
            container.start_pos = container.start_pos - old_start + new_start;
            stack.extend(container.children.iter().copied());
        }
    }

    /// Clear the block range `target` (or the header) needs for `bytes`, growing if needed
    fn make_room(&mut self, id: ContainerId, target: Option<EntryId>, bytes: u64) -> Result<()> {
        let start = match target {
            Some(entry) => self.container(id)?.get(entry)?.file_offset().unwrap_or(0) as u64,
            None => 0,
        };
        let range = start..start + block_count(bytes);

        loop {
            let victim = occupied_extents(self.container(id)?)
                .into_iter()
                .find(|(entry, extent)| {
                    Some(*entry) != target && extent.start < range.end && extent.end > range.start
                });
            let Some((victim, extent)) = victim else {
                break;
            };

            let blocks = extent.end - extent.start;
            let destination = match self.find_hole(id, blocks, range.clone())? {
                Some(block) => block,
                None => {
                    let block = self.find_end_block(id)?.max(range.end);
                    self.grow_archive(id, (block + blocks) * BLOCK_SIZE)?;
                    block
                }
            };
            self.relocate_file(id, victim, destination)?;
        }

        let end = self.find_end_block(id)?.max(range.end);
        self.grow_archive(id, end * BLOCK_SIZE)
    }

    /// Make sure `bytes` fit at `target` (or at the header), then rewrite the header
    #[instrument(skip(self), err)]
    pub fn ensure_space(
        &mut self,
        id: ContainerId,
        target: Option<EntryId>,
        bytes: u64,
    ) -> Result<()> {
        self.make_room(id, target, bytes)?;
        self.write_header(id)
    }

    /// Rebuild the name blob and entry table and write them at the container's start
    ///
    /// Files in the way of a grown header are moved first. The table and names are encrypted
    /// with the container's mode.
    #[instrument(skip(self), err)]
    pub fn write_header(&mut self, id: ContainerId) -> Result<()> {
        let mut names = self.container_mut(id)?.build_names();
        let table_length = self.container(id)?.header.table_length();
        self.make_room(id, None, table_length)?;

        let container = self.container(id)?;
        let mut table = container.encode_entries()?;
        let header = container.header;
        let start_pos = container.start_pos;
        let name = container.name.clone();
        let key_length = container.file_size as u32;

        let crypto = &*self.options.crypto;
        encrypt(crypto, header.encryption, &mut table, &name, key_length)?;
        encrypt(crypto, header.encryption, &mut names, &name, key_length)?;

        self.stream.seek(SeekFrom::Start(start_pos))?;
        header.write(&mut self.stream)?;
        self.stream.write_all(&table)?;
        self.stream.write_all(&names)?;
        write_zeroes(
            &mut self.stream,
            header.block_count() * BLOCK_SIZE - header.table_length(),
        )?;

        trace!(entries = header.entry_count, names = header.names_length, "wrote header of {name}");
        Ok(())
    }

    /// Give a new file space, link it under `dir` and rewrite the header
    ///
    /// The caller writes the data at the entry's final offset afterwards.
    pub fn insert_file_space(
        &mut self,
        id: ContainerId,
        dir: EntryId,
        mut entry: Entry,
    ) -> Result<EntryId> {
        self.check_new_name(id, dir, &entry.name)?;

        let blocks = entry.block_count();
        let block = match self.find_hole(id, blocks, 0..0)? {
            Some(block) => block,
            None => {
                let block = self.find_end_block(id)?;
                self.grow_archive(id, (block + blocks) * BLOCK_SIZE)?;
                block
            }
        };
        let offset = check_offset(block)?;
        entry.set_file_offset(offset);

        let container = self.container_mut(id)?;
        let new = container.attach(dir, entry)?;
        container.ensure_all_entries();
        self.write_header(id)?;
        Ok(new)
    }

    fn check_new_name(&self, id: ContainerId, dir: EntryId, name: &str) -> Result<()> {
        let container = self.container(id)?;
        let dir_entry = container.get(dir)?;
        if !dir_entry.is_directory() {
            return Err(Error::NotADirectory(dir_entry.path.clone()));
        }
        if container.find_child(dir, name).is_some() {
            return Err(Error::EntryExists(name.to_owned()));
        }
        Ok(())
    }

    /// Write stored data at an entry's offset and zero-pad it to whole blocks
    fn write_entry_data(&mut self, id: ContainerId, entry: EntryId, data: &[u8]) -> Result<()> {
        let container = self.container(id)?;
        let offset = container.get(entry)?.file_offset().unwrap_or(0) as u64;
        let position = container.start_pos + offset * BLOCK_SIZE;
        let length = data.len() as u64;

        self.stream.seek(SeekFrom::Start(position))?;
        self.stream.write_all(data)?;
        write_zeroes(&mut self.stream, block_count(length) * BLOCK_SIZE - length)
    }

    /// Encrypt stored data the way an entry marked as encrypted expects it
    fn encrypt_stored(&self, id: ContainerId, entry: &Entry, stored: &mut [u8]) -> Result<()> {
        if !entry.is_encrypted() {
            return Ok(());
        }
        let mode = entry_encryption(self.container(id)?);
        let body = match entry.kind {
            EntryKind::ResourceFile(_) => stored.get_mut(ResourceFrame::SIZE..).unwrap_or_default(),
            _ => stored,
        };
        encrypt(&*self.options.crypto, mode, body, &entry.name, entry.ng_length())
    }

    /// Create a directory named `name` under `dir`
    #[instrument(skip(self), err)]
    pub fn create_directory(&mut self, id: ContainerId, dir: EntryId, name: &str) -> Result<EntryId> {
        let entry = Entry::new(name, EntryKind::Directory(DirectoryEntry::default()));
        let container = self.container_mut(id)?;
        let new = container.attach(dir, entry)?;
        container.ensure_all_entries();
        self.write_header(id)?;
        Ok(new)
    }

    /// Create a file named `name` under `dir` holding `data`
    ///
    /// See the module docs of [`crate`] for how the entry kind is chosen. A nested archive is
    /// opened and scanned once written; if that fails the file stays and the failure is
    /// recorded as the container's last error.
    #[instrument(skip(self, data), fields(size = data.len()), err)]
    pub fn create_file(
        &mut self,
        id: ContainerId,
        dir: EntryId,
        name: &str,
        data: &[u8],
    ) -> Result<EntryId> {
        self.check_new_name(id, dir, name)?;

        let entry = Entry::new(name, EntryKind::Directory(DirectoryEntry::default()));
        let (kind, mut stored) = prepare_file(&entry.name_lower, data)?;
        let entry = Entry { kind, ..entry };
        self.encrypt_stored(id, &entry, &mut stored)?;

        let nests = is_nested_archive(&entry, data);
        let new = self.insert_file_space(id, dir, entry)?;
        self.write_entry_data(id, new, &stored)?;

        if nests {
            self.attach_nested(id, new);
        }
        Ok(new)
    }

    /// Replace the data of an existing file, keeping its offset when there is room
    #[instrument(skip(self, data), fields(size = data.len()), err)]
    pub fn replace_file(&mut self, id: ContainerId, entry: EntryId, data: &[u8]) -> Result<()> {
        let current = self.container(id)?.get(entry)?;
        let offset = current
            .file_offset()
            .ok_or_else(|| Error::NotAFile(current.path.clone()))?;

        let (kind, mut stored) = prepare_file(&current.name_lower, data)?;
        let mut replacement = Entry {
            kind,
            ..current.clone()
        };
        replacement.set_file_offset(offset);
        self.encrypt_stored(id, &replacement, &mut stored)?;

        if let Some(child) = self.child_for(id, entry) {
            self.container_mut(id)?.children.retain(|c| *c != child);
        }

        let nests = is_nested_archive(&replacement, data);
        let stored_size = stored.len() as u64;
        *self.container_mut(id)?.entry_mut(entry)? = replacement;
        self.ensure_space(id, Some(entry), stored_size)?;
        self.write_entry_data(id, entry, &stored)?;

        if nests {
            self.attach_nested(id, entry);
        }
        Ok(())
    }

    /// Delete an entry and everything below it
    #[instrument(skip(self), err)]
    pub fn delete_entry(&mut self, id: ContainerId, entry: EntryId) -> Result<()> {
        let container = self.container(id)?;
        container.get(entry)?;
        let removed = container.subtree(entry);
        let orphaned = removed
            .iter()
            .filter_map(|e| self.child_for(id, *e))
            .collect::<Vec<_>>();

        let container = self.container_mut(id)?;
        container.detach(entry)?;
        container.children.retain(|c| !orphaned.contains(c));
        container.ensure_all_entries();
        self.write_header(id)
    }

    /// Rename an entry, its subtree's paths follow
    ///
    /// A renamed nested archive has its own header rewritten, since an NG key depends on the
    /// archive's name.
    #[instrument(skip(self), err)]
    pub fn rename_entry(&mut self, id: ContainerId, entry: EntryId, new_name: &str) -> Result<()> {
        let container = self.container(id)?;
        let parent = container.get(entry)?.parent.ok_or(Error::RootEntry)?;
        if let Some(existing) = container.find_child(parent, new_name) {
            if existing != entry {
                return Err(Error::EntryExists(new_name.to_owned()));
            }
        }

        let container = self.container_mut(id)?;
        container.entry_mut(entry)?.set_name(new_name);
        container.update_paths(entry);
        container.ensure_all_entries();
        self.write_header(id)?;

        let renamed = self.child_for(id, entry);
        self.refresh_child_paths(id);
        if let Some(child) = renamed {
            self.write_header(child)?;
        }
        Ok(())
    }

    /// Copy names and paths from origin entries to the nested containers below `id`
    fn refresh_child_paths(&mut self, id: ContainerId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let children = self.containers[next.0].children.clone();
            for child in children {
                if let Some((parent, origin)) = self.containers[child.0].parent {
                    let origin = &self.containers[parent.0].entries[origin.0];
                    let (name, path) = (origin.name.clone(), origin.path.clone());

                    let container = &mut self.containers[child.0];
                    container.name = name;
                    container.path = path;
                    let root = container.root;
                    container.update_paths(root);
                }
                stack.push(child);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::container::ContainerId;
    use crate::entry::EntryKind;
    use crate::error::{ConsistencyError, Error, FormatError, Result};
    use crate::read::{RpfArchive, RpfOptions};
    use crate::types::EncryptionMode;

    fn empty() -> Result<RpfArchive<Cursor<Vec<u8>>>> {
        RpfArchive::create_new(
            Cursor::new(Vec::new()),
            "test.rpf",
            EncryptionMode::Open,
            RpfOptions::default(),
        )
    }

    fn extents(rpf: &RpfArchive<Cursor<Vec<u8>>>, id: ContainerId) -> Vec<(u64, u64)> {
        let mut extents = rpf
            .container(id)
            .unwrap()
            .file_entries()
            .filter(|(_, e)| e.block_count() > 0)
            .map(|(_, e)| (e.file_offset().unwrap() as u64, e.block_count()))
            .collect::<Vec<_>>();
        extents.sort();
        extents
    }

    #[traced_test]
    #[test]
    fn create_empty_archive() -> Result<()> {
        let rpf = empty()?;
        let data = rpf.get_ref().get_ref();

        #[rustfmt::skip]
        let expected = vec![
            0x37, 0x46, 0x50, 0x52,
            0x01, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            0x4F, 0x50, 0x45, 0x4E,
            0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x7F,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(data.len(), 512);
        assert_eq!(&data[..32], &expected[..]);
        assert!(data[32..].iter().all(|b| *b == 0));
        assert_eq!(rpf.root().file_size(), 512);

        Ok(())
    }

    #[traced_test]
    #[test]
    fn find_hole_prefers_smallest_gap() -> Result<()> {
        let mut rpf = empty()?;
        let root = rpf.root().root();
        let a = rpf.create_file(ContainerId::ROOT, root, "a.awc", &[1; 512 * 3])?;
        let b = rpf.create_file(ContainerId::ROOT, root, "b.awc", &[2; 512])?;
        let c = rpf.create_file(ContainerId::ROOT, root, "c.awc", &[3; 512 * 2])?;
        rpf.create_file(ContainerId::ROOT, root, "d.awc", &[4; 512])?;
        rpf.delete_entry(ContainerId::ROOT, a)?;
        rpf.delete_entry(ContainerId::ROOT, c)?;

        let b_start = rpf.root().entry(b).and_then(|e| e.file_offset()).unwrap_or(0) as u64;
        let hole = rpf.find_hole(ContainerId::ROOT, 1, 0..0)?;
        assert_eq!(hole, Some(b_start + 1));

        let hole = rpf.find_hole(ContainerId::ROOT, 3, 0..0)?;
        assert_eq!(hole, Some(1));

        let hole = rpf.find_hole(ContainerId::ROOT, 1, 0..2)?;
        assert_eq!(hole, Some(b_start + 1));
        assert_eq!(rpf.find_hole(ContainerId::ROOT, 4, 0..0)?, None);

        Ok(())
    }

    #[traced_test]
    #[test]
    fn relocate_moves_data() -> Result<()> {
        let mut rpf = empty()?;
        let root = rpf.root().root();
        let payload = (0..700u32).map(|i| i as u8).collect::<Vec<_>>();
        let file = rpf.create_file(ContainerId::ROOT, root, "a.txt", &payload)?;

        let end = rpf.find_end_block(ContainerId::ROOT)?;
        rpf.grow_archive(ContainerId::ROOT, (end + 2) * 512)?;
        rpf.relocate_file(ContainerId::ROOT, file, end)?;
        rpf.write_header(ContainerId::ROOT)?;

        assert_eq!(rpf.try_extract(ContainerId::ROOT, file)?, payload);
        Ok(())
    }

    #[traced_test]
    #[test]
    fn overlapping_relocation_is_rejected() -> Result<()> {
        let mut rpf = empty()?;
        let root = rpf.root().root();
        let file = rpf.create_file(ContainerId::ROOT, root, "a.awc", &[9; 1500])?;
        let before = rpf.get_ref().get_ref().clone();
        let start = rpf.root().entry(file).and_then(|e| e.file_offset()).unwrap_or(0) as u64;

        let result = rpf.relocate_file(ContainerId::ROOT, file, start + 1);
        assert!(matches!(
            result,
            Err(Error::Consistency(ConsistencyError::OverlappingRelocation { blocks: 3, .. }))
        ));
        assert_eq!(rpf.get_ref().get_ref(), &before);

        Ok(())
    }

    #[traced_test]
    #[test]
    fn relocation_past_offset_field_is_rejected() -> Result<()> {
        let mut rpf = empty()?;
        let root = rpf.root().root();
        let file = rpf.create_file(ContainerId::ROOT, root, "a.awc", &[7; 600])?;
        let before = rpf.get_ref().get_ref().clone();

        let result = rpf.relocate_file(ContainerId::ROOT, file, 0x80_0000);
        assert!(matches!(
            result,
            Err(Error::Format(FormatError::FieldOverflow { field: "file offset", .. }))
        ));
        assert_eq!(rpf.get_ref().get_ref(), &before);
        assert_eq!(rpf.try_extract(ContainerId::ROOT, file)?, vec![7; 600]);

        Ok(())
    }

    #[traced_test]
    #[test]
    fn growing_file_moves_neighbours() -> Result<()> {
        let mut rpf = empty()?;
        let root = rpf.root().root();
        let a = rpf.create_file(ContainerId::ROOT, root, "a.awc", &[1; 100])?;
        let b = rpf.create_file(ContainerId::ROOT, root, "b.awc", &[2; 100])?;

        rpf.replace_file(ContainerId::ROOT, a, &[3; 2000])?;

        let extents = extents(&rpf, ContainerId::ROOT);
        for pair in extents.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }
        assert_eq!(rpf.try_extract(ContainerId::ROOT, a)?, vec![3; 2000]);
        assert_eq!(rpf.try_extract(ContainerId::ROOT, b)?, vec![2; 100]);
        assert_eq!(rpf.root().file_size(), rpf.get_ref().get_ref().len() as u64);

        Ok(())
    }

    #[traced_test]
    #[test]
    fn kinds_follow_content() -> Result<()> {
        let mut rpf = empty()?;
        let root = rpf.root().root();
        let text = rpf.create_file(ContainerId::ROOT, root, "a.txt", &[b'a'; 1000])?;
        let audio = rpf.create_file(ContainerId::ROOT, root, "b.awc", &[b'b'; 1000])?;
        let fake = rpf.create_file(ContainerId::ROOT, root, "c.rpf", &[b'c'; 1000])?;

        let container = rpf.root();
        let binary = |id| match container.entry(id).map(|e| &e.kind) {
            Some(EntryKind::BinaryFile(file)) => Some((file.file_size, file.file_uncompressed_size)),
            _ => None,
        };
        assert!(matches!(binary(text), Some((size, 1000)) if size > 0 && size < 1000));
        assert_eq!(binary(audio), Some((0, 1000)));
        assert!(matches!(binary(fake), Some((size, 1000)) if size > 0));
        assert!(container.children().is_empty());

        Ok(())
    }

    #[traced_test]
    #[test]
    fn create_existing_name_fails() -> Result<()> {
        let mut rpf = empty()?;
        let root = rpf.root().root();
        rpf.create_directory(ContainerId::ROOT, root, "Data")?;

        assert!(matches!(
            rpf.create_file(ContainerId::ROOT, root, "DATA", b"x"),
            Err(Error::EntryExists(_))
        ));
        assert!(matches!(
            rpf.create_directory(ContainerId::ROOT, root, "data"),
            Err(Error::EntryExists(_))
        ));
        Ok(())
    }

    #[traced_test]
    #[test]
    fn root_cannot_be_renamed_or_deleted() -> Result<()> {
        let mut rpf = empty()?;
        let root = rpf.root().root();

        assert!(matches!(rpf.delete_entry(ContainerId::ROOT, root), Err(Error::RootEntry)));
        assert!(matches!(
            rpf.rename_entry(ContainerId::ROOT, root, "x"),
            Err(Error::RootEntry)
        ));
        Ok(())
    }
}
