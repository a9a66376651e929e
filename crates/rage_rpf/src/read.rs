//! Types for reading RPF7 archives
//!

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use bon::Builder;
use rage_rsc::compression::inflate;
use rage_rsc::frame::ResourceFrame;
use tracing::{debug, instrument, warn};

use crate::container::{ContainerId, RpfContainer, ScanTotals};
use crate::crypto::{decrypt, CryptoProvider, NoCrypto};
use crate::entry::{read_name, Entry, EntryId, EntryKind};
use crate::error::{Error, FormatError, Result};
use crate::types::{scattered_size, EncryptionMode, EntryRecord, RpfHeader, BLOCK_SIZE};

/// Default limit on the path length of a nested archive for it to be opened
pub const DEFAULT_MAX_PATH_LENGTH: usize = 5000;

fn no_crypto() -> Arc<dyn CryptoProvider> {
    Arc::new(NoCrypto)
}

/// Options for how an archive is opened and edited
#[derive(Debug, Clone, Builder)]
pub struct RpfOptions {
    /// Decrypts and encrypts headers and entries
    #[builder(default = no_crypto())]
    pub crypto: Arc<dyn CryptoProvider>,

    /// Whether nested archives are opened while scanning
    #[builder(default = true)]
    pub scan_children: bool,

    /// Nested archives with a longer path are treated as plain files
    #[builder(default = DEFAULT_MAX_PATH_LENGTH)]
    pub max_path_length: usize,
}

impl Default for RpfOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// RPF7 archive, the physical stream and every container found in it
///
/// ```no_run
/// use std::fs::File;
/// use rage_rpf::{RpfArchive, RpfOptions};
///
/// fn list_rpf_contents(path: &str) -> rage_rpf::error::Result<()> {
///     let mut rpf = RpfArchive::new(File::open(path)?, "update.rpf", RpfOptions::default())?;
///
///     for id in rpf.containers() {
///         let files = rpf
///             .container(id)?
///             .file_entries()
///             .map(|(entry, file)| (entry, file.path.clone()))
///             .collect::<Vec<_>>();
///
///         for (entry, path) in files {
///             if let Some(data) = rpf.extract_file(id, entry) {
///                 println!("{path}: {} bytes", data.len());
///             }
///         }
///     }
///
///     Ok(())
/// }
/// ```
pub struct RpfArchive<S> {
    pub(crate) stream: S,
    pub(crate) containers: Vec<RpfContainer>,
    pub(crate) options: RpfOptions,
}

impl<S> RpfArchive<S> {
    /// Look a container up by handle
    pub fn container(&self, id: ContainerId) -> Result<&RpfContainer> {
        self.containers
            .get(id.0)
            .ok_or(Error::ContainerNotFound(id.0))
    }

    pub(crate) fn container_mut(&mut self, id: ContainerId) -> Result<&mut RpfContainer> {
        self.containers
            .get_mut(id.0)
            .ok_or(Error::ContainerNotFound(id.0))
    }

    /// The top-level container
    pub fn root(&self) -> &RpfContainer {
        &self.containers[ContainerId::ROOT.0]
    }

    /// Every attached container, parents before their children
    pub fn containers(&self) -> Vec<ContainerId> {
        let mut found = Vec::new();
        let mut stack = vec![ContainerId::ROOT];
        while let Some(id) = stack.pop() {
            found.push(id);
            if let Some(container) = self.containers.get(id.0) {
                stack.extend(container.children.iter().rev().copied());
            }
        }
        found
    }

    /// The nested container opened from `entry`, if there is one
    pub fn child_for(&self, id: ContainerId, entry: EntryId) -> Option<ContainerId> {
        self.containers.get(id.0)?.children.iter().copied().find(|child| {
            self.containers
                .get(child.0)
                .is_some_and(|c| c.parent == Some((id, entry)))
        })
    }

    /// Resolve a slash separated path from the top-level root, descending into nested archives
    pub fn find_entry(&self, path: &str) -> Option<(ContainerId, EntryId)> {
        let mut container = ContainerId::ROOT;
        let mut entry = self.root().root();

        for part in path.split(['/', '\\']).filter(|part| !part.is_empty()) {
            if let Some(child) = self.child_for(container, entry) {
                container = child;
                entry = self.containers[child.0].root();
            }
            entry = self.containers[container.0].find_child(entry, part)?;
        }

        Some((container, entry))
    }

    /// The options the archive was opened with
    pub fn options(&self) -> &RpfOptions {
        &self.options
    }

    /// Borrow the physical stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap and return the physical stream
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Extract a file through another handle on the same physical stream
    ///
    /// Lets several readers extract from one archive at once while nothing is being edited.
    pub fn extract_with<R: Read + Seek>(
        &self,
        reader: &mut R,
        container: ContainerId,
        entry: EntryId,
    ) -> Result<Vec<u8>> {
        let container = self.container(container)?;
        extract_entry(reader, &*self.options.crypto, container, container.get(entry)?)
    }
}

impl<S: Read + Seek> RpfArchive<S> {
    /// Open the archive at the start of `stream`, named `name`, and scan it
    #[instrument(skip(stream, options), err)]
    pub fn new(mut stream: S, name: &str, options: RpfOptions) -> Result<Self> {
        let file_size = stream.seek(SeekFrom::End(0))?;
        let container = read_container(&mut stream, &*options.crypto, name, name, 0, file_size)?;

        let mut archive = Self {
            stream,
            containers: vec![container],
            options,
        };
        archive.scan_structure(ContainerId::ROOT);
        Ok(archive)
    }

    /// Open nested archives below `id` and count its entries
    ///
    /// A nested archive that fails to open is logged, recorded as the container's last error and
    /// counted as a plain binary file. Its siblings are still scanned.
    pub fn scan_structure(&mut self, id: ContainerId) {
        let Some(container) = self.containers.get_mut(id.0) else {
            return;
        };
        container.children.clear();

        let mut totals = ScanTotals {
            archives: 1,
            ..Default::default()
        };
        let mut archives = Vec::new();

        for (entry_id, entry) in container.entries() {
            match &entry.kind {
                EntryKind::Directory(_) => totals.folders += 1,
                EntryKind::ResourceFile(_) => {
                    totals.resources += 1;
                    totals.files += 1;
                }
                EntryKind::BinaryFile(_)
                    if self.options.scan_children
                        && entry.is_archive()
                        && entry.path.len() < self.options.max_path_length =>
                {
                    archives.push(entry_id)
                }
                EntryKind::BinaryFile(_) => {
                    totals.binaries += 1;
                    totals.files += 1;
                }
            }
        }

        for entry in archives {
            match self.open_child(id, entry) {
                Ok(child) => {
                    self.scan_structure(child);
                    totals += self.containers[child.0].totals;
                }
                Err(e) => {
                    let path = self.containers[id.0].entries[entry.0].path.clone();
                    warn!("unable to open nested archive {path}: {e}");
                    self.containers[id.0].last_error = Some(format!("{path}: {e}"));
                    totals.binaries += 1;
                    totals.files += 1;
                }
            }
        }

        self.containers[id.0].totals = totals;
    }

    /// Open and scan a nested archive that was just written, a failure is only recorded
    pub(crate) fn attach_nested(&mut self, parent: ContainerId, entry: EntryId) {
        match self.open_child(parent, entry) {
            Ok(child) => self.scan_structure(child),
            Err(e) => {
                warn!("unable to open nested archive #{} of container #{}: {e}", entry.0, parent.0);
                if let Ok(c) = self.container_mut(parent) {
                    c.last_error = Some(e.to_string());
                }
            }
        }
    }

    /// Read the nested archive stored in `entry` and attach it below `parent`
    #[instrument(skip(self), err)]
    pub(crate) fn open_child(&mut self, parent: ContainerId, entry: EntryId) -> Result<ContainerId> {
        let container = self.container(parent)?;
        let origin = container.get(entry)?;
        let start_pos =
            container.start_pos + origin.file_offset().unwrap_or(0) as u64 * BLOCK_SIZE;
        let file_size = origin.effective_size().unwrap_or(0);
        let (name, path) = (origin.name.clone(), origin.path.clone());

        let mut child = read_container(
            &mut self.stream,
            &*self.options.crypto,
            &name,
            &path,
            start_pos,
            file_size,
        )?;
        child.parent = Some((parent, entry));

        let id = ContainerId(self.containers.len());
        debug!(?id, start_pos, file_size, "attached nested archive {path}");
        self.containers.push(child);
        self.containers[parent.0].children.push(id);
        Ok(id)
    }

    /// Extract a file, returning its decrypted and decompressed data
    pub fn try_extract(&mut self, container: ContainerId, entry: EntryId) -> Result<Vec<u8>> {
        let container = self
            .containers
            .get(container.0)
            .ok_or(Error::ContainerNotFound(container.0))?;
        extract_entry(
            &mut self.stream,
            &*self.options.crypto,
            container,
            container.get(entry)?,
        )
    }

    /// Extract a file, recording a failure as the container's last error
    pub fn extract_file(&mut self, container: ContainerId, entry: EntryId) -> Option<Vec<u8>> {
        match self.try_extract(container, entry) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("unable to extract entry #{} of container #{}: {e}", entry.0, container.0);
                if let Ok(c) = self.container_mut(container) {
                    c.last_error = Some(e.to_string());
                }
                None
            }
        }
    }
}

/// Read and decode one container's header at `start_pos`
#[instrument(skip(reader, crypto), err)]
pub(crate) fn read_container<R: Read + Seek>(
    reader: &mut R,
    crypto: &dyn CryptoProvider,
    name: &str,
    path: &str,
    start_pos: u64,
    file_size: u64,
) -> Result<RpfContainer> {
    reader.seek(SeekFrom::Start(start_pos))?;
    let header = RpfHeader::parse(reader)?;
    if header.table_length() > file_size {
        return Err(FormatError::TruncatedHeader {
            length: header.table_length(),
            available: file_size,
        }
        .into());
    }

    let mut table = vec![0u8; header.entry_count as usize * EntryRecord::SIZE];
    reader.read_exact(&mut table)?;
    let mut names = vec![0u8; header.names_length as usize];
    reader.read_exact(&mut names)?;

    decrypt(crypto, header.encryption, &mut table, name, file_size as u32)?;
    decrypt(crypto, header.encryption, &mut names, name, file_size as u32)?;

    let mut records = Vec::with_capacity(header.entry_count as usize);
    for chunk in table.chunks_exact(EntryRecord::SIZE) {
        let mut raw = [0u8; EntryRecord::SIZE];
        raw.copy_from_slice(chunk);

        let mut record = EntryRecord::parse(&raw)?;
        if let EntryRecord::ResourceFile {
            file_size,
            file_offset,
            ..
        } = &mut record
        {
            if *file_size == EntryRecord::SIZE_SENTINEL {
                *file_size = read_scattered_size(reader, start_pos, *file_offset)?;
            }
        }

        let name_offset = match record {
            EntryRecord::Directory { name_offset, .. }
            | EntryRecord::BinaryFile { name_offset, .. }
            | EntryRecord::ResourceFile { name_offset, .. } => name_offset,
        };
        records.push((record, read_name(&names, name_offset)?));
    }

    debug!(
        entries = header.entry_count,
        encryption = ?header.encryption,
        "read archive header"
    );
    RpfContainer::from_records(name, path, start_pos, file_size, header, records)
}

fn read_scattered_size<R: Read + Seek>(reader: &mut R, start_pos: u64, offset: u32) -> Result<u32> {
    let mut frame = [0u8; ResourceFrame::SIZE];
    reader.seek(SeekFrom::Start(start_pos + offset as u64 * BLOCK_SIZE))?;
    reader.read_exact(&mut frame)?;
    Ok(scattered_size(&frame))
}

/// The cipher an encrypted entry of `container` uses
pub(crate) fn entry_encryption(container: &RpfContainer) -> EncryptionMode {
    match container.encryption() {
        EncryptionMode::Aes => EncryptionMode::Aes,
        _ => EncryptionMode::Ng,
    }
}

fn read_exact_at<R: Read + Seek>(reader: &mut R, position: u64, length: u64) -> Result<Vec<u8>> {
    let mut data = vec![0u8; length as usize];
    reader.seek(SeekFrom::Start(position))?;
    reader.read_exact(&mut data)?;
    Ok(data)
}

/// Read, decrypt and decompress one file of `container`
pub(crate) fn extract_entry<R: Read + Seek>(
    reader: &mut R,
    crypto: &dyn CryptoProvider,
    container: &RpfContainer,
    entry: &Entry,
) -> Result<Vec<u8>> {
    let start = container.start_pos + entry.file_offset().unwrap_or(0) as u64 * BLOCK_SIZE;

    match &entry.kind {
        EntryKind::Directory(_) => Err(Error::NotAFile(entry.path.clone())),
        EntryKind::BinaryFile(file) => {
            let mut data = read_exact_at(reader, start, entry.effective_size().unwrap_or(0))?;
            if file.is_encrypted {
                let mode = entry_encryption(container);
                decrypt(crypto, mode, &mut data, &entry.name, entry.ng_length())?;
            }

            if file.file_size > 0 {
                Ok(inflate(&data)?)
            } else {
                Ok(data)
            }
        }
        EntryKind::ResourceFile(file) if file.file_size == 0 => {
            read_exact_at(reader, start, file.system_size() + file.graphics_size())
        }
        EntryKind::ResourceFile(file) => {
            let frame = ResourceFrame::SIZE as u64;
            let length = (file.file_size as u64).saturating_sub(frame);
            let mut data = read_exact_at(reader, start + frame, length)?;
            if file.is_encrypted {
                let mode = entry_encryption(container);
                decrypt(crypto, mode, &mut data, &entry.name, entry.ng_length())?;
            }

            match inflate(&data) {
                Ok(inflated) => Ok(inflated),
                Err(e) => {
                    warn!("{} is not compressed, returning raw data: {e}", entry.path);
                    Ok(data)
                }
            }
        }
    }
}
