//! Base types for the on-disk structure of an RPF7 archive.

use std::io::{Read, Seek};

use binrw::{BinRead, BinWrite};
use byteorder::{ByteOrder, LittleEndian};
use rage_rsc::flags::PageFlags;

use crate::error::{Error, FormatError, Result};

/// Size of one addressing block, every file offset and size in an archive is counted in these
pub const BLOCK_SIZE: u64 = 512;

/// Number of blocks needed to hold `bytes`
pub const fn block_count(bytes: u64) -> u64 {
    bytes.div_ceil(BLOCK_SIZE)
}

/// How the entry table and name blob of an archive are encrypted
///
/// File entries marked as encrypted use AES in an [`EncryptionMode::Aes`] archive and NG otherwise.
#[derive(BinRead, BinWrite, Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[brw(repr=u32)]
pub enum EncryptionMode {
    /// Stored as is
    #[default]
    None = 0,

    /// "OPEN", stored as is by modding tools
    Open = 0x4E45504F,

    /// AES-256 with a single global key
    Aes = 0x0FFFFFF9,

    /// Per-item keyed permutation, keyed by name and length
    Ng = 0x0FEFFFFF,
}

impl EncryptionMode {
    /// Whether data under this mode has to go through the crypto provider
    pub fn is_encrypted(self) -> bool {
        matches!(self, EncryptionMode::Aes | EncryptionMode::Ng)
    }
}

/// RPF7 archive header
///
/// Starts with "RPF7" (stored as `37 46 50 52`) and is followed by `entry_count` entry records
/// and `names_length` bytes of names. All data is stored in little endian format.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little, magic = 0x52504637u32)]
pub struct RpfHeader {
    /// Number of entry records, the root directory included
    pub entry_count: u32,

    /// Length of the name blob in bytes
    pub names_length: u32,

    /// Encryption applied to the entry table and the name blob
    pub encryption: EncryptionMode,
}

impl RpfHeader {
    /// Length of the header preamble in bytes
    pub const SIZE: u64 = 16;

    /// "RPF7" read as a little endian integer
    pub const MAGIC: u32 = 0x52504637;

    /// Read a header, reporting a wrong magic or encryption tag as a [`FormatError`]
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Self::read(reader).map_err(|e| match e.root_cause() {
            binrw::Error::BadMagic { .. } => FormatError::BadMagic.into(),
            binrw::Error::NoVariantMatch { .. } | binrw::Error::EnumErrors { .. } => {
                FormatError::UnknownEncryption.into()
            }
            _ => Error::from(e),
        })
    }

    /// Bytes covered by the preamble, the entry table and the name blob
    pub fn table_length(&self) -> u64 {
        Self::SIZE + self.entry_count as u64 * EntryRecord::SIZE as u64 + self.names_length as u64
    }

    /// Number of blocks reserved for the header
    pub fn block_count(&self) -> u64 {
        block_count(self.table_length())
    }
}

/// A single 16 byte entry record, discriminated by its second 32-bit word
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryRecord {
    /// `{name_offset:u32, 0x7FFFFF00, entries_index:u32, entries_count:u32}`
    Directory {
        name_offset: u32,
        entries_index: u32,
        entries_count: u32,
    },

    /// `{name_offset:16 | file_size:24 | file_offset:24, uncompressed_size:u32, encryption_type:u32}`
    BinaryFile {
        name_offset: u32,
        file_size: u32,
        file_offset: u32,
        uncompressed_size: u32,
        encryption_type: u32,
    },

    /// `{name_offset:u16, file_size:u24, file_offset:u24 | 0x800000, system_flags:u32, graphics_flags:u32}`
    ResourceFile {
        name_offset: u32,
        file_size: u32,
        file_offset: u32,
        system_flags: PageFlags,
        graphics_flags: PageFlags,
    },
}

fn check(field: &'static str, value: u32, max: u32) -> Result<()> {
    if value > max {
        return Err(FormatError::FieldOverflow {
            field,
            value: value as u64,
        }
        .into());
    }
    Ok(())
}

impl EntryRecord {
    /// Length of a record in bytes
    pub const SIZE: usize = 16;

    /// Second word of every directory record
    pub const DIRECTORY_IDENT: u32 = 0x7FFF_FF00;

    /// Resource size meaning "the real size is scattered through the resource frame"
    pub const SIZE_SENTINEL: u32 = 0xFF_FFFF;

    /// Largest offset a file record can store
    ///
    /// Bit 23 of the offset is the top bit of the second word, which marks a resource.
    pub const MAX_FILE_OFFSET: u32 = 0x7F_FFFF;

    /// Decode one record
    pub fn parse(raw: &[u8; Self::SIZE]) -> Result<Self> {
        let ident = LittleEndian::read_u32(&raw[4..8]);

        if ident == Self::DIRECTORY_IDENT {
            return Ok(EntryRecord::Directory {
                name_offset: LittleEndian::read_u32(&raw[0..4]),
                entries_index: LittleEndian::read_u32(&raw[8..12]),
                entries_count: LittleEndian::read_u32(&raw[12..16]),
            });
        }

        if ident & 0x8000_0000 == 0 {
            let packed = LittleEndian::read_u64(&raw[0..8]);
            let encryption_type = LittleEndian::read_u32(&raw[12..16]);
            if encryption_type > 1 {
                return Err(FormatError::BadEncryptionType(encryption_type).into());
            }

            return Ok(EntryRecord::BinaryFile {
                name_offset: (packed & 0xFFFF) as u32,
                file_size: ((packed >> 16) & 0xFF_FFFF) as u32,
                file_offset: ((packed >> 40) & 0xFF_FFFF) as u32,
                uncompressed_size: LittleEndian::read_u32(&raw[8..12]),
                encryption_type,
            });
        }

        Ok(EntryRecord::ResourceFile {
            name_offset: LittleEndian::read_u16(&raw[0..2]) as u32,
            file_size: LittleEndian::read_u24(&raw[2..5]),
            file_offset: LittleEndian::read_u24(&raw[5..8]) & Self::MAX_FILE_OFFSET,
            system_flags: PageFlags::from_value(LittleEndian::read_u32(&raw[8..12])),
            graphics_flags: PageFlags::from_value(LittleEndian::read_u32(&raw[12..16])),
        })
    }

    /// Encode one record, failing when a field does not fit its bit width
    pub fn to_bytes(&self) -> Result<[u8; Self::SIZE]> {
        let mut raw = [0u8; Self::SIZE];

        match *self {
            EntryRecord::Directory {
                name_offset,
                entries_index,
                entries_count,
            } => {
                LittleEndian::write_u32(&mut raw[0..4], name_offset);
                LittleEndian::write_u32(&mut raw[4..8], Self::DIRECTORY_IDENT);
                LittleEndian::write_u32(&mut raw[8..12], entries_index);
                LittleEndian::write_u32(&mut raw[12..16], entries_count);
            }
            EntryRecord::BinaryFile {
                name_offset,
                file_size,
                file_offset,
                uncompressed_size,
                encryption_type,
            } => {
                check("name offset", name_offset, 0xFFFF)?;
                check("file size", file_size, 0xFF_FFFF)?;
                check("file offset", file_offset, Self::MAX_FILE_OFFSET)?;

                let packed = name_offset as u64
                    | (file_size as u64) << 16
                    | (file_offset as u64) << 40;
                LittleEndian::write_u64(&mut raw[0..8], packed);
                LittleEndian::write_u32(&mut raw[8..12], uncompressed_size);
                LittleEndian::write_u32(&mut raw[12..16], encryption_type);
            }
            EntryRecord::ResourceFile {
                name_offset,
                file_size,
                file_offset,
                system_flags,
                graphics_flags,
            } => {
                check("name offset", name_offset, 0xFFFF)?;
                check("file size", file_size, Self::SIZE_SENTINEL)?;
                check("file offset", file_offset, Self::MAX_FILE_OFFSET)?;

                LittleEndian::write_u16(&mut raw[0..2], name_offset as u16);
                LittleEndian::write_u24(&mut raw[2..5], file_size);
                LittleEndian::write_u24(&mut raw[5..8], file_offset);
                raw[7] |= 0x80;
                LittleEndian::write_u32(&mut raw[8..12], system_flags.value());
                LittleEndian::write_u32(&mut raw[12..16], graphics_flags.value());
            }
        }

        Ok(raw)
    }
}

/// Recover a resource size stored in the 16 bytes at the start of its data
///
/// Used when the record holds [`EntryRecord::SIZE_SENTINEL`].
pub fn scattered_size(frame: &[u8; 16]) -> u32 {
    (frame[7] as u32) | (frame[14] as u32) << 8 | (frame[5] as u32) << 16 | (frame[2] as u32) << 24
}

/// Store a resource size in the bytes [`scattered_size`] reads it from
pub fn scatter_size(frame: &mut [u8], size: u32) {
    frame[7] = size as u8;
    frame[14] = (size >> 8) as u8;
    frame[5] = (size >> 16) as u8;
    frame[2] = (size >> 24) as u8;
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::BinWrite;
    use pretty_assertions::assert_eq;
    use rage_rsc::flags::PageFlags;

    use super::{scatter_size, scattered_size, EncryptionMode, EntryRecord, RpfHeader};
    use crate::error::{Error, FormatError, Result};

    #[test]
    fn read_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x37, 0x46, 0x50, 0x52,
            0x03, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x00, 0x00,
            0xFF, 0xFF, 0xEF, 0x0F,
        ]);

        let expected = RpfHeader {
            entry_count: 3,
            names_length: 0x20,
            encryption: EncryptionMode::Ng,
        };

        let header = RpfHeader::parse(&mut input)?;
        assert_eq!(header, expected);
        assert_eq!(header.table_length(), 16 + 48 + 32);
        assert_eq!(header.block_count(), 1);

        Ok(())
    }

    #[test]
    fn write_header() -> Result<()> {
        #[rustfmt::skip]
        let expected = vec![
            0x37, 0x46, 0x50, 0x52,
            0x01, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            0x4F, 0x50, 0x45, 0x4E,
        ];

        let header = RpfHeader {
            entry_count: 1,
            names_length: 0x10,
            encryption: EncryptionMode::Open,
        };

        let mut actual = Vec::new();
        header.write(&mut Cursor::new(&mut actual))?;
        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn reject_bad_magic() {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x52, 0x53, 0x43, 0x37,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ]);

        assert!(matches!(
            RpfHeader::parse(&mut input),
            Err(Error::Format(FormatError::BadMagic))
        ));
    }

    #[test]
    fn reject_unknown_encryption() {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x37, 0x46, 0x50, 0x52,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x12, 0x34, 0x56, 0x78,
        ]);

        assert!(matches!(
            RpfHeader::parse(&mut input),
            Err(Error::Format(FormatError::UnknownEncryption))
        ));
    }

    #[test]
    fn directory_record() -> Result<()> {
        #[rustfmt::skip]
        let raw = [
            0x04, 0x00, 0x00, 0x00,
            0x00, 0xFF, 0xFF, 0x7F,
            0x01, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
        ];

        let record = EntryRecord::parse(&raw)?;
        assert_eq!(
            record,
            EntryRecord::Directory {
                name_offset: 4,
                entries_index: 1,
                entries_count: 2,
            }
        );
        assert_eq!(record.to_bytes()?, raw);

        Ok(())
    }

    #[test]
    fn binary_record() -> Result<()> {
        #[rustfmt::skip]
        let raw = [
            0x10, 0x00, 0x23, 0x01,
            0x00, 0x45, 0x00, 0x00,
            0x00, 0x02, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
        ];

        let record = EntryRecord::parse(&raw)?;
        assert_eq!(
            record,
            EntryRecord::BinaryFile {
                name_offset: 0x10,
                file_size: 0x123,
                file_offset: 0x45,
                uncompressed_size: 0x200,
                encryption_type: 1,
            }
        );
        assert_eq!(record.to_bytes()?, raw);

        Ok(())
    }

    #[test]
    fn binary_record_bad_encryption_type() {
        #[rustfmt::skip]
        let raw = [
            0x10, 0x00, 0x23, 0x01,
            0x00, 0x45, 0x00, 0x00,
            0x00, 0x02, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
        ];

        assert!(matches!(
            EntryRecord::parse(&raw),
            Err(Error::Format(FormatError::BadEncryptionType(2)))
        ));
    }

    #[test]
    fn resource_record() -> Result<()> {
        #[rustfmt::skip]
        let raw = [
            0x20, 0x00,
            0x34, 0x12, 0x00,
            0x56, 0x00, 0x80,
            0x00, 0x00, 0x02, 0x20,
            0x00, 0x00, 0x02, 0xB0,
        ];

        let record = EntryRecord::parse(&raw)?;
        assert_eq!(
            record,
            EntryRecord::ResourceFile {
                name_offset: 0x20,
                file_size: 0x1234,
                file_offset: 0x56,
                system_flags: PageFlags::from_value(0x2002_0000),
                graphics_flags: PageFlags::from_value(0xB002_0000),
            }
        );
        assert_eq!(record.to_bytes()?, raw);

        Ok(())
    }

    #[test]
    fn record_field_overflow() {
        let record = EntryRecord::BinaryFile {
            name_offset: 0,
            file_size: 0x100_0000,
            file_offset: 0,
            uncompressed_size: 0,
            encryption_type: 0,
        };

        assert!(matches!(
            record.to_bytes(),
            Err(Error::Format(FormatError::FieldOverflow { field: "file size", .. }))
        ));
    }

    #[test]
    fn binary_offset_cannot_reach_resource_bit() -> Result<()> {
        let record = EntryRecord::BinaryFile {
            name_offset: 1,
            file_size: 0x10,
            file_offset: EntryRecord::MAX_FILE_OFFSET,
            uncompressed_size: 0x20,
            encryption_type: 0,
        };
        assert_eq!(EntryRecord::parse(&record.to_bytes()?)?, record);

        let record = EntryRecord::BinaryFile {
            name_offset: 1,
            file_size: 0x10,
            file_offset: 0x80_0000,
            uncompressed_size: 0x20,
            encryption_type: 0,
        };
        assert!(matches!(
            record.to_bytes(),
            Err(Error::Format(FormatError::FieldOverflow { field: "file offset", value: 0x80_0000 }))
        ));

        Ok(())
    }

    #[test]
    fn scattered_sizes() {
        let mut frame = [0u8; 16];
        scatter_size(&mut frame, 0x1234_5678);
        assert_eq!(frame[7], 0x78);
        assert_eq!(frame[14], 0x56);
        assert_eq!(frame[5], 0x34);
        assert_eq!(frame[2], 0x12);
        assert_eq!(scattered_size(&frame), 0x1234_5678);
    }
}
