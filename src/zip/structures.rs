use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use super::ZipError;

/// Value stored in 16-bit fields whose real value lives in a ZIP64 record.
pub const ZIP64_MARKER_U16: u16 = 0xFFFF;
/// Value stored in 32-bit fields whose real value lives in a ZIP64 record.
pub const ZIP64_MARKER_U32: u32 = 0xFFFF_FFFF;

/// General purpose flag: file name is UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// "Version needed to extract" for plain deflate entries (2.0).
pub const VERSION_NEEDED: u16 = 20;
/// Unix host, zip format version 2.0.
pub const VERSION_MADE_BY: u16 = (3 << 8) | 20;

/// DOS date for 1980-01-01, used so archives are byte-for-byte reproducible.
pub const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, Default)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ZipError> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::Invalid("end of central directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.disk_number)?;
        out.write_u16::<LittleEndian>(self.disk_with_cd)?;
        out.write_u16::<LittleEndian>(self.disk_entries)?;
        out.write_u16::<LittleEndian>(self.total_entries)?;
        out.write_u32::<LittleEndian>(self.cd_size)?;
        out.write_u32::<LittleEndian>(self.cd_offset)?;
        out.write_u16::<LittleEndian>(self.comment_len)
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == ZIP64_MARKER_U16
            || self.total_entries == ZIP64_MARKER_U16
            || self.cd_size == ZIP64_MARKER_U32
            || self.cd_offset == ZIP64_MARKER_U32
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ZipError> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::Invalid("zip64 locator"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum.
///
/// Only the fields needed to locate the central directory are kept.
pub struct Zip64EOCD {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ZipError> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::Invalid("zip64 end of central directory"));
        }

        // record size (8), versions (2+2), disk numbers (4+4), entries on this disk (8)
        let mut cursor = Cursor::new(&data[32..]);
        Ok(Self {
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Local File Header (LFH) - 30 bytes plus name and extra field
pub struct LocalFileHeader<'a> {
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: &'a str,
}

impl LocalFileHeader<'_> {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIZE: usize = 30;
    /// Offset of the file name length field inside the fixed part.
    pub const NAME_LEN_OFFSET: u64 = 26;

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.last_mod_time)?;
        out.write_u16::<LittleEndian>(self.last_mod_date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_all(self.file_name.as_bytes())
    }
}

/// Central Directory File Header (CDFH) - 46 bytes plus variable fields
pub struct CentralDirectoryHeader;

impl CentralDirectoryHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const MIN_SIZE: usize = 46;

    /// Parse one header at the cursor, leaving it positioned at the next one.
    pub fn read_from(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry, ZipError> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != Self::SIGNATURE {
            return Err(ZipError::Invalid("central directory file header"));
        }

        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = u64::from(cursor.read_u32::<LittleEndian>()?);
        let mut uncompressed_size = u64::from(cursor.read_u32::<LittleEndian>()?);
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = u64::from(cursor.read_u32::<LittleEndian>()?);

        let mut name = vec![0u8; usize::from(file_name_length)];
        cursor.read_exact(&mut name)?;
        let file_name = String::from_utf8_lossy(&name).into_owned();

        // ZIP64 extended information (0x0001) carries only the fields whose
        // 32-bit slot holds the marker, in this fixed order.
        let extra_end = cursor.position() + u64::from(extra_field_length);
        while cursor.position() + 4 <= extra_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = u64::from(cursor.read_u16::<LittleEndian>()?);
            let field_end = (cursor.position() + field_size).min(extra_end);

            if header_id == 0x0001 {
                for slot in [&mut uncompressed_size, &mut compressed_size, &mut lfh_offset] {
                    if *slot == u64::from(ZIP64_MARKER_U32) && cursor.position() + 8 <= field_end {
                        *slot = cursor.read_u64::<LittleEndian>()?;
                    }
                }
            }
            cursor.set_position(field_end);
        }
        cursor.set_position(extra_end + u64::from(file_comment_length));

        Ok(ZipFileEntry {
            is_directory: file_name.ends_with('/'),
            file_name,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
        })
    }

    pub fn write_to<W: Write>(entry: &ZipFileEntry, out: &mut W) -> Result<(), ZipError> {
        let narrow = |v: u64| u32::try_from(v).map_err(|_| ZipError::TooLarge(entry.file_name.clone()));

        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
        out.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        out.write_u16::<LittleEndian>(entry.flags)?;
        out.write_u16::<LittleEndian>(entry.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(entry.last_mod_time)?;
        out.write_u16::<LittleEndian>(entry.last_mod_date)?;
        out.write_u32::<LittleEndian>(entry.crc32)?;
        out.write_u32::<LittleEndian>(narrow(entry.compressed_size)?)?;
        out.write_u32::<LittleEndian>(narrow(entry.uncompressed_size)?)?;
        out.write_u16::<LittleEndian>(entry.file_name.len() as u16)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        // regular file, rw-r--r--
        out.write_u32::<LittleEndian>(0o100_644 << 16)?;
        out.write_u32::<LittleEndian>(narrow(entry.lfh_offset)?)?;
        out.write_all(entry.file_name.as_bytes())?;
        Ok(())
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub is_directory: bool,
}
