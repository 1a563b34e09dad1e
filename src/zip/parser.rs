//! Low-level ZIP archive parser.
//!
//! ZIP files are read from the end: the End of Central Directory (EOCD)
//! points at the central directory, which lists every entry and the offset
//! of its Local File Header. Only the tail and the central directory are
//! touched until an entry's data is actually requested.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::sync::Arc;

use crate::io::ReadAt;

use super::ZipError;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser, generic over the data source.
///
/// Typically used through [`ZipExtractor`](super::ZipExtractor).
pub struct ZipParser<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record together with its offset in the archive.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64), ZipError> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            return Err(ZipError::Invalid("end of central directory"));
        }

        // Common case: no archive comment, EOCD is the last 22 bytes.
        let offset = self.size - eocd_size;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.read_exact_at(offset, &mut buf).await?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(&buf)?, offset));
        }

        // Otherwise scan backwards through the largest possible comment.
        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
        let search_start = self.size - search_size;
        let mut buf = vec![0u8; search_size as usize];
        self.read_exact_at(search_start, &mut buf).await?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            let comment_len = usize::from(u16::from_le_bytes([buf[i + 20], buf[i + 21]]));
            if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                let eocd = EndOfCentralDirectory::from_bytes(&buf[i..])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(ZipError::Invalid("end of central directory"))
    }

    /// Read the ZIP64 EOCD through the locator that precedes the regular EOCD.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD, ZipError> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or(ZipError::Invalid("zip64 locator"))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.read_exact_at(locator_offset, &mut locator_buf).await?;
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;
        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List every entry recorded in the central directory.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>, ZipError> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                u64::from(eocd.cd_offset),
                u64::from(eocd.cd_size),
                u64::from(eocd.total_entries),
            )
        };

        if cd_offset.saturating_add(cd_size) > self.size
            || total_entries > cd_size / CentralDirectoryHeader::MIN_SIZE as u64
        {
            return Err(ZipError::Invalid("central directory bounds"));
        }

        let mut cd_data = vec![0u8; cd_size as usize];
        self.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut cursor = Cursor::new(cd_data.as_slice());
        (0..total_entries)
            .map(|_| CentralDirectoryHeader::read_from(&mut cursor))
            .collect()
    }

    /// Offset of an entry's data, past its Local File Header.
    ///
    /// The local name and extra field lengths may differ from the central
    /// directory copy, so the local header is read rather than trusted.
    /// Fails when the entry's data would run past the end of the archive.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64, ZipError> {
        let out_of_bounds = || ZipError::Invalid("entry bounds");
        if entry.lfh_offset.saturating_add(LocalFileHeader::SIZE as u64) > self.size {
            return Err(out_of_bounds());
        }

        let mut lfh_buf = vec![0u8; LocalFileHeader::SIZE];
        self.read_exact_at(entry.lfh_offset, &mut lfh_buf).await?;

        if &lfh_buf[0..4] != LocalFileHeader::SIGNATURE {
            return Err(ZipError::Invalid("local file header"));
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(LocalFileHeader::NAME_LEN_OFFSET);
        let file_name_length = u64::from(cursor.read_u16::<LittleEndian>()?);
        let extra_field_length = u64::from(cursor.read_u16::<LittleEndian>()?);

        let data_offset =
            entry.lfh_offset + LocalFileHeader::SIZE as u64 + file_name_length + extra_field_length;
        match data_offset.checked_add(entry.compressed_size) {
            Some(end) if end <= self.size => Ok(data_offset),
            _ => Err(out_of_bounds()),
        }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    /// Fill `buf` completely or fail with `UnexpectedEof`.
    pub async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ZipError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .reader
                .read_at(offset + filled as u64, &mut buf[filled..])
                .await?;
            if n == 0 {
                return Err(ZipError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            filled += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::zip::ZipWriter;

    fn archive_with_comment(comment: &[u8]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_file("manifest.json", b"{}").unwrap();
        let mut bytes = writer.finish().unwrap();
        // patch comment length into the trailing EOCD and append the comment
        let len = bytes.len();
        bytes[len - 2..].copy_from_slice(&(comment.len() as u16).to_le_bytes());
        bytes.extend_from_slice(comment);
        bytes
    }

    #[tokio::test]
    async fn finds_eocd_behind_comment() {
        let bytes = archive_with_comment(b"made for tests");
        let parser = ZipParser::new(Arc::new(MemoryReader::new(bytes)));
        let entries = parser.list_files().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, "manifest.json");
    }

    #[tokio::test]
    async fn rejects_non_zip() {
        let parser = ZipParser::new(Arc::new(MemoryReader::new(vec![b'x'; 64])));
        assert!(matches!(
            parser.list_files().await,
            Err(ZipError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn entry_data_must_fit_in_archive() {
        let mut bytes = archive_with_comment(b"");
        let cd = bytes.windows(4).position(|w| w == CentralDirectoryHeader::SIGNATURE).unwrap();
        bytes[cd + 20..cd + 24].copy_from_slice(&0x7fff_0000u32.to_le_bytes());

        let parser = ZipParser::new(Arc::new(MemoryReader::new(bytes)));
        let entries = parser.list_files().await.unwrap();
        assert!(matches!(
            parser.get_data_offset(&entries[0]).await,
            Err(ZipError::Invalid("entry bounds"))
        ));
    }

    #[tokio::test]
    async fn rejects_tiny_input() {
        let parser = ZipParser::new(Arc::new(MemoryReader::new(b"PK".to_vec())));
        assert!(parser.find_eocd().await.is_err());
    }
}
