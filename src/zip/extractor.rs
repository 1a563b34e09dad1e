use flate2::read::DeflateDecoder;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::io::ReadAt;

use super::ZipError;
use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

const MAX_DEFLATE_RATIO: u64 = 1032;

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>, ZipError> {
        self.parser.list_files().await
    }

    /// Decompress one entry into memory, checking its CRC-32.
    pub async fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>, ZipError> {
        let data_offset = self.parser.get_data_offset(entry).await?;
        let too_large = || ZipError::TooLarge(entry.file_name.clone());
        let mut raw = vec![0u8; usize::try_from(entry.compressed_size).map_err(|_| too_large())?];
        self.parser.read_exact_at(data_offset, &mut raw).await?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                // the declared size is only a hint; deflate tops out near 1032:1
                let hint = entry
                    .uncompressed_size
                    .min(entry.compressed_size.saturating_mul(MAX_DEFLATE_RATIO));
                let mut out = Vec::new();
                out.try_reserve(usize::try_from(hint).map_err(|_| too_large())?)
                    .map_err(|_| too_large())?;
                DeflateDecoder::new(raw.as_slice())
                    .take(entry.uncompressed_size.saturating_add(1))
                    .read_to_end(&mut out)?;
                out
            }
            CompressionMethod::Unknown(method) => {
                return Err(ZipError::UnsupportedMethod {
                    name: entry.file_name.clone(),
                    method,
                });
            }
        };

        if data.len() as u64 != entry.uncompressed_size {
            return Err(ZipError::Invalid("entry size"));
        }

        let mut crc = flate2::Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            return Err(ZipError::CrcMismatch {
                name: entry.file_name.clone(),
                expected: entry.crc32,
                actual: crc.sum(),
            });
        }

        Ok(data)
    }

    /// Extract file to disk
    pub async fn extract_to_file(
        &self,
        entry: &ZipFileEntry,
        output_path: &Path,
    ) -> Result<(), ZipError> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = self.extract_to_memory(entry).await?;
        let mut file = fs::File::create(output_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        Ok(())
    }

    /// Extract every file entry below `dest`, keeping the archive's
    /// directory structure. Returns the paths written, in archive order.
    pub async fn extract_all(&self, dest: &Path) -> Result<Vec<PathBuf>, ZipError> {
        let entries = self.list_files().await?;
        let mut written = Vec::with_capacity(entries.len());

        for entry in entries.iter().filter(|e| !e.is_directory) {
            let output_path = dest.join(safe_relative_path(&entry.file_name)?);
            tracing::trace!("extracting {}", entry.file_name);
            self.extract_to_file(entry, &output_path).await?;
            written.push(output_path);
        }

        Ok(written)
    }
}

/// Map an entry name to a relative path that cannot leave the extraction root.
fn safe_relative_path(name: &str) -> Result<PathBuf, ZipError> {
    let normalized = name.replace('\\', "/");
    let path = Path::new(&normalized);
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(ZipError::UnsafeEntryName(name.to_owned())),
        }
    }

    if out.as_os_str().is_empty() {
        return Err(ZipError::UnsafeEntryName(name.to_owned()));
    }
    Ok(out)
}
