use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::ZipError;
use super::structures::*;

/// Sequential ZIP writer.
///
/// Each entry is deflated and kept compressed only when that actually saves
/// space; otherwise it is stored. Timestamps are pinned to the DOS epoch so
/// identical inputs give identical archives.
pub struct ZipWriter<W: Write> {
    out: W,
    offset: u64,
    entries: Vec<ZipFileEntry>,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            offset: 0,
            entries: Vec::new(),
        }
    }

    /// Append one file entry. `name` uses `/` separators.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<(), ZipError> {
        let too_large = || ZipError::TooLarge(name.to_owned());
        if name.len() > usize::from(u16::MAX) {
            return Err(too_large());
        }

        let mut crc = flate2::Crc::new();
        crc.update(data);

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let deflated = encoder.finish()?;

        let (method, payload) = if deflated.len() < data.len() {
            (CompressionMethod::Deflate, deflated.as_slice())
        } else {
            (CompressionMethod::Stored, data)
        };

        let header = LocalFileHeader {
            flags: FLAG_UTF8,
            compression_method: method,
            last_mod_time: 0,
            last_mod_date: DOS_EPOCH_DATE,
            crc32: crc.sum(),
            compressed_size: u32::try_from(payload.len()).map_err(|_| too_large())?,
            uncompressed_size: u32::try_from(data.len()).map_err(|_| too_large())?,
            file_name: name,
        };
        header.write_to(&mut self.out)?;
        self.out.write_all(payload)?;

        self.entries.push(ZipFileEntry {
            file_name: name.to_owned(),
            flags: FLAG_UTF8,
            compression_method: method,
            compressed_size: payload.len() as u64,
            uncompressed_size: data.len() as u64,
            crc32: crc.sum(),
            lfh_offset: self.offset,
            last_mod_time: 0,
            last_mod_date: DOS_EPOCH_DATE,
            is_directory: false,
        });
        self.offset += (LocalFileHeader::SIZE + name.len() + payload.len()) as u64;

        Ok(())
    }

    /// Write the central directory and EOCD, returning the inner writer.
    pub fn finish(mut self) -> Result<W, ZipError> {
        let total = u16::try_from(self.entries.len())
            .map_err(|_| ZipError::TooLarge("<central directory>".to_owned()))?;

        let mut directory = Vec::new();
        for entry in &self.entries {
            CentralDirectoryHeader::write_to(entry, &mut directory)?;
        }
        self.out.write_all(&directory)?;

        let narrow =
            |v: u64| u32::try_from(v).map_err(|_| ZipError::TooLarge("<archive>".to_owned()));
        EndOfCentralDirectory {
            disk_entries: total,
            total_entries: total,
            cd_size: narrow(directory.len() as u64)?,
            cd_offset: narrow(self.offset)?,
            ..Default::default()
        }
        .write_to(&mut self.out)?;
        self.out.flush()?;

        Ok(self.out)
    }
}

/// Compress `paths` (files or directories, walked recursively) into `out`.
///
/// Entry names are taken relative to `root`, so every path must live below it.
pub fn compress_paths<W: Write>(root: &Path, paths: &[PathBuf], out: W) -> Result<W, ZipError> {
    let mut files = Vec::new();
    for path in paths {
        collect_files(path, &mut files)?;
    }

    let mut writer = ZipWriter::new(out);
    for file in files {
        let relative = file
            .strip_prefix(root)
            .map_err(|_| ZipError::UnsafeEntryName(file.display().to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let data = fs::read(&file)?;
        tracing::trace!("adding {name} ({} bytes)", data.len());
        writer.add_file(&name, &data)?;
    }
    writer.finish()
}

fn collect_files(path: &Path, files: &mut Vec<PathBuf>) -> Result<(), ZipError> {
    if path.is_dir() {
        let mut children = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        children.sort();
        for child in children {
            collect_files(&child, files)?;
        }
    } else {
        files.push(path.to_path_buf());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compresses_directory_tree_with_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("animations")).unwrap();
        fs::write(root.join("animations").join("b.json"), b"{}").unwrap();
        fs::write(root.join("animations").join("a.json"), b"{}").unwrap();
        fs::write(root.join("manifest.json"), b"{}").unwrap();

        let bytes = compress_paths(
            root,
            &[root.join("animations"), root.join("manifest.json")],
            Vec::new(),
        )
        .unwrap();

        let text = String::from_utf8_lossy(&bytes);
        let a = text.find("animations/a.json").unwrap();
        let b = text.find("animations/b.json").unwrap();
        assert!(a < b);
        assert!(text.contains("manifest.json"));
        assert_eq!(&bytes[0..4], LocalFileHeader::SIGNATURE);
    }

    #[test]
    fn empty_archive_is_just_an_eocd() {
        let bytes = ZipWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        assert_eq!(&bytes[0..4], EndOfCentralDirectory::SIGNATURE);
    }

    #[test]
    fn repetitive_data_gets_deflated() {
        let data = "0123456789".repeat(100);
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_file("big.json", data.as_bytes()).unwrap();
        let bytes = writer.finish().unwrap();
        assert!(bytes.len() < data.len());
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let stray = other.path().join("stray.json");
        fs::write(&stray, b"{}").unwrap();

        assert!(matches!(
            compress_paths(root.path(), &[stray], Vec::new()),
            Err(ZipError::UnsafeEntryName(_))
        ));
    }
}
