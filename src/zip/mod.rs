//! ZIP container codec for `.lottie` archives.
//!
//! - [`structures`]: on-disk records (EOCD, central and local headers)
//! - [`parser`]: reads the central directory through [`ReadAt`](crate::io::ReadAt)
//! - [`extractor`]: unpacks entries to memory or to a directory
//! - [`writer`]: produces archives from files on disk
//!
//! Reading starts from the End of Central Directory at the tail of the
//! archive, so a random-access source never needs to be read front to back.
//! STORED and DEFLATE entries are supported, ZIP64 records are understood on
//! read. Encryption and multi-disk archives are not.

mod extractor;
mod parser;
mod structures;
mod writer;

pub use extractor::ZipExtractor;
pub use parser::ZipParser;
pub use structures::*;
pub use writer::{ZipWriter, compress_paths};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZipError {
    #[error("zip I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a valid zip archive: bad {0}")]
    Invalid(&'static str),
    #[error("unsupported compression method {method} for '{name}'")]
    UnsupportedMethod { name: String, method: u16 },
    #[error("crc mismatch for '{name}': expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
    #[error("entry name escapes the destination: '{0}'")]
    UnsafeEntryName(String),
    #[error("entry too large for a non-zip64 archive: '{0}'")]
    TooLarge(String),
}
