use thiserror::Error;

use crate::io::FetchError;
use crate::manifest::ManifestError;
use crate::zip::ZipError;

/// Coarse classification so callers can decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input was wrong; retrying will not help.
    InvalidInput,
    /// I/O or network trouble that may go away.
    Transient,
    /// The archive itself is damaged or does not follow the format.
    Corrupt,
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("not an animation source (expected a .json file): {0}")]
    NotAnimationSource(String),
    #[error("animation source unavailable: {source_uri}: {reason}")]
    SourceUnavailable {
        source_uri: String,
        #[source]
        reason: FetchError,
    },
    #[error("animation source is empty: {0}")]
    NoDataLoaded(String),
    #[error("invalid manifest: {0}")]
    InvalidManifest(#[from] ManifestError),
    #[error("compression failed: {0}")]
    CompressionFailed(#[source] ZipError),
    #[error("packaging I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Task(String),
}

impl PackageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackageError::NotAnimationSource(_)
            | PackageError::NoDataLoaded(_)
            | PackageError::InvalidManifest(_) => ErrorKind::InvalidInput,
            PackageError::SourceUnavailable { reason, .. } if !reason.is_transient() => {
                ErrorKind::InvalidInput
            }
            PackageError::SourceUnavailable { .. }
            | PackageError::CompressionFailed(_)
            | PackageError::Io(_)
            | PackageError::Task(_) => ErrorKind::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("archive source unavailable: {source_key}: {reason}")]
    SourceUnavailable {
        source_key: String,
        #[source]
        reason: FetchError,
    },
    #[error("no data loaded from {0}")]
    NoDataLoaded(String),
    #[error("not a .lottie archive: {0}")]
    NotAnArchive(String),
    #[error("malformed manifest: {0}")]
    MalformedManifest(#[source] ManifestError),
    #[error("extraction failed: {0}")]
    ExtractionFailed(#[source] ZipError),
    #[error("loader I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Task(String),
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::SourceUnavailable { reason, .. } if !reason.is_transient() => {
                ErrorKind::InvalidInput
            }
            LoadError::SourceUnavailable { .. } | LoadError::Io(_) | LoadError::Task(_) => {
                ErrorKind::Transient
            }
            LoadError::NoDataLoaded(_) | LoadError::NotAnArchive(_) => ErrorKind::InvalidInput,
            LoadError::MalformedManifest(_) => ErrorKind::Corrupt,
            LoadError::ExtractionFailed(ZipError::Io(_)) => ErrorKind::Transient,
            LoadError::ExtractionFailed(_) => ErrorKind::Corrupt,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_kinds() {
        assert_eq!(
            LoadError::NotAnArchive("x".to_owned()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            LoadError::MalformedManifest(ManifestError::NoAnimations).kind(),
            ErrorKind::Corrupt
        );
        assert_eq!(
            LoadError::ExtractionFailed(ZipError::Invalid("header")).kind(),
            ErrorKind::Corrupt
        );

        let offline = LoadError::SourceUnavailable {
            source_key: "https://example.com/a.lottie".to_owned(),
            reason: FetchError::RetriesExhausted(3),
        };
        assert!(offline.is_retryable());
        assert!(offline.to_string().contains("example.com"));
    }

    #[test]
    fn package_error_kinds() {
        let missing = PackageError::SourceUnavailable {
            source_uri: "wave.json".to_owned(),
            reason: FetchError::Io(std::io::ErrorKind::NotFound.into()),
        };
        assert_eq!(missing.kind(), ErrorKind::InvalidInput);
        assert!(!PackageError::NotAnimationSource("a.txt".to_owned()).is_retryable());
    }
}
