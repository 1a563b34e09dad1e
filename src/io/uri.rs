use reqwest::Url;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid source URI '{0}'")]
pub struct InvalidUri(pub String);

/// Where an animation or archive comes from.
///
/// `http://` and `https://` strings are remote, `file://` URLs and bare
/// strings are local paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    Local(PathBuf),
    Remote(Url),
}

impl SourceUri {
    pub fn is_remote(&self) -> bool {
        matches!(self, SourceUri::Remote(_))
    }

    /// The path component used for extension checks and naming.
    pub fn path(&self) -> &Path {
        match self {
            SourceUri::Local(path) => path,
            SourceUri::Remote(url) => Path::new(url.path()),
        }
    }

    /// File name without extension, e.g. `wave` for `.../wave.json`.
    pub fn file_stem(&self) -> Option<String> {
        self.path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
    }
}

impl FromStr for SourceUri {
    type Err = InvalidUri;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(InvalidUri(s.to_owned()));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Url::parse(trimmed)
                .map(SourceUri::Remote)
                .map_err(|_| InvalidUri(s.to_owned()));
        }
        if lower.starts_with("file://") {
            return Url::parse(trimmed)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .map(SourceUri::Local)
                .ok_or_else(|| InvalidUri(s.to_owned()));
        }

        Ok(SourceUri::Local(PathBuf::from(trimmed)))
    }
}

impl From<PathBuf> for SourceUri {
    fn from(path: PathBuf) -> Self {
        SourceUri::Local(path)
    }
}

impl From<Url> for SourceUri {
    fn from(url: Url) -> Self {
        SourceUri::Remote(url)
    }
}

impl fmt::Display for SourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceUri::Local(path) => write!(f, "{}", path.display()),
            SourceUri::Remote(url) => write!(f, "{url}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_schemes() {
        let remote: SourceUri = "https://example.com/anims/wave.json?v=2".parse().unwrap();
        assert!(remote.is_remote());
        assert_eq!(remote.file_stem().as_deref(), Some("wave"));

        let local: SourceUri = "assets/wave.json".parse().unwrap();
        assert_eq!(local, SourceUri::Local(PathBuf::from("assets/wave.json")));
    }

    #[cfg(unix)]
    #[test]
    fn file_urls_become_paths() {
        let uri: SourceUri = "file:///tmp/wave.json".parse().unwrap();
        assert_eq!(uri, SourceUri::Local(PathBuf::from("/tmp/wave.json")));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<SourceUri>().is_err());
        assert!("http://".parse::<SourceUri>().is_err());
    }
}
