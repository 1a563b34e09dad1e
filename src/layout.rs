//! Directory conventions shared by the packager and the loader.

use std::path::{Path, PathBuf};

pub const ARCHIVE_EXTENSION: &str = "lottie";
pub const JSON_EXTENSION: &str = "json";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const ANIMATIONS_DIR_NAME: &str = "animations";
pub const IMAGES_DIR_NAME: &str = "images";

/// Paths of one archive's working tree and of its compressed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub root: PathBuf,
    pub animations_dir: PathBuf,
    pub images_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub archive_path: PathBuf,
}

impl ArchiveLayout {
    /// Layout for `base_name` under `parent`: the tree lives in
    /// `parent/base_name/` and the archive is `parent/base_name.lottie`.
    pub fn new(parent: &Path, base_name: &str) -> Self {
        let root = parent.join(base_name);
        Self {
            animations_dir: root.join(ANIMATIONS_DIR_NAME),
            images_dir: root.join(IMAGES_DIR_NAME),
            manifest_path: root.join(MANIFEST_FILE_NAME),
            archive_path: parent.join(format!("{base_name}.{ARCHIVE_EXTENSION}")),
            root,
        }
    }

    /// Layout of an already extracted tree rooted at `root`.
    pub fn extracted(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            animations_dir: root.join(ANIMATIONS_DIR_NAME),
            images_dir: root.join(IMAGES_DIR_NAME),
            manifest_path: root.join(MANIFEST_FILE_NAME),
            archive_path: root.with_extension(ARCHIVE_EXTENSION),
        }
    }

    /// `animations/<stem>.json`
    pub fn animation_path(&self, stem: &str) -> PathBuf {
        self.animations_dir.join(format!("{stem}.{JSON_EXTENSION}"))
    }
}

pub fn is_source_json(path: &Path) -> bool {
    has_extension(path, JSON_EXTENSION)
}

pub fn is_archive(path: &Path) -> bool {
    has_extension(path, ARCHIVE_EXTENSION)
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = ArchiveLayout::new(Path::new("/out"), "wave");
        assert_eq!(layout.root, Path::new("/out/wave"));
        assert_eq!(layout.animations_dir, Path::new("/out/wave/animations"));
        assert_eq!(layout.images_dir, Path::new("/out/wave/images"));
        assert_eq!(layout.manifest_path, Path::new("/out/wave/manifest.json"));
        assert_eq!(layout.archive_path, Path::new("/out/wave.lottie"));
        assert_eq!(
            layout.animation_path("wave-dark"),
            Path::new("/out/wave/animations/wave-dark.json")
        );
    }

    #[test]
    fn classification_is_by_extension() {
        assert!(is_source_json(Path::new("a/b/wave.json")));
        assert!(is_source_json(Path::new("WAVE.JSON")));
        assert!(!is_source_json(Path::new("wave.lottie")));
        assert!(!is_source_json(Path::new("wave")));
        assert!(is_archive(Path::new("wave.lottie")));
        assert!(!is_archive(Path::new("wave.zip")));
    }
}
