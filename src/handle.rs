use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::layout::{ArchiveLayout, is_source_json};
use crate::manifest::{AnimationEntry, Manifest};
use crate::theme::ThemeKey;

/// An unpacked archive: its manifest plus the files found on disk.
#[derive(Debug, Clone)]
pub struct ArchiveHandle {
    source_identity: String,
    layout: ArchiveLayout,
    manifest: Manifest,
    animation_files: BTreeMap<String, PathBuf>,
    images: Vec<PathBuf>,
    default_animation: PathBuf,
}

/// A manifest entry together with the file it resolved to.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedAnimation<'a> {
    pub entry: &'a AnimationEntry,
    pub path: &'a Path,
}

impl ResolvedAnimation<'_> {
    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn loop_animation(&self) -> bool {
        self.entry.loop_animation
    }

    pub fn speed(&self) -> f32 {
        self.entry.speed
    }
}

impl ArchiveHandle {
    /// `animation_files` maps file stems under `animations/` to their paths.
    pub fn new(
        source_identity: impl Into<String>,
        working_dir: &Path,
        manifest: Manifest,
        animation_files: BTreeMap<String, PathBuf>,
        images: Vec<PathBuf>,
    ) -> Self {
        let layout = ArchiveLayout::extracted(working_dir);
        let default_animation = manifest
            .theme(ThemeKey::default_key().as_str())
            .and_then(|theme| animation_files.get(&theme.animation))
            .or_else(|| {
                manifest
                    .default_animation()
                    .and_then(|entry| animation_files.get(&entry.id))
            })
            .or_else(|| animation_files.values().next())
            .cloned()
            .unwrap_or_else(|| {
                let stem = manifest.default_animation().map_or("", |e| e.id.as_str());
                layout.animation_path(stem)
            });

        Self {
            source_identity: source_identity.into(),
            layout,
            manifest,
            animation_files,
            images,
            default_animation,
        }
    }

    /// Build a handle by scanning `animations/` and `images/` under
    /// `working_dir`. Missing directories count as empty.
    pub async fn scan(
        source_identity: impl Into<String>,
        working_dir: &Path,
        manifest: Manifest,
    ) -> io::Result<Self> {
        let layout = ArchiveLayout::extracted(working_dir);

        let animation_files = list_files(&layout.animations_dir)
            .await?
            .into_iter()
            .filter(|path| is_source_json(path))
            .filter_map(|path| {
                let stem = path.file_stem()?.to_string_lossy().into_owned();
                Some((stem, path))
            })
            .collect();
        let images = list_files(&layout.images_dir).await?;

        Ok(Self::new(
            source_identity,
            working_dir,
            manifest,
            animation_files,
            images,
        ))
    }

    pub fn source_identity(&self) -> &str {
        &self.source_identity
    }

    pub fn working_dir(&self) -> &Path {
        &self.layout.root
    }

    pub fn images_dir(&self) -> &Path {
        &self.layout.images_dir
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Every JSON file under `animations/`, theme variants included.
    pub fn animation_files(&self) -> &BTreeMap<String, PathBuf> {
        &self.animation_files
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    /// Manifest entries whose file exists, in manifest order.
    pub fn animations(&self) -> Vec<ResolvedAnimation<'_>> {
        self.manifest
            .animations
            .iter()
            .filter_map(|entry| {
                let path = self.animation_files.get(&entry.id)?;
                Some(ResolvedAnimation { entry, path })
            })
            .collect()
    }

    pub fn animation(&self, id: &str) -> Option<&Path> {
        self.animation_files.get(id).map(PathBuf::as_path)
    }

    /// Animation file for a theme key.
    ///
    /// Unknown keys, and keys whose file is missing from the archive, fall
    /// back to the base animation.
    pub fn animation_path(&self, theme: impl AsRef<str>) -> &Path {
        self.manifest
            .theme(theme.as_ref())
            .and_then(|t| self.animation_files.get(&t.animation))
            .map_or(self.default_animation.as_path(), PathBuf::as_path)
    }

    pub fn default_animation_path(&self) -> &Path {
        &self.default_animation
    }

    /// Look up an image by file name, e.g. `img_0.png`.
    pub fn image(&self, name: &str) -> Option<&Path> {
        self.images
            .iter()
            .find(|path| path.file_name().is_some_and(|n| n == name))
            .map(PathBuf::as_path)
    }

    pub fn theme_keys(&self) -> impl Iterator<Item = &ThemeKey> {
        self.manifest.themes.keys()
    }
}

/// Regular, non-hidden files directly inside `dir`, sorted by name.
async fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
