//! Builds `.lottie` archives from loose animation JSON.

use std::collections::HashSet;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::error::PackageError;
use crate::io::{Fetch, SourceUri, Transport};
use crate::layout::{ArchiveLayout, is_source_json};
use crate::manifest::{
    AnimationEntry, ColorOverride, Direction, Manifest, PlaybackMode, ThemeOverride,
};
use crate::observer::{Event, NoopObserver, Observer};
use crate::theme::ThemeKey;
use crate::zip::compress_paths;

/// Playback metadata written for the base animation.
#[derive(Debug, Clone, PartialEq)]
pub struct PackOptions {
    pub loop_animation: bool,
    pub speed: f32,
    pub theme_color: String,
    pub direction: Option<Direction>,
    pub mode: Option<PlaybackMode>,
    pub author: String,
    pub generator: String,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            loop_animation: true,
            speed: 1.0,
            theme_color: "#ffffff".to_owned(),
            direction: None,
            mode: None,
            author: "LottieFiles".to_owned(),
            generator: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

/// An alternate animation to ship under a theme key.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeSource {
    pub key: ThemeKey,
    pub uri: String,
    pub color_overrides: Option<Vec<ColorOverride>>,
}

impl ThemeSource {
    pub fn new(key: impl Into<ThemeKey>, uri: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            uri: uri.into(),
            color_overrides: None,
        }
    }

    pub fn with_color_overrides(mut self, overrides: Vec<ColorOverride>) -> Self {
        self.color_overrides = Some(overrides);
        self
    }
}

/// Everything one `pack` call needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PackRequest {
    pub base: String,
    pub themes: Vec<ThemeSource>,
    pub options: PackOptions,
    pub destination: PathBuf,
}

impl PackRequest {
    pub fn new(base: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            themes: Vec::new(),
            options: PackOptions::default(),
            destination: destination.into(),
        }
    }

    pub fn with_theme(mut self, theme: ThemeSource) -> Self {
        self.themes.push(theme);
        self
    }

    pub fn with_options(mut self, options: PackOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Clone)]
pub struct PackagerConfig {
    pub fetcher: Arc<dyn Fetch>,
    pub observer: Arc<dyn Observer>,
}

impl PackagerConfig {
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            fetcher: Arc::new(Transport::default()),
            observer: Arc::new(NoopObserver),
        }
    }
}

/// Creates archives. Cheap to clone; clones share configuration.
#[derive(Clone, Default)]
pub struct Packager {
    config: PackagerConfig,
}

impl Packager {
    pub fn new(config: PackagerConfig) -> Self {
        Self { config }
    }

    /// Pack `request.base` plus its theme variants into
    /// `<destination>/<base name>.lottie` and return that path.
    ///
    /// Only the base animation is mandatory: a theme whose source is
    /// invalid, not JSON, or unreachable is reported to the observer and
    /// left out.
    pub async fn pack(&self, request: &PackRequest) -> Result<PathBuf, PackageError> {
        let not_animation = || PackageError::NotAnimationSource(request.base.clone());
        let base_uri: SourceUri = request.base.parse().map_err(|_| not_animation())?;
        if !is_source_json(base_uri.path()) {
            return Err(not_animation());
        }
        let base_name = base_uri.file_stem().ok_or_else(not_animation)?;

        let layout = ArchiveLayout::new(&request.destination, &base_name);
        tokio::fs::create_dir_all(&layout.animations_dir).await?;

        let base_data = self.fetch(&base_uri).await?;
        let base_path = layout.animation_path(&base_name);
        tokio::fs::write(&base_path, &base_data).await?;
        let mut files = vec![base_path];

        let options = &request.options;
        let mut manifest = Manifest::new(
            vec![AnimationEntry {
                id: base_name.clone(),
                loop_animation: options.loop_animation,
                speed: options.speed,
                theme_color: options.theme_color.clone(),
                direction: options.direction,
                mode: options.mode,
            }],
            options.author.clone(),
            options.generator.clone(),
        );
        manifest
            .themes
            .insert(ThemeKey::default_key(), ThemeOverride::new(base_name.clone()));

        let mut taken: HashSet<ThemeKey> = HashSet::from([ThemeKey::default_key()]);
        for theme in &request.themes {
            match self.pack_theme(theme, &base_name, &layout, &taken).await {
                Ok((stem, path)) => {
                    taken.insert(theme.key.clone());
                    files.push(path);
                    manifest.themes.insert(
                        theme.key.clone(),
                        ThemeOverride {
                            animation: stem,
                            color_settings: theme.color_overrides.clone(),
                        },
                    );
                }
                Err(reason) => self.config.observer.on_event(&Event::OverrideSkipped {
                    key: &theme.key,
                    source: &theme.uri,
                    reason,
                }),
            }
        }

        manifest.validate()?;
        tokio::fs::write(&layout.manifest_path, manifest.encode()?).await?;
        files.push(layout.manifest_path.clone());

        let archive_path = layout.archive_path.clone();
        let (root, target, destination) = (
            layout.root.clone(),
            archive_path.clone(),
            request.destination.clone(),
        );
        tokio::task::spawn_blocking(move || write_archive(&root, &files, &destination, &target))
            .await
            .map_err(|e| PackageError::Task(e.to_string()))??;

        self.config.observer.on_event(&Event::Packed {
            archive: &archive_path,
        });
        Ok(archive_path)
    }

    /// Blocking form of [`pack`](Self::pack). Must not be called from async code.
    pub fn pack_blocking(&self, request: &PackRequest) -> Result<PathBuf, PackageError> {
        crate::task::block_on(self.pack(request))?
    }

    /// Pack in the background and pass the result to `on_complete`.
    pub fn pack_with<F>(&self, request: PackRequest, on_complete: F)
    where
        F: FnOnce(Result<PathBuf, PackageError>) + Send + 'static,
    {
        let packager = self.clone();
        crate::task::run_detached(async move { packager.pack(&request).await }, on_complete);
    }

    async fn fetch(&self, uri: &SourceUri) -> Result<Vec<u8>, PackageError> {
        let source = uri.to_string();
        self.config
            .observer
            .on_event(&Event::Fetching { source: &source });

        let data = self
            .config
            .fetcher
            .fetch(uri)
            .await
            .map_err(|reason| PackageError::SourceUnavailable {
                source_uri: source.clone(),
                reason,
            })?;
        if data.is_empty() {
            return Err(PackageError::NoDataLoaded(source));
        }
        Ok(data)
    }

    /// Write one theme's animation; `Err` carries the reason it was skipped.
    async fn pack_theme(
        &self,
        theme: &ThemeSource,
        base_name: &str,
        layout: &ArchiveLayout,
        taken: &HashSet<ThemeKey>,
    ) -> Result<(String, PathBuf), String> {
        if taken.contains(&theme.key) {
            return Err("theme key already registered".to_owned());
        }
        let key = theme.key.as_str();
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err("theme key cannot be used in a file name".to_owned());
        }

        let uri: SourceUri = theme.uri.parse().map_err(|e| format!("{e}"))?;
        if !is_source_json(uri.path()) {
            return Err("not a JSON animation source".to_owned());
        }

        let data = self.fetch(&uri).await.map_err(|e| e.to_string())?;
        let stem = format!("{base_name}-{key}");
        let path = layout.animation_path(&stem);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| e.to_string())?;
        Ok((stem, path))
    }
}

/// Compress into a temporary file next to the target and rename it into
/// place, so a failed run never leaves a partial archive behind.
fn write_archive(
    root: &Path,
    files: &[PathBuf],
    destination: &Path,
    archive_path: &Path,
) -> Result<(), PackageError> {
    let mut tmp = NamedTempFile::new_in(destination)?;
    compress_paths(root, files, BufWriter::new(tmp.as_file_mut()))
        .map_err(PackageError::CompressionFailed)?;
    tmp.as_file().sync_all()?;
    tmp.persist(archive_path)
        .map_err(|e| PackageError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const ANIMATION: &str = r#"{"v":"5.7.4","fr":30,"ip":0,"op":60,"w":100,"h":100,"layers":[]}"#;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Observer for Recorder {
        fn on_event(&self, event: &Event<'_>) {
            if let Event::OverrideSkipped { key, .. } = event {
                self.0.lock().unwrap().push(key.to_string());
            }
        }
    }

    fn write(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn rejects_non_json_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(dir.path(), "wave.txt", ANIMATION);

        let err = Packager::default()
            .pack(&PackRequest::new(base, dir.path().join("out")))
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::NotAnimationSource(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn missing_base_fails() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("gone.json").to_string_lossy().into_owned();

        let err = Packager::default()
            .pack(&PackRequest::new(base, dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::SourceUnavailable { .. }));
        assert!(!dir.path().join("gone.lottie").exists());
    }

    #[tokio::test]
    async fn writes_layout_and_registers_default_theme() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(dir.path(), "wave.json", ANIMATION);
        let dark = write(dir.path(), "wave_dark.json", ANIMATION);
        let out = dir.path().join("out");

        let request = PackRequest::new(base, &out).with_theme(
            ThemeSource::new("dark", dark).with_color_overrides(vec![ColorOverride::new(
                vec!["Bg".to_owned()],
                "#111111",
            )]),
        );
        let archive = Packager::default().pack(&request).await.unwrap();

        assert_eq!(archive, out.join("wave.lottie"));
        assert!(archive.exists());

        let layout = ArchiveLayout::new(&out, "wave");
        assert!(layout.animation_path("wave").exists());
        assert!(layout.animation_path("wave-dark").exists());

        let manifest = Manifest::load(&layout.manifest_path).unwrap();
        assert_eq!(manifest.animations.len(), 1);
        assert_eq!(manifest.animations[0].id, "wave");
        assert_eq!(manifest.theme("light").unwrap().animation, "wave");
        let dark = manifest.theme("dark").unwrap();
        assert_eq!(dark.animation, "wave-dark");
        assert_eq!(dark.color_settings.as_ref().unwrap()[0].color, "#111111");
    }

    #[tokio::test]
    async fn bad_themes_are_skipped_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(dir.path(), "wave.json", ANIMATION);
        let notes = write(dir.path(), "notes.txt", "hello");
        let missing = dir.path().join("absent.json").to_string_lossy().into_owned();
        let recorder = Arc::new(Recorder::default());

        let request = PackRequest::new(base.clone(), dir.path())
            .with_theme(ThemeSource::new("sepia", notes))
            .with_theme(ThemeSource::new("dark", missing))
            .with_theme(ThemeSource::new("light", base.clone()))
            .with_theme(ThemeSource::new("../up", base));
        let packager = Packager::new(PackagerConfig::default().with_observer(recorder.clone()));
        packager.pack(&request).await.unwrap();

        let manifest = Manifest::load(&dir.path().join("wave").join("manifest.json")).unwrap();
        assert_eq!(manifest.themes.len(), 1);
        assert!(manifest.theme("light").is_some());
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["sepia", "dark", "light", "../up"]
        );
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_before_compression() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(dir.path(), "wave.json", ANIMATION);
        let options = PackOptions {
            speed: -1.0,
            ..PackOptions::default()
        };

        let err = Packager::default()
            .pack(&PackRequest::new(base, dir.path()).with_options(options))
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::InvalidManifest(_)));
        assert!(!dir.path().join("wave.lottie").exists());
    }

    /// Serves canned bodies by URL; anything else is a 404.
    struct CannedFetcher(Vec<(&'static str, &'static str)>);

    #[async_trait::async_trait]
    impl Fetch for CannedFetcher {
        async fn fetch(&self, uri: &SourceUri) -> Result<Vec<u8>, crate::io::FetchError> {
            let url = uri.to_string();
            self.0
                .iter()
                .find(|(known, _)| *known == url)
                .map(|(_, body)| body.as_bytes().to_vec())
                .ok_or(crate::io::FetchError::Status(reqwest::StatusCode::NOT_FOUND))
        }
    }

    fn canned(routes: Vec<(&'static str, &'static str)>) -> Packager {
        Packager::new(PackagerConfig::default().with_fetcher(Arc::new(CannedFetcher(routes))))
    }

    #[tokio::test]
    async fn remote_sources_go_through_the_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let packager = canned(vec![
            ("https://example.com/anim/wave.json", ANIMATION),
            ("https://example.com/anim/night.json", ANIMATION),
        ]);
        let request = PackRequest::new("https://example.com/anim/wave.json", dir.path())
            .with_theme(ThemeSource::new("dark", "https://example.com/anim/night.json"))
            .with_theme(ThemeSource::new("sepia", "https://example.com/anim/missing.json"));

        let archive = packager.pack(&request).await.unwrap();
        assert_eq!(archive, dir.path().join("wave.lottie"));

        let manifest = Manifest::load(&dir.path().join("wave").join("manifest.json")).unwrap();
        assert_eq!(manifest.animations[0].id, "wave");
        assert_eq!(manifest.theme("dark").unwrap().animation, "wave-dark");
        assert!(manifest.theme("sepia").is_none());
    }

    #[tokio::test]
    async fn empty_base_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let packager = canned(vec![("https://example.com/empty.json", "")]);

        let err = packager
            .pack(&PackRequest::new("https://example.com/empty.json", dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::NoDataLoaded(_)));
        assert!(!err.is_retryable());
        assert!(!dir.path().join("empty.lottie").exists());
    }

    #[tokio::test]
    async fn unreachable_remote_base_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = canned(Vec::new())
            .pack(&PackRequest::new("https://example.com/wave.json", dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::SourceUnavailable { .. }));
        assert!(!dir.path().join("wave.lottie").exists());
    }

    #[test]
    fn failed_compression_leaves_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("wave");
        std::fs::create_dir_all(&root).unwrap();
        write(&root, "manifest.json", "{}");
        let target = dir.path().join("wave.lottie");

        let files = vec![root.join("manifest.json"), root.join("vanished.json")];
        let err = write_archive(&root, &files, dir.path(), &target).unwrap_err();
        assert!(matches!(err, PackageError::CompressionFailed(_)));
        assert!(!target.exists());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, ["wave"]);
    }

    #[test]
    fn failed_compression_keeps_previous_archive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("wave");
        std::fs::create_dir_all(&root).unwrap();
        let outside = PathBuf::from(write(dir.path(), "outside.json", ANIMATION));
        let target = dir.path().join("wave.lottie");
        std::fs::write(&target, b"previous").unwrap();

        let err = write_archive(&root, &[outside], dir.path(), &target).unwrap_err();
        assert!(matches!(
            err,
            PackageError::CompressionFailed(crate::zip::ZipError::UnsafeEntryName(_))
        ));
        assert_eq!(std::fs::read(&target).unwrap(), b"previous");
    }

    #[test]
    fn blocking_form_works_outside_a_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(dir.path(), "wave.json", ANIMATION);
        let archive = Packager::default()
            .pack_blocking(&PackRequest::new(base, dir.path()))
            .unwrap();
        assert!(archive.exists());
    }
}
