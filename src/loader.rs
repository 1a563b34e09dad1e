//! Unpacks `.lottie` archives into private working directories.

use parking_lot::Mutex;
use reqwest::Url;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{ArchiveCache, CacheProvider};
use crate::error::LoadError;
use crate::handle::ArchiveHandle;
use crate::io::{
    Fetch, FetchError, InvalidUri, LocalFileReader, MemoryReader, ReadAt, SourceUri, Transport,
};
use crate::layout::{ARCHIVE_EXTENSION, ArchiveLayout, is_archive};
use crate::manifest::Manifest;
use crate::observer::{Event, NoopObserver, Observer};
use crate::zip::{EndOfCentralDirectory, LocalFileHeader, ZipExtractor};

/// A directory of bundled resources, identified by a stable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    root: PathBuf,
    identity: String,
}

impl Bundle {
    /// Bundle identified by its root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let identity = root.display().to_string();
        Self { root, identity }
    }

    pub fn with_identity(root: impl Into<PathBuf>, identity: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            identity: identity.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// `<root>/<subdirectory>/<name>.lottie`
    pub fn resource_path(&self, name: &str, subdirectory: Option<&str>) -> PathBuf {
        let mut path = self.root.clone();
        if let Some(sub) = subdirectory {
            path.push(sub);
        }
        path.push(format!("{}.{ARCHIVE_EXTENSION}", bundle_resource_name(name)));
        path
    }
}

/// Names may be given with or without the `.lottie` extension.
fn bundle_resource_name(name: &str) -> &str {
    if is_archive(Path::new(name)) {
        &name[..name.len() - ARCHIVE_EXTENSION.len() - 1]
    } else {
        name
    }
}

/// Where an archive comes from.
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    Url(Url),
    File(PathBuf),
    Bundled {
        bundle: Bundle,
        name: String,
        subdirectory: Option<String>,
    },
    Bytes {
        data: Vec<u8>,
        label: String,
    },
}

impl ArchiveSource {
    /// `http(s)://` URLs are fetched; `file://` URLs become [`ArchiveSource::File`].
    pub fn url(url: &str) -> Result<Self, InvalidUri> {
        let invalid = || InvalidUri(url.to_owned());
        let parsed = Url::parse(url).map_err(|_| invalid())?;
        match parsed.scheme() {
            "http" | "https" => Ok(ArchiveSource::Url(parsed)),
            "file" => parsed
                .to_file_path()
                .map(ArchiveSource::File)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ArchiveSource::File(path.into())
    }

    pub fn bundled(bundle: Bundle, name: impl Into<String>, subdirectory: Option<String>) -> Self {
        ArchiveSource::Bundled {
            bundle,
            name: name.into(),
            subdirectory,
        }
    }

    pub fn bytes(data: Vec<u8>, label: impl Into<String>) -> Self {
        ArchiveSource::Bytes {
            data,
            label: label.into(),
        }
    }

    /// Deterministic identity used for caching and working directories.
    pub fn cache_key(&self) -> String {
        match self {
            ArchiveSource::Url(url) => url.as_str().to_owned(),
            ArchiveSource::File(path) => std::path::absolute(path)
                .unwrap_or_else(|_| path.clone())
                .display()
                .to_string(),
            ArchiveSource::Bundled {
                bundle,
                name,
                subdirectory,
            } => format!(
                "{}{}/{}",
                bundle.identity(),
                subdirectory.as_deref().unwrap_or(""),
                bundle_resource_name(name)
            ),
            ArchiveSource::Bytes { label, .. } => label.clone(),
        }
    }

    /// Human-readable part of the working directory name.
    fn stem(&self) -> String {
        let raw = match self {
            ArchiveSource::Url(url) => SourceUri::Remote(url.clone()).file_stem(),
            ArchiveSource::File(path) => path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            ArchiveSource::Bundled { name, .. } => Some(bundle_resource_name(name).to_owned()),
            ArchiveSource::Bytes { label, .. } => Some(label.clone()),
        };

        let cleaned: String = raw
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
            .take(32)
            .collect();
        if cleaned.is_empty() {
            "archive".to_owned()
        } else {
            cleaned
        }
    }
}

#[derive(Clone)]
pub struct LoaderConfig {
    /// Parent of every per-source extraction directory.
    pub working_dir: PathBuf,
    /// `None` disables caching: every load extracts again.
    pub cache: Option<Arc<dyn CacheProvider>>,
    pub fetcher: Arc<dyn Fetch>,
    pub observer: Arc<dyn Observer>,
}

impl LoaderConfig {
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_cache(mut self, cache: Option<Arc<dyn CacheProvider>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::temp_dir().join("dotlottie"),
            cache: Some(ArchiveCache::shared()),
            fetcher: Arc::new(Transport::default()),
            observer: Arc::new(NoopObserver),
        }
    }
}

struct LoaderInner {
    config: LoaderConfig,
    /// One async mutex per key currently being unpacked.
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Loads archives, consulting the configured cache first.
///
/// Cheap to clone; clones share configuration and in-flight locks.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                config,
                key_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Load an archive, returning the cached handle when the same source was
    /// unpacked before.
    ///
    /// Concurrent loads of one source are serialized, so the second waits
    /// for the first and then finds its result in the cache.
    pub async fn load(&self, source: &ArchiveSource) -> Result<Arc<ArchiveHandle>, LoadError> {
        let key = source.cache_key();
        if let Some(handle) = self.cached(&key) {
            return Ok(handle);
        }
        self.emit(&Event::CacheMiss { key: &key });

        let slot = self.key_lock(&key);
        let _guard = slot.lock.lock().await;
        if let Some(handle) = self.cached(&key) {
            return Ok(handle);
        }
        let handle = self.unpack(source, &key).await?;
        // publish before the guard drops so waiters find it
        if let Some(cache) = &self.inner.config.cache {
            cache.put(&key, handle.clone());
        }
        Ok(handle)
    }

    /// Blocking form of [`load`](Self::load). Must not be called from async code.
    pub fn load_blocking(&self, source: &ArchiveSource) -> Result<Arc<ArchiveHandle>, LoadError> {
        crate::task::block_on(self.load(source))?
    }

    /// Load in the background and pass the result to `on_complete`.
    pub fn load_with<F>(&self, source: ArchiveSource, on_complete: F)
    where
        F: FnOnce(Result<Arc<ArchiveHandle>, LoadError>) + Send + 'static,
    {
        let loader = self.clone();
        crate::task::run_detached(async move { loader.load(&source).await }, on_complete);
    }

    /// Forget every cached handle and delete all working directories.
    pub async fn purge(&self) -> io::Result<()> {
        if let Some(cache) = &self.inner.config.cache {
            cache.clear();
        }
        remove_dir_if_exists(&self.inner.config.working_dir).await
    }

    /// Extraction directory for a source: readable stem plus a key hash.
    pub fn working_dir_for(&self, source: &ArchiveSource) -> PathBuf {
        self.working_dir_for_key(source, &source.cache_key())
    }

    fn working_dir_for_key(&self, source: &ArchiveSource, key: &str) -> PathBuf {
        let digest = blake3::hash(key.as_bytes()).to_hex();
        self.inner
            .config
            .working_dir
            .join(format!("{}-{}", source.stem(), &digest[..16]))
    }

    fn cached(&self, key: &str) -> Option<Arc<ArchiveHandle>> {
        let handle = self.inner.config.cache.as_ref()?.get(key)?;
        self.emit(&Event::CacheHit { key });
        Some(handle)
    }

    fn emit(&self, event: &Event<'_>) {
        self.inner.config.observer.on_event(event);
    }

    fn key_lock<'a>(&'a self, key: &'a str) -> KeyLock<'a> {
        let lock = self
            .inner
            .key_locks
            .lock()
            .entry(key.to_owned())
            .or_default()
            .clone();
        KeyLock {
            locks: &self.inner.key_locks,
            key,
            lock,
        }
    }

    /// Number of keys with a load in flight.
    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.inner.key_locks.lock().len()
    }

    async fn unpack(
        &self,
        source: &ArchiveSource,
        key: &str,
    ) -> Result<Arc<ArchiveHandle>, LoadError> {
        let dir = self.working_dir_for_key(source, key);
        let unavailable = |reason: FetchError| LoadError::SourceUnavailable {
            source_key: key.to_owned(),
            reason,
        };

        match source {
            ArchiveSource::Url(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| unavailable(io::Error::from(io::ErrorKind::InvalidInput).into()))?;
                let reader = LocalFileReader::new(&path).map_err(|e| unavailable(e.into()))?;
                self.unpack_from(Arc::new(reader), key, &dir).await
            }
            ArchiveSource::Url(url) => {
                self.emit(&Event::Fetching { source: key });
                let data = self
                    .inner
                    .config
                    .fetcher
                    .fetch(&SourceUri::Remote(url.clone()))
                    .await
                    .map_err(unavailable)?;
                self.unpack_from(Arc::new(MemoryReader::new(data)), key, &dir)
                    .await
            }
            ArchiveSource::File(path) => {
                let reader = LocalFileReader::new(path).map_err(|e| unavailable(e.into()))?;
                self.unpack_from(Arc::new(reader), key, &dir).await
            }
            ArchiveSource::Bundled {
                bundle,
                name,
                subdirectory,
            } => {
                let path = bundle.resource_path(name, subdirectory.as_deref());
                let reader = LocalFileReader::new(&path).map_err(|e| unavailable(e.into()))?;
                self.unpack_from(Arc::new(reader), key, &dir).await
            }
            ArchiveSource::Bytes { data, .. } => {
                self.unpack_from(Arc::new(MemoryReader::new(data.clone())), key, &dir)
                    .await
            }
        }
    }

    async fn unpack_from<R: ReadAt>(
        &self,
        reader: Arc<R>,
        key: &str,
        dir: &Path,
    ) -> Result<Arc<ArchiveHandle>, LoadError> {
        if reader.size() == 0 {
            return Err(LoadError::NoDataLoaded(key.to_owned()));
        }

        let mut signature = [0u8; 4];
        let n = reader.read_at(0, &mut signature).await?;
        if n < signature.len()
            || (&signature[..] != LocalFileHeader::SIGNATURE
                && &signature[..] != EndOfCentralDirectory::SIGNATURE)
        {
            return Err(LoadError::NotAnArchive(key.to_owned()));
        }

        // Never let files from an earlier extraction leak into this one.
        remove_dir_if_exists(dir).await?;
        tokio::fs::create_dir_all(dir).await?;

        let files = match ZipExtractor::new(reader).extract_all(dir).await {
            Ok(files) => files,
            Err(e) => {
                discard(dir).await;
                return Err(LoadError::ExtractionFailed(e));
            }
        };
        self.emit(&Event::Extracted {
            key,
            dir,
            files: files.len(),
        });

        let layout = ArchiveLayout::extracted(dir);
        let manifest = match read_manifest(&layout.manifest_path).await {
            Ok(manifest) => manifest,
            Err(e) => {
                discard(dir).await;
                return Err(LoadError::MalformedManifest(e));
            }
        };

        let handle = match ArchiveHandle::scan(key, dir, manifest).await {
            Ok(handle) => handle,
            Err(e) => {
                discard(dir).await;
                return Err(e.into());
            }
        };
        self.emit(&Event::Loaded {
            key,
            animations: handle.animations().len(),
            images: handle.images().len(),
        });
        Ok(Arc::new(handle))
    }
}

/// Entry in the per-key lock table; removes itself once the last holder is gone,
/// including when the load is cancelled or unwinds.
struct KeyLock<'a> {
    locks: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    key: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // one reference in the table, one here
        let ours = locks
            .get(self.key)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock));
        if ours && Arc::strong_count(&self.lock) == 2 {
            locks.remove(self.key);
        }
    }
}

async fn read_manifest(path: &Path) -> Result<Manifest, crate::manifest::ManifestError> {
    Manifest::decode(&tokio::fs::read(path).await?)
}

async fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Best-effort cleanup after a failed extraction.
async fn discard(dir: &Path) {
    if let Err(e) = remove_dir_if_exists(dir).await {
        tracing::warn!("could not remove {}: {e}", dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_are_deterministic() {
        let bundle = Bundle::with_identity("/app/resources", "com.example.app");
        let a = ArchiveSource::bundled(bundle.clone(), "wave.lottie", Some("anims".to_owned()));
        let b = ArchiveSource::bundled(bundle, "wave", Some("anims".to_owned()));
        assert_eq!(a.cache_key(), "com.example.appanims/wave");
        assert_eq!(a.cache_key(), b.cache_key());

        let url = ArchiveSource::url("https://example.com/a/wave.lottie").unwrap();
        assert_eq!(url.cache_key(), "https://example.com/a/wave.lottie");

        let bytes = ArchiveSource::bytes(vec![1, 2, 3], "inline-wave");
        assert_eq!(bytes.cache_key(), "inline-wave");
    }

    #[test]
    fn file_keys_are_absolute() {
        let key = ArchiveSource::file("relative/wave.lottie").cache_key();
        assert!(Path::new(&key).is_absolute());
    }

    #[test]
    fn bundle_resource_paths() {
        let bundle = Bundle::new("/res");
        assert_eq!(
            bundle.resource_path("wave.lottie", None),
            Path::new("/res/wave.lottie")
        );
        assert_eq!(
            bundle.resource_path("wave", Some("themes")),
            Path::new("/res/themes/wave.lottie")
        );
    }

    #[test]
    fn working_dirs_are_scoped_by_key() {
        let loader = Loader::new(LoaderConfig::default().with_working_dir("/work"));
        let a = loader.working_dir_for(&ArchiveSource::bytes(Vec::new(), "same name"));
        let b = loader.working_dir_for(&ArchiveSource::bytes(Vec::new(), "same-name"));
        assert_ne!(a, b);
        assert!(a.starts_with("/work"));
        assert!(
            a.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("samename-")
        );
    }

    #[tokio::test]
    async fn rejects_empty_and_foreign_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(
            LoaderConfig::default()
                .with_working_dir(dir.path())
                .with_cache(None),
        );

        let err = loader
            .load(&ArchiveSource::bytes(Vec::new(), "empty"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NoDataLoaded(_)));

        let err = loader
            .load(&ArchiveSource::bytes(b"{\"v\":\"5.7\"}".to_vec(), "json"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NotAnArchive(_)));
    }

    const MANIFEST: &str = r##"{"animations":[{"id":"a","loop":true,"speed":1.0,"themeColor":"#ffffff"}],
        "version":"1.0","author":"t","generator":"t"}"##;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = crate::zip::ZipWriter::new(Vec::new());
        for (name, data) in entries {
            writer.add_file(name, data.as_bytes()).unwrap();
        }
        writer.finish().unwrap()
    }

    fn uncached(work: &Path) -> Loader {
        Loader::new(
            LoaderConfig::default()
                .with_working_dir(work)
                .with_cache(None),
        )
    }

    struct StalledFetcher;

    #[async_trait::async_trait]
    impl Fetch for StalledFetcher {
        async fn fetch(&self, _uri: &SourceUri) -> Result<Vec<u8>, FetchError> {
            std::future::pending().await
        }
    }

    #[test]
    fn url_sources_by_scheme() {
        assert!(matches!(
            ArchiveSource::url("https://example.com/a.lottie"),
            Ok(ArchiveSource::Url(_))
        ));
        assert!(ArchiveSource::url("ftp://example.com/a.lottie").is_err());
        assert!(ArchiveSource::url("not a url").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn file_urls_become_file_sources() {
        let source = ArchiveSource::url("file:///srv/anims/wave.lottie").unwrap();
        assert!(matches!(&source, ArchiveSource::File(p) if p == Path::new("/srv/anims/wave.lottie")));
        assert_eq!(source.cache_key(), "/srv/anims/wave.lottie");
    }

    #[tokio::test]
    async fn file_scheme_url_variant_reads_locally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.lottie");
        std::fs::write(&path, archive(&[("manifest.json", MANIFEST), ("animations/a.json", "{}")]))
            .unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let handle = uncached(&dir.path().join("work"))
            .load(&ArchiveSource::Url(url))
            .await
            .unwrap();
        assert!(handle.animation("a").is_some());
    }

    #[tokio::test]
    async fn failed_scan_discards_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let loader = uncached(dir.path());
        // a plain file where the animations directory should be
        let source = ArchiveSource::bytes(
            archive(&[("manifest.json", MANIFEST), ("animations", "{}")]),
            "flat",
        );

        let err = loader.load(&source).await.unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
        assert!(!loader.working_dir_for(&source).exists());
    }

    #[tokio::test]
    async fn abandoned_load_releases_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(
            LoaderConfig::default()
                .with_working_dir(dir.path())
                .with_cache(None)
                .with_fetcher(Arc::new(StalledFetcher)),
        );
        let source = ArchiveSource::url("https://example.com/slow.lottie").unwrap();

        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            loader.load(&source),
        )
        .await;
        assert!(attempt.is_err());
        assert_eq!(loader.in_flight(), 0);
    }

    #[tokio::test]
    async fn finished_loads_release_their_key() {
        let dir = tempfile::tempdir().unwrap();
        let loader = uncached(dir.path());
        let _ = loader
            .load(&ArchiveSource::bytes(b"nope".to_vec(), "x"))
            .await;
        assert_eq!(loader.in_flight(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(
            LoaderConfig::default()
                .with_working_dir(dir.path())
                .with_cache(None),
        );
        let err = loader
            .load(&ArchiveSource::file(dir.path().join("nope.lottie")))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::SourceUnavailable { .. }));
        assert!(!err.is_retryable());
    }
}
